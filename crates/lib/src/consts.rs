//! Names and label keys shared across the engine.

pub const APP_NAME: &str = "keelos";

/// Length of the truncated hash used for applied-hash entries.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

pub const LABEL_SCOPE: &str = "io.keelos.scope";
pub const LABEL_DETACH: &str = "io.keelos.detach";
pub const LABEL_CREATE_ONLY: &str = "io.keelos.createonly";
pub const LABEL_RELOAD_CONFIG: &str = "io.keelos.reloadconfig";
pub const LABEL_REBUILD: &str = "io.keelos.rebuild";
/// Console identity; a change on the console service always forces a rebuild.
pub const LABEL_CONSOLE: &str = "io.keelos.console";
/// Stamped by the runtime on create with the hash of the spec it was created from.
pub const LABEL_CONFIG_HASH: &str = "io.keelos.config-hash";
/// Stamped by the runtime on create with the owning service name.
pub const LABEL_SERVICE: &str = "io.keelos.service";

pub const SCOPE_SYSTEM: &str = "system";
pub const REBUILD_ALWAYS: &str = "always";

pub const CONSOLE_SERVICE: &str = "console";
pub const ENGINE_SERVICE: &str = "docker";
pub const NETWORK_SERVICE: &str = "network";
pub const SYSLOG_SERVICE: &str = "syslog";

/// Console value meaning "keep the built-in console".
pub const DEFAULT_CONSOLE: &str = "default";

pub const SYSLOG_DRIVER: &str = "syslog";

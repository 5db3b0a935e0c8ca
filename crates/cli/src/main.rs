mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use keelos_lib::loader::CatalogKind;

use cmd::{cmd_cache_refresh, cmd_plan, cmd_service_list, cmd_service_show};
use output::OutputFormat;

/// keel - inspect and dry-run the keelos service engine
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Path to the engine configuration (default: $KEELOS_CONFIG or ~/.config/keelos/keelos.yml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Show the runtime calls one reconcile pass would make (dry-run)
  Plan {
    /// Treat the network as up, allowing remote loads
    #[arg(long)]
    network: bool,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
  },

  /// Inspect service definitions
  Service {
    #[command(subcommand)]
    command: ServiceCommands,
  },

  /// Manage the resource cache
  Cache {
    #[command(subcommand)]
    command: CacheCommands,
  },
}

#[derive(Subcommand)]
enum ServiceCommands {
  /// Resolve a service and show its hash, policy and links
  Show {
    /// Service name, path, or URL
    name: String,

    /// Allow remote loads
    #[arg(long)]
    network: bool,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
  },

  /// List the services published by the configured repositories
  List {
    /// Catalog section to list (default: all)
    #[arg(long, value_enum)]
    kind: Option<KindArg>,

    /// Print machine-readable JSON
    #[arg(long)]
    json: bool,
  },
}

#[derive(Subcommand)]
enum CacheCommands {
  /// Refetch cached catalog indexes and the documents they list
  Refresh {
    /// Catalog section to refresh (default: all)
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
  },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
  Services,
  Consoles,
  Engines,
}

impl From<KindArg> for CatalogKind {
  fn from(kind: KindArg) -> Self {
    match kind {
      KindArg::Services => CatalogKind::Services,
      KindArg::Consoles => CatalogKind::Consoles,
      KindArg::Engines => CatalogKind::Engines,
    }
  }
}

fn kinds(kind: Option<KindArg>) -> Vec<CatalogKind> {
  match kind {
    Some(kind) => vec![kind.into()],
    None => CatalogKind::ALL.to_vec(),
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  // Logs go to stderr so --json output stays parseable.
  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let config = cli.config.as_deref();

  match cli.command {
    Commands::Plan { network, json } => cmd_plan(config, network, OutputFormat::from_flag(json)),
    Commands::Service { command } => match command {
      ServiceCommands::Show { name, network, json } => {
        cmd_service_show(config, &name, network, OutputFormat::from_flag(json))
      }
      ServiceCommands::List { kind, json } => cmd_service_list(config, &kinds(kind), OutputFormat::from_flag(json)),
    },
    Commands::Cache { command } => match command {
      CacheCommands::Refresh { kind } => cmd_cache_refresh(config, &kinds(kind)),
    },
  }
}

//! # `oai-harvest`
//!
//! Harvests a Linked Data Platform repository into an OAI-PMH store.
//!
//! ## Usage
//!
//! ```bash
//! oai-harvest --config ./config/harvest.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `oai-harvest init` | Create the SQLite database and run schema migrations |
//! | `oai-harvest formats add <prefix> --schema <url> --namespace <uri>` | Register a metadata format |
//! | `oai-harvest formats list` | List registered formats with record counts |
//! | `oai-harvest harvest` | Walk the repository and store sets, records and metadata |
//! | `oai-harvest stats` | Show store counts |
//!
//! ## Examples
//!
//! ```bash
//! oai-harvest init
//! oai-harvest formats add oai_dc \
//!     --schema http://www.openarchives.org/OAI/2.0/oai_dc.xsd \
//!     --namespace http://www.openarchives.org/OAI/2.0/oai_dc/
//! oai-harvest harvest -v --sleep 1
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ldp_oai_harvest::{config, formats, harvest, migrate, stats};

/// Harvest an LDP repository into an OAI-PMH store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harvest.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "oai-harvest", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    /// `RUST_LOG` takes precedence when set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage metadata formats.
    Formats {
        #[command(subcommand)]
        action: FormatsAction,
    },

    /// Walk the repository from `source.root_url` and store what it finds.
    ///
    /// Exits non-zero only if the root resource cannot be fetched or the
    /// database fails; everything else is reported in the summary.
    Harvest {
        /// Seconds to wait between requests (overrides `harvest.rate_limit_ms`).
        #[arg(short, long)]
        sleep: Option<f64>,
    },

    /// Show store statistics.
    Stats,
}

#[derive(Subcommand)]
enum FormatsAction {
    /// Register a metadata format, or update its schema and namespace.
    Add {
        /// Metadata prefix, e.g. `oai_dc`.
        prefix: String,

        /// Schema URL.
        #[arg(long)]
        schema: String,

        /// Namespace URI.
        #[arg(long)]
        namespace: String,
    },

    /// List registered formats.
    List,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Formats { action } => match action {
            FormatsAction::Add {
                prefix,
                schema,
                namespace,
            } => {
                formats::run_formats_add(&cfg, &prefix, &schema, &namespace).await?;
            }
            FormatsAction::List => {
                formats::run_formats_list(&cfg).await?;
            }
        },
        Commands::Harvest { sleep } => {
            harvest::run_harvest_command(&cfg, sleep).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}

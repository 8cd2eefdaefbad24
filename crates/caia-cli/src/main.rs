use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod dest;
mod items;
mod transport;

#[derive(Parser)]
#[command(name = "caia-cli")]
#[command(about = "CAIA circulation-request sync jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one circrequests job: fetch holds, diff, send new requests, record denials
    Circrequests {
        /// Layered config paths in merge order (base -> site -> ...)
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Run one items job: fetch new and updated items since the last success, send both lists
    Items {
        /// Layered config paths in merge order (base -> site -> ...)
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Offline diff of two saved source responses; prints the diff result JSON
    Diff {
        /// Field whose value identifies a record
        #[arg(long)]
        key_field: String,

        /// Previous source response file
        #[arg(long)]
        previous: String,

        /// Current source response file
        #[arg(long)]
        current: String,

        /// Denial ledger file (key -> denial timestamp); empty when omitted
        #[arg(long)]
        ledger: Option<String>,

        /// Denied keys are resubmitted only after this many seconds
        #[arg(long, default_value_t = caia_reconcile::DEFAULT_COOLDOWN_SECONDS)]
        cooldown_seconds: u64,

        /// Evaluation time (RFC 3339); defaults to the current UTC time
        #[arg(long)]
        now: Option<String>,

        /// Response field holding the record array
        #[arg(long, default_value = caia_reconcile::snapshot_adapter::DEFAULT_RECORDS_FIELD)]
        records_field: String,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Remove the last-success lookup and the denial ledger so the next run starts fresh
    Reset {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Remove every `*.json` in the circrequests storage dir, then reset
    Clean {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // dev convenience; a missing file is fine
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Circrequests { config_paths } => {
            let outcome = commands::circrequests::run(&config_paths).await?;
            println!("job_id={}", outcome.job_id);
            println!("new_entries={}", outcome.new_entries);
            println!("denied_keys={}", outcome.denied_keys);
        }

        Commands::Items { config_paths } => {
            let outcome = commands::items::run(&config_paths).await?;
            println!("job_id={}", outcome.job_id);
            println!("new_items={}", outcome.new_items);
            println!("updated_items={}", outcome.updated_items);
        }

        Commands::Diff {
            key_field,
            previous,
            current,
            ledger,
            cooldown_seconds,
            now,
            records_field,
        } => {
            let result = commands::diff::run(commands::diff::DiffArgs {
                key_field,
                previous,
                current,
                ledger,
                cooldown_seconds,
                now,
                records_field,
            })?;
            let out = serde_json::to_string_pretty(&result.to_json()?)
                .context("serialize diff result failed")?;
            println!("{out}");
        }

        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Reset { config_paths } => {
            let removed = commands::circrequests::reset(&config_paths)?;
            for path in removed {
                println!("removed={}", path.display());
            }
        }

        Commands::Clean { config_paths } => {
            let removed = commands::circrequests::clean(&config_paths)?;
            for path in removed {
                println!("removed={}", path.display());
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

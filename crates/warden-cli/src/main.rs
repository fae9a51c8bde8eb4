//! Warden CLI - fleet monitoring server

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warden_codec::KeyPair;
use warden_core::{HttpTransport, Warden};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - update monitoring for a fleet of sites")]
struct Cli {
    /// Configuration file path (defaults to ./warden.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Generate the server key pair
    Keygen {
        /// Replace an existing key file
        #[arg(long)]
        force: bool,
    },
    /// Print the server public key
    PublicKey,
    /// Poll every registered site once
    Refresh,
    /// List sites and pending updates
    Sites,
    /// Check configuration validity
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = warden_cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Serve) => {
            let warden = Warden::open(config).context("failed to start")?;
            warden_cli::server::serve(warden).await?;
        }
        Some(Commands::Keygen { force }) => {
            let path = &config.keys.secret_key_path;
            if path.exists() && !force {
                anyhow::bail!("{} exists; pass --force to replace it", path.display());
            }
            let keys = KeyPair::generate();
            keys.save(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", warden_codec::PayloadCodec::new(keys).public_key_base64());
        }
        Some(Commands::PublicKey) => {
            let path = &config.keys.secret_key_path;
            let encoded = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let keys = KeyPair::from_secret_base64(&encoded)?;
            println!("{}", warden_codec::PayloadCodec::new(keys).public_key_base64());
        }
        Some(Commands::Refresh) => {
            let transport = HttpTransport::new(&config.refresh)?;
            let warden = Warden::open(config)?;
            let summary = warden.reconciler().refresh_all(&transport).await?;
            println!(
                "Refreshed {} of {} sites",
                summary.refreshed.len(),
                summary.attempted()
            );
            for failure in &summary.failed {
                println!("  FAILED {} - {}", failure.url, failure.error);
            }
        }
        Some(Commands::Sites) => {
            let stale_after = config.health.stale_after();
            let warden = Warden::open(config)?;
            let rows = warden
                .reconciler()
                .list_site_summaries(chrono::Utc::now(), stale_after)
                .await?;
            for row in rows {
                let flag = if row.needs_attention() { "!" } else { " " };
                println!(
                    "{} {:<32} {:<40} security={} updates={}{}",
                    flag,
                    row.name,
                    row.url,
                    row.security_updates,
                    row.regular_updates,
                    if row.not_updated { " (stale)" } else { "" }
                );
            }
        }
        Some(Commands::Check) => {
            println!("{}", toml::to_string_pretty(&config)?);
            println!("Configuration OK");
        }
        None => {
            println!("Warden v{} - Use --help for commands", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use favicon_cache::{
    config::{Config, defaults::DEFAULT_CONFIG_FILE},
    models::{Fingerprint, ScaledImage},
    services::FaviconService,
};

/// Exit code for `peek` when the site has no cached icon
const EXIT_MISS: u8 = 2;

#[derive(Parser)]
#[command(name = "favicon-cache")]
#[command(version)]
#[command(about = "Fetch, scale and cache website icons")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the icon for a site, using the cache when possible
    Load {
        site: String,
        /// Where to write the PNG (defaults to <fingerprint>.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the cached icon for a site without touching the network
    Peek {
        site: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print cache occupancy as JSON
    Stats,
    /// Remove every cached icon
    Clear,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_filter = format!("favicon_cache={}", cli.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load(Some(cli.config.as_path()))?;
    let service = FaviconService::from_config(&config)
        .await
        .context("failed to start icon pipeline")?;

    match cli.command {
        Command::Load { site, output } => {
            let image = service.fetch_icon(&site).await?;
            write_icon(&site, &image, output)?;
        }
        Command::Peek { site, output } => match service.cached_icon(&site).await {
            Some(image) => write_icon(&site, &image, output)?,
            None => {
                info!("No cached icon for {}", site);
                return Ok(ExitCode::from(EXIT_MISS));
            }
        },
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&service.stats().await)?);
        }
        Command::Clear => {
            service.clear().await?;
            info!("Cache cleared");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn write_icon(site: &str, image: &ScaledImage, output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.png", Fingerprint::of_site(site))));
    image
        .save_with_format(&path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

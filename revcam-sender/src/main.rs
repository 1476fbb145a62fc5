//! revcam sender entry point.
//!
//! ```text
//! revcam-sender                     Run with revcam-sender.toml (or defaults)
//! revcam-sender --config <path>     Load a custom config TOML
//! revcam-sender --target <addr>     Override network.target_address
//! revcam-sender --source <path>     Override stream.source
//! revcam-sender --fps <n>           Override stream.fps
//! revcam-sender --gen-config        Write default config to stdout
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use revcam_sender::config::AppConfig;
use revcam_sender::service::SenderService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "revcam-sender", about = "Stream JPEG frames to a revcam receiver over UDP")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "revcam-sender.toml")]
    config: PathBuf,

    /// Receiver address (host:port).
    #[arg(short, long)]
    target: Option<SocketAddr>,

    /// JPEG file or directory of JPEG files.
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Frames per second.
    #[arg(long)]
    fps: Option<f64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&AppConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = AppConfig::load(&cli.config);
    if let Some(target) = cli.target {
        config.network.target_address = target.to_string();
    }
    if let Some(source) = cli.source {
        config.stream.source = source;
    }
    if let Some(fps) = cli.fps {
        config.stream.fps = fps;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("revcam-sender v{}", env!("CARGO_PKG_VERSION"));
    info!("target: {}", config.network.target_address);
    info!("source: {}", config.stream.source.display());
    info!("header: {:?}, payload {} bytes", config.stream.header, config.stream.payload_size);

    let service = SenderService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    let stats = service.run().await?;
    info!(
        frames = stats.frames,
        skipped = stats.skipped,
        send_errors = stats.send_errors,
        "done"
    );
    Ok(())
}

//! revcam receiver entry point.
//!
//! ```text
//! revcam-receiver                     Run with revcam-receiver.toml (or defaults)
//! revcam-receiver --config <path>     Load a custom config TOML
//! revcam-receiver --listen <addr>     Override network.listen_address
//! revcam-receiver --gen-config        Write default config to stdout
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use revcam_receiver::config::AppConfig;
use revcam_receiver::service::ReceiverService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "revcam-receiver", about = "Receive and reassemble revcam frames over UDP")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "revcam-receiver.toml")]
    config: PathBuf,

    /// Address to listen on (host:port).
    #[arg(short, long)]
    listen: Option<SocketAddr>,

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
    if let Some(listen) = cli.listen {
        config.network.listen_address = listen.to_string();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("revcam-receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("listen: {}", config.network.listen_address);
    info!(
        "header: {:?}, jitter window {} ms, frame timeout {} ms",
        config.stream.header, config.reassembly.jitter_window_ms, config.reassembly.frame_timeout_ms
    );

    let service = ReceiverService::new(config);
    let stop = service.stop_handle();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    let stats = service.run().await?;
    info!(
        datagrams = stats.datagrams,
        delivered = stats.delivered,
        malformed = stats.malformed,
        "done"
    );
    Ok(())
}

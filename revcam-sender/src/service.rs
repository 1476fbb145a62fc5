//! Sender service lifecycle: open the source, bind the socket, stream
//! until stopped.

use revcam_core::{CamError, CancellationToken, FrameTransmitter, SenderStats, StreamSender};
use tracing::info;

use crate::config::AppConfig;
use crate::source::JpegFileSource;

/// The top-level sender service.
pub struct SenderService {
    config: AppConfig,
    shutdown: CancellationToken,
}

impl SenderService {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the service when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stream until stopped or the source runs out.
    pub async fn run(&self) -> Result<SenderStats, CamError> {
        let bind = self.config.bind_addr()?;
        let target = self.config.target_addr()?;

        let source = JpegFileSource::open(&self.config.stream.source, self.config.stream.loop_source)?;
        let transmitter =
            FrameTransmitter::bind(bind, target, self.config.network.send_buffer_bytes).await?;
        info!("sending from {}", transmitter.socket().local_addr()?);

        let sender = StreamSender::new(source, transmitter, self.config.to_sender_config()?)?;
        sender.run(self.shutdown.clone()).await
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Receiver service lifecycle: bind, ingest into the latest-frame
//! cell, report until stopped.

use revcam_core::{
    CamError, CancellationToken, IngestLoop, LatestFrameCell, LatestFrameReader, ReceiverStats,
};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::reporter::Reporter;

/// The top-level receiver service.
pub struct ReceiverService {
    config: AppConfig,
    shutdown: CancellationToken,
}

impl ReceiverService {
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

    /// Bind the socket and return the running pieces without starting
    /// them.
    pub async fn prepare(&self) -> Result<(IngestLoop<LatestFrameCell>, LatestFrameReader), CamError> {
        let ingest_config = self.config.to_ingest_config()?;
        let cell = LatestFrameCell::new();
        let reader = cell.reader();
        let ingest = IngestLoop::bind(
            self.config.listen_addr()?,
            self.config.network.recv_buffer_bytes,
            ingest_config,
            cell,
        )
        .await?;
        Ok((ingest, reader))
    }

    /// Receive until stopped.
    ///
    /// The reporter stops with the ingest loop, whichever way it ends.
    pub async fn run(&self) -> Result<ReceiverStats, CamError> {
        let (ingest, reader) = self.prepare().await?;

        let mut reporter = Reporter::new(
            reader,
            self.config.report_interval(),
            std::time::Duration::from_millis(self.config.ingest.stale_after_ms.max(1)),
        )
        .with_stats(ingest.stats_receiver());
        if let Some(path) = self.config.snapshot_path() {
            info!("writing snapshots to {}", path.display());
            reporter = reporter.with_snapshot_path(path);
        }

        let reporter_token = self.shutdown.child_token();
        let reporter_handle = tokio::spawn(reporter.run(reporter_token.clone()));

        let result = ingest.run(self.shutdown.clone()).await;

        reporter_token.cancel();
        if let Err(e) = reporter_handle.await {
            warn!("reporter task failed: {e}");
        }
        result
    }
}

// ── Tests ────────────────────────────────────────────────────────

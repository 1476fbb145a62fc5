//! Configuration for the receiver.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use revcam_core::{CamError, DEFAULT_SOCKET_BUFFER, HeaderKind, IngestConfig, ReassemblyConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub reassembly: ReassemblySettings,
    pub ingest: IngestSettings,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to receive fragments on.
    pub listen_address: String,
    /// Requested kernel receive buffer.
    pub recv_buffer_bytes: usize,
}

/// Expected stream shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Header shape: "timed" or "counted".
    pub header: HeaderKind,
    /// Accepted payload type on timed streams. Negative accepts any.
    pub payload_type: i16,
}

/// Reassembly windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblySettings {
    /// Grace period for a frame with a gap after its last fragment.
    pub jitter_window_ms: u64,
    /// Hard limit on how long a frame may stay incomplete.
    pub frame_timeout_ms: u64,
    /// Fragments per frame before the frame is rejected.
    pub max_fragments: usize,
}

/// Ingest loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Receive timeout between sweeps.
    pub poll_interval_ms: u64,
    /// No frame for this long is reported as signal loss.
    pub stale_after_ms: u64,
}

/// What to do with received frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Write each new frame here. Empty disables.
    pub snapshot_path: PathBuf,
    /// How often the reporter looks at the latest frame.
    pub report_interval_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:5004".into(),
            recv_buffer_bytes: DEFAULT_SOCKET_BUFFER,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            header: HeaderKind::Timed,
            payload_type: i16::from(revcam_core::DEFAULT_PAYLOAD_TYPE),
        }
    }
}

impl Default for ReassemblySettings {
    fn default() -> Self {
        let defaults = ReassemblyConfig::default();
        Self {
            jitter_window_ms: defaults.jitter_window.as_millis() as u64,
            frame_timeout_ms: defaults.frame_timeout.as_millis() as u64,
            max_fragments: defaults.max_fragments,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            stale_after_ms: 1000,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::new(),
            report_interval_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, CamError> {
        let value = &self.network.listen_address;
        value
            .parse()
            .map_err(|e| CamError::InvalidConfig(format!("network.listen_address = {value:?}: {e}")))
    }

    /// Convert the reassembly and ingest settings into an
    /// [`IngestConfig`].
    ///
    /// Out-of-range timings are clamped. A payload type above 127, or a
    /// jitter window that is not shorter than the frame timeout, is an
    /// error.
    pub fn to_ingest_config(&self) -> Result<IngestConfig, CamError> {
        let config = IngestConfig {
            header: self.stream.header,
            payload_type: self.payload_type_filter()?,
            reassembly: ReassemblyConfig {
                jitter_window: Duration::from_millis(self.reassembly.jitter_window_ms),
                frame_timeout: Duration::from_millis(self.reassembly.frame_timeout_ms.max(1)),
                max_fragments: self.reassembly.max_fragments.clamp(1, usize::from(u16::MAX)),
            },
            poll_interval: Duration::from_millis(self.ingest.poll_interval_ms.clamp(1, 1000)),
            stale_after: Duration::from_millis(self.ingest.stale_after_ms.max(1)),
        };
        config.validate()?;
        Ok(config)
    }

    /// Payload type to accept, `None` for any.
    fn payload_type_filter(&self) -> Result<Option<u8>, CamError> {
        let value = self.stream.payload_type;
        if value < 0 {
            return Ok(None);
        }
        match u8::try_from(value) {
            Ok(pt) if pt <= revcam_core::header::MAX_PAYLOAD_TYPE => Ok(Some(pt)),
            _ => Err(CamError::InvalidConfig(format!(
                "stream.payload_type = {value}: must be 0..=127, or negative for any"
            ))),
        }
    }

    /// Reporter period.
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.output.report_interval_ms.max(10))
    }

    /// Snapshot destination, if enabled.
    pub fn snapshot_path(&self) -> Option<&Path> {
        let path = self.output.snapshot_path.as_path();
        (!path.as_os_str().is_empty()).then_some(path)
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Configuration for the sender.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use revcam_core::header::MAX_PAYLOAD_TYPE;
use revcam_core::{CamError, DEFAULT_PAYLOAD_SIZE, DEFAULT_SOCKET_BUFFER, HeaderKind, SenderConfig};

/// Largest UDP payload over IPv4 minus the larger header.
const MAX_PAYLOAD_SIZE: usize = 65_507 - revcam_core::TimedHeader::SIZE;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Socket settings.
    pub network: NetworkConfig,
    /// Stream shape and frame source.
    pub stream: StreamConfig,
    /// Schedule recovery.
    pub pacing: PacingConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address to send from.
    pub bind_address: String,
    /// Receiver address.
    pub target_address: String,
    /// Requested kernel send buffer.
    pub send_buffer_bytes: usize,
}

/// Stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Header shape: "timed" or "counted".
    pub header: HeaderKind,
    /// Payload bytes per datagram.
    pub payload_size: usize,
    /// Payload type on timed headers (0..=127).
    pub payload_type: u8,
    /// Frames per second. 0 uses the source's rate, else 30.
    pub fps: f64,
    /// JPEG file, or a directory of JPEG files.
    pub source: PathBuf,
    /// Restart the source when it runs out.
    pub loop_source: bool,
}

/// Pacing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Resynchronise after falling this many frames behind. 0 never does.
    pub max_backlog_frames: u32,
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
            bind_address: "0.0.0.0:0".into(),
            target_address: "127.0.0.1:5004".into(),
            send_buffer_bytes: DEFAULT_SOCKET_BUFFER,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            header: HeaderKind::Timed,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            payload_type: revcam_core::DEFAULT_PAYLOAD_TYPE,
            fps: 0.0,
            source: PathBuf::from("frames"),
            loop_source: true,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            max_backlog_frames: 30,
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

    pub fn bind_addr(&self) -> Result<SocketAddr, CamError> {
        parse_addr("network.bind_address", &self.network.bind_address)
    }

    pub fn target_addr(&self) -> Result<SocketAddr, CamError> {
        parse_addr("network.target_address", &self.network.target_address)
    }

    /// Convert stream settings into a [`SenderConfig`], clamping
    /// out-of-range sizes and rates. A payload type above 127 is an
    /// error.
    pub fn to_sender_config(&self) -> Result<SenderConfig, CamError> {
        let payload_type = self.stream.payload_type;
        if payload_type > MAX_PAYLOAD_TYPE {
            return Err(CamError::InvalidConfig(format!(
                "stream.payload_type = {payload_type}: must be 0..=127"
            )));
        }
        let fps = self.stream.fps;
        Ok(SenderConfig {
            header: self.stream.header,
            payload_size: self.stream.payload_size.clamp(1, MAX_PAYLOAD_SIZE),
            payload_type,
            fps: (fps.is_finite() && fps > 0.0).then(|| fps.min(1000.0)),
            max_backlog_frames: match self.pacing.max_backlog_frames {
                0 => None,
                n => Some(n),
            },
        })
    }
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, CamError> {
    value
        .parse()
        .map_err(|e| CamError::InvalidConfig(format!("{key} = {value:?}: {e}")))
}

// ── Tests ────────────────────────────────────────────────────────

//! # revcam-receiver
//!
//! Receives fragmented camera frames over UDP, reassembles them under
//! loss and reordering, and keeps the newest complete frame available
//! to readers. A reporter logs the stream state and can mirror each
//! frame to a file for an external viewer.
//!
//! ## Usage
//!
//! ```text
//! revcam-receiver --listen 0.0.0.0:5004
//! revcam-receiver --gen-config > revcam-receiver.toml
//! ```

pub mod config;
pub mod reporter;
pub mod service;

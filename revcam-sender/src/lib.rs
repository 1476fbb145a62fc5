//! # revcam-sender
//!
//! Streams JPEG frames from disk to a revcam receiver over UDP. Each
//! frame is split into header-prefixed datagrams and paced on an
//! absolute per-frame schedule.
//!
//! ## Usage
//!
//! ```text
//! revcam-sender --source frames/ --target 192.168.1.20:5004
//! revcam-sender --gen-config > revcam-sender.toml
//! ```

pub mod config;
pub mod service;
pub mod source;

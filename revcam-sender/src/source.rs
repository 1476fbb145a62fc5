//! JPEG frames from disk.

use std::path::Path;

use bytes::Bytes;
use tracing::{info, warn};

use revcam_core::{CamError, FrameSource, MemorySource};

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Plays back a JPEG file, or every `.jpg`/`.jpeg` in a directory in
/// name order.
///
/// Files are read once up front so `next_frame` never touches the disk.
#[derive(Debug, Clone)]
pub struct JpegFileSource {
    frames: MemorySource,
}

impl JpegFileSource {
    pub fn open(path: &Path, looping: bool) -> Result<Self, CamError> {
        let files = if path.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(path)
                .map_err(|e| CamError::Source(format!("{}: {e}", path.display())))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_jpeg_name(p))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut frames = Vec::with_capacity(files.len());
        for file in &files {
            let data = std::fs::read(file)
                .map_err(|e| CamError::Source(format!("{}: {e}", file.display())))?;
            if data.is_empty() {
                warn!("skipping empty file {}", file.display());
                continue;
            }
            if !data.starts_with(&JPEG_SOI) {
                warn!("{} does not start with a JPEG marker", file.display());
            }
            frames.push(Bytes::from(data));
        }

        if frames.is_empty() {
            return Err(CamError::Source(format!(
                "no JPEG frames found at {}",
                path.display()
            )));
        }

        info!(frames = frames.len(), looping, "loaded {}", path.display());
        Ok(Self {
            frames: MemorySource::new(frames, looping),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for JpegFileSource {
    fn next_frame(&mut self) -> Result<Option<Bytes>, CamError> {
        self.frames.next_frame()
    }
}

fn is_jpeg_name(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

// ── Tests ────────────────────────────────────────────────────────

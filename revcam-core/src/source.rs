//! Frame producers for the sender.

use bytes::Bytes;

use crate::error::CamError;

/// Yields encoded frames one at a time.
///
/// `next_frame` runs on the send loop between pacing ticks, so it must
/// return promptly. `Ok(None)` means the source is exhausted; an error
/// skips the current cycle and the loop carries on.
pub trait FrameSource: Send {
    /// Frame rate the source was captured at, if it knows one.
    fn native_fps(&self) -> Option<f64> {
        None
    }

    fn next_frame(&mut self) -> Result<Option<Bytes>, CamError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn native_fps(&self) -> Option<f64> {
        (**self).native_fps()
    }

    fn next_frame(&mut self) -> Result<Option<Bytes>, CamError> {
        (**self).next_frame()
    }
}

// ── MemorySource ─────────────────────────────────────────────────

/// Plays back a fixed list of frames, optionally looping.
#[derive(Debug, Clone)]
pub struct MemorySource {
    frames: Vec<Bytes>,
    position: usize,
    looping: bool,
    fps: Option<f64>,
}

impl MemorySource {
    pub fn new(frames: Vec<Bytes>, looping: bool) -> Self {
        Self {
            frames,
            position: 0,
            looping,
            fps: None,
        }
    }

    /// Report `fps` as the native rate.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for MemorySource {
    fn native_fps(&self) -> Option<f64> {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<Bytes>, CamError> {
        if self.position >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return Ok(None);
            }
            self.position = 0;
        }
        let frame = self.frames[self.position].clone();
        self.position += 1;
        Ok(Some(frame))
    }
}

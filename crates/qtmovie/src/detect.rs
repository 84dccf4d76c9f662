use crate::plugin::{DecoderBackend, DecoderHandle};

/// Decides once per tick whether a newly decoded frame should be pulled
/// into the format converter.
pub trait FrameReadyDetector {
    fn frame_ready(&mut self, backend: &dyn DecoderBackend, handle: DecoderHandle) -> bool;

    /// Forget per-movie state; called when the session closes.
    fn reset(&mut self);
}

/// Push-based backends: the plugin updates textures on the render thread
/// at the host's own cadence, so every tick counts.
#[derive(Debug, Default)]
pub struct EveryTick;

impl FrameReadyDetector for EveryTick {
    fn frame_ready(&mut self, _backend: &dyn DecoderBackend, _handle: DecoderHandle) -> bool {
        true
    }

    fn reset(&mut self) {}
}

/// Pull-based backends: a frame is ready when the decoder's drawn-frame
/// counter moved since the last tick.
#[derive(Debug, Default)]
pub struct DrawnFrameCounter {
    /// `None` until the first prepared tick of a movie.
    last_drawn: Option<u32>,
}

impl DrawnFrameCounter {
    pub fn last_drawn(&self) -> Option<u32> {
        self.last_drawn
    }
}

impl FrameReadyDetector for DrawnFrameCounter {
    fn frame_ready(&mut self, backend: &dyn DecoderBackend, handle: DecoderHandle) -> bool {
        let drawn = backend.frames_drawn(handle);
        if self.last_drawn == Some(drawn) {
            return false;
        }
        self.last_drawn = Some(drawn);
        true
    }

    fn reset(&mut self) {
        self.last_drawn = None;
    }
}

//! Per-frame failure taxonomy.
//!
//! Frame errors travel inside `anyhow::Error`; the pipeline uses
//! `downcast_ref::<FrameError>()` to decide whether a failure counts toward
//! the degraded-stream threshold. `ResourceContention` never does.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameErrorKind {
    /// Capture from the camera failed for a single frame.
    TransientCapture,
    /// The classifier rejected or failed on a single frame.
    Classification,
    /// The camera stayed locked by another viewer past the wait bound.
    ResourceContention,
}

impl FrameErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            FrameErrorKind::TransientCapture => "CAPTURE_FAILED",
            FrameErrorKind::Classification => "CLASSIFY_FAILED",
            FrameErrorKind::ResourceContention => "CAMERA_BUSY",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FrameError {
    pub kind: FrameErrorKind,
    pub message: String,
}

impl FrameError {
    pub fn new(kind: FrameErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for FrameError {}

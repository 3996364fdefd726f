//! Camera capture.
//!
//! This module provides frame sources and the shared camera handle:
//! - Synthetic source (`stub://…`) for tests and hardware-free runs
//! - USB/V4L2 devices (feature: camera-v4l2)
//!
//! Every source yields RGB24 `Frame`s at a fixed resolution. The camera is a
//! single exclusive device: all viewers capture through one `SharedCamera`,
//! which serializes access and bounds how long a caller waits for the lock.

mod frame;
#[cfg(feature = "camera-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

pub use frame::Frame;
pub use synthetic::{CameraProbe, SyntheticCamera};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::error::{FrameError, FrameErrorKind};

const LOCK_RETRY: Duration = Duration::from_millis(2);

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// `stub://…` or a device node such as `/dev/video0`.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

/// Capture statistics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub device: String,
}

/// A blocking, single-owner frame source.
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Open the device. Called once at startup; failure is fatal.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next RGB24 frame.
    fn capture(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> CaptureStats;
}

/// Open (but do not connect) the source named by `config.device`.
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    if config.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(config.clone())));
    }
    if config.device.starts_with("/dev/") {
        #[cfg(feature = "camera-v4l2")]
        {
            return Ok(Box::new(V4l2Camera::new(config.clone())));
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            anyhow::bail!(
                "camera {} requires the camera-v4l2 feature",
                config.device
            )
        }
    }
    Err(anyhow!("unsupported camera device '{}'", config.device))
}

/// The one camera, shared by every viewer pipeline.
pub struct SharedCamera {
    source: Mutex<Box<dyn FrameSource>>,
    lock_timeout: Duration,
}

impl SharedCamera {
    pub fn new(source: Box<dyn FrameSource>, lock_timeout: Duration) -> Self {
        Self {
            source: Mutex::new(source),
            lock_timeout,
        }
    }

    pub(crate) fn acquire(&self) -> Result<MutexGuard<'_, Box<dyn FrameSource>>> {
        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match self.source.try_lock() {
                Ok(guard) => return Ok(guard),
                // A capture that panicked holds no partial state we rely on.
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(FrameError::new(
                            FrameErrorKind::ResourceContention,
                            format!("camera busy for more than {:?}", self.lock_timeout),
                        )
                        .into());
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
            }
        }
    }

    /// Capture one frame. The camera lock is held only for this call.
    pub fn capture(&self) -> Result<Frame> {
        let mut source = self.acquire()?;
        source.capture().map_err(|err| {
            anyhow::Error::from(FrameError::new(
                FrameErrorKind::TransientCapture,
                format!("{}: {:#}", source.name(), err),
            ))
        })
    }

    /// True while some caller holds the camera.
    pub fn is_busy(&self) -> bool {
        matches!(self.source.try_lock(), Err(TryLockError::WouldBlock))
    }

    pub fn stats(&self) -> Result<CaptureStats> {
        Ok(self.acquire()?.stats())
    }

    pub fn is_healthy(&self) -> bool {
        match self.source.try_lock() {
            Ok(source) => source.is_healthy(),
            Err(TryLockError::Poisoned(_)) => false,
            // Busy capturing is healthy.
            Err(TryLockError::WouldBlock) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn stub_camera() -> (SharedCamera, CameraProbe) {
        let mut source = SyntheticCamera::new(CameraConfig {
            width: 32,
            height: 24,
            ..CameraConfig::default()
        });
        source.connect().expect("connect");
        let probe = source.probe();
        (
            SharedCamera::new(Box::new(source), Duration::from_millis(100)),
            probe,
        )
    }

    #[test]
    fn capture_releases_lock_after_each_frame() -> Result<()> {
        let (camera, probe) = stub_camera();
        let frame = camera.capture()?;
        assert_eq!((frame.width(), frame.height()), (32, 24));
        assert!(!camera.is_busy());
        assert_eq!(probe.captures(), 1);
        Ok(())
    }

    #[test]
    fn capture_failure_is_transient_frame_error() {
        let (camera, probe) = stub_camera();
        probe.fail_next(1);
        let err = camera.capture().expect_err("injected failure");
        let frame_err = err.downcast_ref::<FrameError>().expect("typed");
        assert_eq!(frame_err.kind, FrameErrorKind::TransientCapture);
        assert!(camera.capture().is_ok());
    }

    #[test]
    fn held_camera_times_out_as_contention() {
        let (camera, _probe) = stub_camera();
        let camera = Arc::new(camera);
        let guard = camera.acquire().expect("first holder");
        let other = camera.clone();
        let waiter = std::thread::spawn(move || other.capture());
        let result = waiter.join().unwrap();
        drop(guard);
        let err = result.expect_err("contention");
        assert_eq!(
            err.downcast_ref::<FrameError>().map(|e| e.kind),
            Some(FrameErrorKind::ResourceContention)
        );
    }

    #[test]
    fn concurrent_captures_are_serialized() -> Result<()> {
        let (camera, probe) = stub_camera();
        let camera = Arc::new(camera);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let camera = camera.clone();
            handles.push(std::thread::spawn(move || -> Result<()> {
                for _ in 0..10 {
                    camera.capture()?;
                }
                Ok(())
            }));
        }
        for handle in handles {
            handle.join().unwrap()?;
        }
        assert_eq!(probe.captures(), 40);
        assert_eq!(probe.max_concurrent(), 1);
        Ok(())
    }

    #[test]
    fn rejects_unknown_device() {
        let config = CameraConfig {
            device: "rtsp://camera".to_string(),
            ..CameraConfig::default()
        };
        assert!(open_camera(&config).is_err());
    }
}

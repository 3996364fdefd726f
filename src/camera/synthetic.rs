use anyhow::{anyhow, Result};
use rand::Rng;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::{CameraConfig, CaptureStats, Frame, FrameSource};

#[derive(Debug, Default)]
struct ProbeCounters {
    captures: AtomicU64,
    in_flight: AtomicU32,
    max_concurrent: AtomicU32,
    fail_remaining: AtomicU32,
}

/// Synthetic camera for `stub://` devices.
///
/// Produces a slowly drifting gradient with a moving bar and a sprinkle of
/// noise, so consecutive frames differ.
pub struct SyntheticCamera {
    config: CameraConfig,
    connected: bool,
    counters: Arc<ProbeCounters>,
}

/// Observation and fault-injection handle for a `SyntheticCamera`.
#[derive(Clone, Debug)]
pub struct CameraProbe {
    counters: Arc<ProbeCounters>,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            counters: Arc::new(ProbeCounters::default()),
        }
    }

    pub fn probe(&self) -> CameraProbe {
        CameraProbe {
            counters: self.counters.clone(),
        }
    }

    fn generate_pixels(&self, frame_count: u64) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![0u8; width * height * 3];
        let bar_x = (frame_count as usize * 4) % width.max(1);
        for y in 0..height {
            for x in 0..width {
                let offset = (y * width + x) * 3;
                let on_bar = x >= bar_x && x < bar_x + 8;
                pixels[offset] = if on_bar { 230 } else { ((x * 255) / width.max(1)) as u8 };
                pixels[offset + 1] = ((y * 255) / height.max(1)) as u8;
                pixels[offset + 2] = (frame_count % 256) as u8;
            }
        }
        let mut rng = rand::thread_rng();
        for _ in 0..(width * height / 64) {
            let idx = rng.gen_range(0..pixels.len().max(1));
            if let Some(p) = pixels.get_mut(idx) {
                *p = rng.gen();
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticCamera {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticCamera: connected to {} ({}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("{} not connected", self.config.device));
        }
        let counters = &self.counters;
        let in_flight = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_concurrent.fetch_max(in_flight, Ordering::SeqCst);

        let result = if counters
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(anyhow!("injected capture failure"))
        } else {
            let count = counters.captures.fetch_add(1, Ordering::SeqCst) + 1;
            Frame::from_rgb(
                self.config.width,
                self.config.height,
                self.generate_pixels(count),
            )
        };

        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.counters.captures.load(Ordering::SeqCst),
            device: self.config.device.clone(),
        }
    }
}

impl CameraProbe {
    /// Successful captures so far.
    pub fn captures(&self) -> u64 {
        self.counters.captures.load(Ordering::SeqCst)
    }

    /// Highest number of captures observed running at once.
    pub fn max_concurrent(&self) -> u32 {
        self.counters.max_concurrent.load(Ordering::SeqCst)
    }

    /// Make the next `n` captures fail.
    pub fn fail_next(&self, n: u32) {
        self.counters.fail_remaining.store(n, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_requires_connect() {
        let mut camera = SyntheticCamera::new(CameraConfig::default());
        assert!(camera.capture().is_err());
        camera.connect().unwrap();
        assert!(camera.capture().is_ok());
    }

    #[test]
    fn consecutive_frames_differ() -> Result<()> {
        let mut camera = SyntheticCamera::new(CameraConfig {
            width: 64,
            height: 48,
            ..CameraConfig::default()
        });
        camera.connect()?;
        let a = camera.capture()?;
        let b = camera.capture()?;
        assert_eq!(a.pixels().len(), 64 * 48 * 3);
        assert_ne!(a.pixels(), b.pixels());
        assert_eq!(camera.stats().frames_captured, 2);
        Ok(())
    }
}

//! Background motion monitor.
//!
//! One thread for the life of the service:
//! - Idle: sensor disabled, re-check the flag every idle interval
//! - Waiting: sensor enabled, wait (bounded by the idle interval) for an edge
//! - Active: motion flag held true for the full cool-down, then cleared
//!
//! Disabling the sensor during a cool-down does not clear the motion flag
//! early; the window always runs to completion. Edges reported during a
//! cool-down or while the sensor was disabled are discarded before the next
//! wait, so only fresh motion opens a new window.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::control::ControlState;
use crate::sensor::MotionSensor;

const SHUTDOWN_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MotionSettings {
    /// Poll interval while the sensor is disabled, and the longest a single
    /// sensor wait may block.
    pub idle_interval: Duration,
    /// How long motion stays reported after an edge.
    pub cooldown: Duration,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(500),
            cooldown: Duration::from_secs(10),
        }
    }
}

/// Handle for the monitor thread.
#[derive(Debug)]
pub struct MotionMonitor {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl MotionMonitor {
    pub fn spawn(
        sensor: Box<dyn MotionSensor>,
        control: Arc<ControlState>,
        settings: MotionSettings,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("motion-monitor".into())
            .spawn(move || run_monitor(sensor, &control, settings, &shutdown_thread))
            .context("failed to spawn motion monitor thread")?;
        Ok(Self {
            shutdown,
            join: Some(join),
        })
    }

    /// Signal the monitor and wait for it to exit.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("motion monitor thread panicked"))?;
        }
        Ok(())
    }
}

fn run_monitor(
    mut sensor: Box<dyn MotionSensor>,
    control: &ControlState,
    settings: MotionSettings,
    shutdown: &AtomicBool,
) {
    log::info!(
        "motion monitor started on {} (cool-down {:?})",
        sensor.name(),
        settings.cooldown
    );
    // False after a cool-down or a disabled spell: pending edges are stale.
    let mut armed = true;
    while !shutdown.load(Ordering::SeqCst) {
        if !control.sensor_enabled() {
            armed = false;
            sleep_unless_shutdown(shutdown, settings.idle_interval);
            continue;
        }
        if !armed {
            sensor.discard_pending();
            armed = true;
        }
        match sensor.wait_for_motion(settings.idle_interval) {
            Ok(true) => {
                control.set_motion_active(true);
                log::info!("motion detected by {}", sensor.name());
                sleep_unless_shutdown(shutdown, settings.cooldown);
                control.set_motion_active(false);
                armed = false;
                log::info!("motion cool-down elapsed");
            }
            Ok(false) => {}
            Err(err) => {
                log::warn!("motion sensor {} failed: {:#}", sensor.name(), err);
                sleep_unless_shutdown(shutdown, settings.idle_interval);
            }
        }
    }
    control.set_motion_active(false);
    log::info!("motion monitor stopped");
}

/// Sleep for `duration`, waking early only when shutdown is requested.
pub(crate) fn sleep_unless_shutdown(shutdown: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::StubSensor;

    fn fast_settings() -> MotionSettings {
        MotionSettings {
            idle_interval: Duration::from_millis(20),
            cooldown: Duration::from_millis(300),
        }
    }

    fn wait_for(control: &ControlState, want: bool, limit: Duration) -> Option<Instant> {
        let start = Instant::now();
        while start.elapsed() < limit {
            if control.motion_active() == want {
                return Some(Instant::now());
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        None
    }

    #[test]
    fn edge_raises_flag_for_the_cooldown_window() -> Result<()> {
        let settings = fast_settings();
        let control = Arc::new(ControlState::new());
        let (sensor, trigger) = StubSensor::new("stub://test");
        let monitor = MotionMonitor::spawn(Box::new(sensor), control.clone(), settings)?;

        let fired_at = Instant::now();
        assert!(trigger.fire());
        let raised = wait_for(&control, true, settings.idle_interval * 5)
            .expect("motion flag raised");
        assert!(raised - fired_at <= settings.idle_interval * 5);

        let cleared = wait_for(&control, false, settings.cooldown * 3)
            .expect("motion flag cleared");
        let held = cleared - fired_at;
        assert!(held >= settings.cooldown, "cleared early after {:?}", held);
        assert!(
            held <= settings.cooldown + settings.idle_interval * 5,
            "cleared late after {:?}",
            held
        );

        monitor.stop()?;
        Ok(())
    }

    #[test]
    fn disabled_sensor_ignores_edges() -> Result<()> {
        let settings = fast_settings();
        let control = Arc::new(ControlState::new());
        control.set_sensor_enabled(false);
        let (sensor, trigger) = StubSensor::new("stub://test");
        let monitor = MotionMonitor::spawn(Box::new(sensor), control.clone(), settings)?;

        trigger.fire();
        std::thread::sleep(settings.idle_interval * 4);
        assert!(!control.motion_active());

        // Re-enabling must not replay the edge seen while disabled.
        control.set_sensor_enabled(true);
        assert!(wait_for(&control, true, settings.idle_interval * 5).is_none());

        // Fresh motion still opens a window.
        trigger.fire();
        assert!(wait_for(&control, true, settings.idle_interval * 5).is_some());

        monitor.stop()?;
        Ok(())
    }

    #[test]
    fn edges_during_cooldown_do_not_open_another_window() -> Result<()> {
        let settings = fast_settings();
        let control = Arc::new(ControlState::new());
        let (sensor, trigger) = StubSensor::new("stub://test");
        let monitor = MotionMonitor::spawn(Box::new(sensor), control.clone(), settings)?;

        let fired_at = Instant::now();
        trigger.fire();
        assert!(wait_for(&control, true, settings.idle_interval * 5).is_some());
        std::thread::sleep(settings.cooldown / 5);
        trigger.fire();

        let cleared = wait_for(&control, false, settings.cooldown * 3)
            .expect("motion flag cleared");
        assert!(
            cleared - fired_at <= settings.cooldown + settings.idle_interval * 5,
            "window was extended"
        );
        assert!(wait_for(&control, true, settings.cooldown).is_none());

        monitor.stop()?;
        Ok(())
    }

    #[test]
    fn disabling_mid_cooldown_keeps_flag_until_window_ends() -> Result<()> {
        let settings = fast_settings();
        let control = Arc::new(ControlState::new());
        let (sensor, trigger) = StubSensor::new("stub://test");
        let monitor = MotionMonitor::spawn(Box::new(sensor), control.clone(), settings)?;

        trigger.fire();
        assert!(wait_for(&control, true, settings.idle_interval * 5).is_some());
        control.set_sensor_enabled(false);
        std::thread::sleep(settings.cooldown / 3);
        assert!(control.motion_active());
        assert!(wait_for(&control, false, settings.cooldown * 2).is_some());

        monitor.stop()?;
        Ok(())
    }

    #[test]
    fn stop_interrupts_cooldown() -> Result<()> {
        let settings = MotionSettings {
            idle_interval: Duration::from_millis(20),
            cooldown: Duration::from_secs(30),
        };
        let control = Arc::new(ControlState::new());
        let (sensor, trigger) = StubSensor::new("stub://test");
        let monitor = MotionMonitor::spawn(Box::new(sensor), control.clone(), settings)?;
        trigger.fire();
        assert!(wait_for(&control, true, Duration::from_millis(200)).is_some());

        let start = Instant::now();
        monitor.stop()?;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(!control.motion_active());
        Ok(())
    }
}

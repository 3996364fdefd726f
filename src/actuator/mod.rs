//! Alert actuator (buzzer) control.
//!
//! `ActuatorController::trigger` is synchronous: it drives the PWM output for
//! the whole alert and only returns once the output is silent again. Callers
//! serialize on the driver lock, so overlapping alerts from several viewers
//! queue behind each other instead of overlapping on the wire.

#[cfg(feature = "gpio-rppal")]
pub mod gpio;
pub mod stub;

#[cfg(feature = "gpio-rppal")]
pub use gpio::GpioBuzzer;
pub use stub::{PwmEvent, PwmRecorder, RecordingDriver};

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::control::ControlState;

/// Raw PWM primitive wrapped by the controller.
pub trait PwmDriver: Send {
    fn name(&self) -> &str;

    fn set_frequency(&mut self, frequency_hz: f64) -> Result<()>;

    /// Duty cycle in `0.0..=1.0`. Zero means silent.
    fn set_duty_cycle(&mut self, duty_cycle: f64) -> Result<()>;
}

/// Alert parameters used by the pipeline for each target detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlertTone {
    pub duration: Duration,
    pub frequency_hz: f64,
}

impl Default for AlertTone {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(500),
            frequency_hz: 1000.0,
        }
    }
}

/// Open the PWM driver named by a device string.
pub fn open_actuator(device: &str) -> Result<Box<dyn PwmDriver>> {
    if device.starts_with("stub://") {
        let (driver, _recorder) = RecordingDriver::new(device);
        return Ok(Box::new(driver));
    }
    if let Some(pin) = device.strip_prefix("gpio:") {
        let pin: u8 = pin
            .parse()
            .map_err(|_| anyhow!("invalid actuator GPIO pin '{}'", pin))?;
        #[cfg(feature = "gpio-rppal")]
        {
            return Ok(Box::new(GpioBuzzer::open(pin)?));
        }
        #[cfg(not(feature = "gpio-rppal"))]
        {
            anyhow::bail!("actuator on GPIO {} requires the gpio-rppal feature", pin)
        }
    }
    Err(anyhow!("unsupported actuator device '{}'", device))
}

pub struct ActuatorController {
    driver: Mutex<Box<dyn PwmDriver>>,
    control: Arc<ControlState>,
    duty_cycle: f64,
}

impl ActuatorController {
    /// Wrap `driver`, forcing it silent before first use.
    pub fn new(
        mut driver: Box<dyn PwmDriver>,
        control: Arc<ControlState>,
        duty_cycle: f64,
    ) -> Result<Self> {
        driver.set_duty_cycle(0.0)?;
        Ok(Self {
            driver: Mutex::new(driver),
            control,
            duty_cycle,
        })
    }

    fn lock_driver(&self) -> MutexGuard<'_, Box<dyn PwmDriver>> {
        // A panic mid-alert already silenced the output through SilenceGuard.
        self.driver.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            log::warn!("actuator lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Sound the actuator for `duration` at `frequency_hz`.
    ///
    /// Returns `Ok(false)` without touching the hardware when the actuator is
    /// disabled. The output is silent when this returns, on every path.
    pub fn trigger(&self, duration: Duration, frequency_hz: f64) -> Result<bool> {
        if !self.control.actuator_enabled() {
            return Ok(false);
        }
        let mut driver = self.lock_driver();
        // The flag may have flipped while this call queued for the driver.
        if !self.control.actuator_enabled() {
            return Ok(false);
        }
        log::debug!(
            "actuator {}: {:.0} Hz for {:?}",
            driver.name(),
            frequency_hz,
            duration
        );
        driver.set_frequency(frequency_hz)?;
        let guard = SilenceGuard::energize(&mut **driver, self.duty_cycle)?;
        std::thread::sleep(duration);
        guard.release()?;
        Ok(true)
    }

    /// Trigger with a preset tone.
    pub fn alert(&self, tone: AlertTone) -> Result<bool> {
        self.trigger(tone.duration, tone.frequency_hz)
    }

    /// Force the output silent.
    pub fn silence(&self) -> Result<()> {
        self.lock_driver().set_duty_cycle(0.0)
    }
}

impl Drop for ActuatorController {
    fn drop(&mut self) {
        if let Err(err) = self.silence() {
            log::error!("failed to silence actuator on shutdown: {}", err);
        }
    }
}

/// Scoped energize: the output goes back to zero duty when the guard is
/// released or dropped, including during unwinding.
struct SilenceGuard<'a> {
    driver: &'a mut dyn PwmDriver,
    armed: bool,
}

impl<'a> SilenceGuard<'a> {
    fn energize(driver: &'a mut dyn PwmDriver, duty_cycle: f64) -> Result<Self> {
        let mut guard = Self {
            driver,
            armed: true,
        };
        guard.driver.set_duty_cycle(duty_cycle)?;
        Ok(guard)
    }

    fn release(mut self) -> Result<()> {
        self.armed = false;
        self.driver.set_duty_cycle(0.0)
    }
}

impl Drop for SilenceGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = self.driver.set_duty_cycle(0.0) {
                log::error!("failed to silence {}: {}", self.driver.name(), err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn controller() -> (Arc<ControlState>, ActuatorController, PwmRecorder) {
        let control = Arc::new(ControlState::new());
        let (driver, recorder) = RecordingDriver::new("stub://buzzer");
        let controller = ActuatorController::new(Box::new(driver), control.clone(), 0.5)
            .expect("controller");
        (control, controller, recorder)
    }

    #[test]
    fn trigger_drives_then_silences() -> Result<()> {
        let (_control, controller, recorder) = controller();
        let start = Instant::now();
        assert!(controller.trigger(Duration::from_millis(30), 1000.0)?);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(recorder.duty_cycle(), 0.0);
        assert_eq!(recorder.activations(), 1);
        assert!(recorder
            .events()
            .contains(&PwmEvent::Frequency(1000.0)));
        Ok(())
    }

    #[test]
    fn disabled_trigger_is_a_no_op() -> Result<()> {
        let (control, controller, recorder) = controller();
        control.set_actuator_enabled(false);
        let start = Instant::now();
        assert!(!controller.trigger(Duration::from_millis(200), 1000.0)?);
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(recorder.activations(), 0);
        Ok(())
    }

    #[test]
    fn concurrent_triggers_never_overlap() -> Result<()> {
        let (_control, controller, recorder) = controller();
        let controller = Arc::new(controller);
        let mut handles = Vec::new();
        for _ in 0..3 {
            let controller = controller.clone();
            handles.push(std::thread::spawn(move || {
                controller.trigger(Duration::from_millis(20), 800.0)
            }));
        }
        for handle in handles {
            assert!(handle.join().unwrap()?);
        }
        assert_eq!(recorder.activations(), 3);
        assert_eq!(recorder.overlaps(), 0);
        assert_eq!(recorder.duty_cycle(), 0.0);
        Ok(())
    }

    #[test]
    fn guard_silences_during_unwind() {
        let (mut driver, recorder) = RecordingDriver::new("stub://buzzer");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = SilenceGuard::energize(&mut driver, 0.5).expect("energize");
            assert_eq!(recorder.duty_cycle(), 0.5);
            panic!("interrupted mid-alert");
        }));
        assert!(result.is_err());
        assert_eq!(recorder.duty_cycle(), 0.0);
    }

    #[test]
    fn failed_energize_leaves_output_silent() {
        let (_control, controller, recorder) = controller();
        recorder.fail_energize(true);
        assert!(controller.trigger(Duration::from_millis(5), 1000.0).is_err());
        assert_eq!(recorder.duty_cycle(), 0.0);
    }

    #[test]
    fn dropping_controller_silences_driver() {
        let (_control, controller, recorder) = controller();
        drop(controller);
        assert_eq!(recorder.events().last(), Some(&PwmEvent::Duty(0.0)));
    }
}

//! Motion sensor sources.
//!
//! - Stub sensor (`stub://…`): edges are injected through a `StubTrigger`
//! - GPIO PIR sensor (`gpio:<bcm>`, feature: gpio-rppal)
//!
//! Sensors only report rising edges. Debouncing and the cool-down window
//! belong to the motion monitor, not to the sensor.

#[cfg(feature = "gpio-rppal")]
pub mod gpio;
pub mod stub;

#[cfg(feature = "gpio-rppal")]
pub use gpio::GpioMotionSensor;
pub use stub::{StubSensor, StubTrigger};

use anyhow::{anyhow, Result};
use std::time::Duration;

/// A motion sensor that can block for a rising edge.
pub trait MotionSensor: Send {
    /// Sensor identifier for logs.
    fn name(&self) -> &str;

    /// Block until motion is reported or `timeout` elapses.
    ///
    /// Returns `Ok(true)` when motion was seen. Implementations must honour the
    /// timeout so the caller can re-check the enabled flag.
    fn wait_for_motion(&mut self, timeout: Duration) -> Result<bool>;

    /// Drop edges reported while nobody was waiting.
    ///
    /// Sensors whose wait already ignores stale edges keep the default.
    fn discard_pending(&mut self) {}
}

/// Open the sensor named by a device string.
pub fn open_sensor(device: &str) -> Result<Box<dyn MotionSensor>> {
    if device.starts_with("stub://") {
        let (sensor, trigger) = StubSensor::new(device);
        // Nothing outside the process can fire a detached stub sensor.
        drop(trigger);
        return Ok(Box::new(sensor));
    }
    if let Some(pin) = device.strip_prefix("gpio:") {
        let pin: u8 = pin
            .parse()
            .map_err(|_| anyhow!("invalid sensor GPIO pin '{}'", pin))?;
        #[cfg(feature = "gpio-rppal")]
        {
            return Ok(Box::new(GpioMotionSensor::open(pin)?));
        }
        #[cfg(not(feature = "gpio-rppal"))]
        {
            anyhow::bail!("sensor on GPIO {} requires the gpio-rppal feature", pin)
        }
    }
    Err(anyhow!("unsupported sensor device '{}'", device))
}

//! PIR motion sensor on a Raspberry Pi GPIO input.

use anyhow::{Context, Result};
use rppal::gpio::{Gpio, InputPin, Trigger};
use std::time::Duration;

use super::MotionSensor;

pub struct GpioMotionSensor {
    name: String,
    pin: InputPin,
}

impl GpioMotionSensor {
    /// Claim `bcm_pin` as a pulled-down input with rising-edge interrupts.
    pub fn open(bcm_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().context("open GPIO controller")?;
        let mut pin = gpio
            .get(bcm_pin)
            .with_context(|| format!("claim GPIO {} for motion sensor", bcm_pin))?
            .into_input_pulldown();
        pin.set_interrupt(Trigger::RisingEdge)
            .with_context(|| format!("enable rising-edge interrupt on GPIO {}", bcm_pin))?;
        log::info!("GpioMotionSensor: listening on GPIO {}", bcm_pin);
        Ok(Self {
            name: format!("gpio:{}", bcm_pin),
            pin,
        })
    }
}

impl MotionSensor for GpioMotionSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait_for_motion(&mut self, timeout: Duration) -> Result<bool> {
        // A PIR output stays high while motion continues; treat an already
        // high line as motion, like a level-triggered wait would.
        if self.pin.is_high() {
            return Ok(true);
        }
        let level = self
            .pin
            // `reset` drops interrupts latched while nobody was polling.
            .poll_interrupt(true, Some(timeout))
            .with_context(|| format!("poll {}", self.name))?;
        Ok(level.is_some())
    }
}

impl Drop for GpioMotionSensor {
    fn drop(&mut self) {
        if let Err(err) = self.pin.clear_interrupt() {
            log::warn!("GpioMotionSensor: failed to clear interrupt: {}", err);
        }
    }
}

//! Passive buzzer on a Raspberry Pi GPIO output using software PWM.

use anyhow::{Context, Result};
use rppal::gpio::{Gpio, OutputPin};

use super::PwmDriver;

pub struct GpioBuzzer {
    name: String,
    pin: OutputPin,
    frequency_hz: f64,
    duty_cycle: f64,
}

impl GpioBuzzer {
    pub fn open(bcm_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().context("open GPIO controller")?;
        let mut pin = gpio
            .get(bcm_pin)
            .with_context(|| format!("claim GPIO {} for buzzer", bcm_pin))?
            .into_output_low();
        // Leave the line low when the pin is released.
        pin.set_reset_on_drop(true);
        log::info!("GpioBuzzer: driving GPIO {}", bcm_pin);
        Ok(Self {
            name: format!("gpio:{}", bcm_pin),
            pin,
            frequency_hz: 1000.0,
            duty_cycle: 0.0,
        })
    }

    fn apply(&mut self) -> Result<()> {
        if self.duty_cycle <= 0.0 {
            self.pin
                .clear_pwm()
                .with_context(|| format!("stop PWM on {}", self.name))?;
            self.pin.set_low();
            return Ok(());
        }
        self.pin
            .set_pwm_frequency(self.frequency_hz, self.duty_cycle)
            .with_context(|| format!("start PWM on {}", self.name))
    }
}

impl PwmDriver for GpioBuzzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_frequency(&mut self, frequency_hz: f64) -> Result<()> {
        self.frequency_hz = frequency_hz;
        if self.duty_cycle > 0.0 {
            self.apply()?;
        }
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty_cycle: f64) -> Result<()> {
        self.duty_cycle = duty_cycle.clamp(0.0, 1.0);
        self.apply()
    }
}

impl Drop for GpioBuzzer {
    fn drop(&mut self) {
        let _ = self.pin.clear_pwm();
        self.pin.set_low();
    }
}

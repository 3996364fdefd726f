use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::PwmDriver;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PwmEvent {
    Frequency(f64),
    Duty(f64),
}

#[derive(Debug, Default)]
struct RecorderState {
    events: Vec<PwmEvent>,
    duty_cycle: f64,
    activations: u64,
    overlaps: u64,
    fail_energize: bool,
}

/// In-memory PWM output. Every call is recorded for inspection.
pub struct RecordingDriver {
    name: String,
    state: Arc<Mutex<RecorderState>>,
}

/// Read side of a `RecordingDriver`.
#[derive(Clone)]
pub struct PwmRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl RecordingDriver {
    pub fn new(name: &str) -> (Self, PwmRecorder) {
        let state = Arc::new(Mutex::new(RecorderState::default()));
        (
            Self {
                name: name.to_string(),
                state: state.clone(),
            },
            PwmRecorder { state },
        )
    }
}

fn lock(state: &Mutex<RecorderState>) -> MutexGuard<'_, RecorderState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PwmDriver for RecordingDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_frequency(&mut self, frequency_hz: f64) -> Result<()> {
        lock(&self.state).events.push(PwmEvent::Frequency(frequency_hz));
        Ok(())
    }

    fn set_duty_cycle(&mut self, duty_cycle: f64) -> Result<()> {
        let mut state = lock(&self.state);
        if duty_cycle > 0.0 && state.fail_energize {
            return Err(anyhow!("{}: energize refused", self.name));
        }
        state.events.push(PwmEvent::Duty(duty_cycle));
        if duty_cycle > 0.0 {
            if state.duty_cycle > 0.0 {
                state.overlaps += 1;
            } else {
                state.activations += 1;
            }
        }
        state.duty_cycle = duty_cycle;
        Ok(())
    }
}

impl PwmRecorder {
    pub fn events(&self) -> Vec<PwmEvent> {
        lock(&self.state).events.clone()
    }

    /// Current duty cycle; zero means silent.
    pub fn duty_cycle(&self) -> f64 {
        lock(&self.state).duty_cycle
    }

    /// Number of silent-to-energized transitions.
    pub fn activations(&self) -> u64 {
        lock(&self.state).activations
    }

    /// Energize requests that arrived while already energized.
    pub fn overlaps(&self) -> u64 {
        lock(&self.state).overlaps
    }

    /// Make every non-zero duty request fail.
    pub fn fail_energize(&self, fail: bool) {
        lock(&self.state).fail_energize = fail;
    }
}

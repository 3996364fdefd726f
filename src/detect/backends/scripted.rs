use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::camera::Frame;
use crate::detect::backend::Classifier;
use crate::detect::result::Detection;

#[derive(Debug, Default)]
struct ScriptState {
    detections: Vec<Detection>,
    fail_remaining: u32,
    calls: u64,
}

/// Classifier that returns a scripted answer for every frame.
///
/// The `stub` backend starts with an empty script, so a hardware-free run
/// streams frames without ever sounding the actuator.
pub struct ScriptedClassifier {
    state: Arc<Mutex<ScriptState>>,
}

/// Controls what a `ScriptedClassifier` reports.
#[derive(Clone)]
pub struct ClassifierScript {
    state: Arc<Mutex<ScriptState>>,
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedClassifier {
    pub fn new() -> (Self, ClassifierScript) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                state: state.clone(),
            },
            ClassifierScript { state },
        )
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn classify(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let mut state = lock(&self.state);
        state.calls += 1;
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(anyhow!("injected classifier failure"));
        }
        Ok(state.detections.clone())
    }
}

impl ClassifierScript {
    /// Replace the detections returned for every subsequent frame.
    pub fn set_detections(&self, detections: Vec<Detection>) {
        lock(&self.state).detections = detections;
    }

    /// Make the next `n` calls fail.
    pub fn fail_next(&self, n: u32) {
        lock(&self.state).fail_remaining = n;
    }

    /// Number of `classify` calls, including failed ones.
    pub fn calls(&self) -> u64 {
        lock(&self.state).calls
    }
}

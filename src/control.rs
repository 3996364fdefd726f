//! Shared runtime toggles and the derived motion flag.
//!
//! `ControlState` is the single coordination point between the motion
//! monitor, every viewer pipeline and the HTTP control endpoints. All three
//! fields live behind one mutex so a reader always sees a snapshot taken at a
//! single instant; no caller ever performs a read-modify-write outside the lock.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Point-in-time copy of the control flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ControlSnapshot {
    pub sensor_enabled: bool,
    pub actuator_enabled: bool,
    pub motion_active: bool,
}

impl ControlSnapshot {
    /// True when the pipeline must not capture: the sensor is in charge and
    /// has not reported motion.
    pub fn gated(&self) -> bool {
        self.sensor_enabled && !self.motion_active
    }
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        Self {
            sensor_enabled: true,
            actuator_enabled: true,
            motion_active: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct ControlState {
    inner: Mutex<ControlSnapshot>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ControlSnapshot> {
        // The guarded value is three plain flags, so a panic elsewhere can
        // never leave it half-written.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> ControlSnapshot {
        *self.lock()
    }

    pub fn sensor_enabled(&self) -> bool {
        self.lock().sensor_enabled
    }

    pub fn actuator_enabled(&self) -> bool {
        self.lock().actuator_enabled
    }

    pub fn motion_active(&self) -> bool {
        self.lock().motion_active
    }

    pub fn set_sensor_enabled(&self, enabled: bool) {
        self.lock().sensor_enabled = enabled;
    }

    pub fn set_actuator_enabled(&self, enabled: bool) {
        self.lock().actuator_enabled = enabled;
    }

    pub fn set_motion_active(&self, active: bool) {
        self.lock().motion_active = active;
    }

    /// Flip the sensor flag under the lock and return the new value.
    pub fn toggle_sensor(&self) -> bool {
        let mut guard = self.lock();
        guard.sensor_enabled = !guard.sensor_enabled;
        guard.sensor_enabled
    }

    /// Flip the actuator flag under the lock and return the new value.
    pub fn toggle_actuator(&self) -> bool {
        let mut guard = self.lock();
        guard.actuator_enabled = !guard.actuator_enabled;
        guard.actuator_enabled
    }
}

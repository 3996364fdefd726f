use anyhow::Result;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::MotionSensor;

/// In-process sensor whose edges come from a paired `StubTrigger`.
pub struct StubSensor {
    name: String,
    edges: Receiver<()>,
}

/// Fires rising edges into a `StubSensor`.
#[derive(Clone)]
pub struct StubTrigger {
    tx: Sender<()>,
}

impl StubSensor {
    pub fn new(name: &str) -> (Self, StubTrigger) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                name: name.to_string(),
                edges: rx,
            },
            StubTrigger { tx },
        )
    }
}

impl StubTrigger {
    /// Report one rising edge. Returns false once the sensor is gone.
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

impl MotionSensor for StubSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait_for_motion(&mut self, timeout: Duration) -> Result<bool> {
        match self.edges.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(RecvTimeoutError::Timeout) => Ok(false),
            Err(RecvTimeoutError::Disconnected) => {
                // No trigger left: behave like a quiet room.
                std::thread::sleep(timeout);
                Ok(false)
            }
        }
    }

    fn discard_pending(&mut self) {
        let stale = self.edges.try_iter().count();
        if stale > 0 {
            log::debug!("{}: discarded {} stale edges", self.name, stale);
        }
    }
}

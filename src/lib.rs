//! catwatch
//!
//! Motion-gated object detection for a single embedded host: a PIR sensor
//! opens the gate, each stream viewer runs its own capture/classify/annotate
//! loop, and a buzzer sounds for every detection of the target class.
//!
//! # Architecture
//!
//! Every component shares one `ControlState` by reference:
//!
//! 1. **MotionMonitor** writes the motion flag with a fixed cool-down window.
//! 2. **InferencePipeline** (one per viewer) reads the flags to decide whether
//!    to capture, and triggers the **ActuatorController** on target hits.
//! 3. **StreamServer** (`api`) flips the enable flags and streams MJPEG.
//!
//! The camera and the actuator are single exclusive devices; both serialize
//! callers internally.
//!
//! # Module Structure
//!
//! - `control`: shared toggles and motion flag
//! - `sensor`, `motion`: PIR sources and the background monitor
//! - `actuator`: PWM drivers and the blocking alert controller
//! - `camera`, `detect`, `annotate`: frame capture, classification, drawing
//! - `pipeline`, `api`: the per-viewer loop and its HTTP surface
//! - `config`, `service`: daemon configuration and wiring

pub mod actuator;
pub mod annotate;
pub mod api;
pub mod camera;
pub mod config;
pub mod control;
pub mod detect;
pub mod error;
pub mod motion;
pub mod pipeline;
pub mod sensor;
pub mod service;

pub use actuator::{ActuatorController, AlertTone, PwmDriver, RecordingDriver};
pub use annotate::{AnnotatedFrame, Overlay};
pub use api::{ApiConfig, ApiHandle, ApiServer};
pub use camera::{CameraConfig, Frame, FrameSource, SharedCamera, SyntheticCamera};
pub use config::ServiceConfig;
pub use control::{ControlSnapshot, ControlState};
pub use detect::{BoundingBox, Classifier, Detection, ScriptedClassifier};
pub use error::{FrameError, FrameErrorKind};
pub use motion::{MotionMonitor, MotionSettings};
pub use pipeline::{InferencePipeline, PipelineContext, PipelineSettings, StepOutcome};
pub use sensor::{MotionSensor, StubSensor};
pub use service::{Devices, Service, ServiceHandle};

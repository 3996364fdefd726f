//! Per-viewer inference loop.
//!
//! Each connected viewer owns one `InferencePipeline`. One `step` is one
//! iteration of gate, capture, classify, annotate, count, actuate, encode.
//! Camera, classifier and actuator are shared between pipelines and
//! serialize internally; annotations are never shared across viewers.

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::actuator::{ActuatorController, AlertTone};
use crate::annotate::{placeholder_frame, AnnotatedFrame};
use crate::camera::SharedCamera;
use crate::control::ControlState;
use crate::detect::Classifier;
use crate::error::{FrameError, FrameErrorKind};

/// Classifier shared by every viewer.
pub type SharedClassifier = Arc<Mutex<Box<dyn Classifier>>>;

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Label that counts and sounds the actuator, matched case-insensitively.
    pub target_class: String,
    pub alert: AlertTone,
    /// Sleep between gate checks while gated closed.
    pub gate_interval: Duration,
    /// Consecutive failures before placeholder frames are emitted.
    pub degraded_after: u32,
    pub jpeg_quality: u8,
    /// Placeholder frame size; matches the camera resolution.
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_class: "cat".to_string(),
            alert: AlertTone::default(),
            gate_interval: Duration::from_millis(100),
            degraded_after: 3,
            jpeg_quality: 80,
            frame_width: 640,
            frame_height: 480,
        }
    }
}

/// Everything a pipeline needs, cheap to clone per viewer.
#[derive(Clone)]
pub struct PipelineContext {
    pub control: Arc<ControlState>,
    pub camera: Arc<SharedCamera>,
    pub classifier: SharedClassifier,
    pub actuator: Arc<ActuatorController>,
    pub settings: Arc<PipelineSettings>,
}

/// Result of one loop iteration.
#[derive(Debug)]
pub enum StepOutcome {
    /// Sensor enabled and no motion; nothing was captured.
    Gated,
    /// Encoded annotated frame.
    Frame(Vec<u8>),
    /// Encoded placeholder; the stream is degraded.
    Degraded(Vec<u8>),
    /// This iteration failed; nothing to emit.
    Skipped,
}

/// One annotated frame and what happened while producing it.
#[derive(Debug)]
pub struct FrameReport {
    pub frame: AnnotatedFrame,
    pub target_count: usize,
    /// Alerts actually sounded (disabled actuator triggers are not counted).
    pub alerts: usize,
}

pub struct InferencePipeline {
    ctx: PipelineContext,
    consecutive_failures: u32,
    degraded: bool,
    placeholder: Option<Vec<u8>>,
}

impl InferencePipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            consecutive_failures: 0,
            degraded: false,
            placeholder: None,
        }
    }

    pub fn gate_interval(&self) -> Duration {
        self.ctx.settings.gate_interval
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// True when this iteration must not capture.
    pub fn gated(&self) -> bool {
        self.ctx.control.get().gated()
    }

    /// Run one iteration. Per-frame failures are absorbed here.
    pub fn step(&mut self) -> StepOutcome {
        if self.gated() {
            return StepOutcome::Gated;
        }
        let encoded = self
            .process_frame()
            .and_then(|report| report.frame.encode_jpeg(self.ctx.settings.jpeg_quality));
        match encoded {
            Ok(jpeg) => {
                if self.degraded {
                    log::info!(
                        "stream recovered after {} failed frames",
                        self.consecutive_failures
                    );
                }
                self.consecutive_failures = 0;
                self.degraded = false;
                StepOutcome::Frame(jpeg)
            }
            Err(err) => self.record_failure(err),
        }
    }

    fn record_failure(&mut self, err: anyhow::Error) -> StepOutcome {
        let contention = err
            .downcast_ref::<FrameError>()
            .map_or(false, |frame_err| frame_err.kind == FrameErrorKind::ResourceContention);
        if contention {
            // Another viewer holds the camera; retry without counting a failure.
            log::debug!("frame skipped: {:#}", err);
            return StepOutcome::Skipped;
        }
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        log::warn!("frame failed ({}): {:#}", self.consecutive_failures, err);
        if self.consecutive_failures < self.ctx.settings.degraded_after {
            return StepOutcome::Skipped;
        }
        if !self.degraded {
            log::warn!(
                "stream degraded after {} consecutive failures",
                self.consecutive_failures
            );
            self.degraded = true;
        }
        match self.placeholder_jpeg() {
            Ok(jpeg) => StepOutcome::Degraded(jpeg),
            Err(err) => {
                log::error!("failed to render placeholder frame: {:#}", err);
                StepOutcome::Skipped
            }
        }
    }

    fn placeholder_jpeg(&mut self) -> Result<Vec<u8>> {
        if let Some(jpeg) = &self.placeholder {
            return Ok(jpeg.clone());
        }
        let settings = &self.ctx.settings;
        let jpeg = placeholder_frame(settings.frame_width, settings.frame_height)
            .encode_jpeg(settings.jpeg_quality)?;
        self.placeholder = Some(jpeg.clone());
        Ok(jpeg)
    }

    /// Capture, classify, annotate and actuate on one frame, ignoring the gate.
    pub fn process_frame(&self) -> Result<FrameReport> {
        let frame = self.ctx.camera.capture()?;
        let detections = {
            let mut classifier = lock_classifier(&self.ctx.classifier);
            classifier.classify(&frame).map_err(|err| {
                anyhow::Error::from(FrameError::new(
                    FrameErrorKind::Classification,
                    format!("{}: {:#}", classifier.name(), err),
                ))
            })?
        };

        let settings = &self.ctx.settings;
        let mut annotated = AnnotatedFrame::new(frame.into_image());
        let mut target_count = 0;
        let mut alerts = 0;
        for detection in &detections {
            if detection.is_class(&settings.target_class) {
                target_count += 1;
                match self.ctx.actuator.alert(settings.alert) {
                    Ok(true) => alerts += 1,
                    Ok(false) => {}
                    Err(err) => log::warn!("actuator trigger failed: {:#}", err),
                }
            }
            annotated.draw_detection(detection);
        }
        annotated.draw_count(&settings.target_class, target_count);

        Ok(FrameReport {
            frame: annotated,
            target_count,
            alerts,
        })
    }
}

fn lock_classifier(classifier: &SharedClassifier) -> MutexGuard<'_, Box<dyn Classifier>> {
    classifier.lock().unwrap_or_else(PoisonError::into_inner)
}

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::camera::Frame;
use crate::detect::result::Detection;

#[cfg(feature = "backend-tract")]
use super::backends::TractClassifier;
use super::backends::ScriptedClassifier;

/// Object classifier.
///
/// Takes a frame and returns every labelled box it finds, in the order the
/// model produced them. Implementations treat the frame as read-only and keep
/// nothing from it past the call.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn classify(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once at startup.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Classifier selection.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierConfig {
    /// `stub` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Class names indexed by model class id.
    pub labels: Vec<String>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence: f32,
    pub iou: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: "stub".to_string(),
            model_path: None,
            labels: vec!["cat".to_string()],
            input_width: 640,
            input_height: 640,
            confidence: 0.5,
            iou: 0.45,
        }
    }
}

pub fn open_classifier(config: &ClassifierConfig) -> Result<Box<dyn Classifier>> {
    match config.backend.as_str() {
        "stub" => Ok(Box::new(ScriptedClassifier::new().0)),
        "tract" => {
            let model_path = config
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("tract classifier needs a model path"))?;
            #[cfg(feature = "backend-tract")]
            {
                Ok(Box::new(TractClassifier::new(model_path, config)?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(anyhow!(
                    "model {} requires the backend-tract feature",
                    model_path.display()
                ))
            }
        }
        other => Err(anyhow!("unknown classifier backend '{}'", other)),
    }
}

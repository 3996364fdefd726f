mod backend;
mod backends;
mod result;
mod yolo;

pub use backend::{open_classifier, Classifier, ClassifierConfig};
pub use backends::{ClassifierScript, ScriptedClassifier};
#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
pub use result::{BoundingBox, Detection};
pub use yolo::{decode_yolov8, non_max_suppression, YoloDecode};

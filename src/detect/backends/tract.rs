#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::camera::Frame;
use crate::detect::backend::{Classifier, ClassifierConfig};
use crate::detect::result::Detection;
use crate::detect::yolo::{decode_yolov8, YoloDecode};

/// Tract-based YOLOv8 classifier for ONNX models.
///
/// Loads a local model file once and runs it on every frame. It does not
/// perform any network I/O or write to disk beyond model loading.
pub struct TractClassifier {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    labels: Vec<String>,
    input_width: u32,
    input_height: u32,
    confidence: f32,
    iou: f32,
}

impl TractClassifier {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, config: &ClassifierConfig) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (width, height) = (config.input_width, config.input_height);
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractClassifier: loaded {} ({}x{}, {} labels)",
            model_path.display(),
            width,
            height,
            config.labels.len()
        );
        Ok(Self {
            model,
            labels: config.labels.clone(),
            input_width: width,
            input_height: height,
            confidence: config.confidence,
            iou: config.iou,
        })
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let image = RgbImage::from_raw(frame.width(), frame.height(), frame.pixels().to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = image::imageops::resize(
            &image,
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn classify(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let (rows, anchors) = match shape.as_slice() {
            [1, rows, anchors] => (*rows, *anchors),
            other => return Err(anyhow!("unexpected YOLOv8 output shape {:?}", other)),
        };
        let flat: Vec<f32> = view.iter().copied().collect();

        Ok(decode_yolov8(
            &flat,
            rows,
            anchors,
            &self.labels,
            &YoloDecode {
                input_width: self.input_width,
                input_height: self.input_height,
                frame_width: frame.width(),
                frame_height: frame.height(),
                confidence: self.confidence,
                iou: self.iou,
            },
        ))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::from_rgb(
            self.input_width,
            self.input_height,
            vec![0u8; (self.input_width * self.input_height * 3) as usize],
        )?;
        self.classify(&blank).map(|_| ())
    }
}

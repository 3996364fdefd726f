//! YOLOv8 output decoding.
//!
//! The detection head emits a `[4 + nc, anchors]` matrix per image: rows 0..4
//! are box centre/size in model-input pixels, the remaining rows are class
//! scores. Decoding picks the best class per anchor, drops anchors below the
//! confidence threshold, rescales boxes to frame pixels and runs greedy NMS.

use crate::detect::result::{BoundingBox, Detection};

const BOX_ROWS: usize = 4;

/// Geometry and thresholds for one decode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct YoloDecode {
    pub input_width: u32,
    pub input_height: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub confidence: f32,
    pub iou: f32,
}

/// Decode a row-major `[rows, anchors]` output into frame-space detections.
pub fn decode_yolov8(
    output: &[f32],
    rows: usize,
    anchors: usize,
    labels: &[String],
    params: &YoloDecode,
) -> Vec<Detection> {
    if rows <= BOX_ROWS || output.len() < rows * anchors {
        return Vec::new();
    }
    let classes = rows - BOX_ROWS;
    let scale_x = params.frame_width as f32 / params.input_width.max(1) as f32;
    let scale_y = params.frame_height as f32 / params.input_height.max(1) as f32;
    let max_x = params.frame_width.saturating_sub(1) as f32;
    let max_y = params.frame_height.saturating_sub(1) as f32;
    let at = |row: usize, anchor: usize| output[row * anchors + anchor];

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best = (0usize, f32::NEG_INFINITY);
        for class in 0..classes {
            let score = at(BOX_ROWS + class, anchor);
            if score > best.1 {
                best = (class, score);
            }
        }
        let (class_id, confidence) = best;
        if confidence < params.confidence {
            continue;
        }

        let cx = at(0, anchor) * scale_x;
        let cy = at(1, anchor) * scale_y;
        let w = at(2, anchor) * scale_x;
        let h = at(3, anchor) * scale_y;
        let bbox = BoundingBox::new(
            (cx - w / 2.0).clamp(0.0, max_x).round() as i32,
            (cy - h / 2.0).clamp(0.0, max_y).round() as i32,
            (cx + w / 2.0).clamp(0.0, max_x).round() as i32,
            (cy + h / 2.0).clamp(0.0, max_y).round() as i32,
        );
        let label = labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", class_id));
        candidates.push(Detection::new(label, bbox).with_confidence(confidence));
    }

    non_max_suppression(&mut candidates, params.iou);
    candidates
}

/// Greedy NMS: keep the most confident box, drop anything overlapping it by
/// more than `iou_threshold`, repeat.
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..detections.len() {
        let overlaps = (0..kept)
            .any(|prev| iou(&detections[prev].bbox, &detections[index].bbox) > iou_threshold);
        if !overlaps {
            detections.swap(kept, index);
            kept += 1;
        }
    }
    detections.truncate(kept);
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0) as f32;
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0) as f32;
    let inter = ix * iy;
    let union = (a.width() * a.height()) as f32 + (b.width() * b.height()) as f32 - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> YoloDecode {
        YoloDecode {
            input_width: 100,
            input_height: 100,
            frame_width: 200,
            frame_height: 100,
            confidence: 0.5,
            iou: 0.45,
        }
    }

    #[test]
    fn decodes_best_class_and_scales_to_frame() {
        // rows: cx, cy, w, h, score(cat), score(dog); two anchors.
        let output = vec![
            50.0, 10.0, // cx
            50.0, 10.0, // cy
            20.0, 4.0, // w
            20.0, 4.0, // h
            0.9, 0.1, // cat
            0.2, 0.3, // dog
        ];
        let labels = vec!["cat".to_string(), "dog".to_string()];
        let dets = decode_yolov8(&output, 6, 2, &labels, &params());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "cat");
        assert_eq!(dets[0].bbox, BoundingBox::new(80, 40, 120, 60));
    }

    #[test]
    fn nms_drops_overlapping_lower_scores() {
        let mut dets = vec![
            Detection::new("cat", BoundingBox::new(0, 0, 10, 10)).with_confidence(0.6),
            Detection::new("cat", BoundingBox::new(1, 1, 11, 11)).with_confidence(0.9),
            Detection::new("cat", BoundingBox::new(50, 50, 60, 60)).with_confidence(0.7),
        ];
        non_max_suppression(&mut dets, 0.45);
        let confidences: Vec<f32> = dets.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn malformed_output_yields_nothing() {
        assert!(decode_yolov8(&[0.0; 3], 4, 1, &[], &params()).is_empty());
        assert!(decode_yolov8(&[0.0; 5], 6, 2, &[], &params()).is_empty());
    }
}

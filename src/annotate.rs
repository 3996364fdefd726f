//! Frame annotation and JPEG encoding.
//!
//! Everything is drawn straight into the RGB buffer with a built-in 5x7
//! bitmap font, so the stream needs no font files or GPU at runtime.

use anyhow::{anyhow, Result};
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};

use crate::detect::{BoundingBox, Detection};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const COUNT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const PLACEHOLDER_BG: Rgb<u8> = Rgb([24, 24, 24]);
const PLACEHOLDER_FG: Rgb<u8> = Rgb([255, 160, 0]);

const BOX_THICKNESS: i32 = 2;
const TEXT_SCALE: i32 = 2;
const GLYPH_W: i32 = 5;
const GLYPH_H: i32 = 7;
const GLYPH_ADVANCE: i32 = GLYPH_W + 1;

/// Text shown on the placeholder frame while the stream is degraded.
pub const DEGRADED_TEXT: &str = "STREAM DEGRADED";

/// Something drawn onto a frame, recorded alongside the pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    Box(BoundingBox),
    /// Text with its top-left corner.
    Label { text: String, x: i32, y: i32 },
    Text { text: String, x: i32, y: i32 },
}

/// Pixel buffer plus the overlays drawn on it.
#[derive(Debug)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub overlays: Vec<Overlay>,
}

impl AnnotatedFrame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            overlays: Vec::new(),
        }
    }

    /// Box plus label above it, clipped to the frame.
    pub fn draw_detection(&mut self, detection: &Detection) {
        let bbox = detection.bbox;
        draw_rectangle(&mut self.image, &bbox, BOX_COLOR);
        self.overlays.push(Overlay::Box(bbox));

        let x = bbox.x1.max(0);
        let y = (bbox.y1 - 10 - GLYPH_H * TEXT_SCALE).max(0);
        draw_text(&mut self.image, x, y, &detection.label, LABEL_COLOR);
        self.overlays.push(Overlay::Label {
            text: detection.label.clone(),
            x,
            y,
        });
    }

    /// Per-frame target count in the top-left corner.
    pub fn draw_count(&mut self, target_class: &str, count: usize) {
        let text = format!("Number of {}s: {}", target_class, count);
        let (x, y) = (10, 30 - GLYPH_H * TEXT_SCALE);
        draw_text(&mut self.image, x, y, &text, COUNT_COLOR);
        self.overlays.push(Overlay::Text { text, x, y });
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.overlays.iter().filter_map(|overlay| match overlay {
            Overlay::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn boxes(&self) -> impl Iterator<Item = &BoundingBox> {
        self.overlays.iter().filter_map(|overlay| match overlay {
            Overlay::Box(bbox) => Some(bbox),
            _ => None,
        })
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        encode_jpeg(&self.image, quality)
    }
}

/// Dark frame with a centred notice, streamed in place of real frames.
pub fn placeholder_frame(width: u32, height: u32) -> AnnotatedFrame {
    let mut frame = AnnotatedFrame::new(RgbImage::from_pixel(
        width.max(1),
        height.max(1),
        PLACEHOLDER_BG,
    ));
    let text_width = text_width(DEGRADED_TEXT);
    let x = ((width as i32 - text_width) / 2).max(0);
    let y = ((height as i32 - GLYPH_H * TEXT_SCALE) / 2).max(0);
    draw_text(&mut frame.image, x, y, DEGRADED_TEXT, PLACEHOLDER_FG);
    frame.overlays.push(Overlay::Text {
        text: DEGRADED_TEXT.to_string(),
        x,
        y,
    });
    frame
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(buffer)
}

fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE * TEXT_SCALE
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;
    let left = bbox.x1.clamp(0, max_x);
    let right = bbox.x2.clamp(0, max_x);
    let top = bbox.y1.clamp(0, max_y);
    let bottom = bbox.y2.clamp(0, max_y);

    for t in 0..BOX_THICKNESS {
        for x in left..=right {
            put(image, x, top + t, color);
            put(image, x, bottom - t, color);
        }
        for y in top..=bottom {
            put(image, left + t, y, color);
            put(image, right - t, y, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_W {
                    if (pattern >> (GLYPH_W - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..TEXT_SCALE {
                        for dx in 0..TEXT_SCALE {
                            put(
                                image,
                                x + col * TEXT_SCALE + dx,
                                y + row as i32 * TEXT_SCALE + dy,
                                color,
                            );
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE * TEXT_SCALE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

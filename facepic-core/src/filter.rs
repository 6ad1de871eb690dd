use crate::config::FilterConfig;
use crate::model::{BoundingBox, Detection, Face};
use std::fmt;

/// Why a detection was turned away
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    LowScore(f32),
    PartialFace,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::LowScore(score) => write!(f, "low score: {:.3}", score),
            Rejection::PartialFace => write!(f, "partial face (edge)"),
        }
    }
}

/// Drops unreliable detections: low detector confidence, or boxes cut off
/// by the image border.
#[derive(Debug, Clone)]
pub struct FaceFilter {
    min_score: f32,
    edge_margin: u32,
}

impl FaceFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            min_score: config.min_score,
            edge_margin: config.edge_margin,
        }
    }

    pub fn check_detection(&self, detection: &Detection) -> Result<(), Rejection> {
        let image_size = detection.image_width.zip(detection.image_height);
        self.check(detection.score, &detection.bbox, image_size)
    }

    pub fn check_face(&self, face: &Face) -> Result<(), Rejection> {
        self.check(face.quality, &face.bbox, face.image_size)
    }

    fn check(
        &self,
        score: f32,
        bbox: &BoundingBox,
        image_size: Option<(u32, u32)>,
    ) -> Result<(), Rejection> {
        if score < self.min_score {
            return Err(Rejection::LowScore(score));
        }
        if let Some((width, height)) = image_size {
            if bbox.touches_border(width, height, self.edge_margin) {
                return Err(Rejection::PartialFace);
            }
        }
        Ok(())
    }
}

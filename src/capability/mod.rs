//! Narrow interfaces to the pixel-level vision primitives
//!
//! Keypoint detection, descriptor matching, homography fitting, the text detection network
//! and the OCR engine are supplied by the caller through these traits. Correlation has a
//! built-in implementation ([`NccCorrelator`]) backed by imageproc.

pub mod correlator;
pub mod shared;

pub use correlator::NccCorrelator;
pub use shared::SharedCapability;

use crate::error::CapabilityError;
use crate::geometry::{PointF, Rect, Size};
use crate::locator::OrbTuning;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// A detected keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyPoint {
    pub position: PointF,
    pub response: f32,
}

impl KeyPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            position: PointF::new(x, y),
            response: 0.0,
        }
    }
}

/// Keypoints plus one opaque descriptor per keypoint, in the same order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<Vec<u8>>,
}

impl Features {
    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// A query/train descriptor pairing. Lower distance is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// How many keypoints to extract and how the detector is tuned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings<'a> {
    pub max_features: u32,
    pub tuning: &'a OrbTuning,
}

/// A 3x3 planar projective transform, row major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Homography(pub [[f64; 3]; 3]);

impl Homography {
    pub fn identity() -> Self {
        Homography([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Pure translation, handy for tests and trivial estimators.
    pub fn translation(dx: f64, dy: f64) -> Self {
        Homography([[1.0, 0.0, dx], [0.0, 1.0, dy], [0.0, 0.0, 1.0]])
    }

    /// Project a point. A point mapped to infinity keeps its affine part.
    pub fn apply(&self, point: PointF) -> PointF {
        let m = &self.0;
        let x = m[0][0] * point.x + m[0][1] * point.y + m[0][2];
        let y = m[1][0] * point.x + m[1][1] * point.y + m[1][2];
        let w = m[2][0] * point.x + m[2][1] * point.y + m[2][2];
        if w.abs() < f64::EPSILON {
            return PointF::new(x, y);
        }
        PointF::new(x / w, y / w)
    }
}

/// Best placement of a template inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub rect: Rect,
    pub score: f32,
}

/// Raw output of a text detection network over its working resolution.
///
/// Maps are row major over a `rows` x `cols` grid, each cell covering
/// [`TextDetectorOutput::STRIDE`] input pixels per axis. `geometry` holds the distances to
/// the top, right, bottom and left edges followed by the rotation angle in radians.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextDetectorOutput {
    pub rows: usize,
    pub cols: usize,
    pub scores: Vec<f32>,
    pub geometry: [Vec<f32>; 5],
}

impl TextDetectorOutput {
    pub const STRIDE: f64 = 4.0;

    pub fn score(&self, row: usize, col: usize) -> f32 {
        self.scores[row * self.cols + col]
    }

    pub fn geometry(&self, plane: usize, row: usize, col: usize) -> f32 {
        self.geometry[plane][row * self.cols + col]
    }

    /// Whether every map holds exactly `rows * cols` values.
    pub fn is_consistent(&self) -> bool {
        let cells = self.rows * self.cols;
        self.scores.len() == cells && self.geometry.iter().all(|plane| plane.len() == cells)
    }
}

/// Text read from a region, with the engine's own confidence when it reports one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Keypoint detection, description and descriptor matching.
pub trait FeatureDetector: Send + Sync {
    fn detect_and_describe(
        &self,
        image: &DynamicImage,
        settings: &DetectorSettings<'_>,
    ) -> Result<Features, CapabilityError>;

    /// Correspondences between the two descriptor sets, best first.
    fn match_descriptors(
        &self,
        query: &Features,
        train: &Features,
    ) -> Result<Vec<Correspondence>, CapabilityError>;
}

pub trait HomographyEstimator: Send + Sync {
    /// Fit a transform taking `query` points onto `train` points; fails when degenerate.
    fn fit(&self, query: &[PointF], train: &[PointF]) -> Result<Homography, CapabilityError>;
}

pub trait TemplateCorrelator: Send + Sync {
    /// Best placement of `template` inside `source`. Callers guarantee the template fits.
    fn correlate(
        &self,
        template: &DynamicImage,
        source: &DynamicImage,
    ) -> Result<Correlation, CapabilityError>;
}

pub trait TextDetector: Send + Sync {
    /// Working resolution the input is resized to before `forward`. Detectors that load
    /// lazily may need to initialise before they can answer.
    fn input_size(&self) -> Result<Size, CapabilityError> {
        Ok(Size::new(640, 640))
    }

    fn forward(&self, image: &DynamicImage) -> Result<TextDetectorOutput, CapabilityError>;
}

pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage, rect: Rect) -> Result<Recognition, CapabilityError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_homography_identity_and_translation() {
        let p = PointF::new(3.5, -2.0);
        assert_eq!(Homography::identity().apply(p), p);
        assert_eq!(
            Homography::translation(10.0, 5.0).apply(p),
            PointF::new(13.5, 3.0)
        );
    }

    #[test]
    fn test_homography_projective_divide() {
        let h = Homography([[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 2.0]]);
        let q = h.apply(PointF::new(7.0, 9.0));
        assert_relative_eq!(q.x, 7.0);
        assert_relative_eq!(q.y, 9.0);
    }

    #[test]
    fn test_detector_output_consistency() {
        let out = TextDetectorOutput {
            rows: 2,
            cols: 3,
            scores: vec![0.0; 6],
            geometry: std::array::from_fn(|_| vec![0.0; 6]),
        };
        assert!(out.is_consistent());
        let broken = TextDetectorOutput {
            scores: vec![0.0; 5],
            ..out
        };
        assert!(!broken.is_consistent());
    }
}

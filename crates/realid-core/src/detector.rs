//! Cascade face detection.
//!
//! Two backends implement [`FaceDetector`]:
//! - [`SeetaDetector`]: the pure-Rust funnel cascade from `rustface`, loaded
//!   from a SeetaFace model file. Default.
//! - `HaarCascadeDetector`: OpenCV's Haar cascade (`opencv` feature), run with
//!   the same parameters as the Python deployment that enrolled existing
//!   descriptors.

use crate::frame::GrayFrame;
use crate::types::BoundingBox;
use std::path::Path;
use thiserror::Error;

/// Image pyramid step between detection scales.
pub const SCALE_FACTOR: f64 = 1.1;
/// Overlapping candidates required to keep a detection.
pub const MIN_NEIGHBORS: i32 = 5;

// SeetaFace tuning. The pyramid factor shrinks the image by 1 / SCALE_FACTOR
// per level.
const SEETA_MIN_FACE_SIZE: u32 = 20;
const SEETA_SCORE_THRESHOLD: f64 = 2.0;
const SEETA_WINDOW_STEP: u32 = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: String, reason: String },
    #[error("detection failed: {0}")]
    DetectionFailed(String),
}

/// Locates faces in a grayscale frame.
///
/// Implementations return boxes in their native output order; callers pick
/// one with a [`FaceSelection`].
pub trait FaceDetector: Send {
    /// Short backend name, reported alongside detections.
    fn name(&self) -> &'static str;

    fn detect(&mut self, frame: &GrayFrame) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Which detection to use when a frame has several faces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaceSelection {
    /// Index 0 of the detector output, in the detector's own order. Not the
    /// largest or most confident face.
    #[default]
    First,
}

impl FaceSelection {
    pub fn select(self, faces: &[BoundingBox]) -> Option<BoundingBox> {
        match self {
            FaceSelection::First => faces.first().copied(),
        }
    }
}

/// SeetaFace funnel-structured cascade detector (`rustface`).
pub struct SeetaDetector {
    model: rustface::Model,
}

impl SeetaDetector {
    /// Load a SeetaFace model (e.g. `seeta_fd_frontal_v1.0.bin`).
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        let path_str = model_path.display().to_string();
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(path_str));
        }

        let file = std::fs::File::open(model_path).map_err(|e| DetectorError::ModelLoad {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;
        let model = rustface::read_model(std::io::BufReader::new(file)).map_err(|e| {
            DetectorError::ModelLoad {
                path: path_str.clone(),
                reason: e.to_string(),
            }
        })?;

        tracing::info!(path = %path_str, "loaded SeetaFace model");
        Ok(Self { model })
    }
}

impl FaceDetector for SeetaDetector {
    fn name(&self) -> &'static str {
        "seetaface"
    }

    fn detect(&mut self, frame: &GrayFrame) -> Result<Vec<BoundingBox>, DetectorError> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(SEETA_MIN_FACE_SIZE);
        detector.set_score_thresh(SEETA_SCORE_THRESHOLD);
        detector.set_pyramid_scale_factor((1.0 / SCALE_FACTOR) as f32);
        detector.set_slide_window_step(SEETA_WINDOW_STEP, SEETA_WINDOW_STEP);

        let image = rustface::ImageData::new(&frame.data, frame.width, frame.height);
        let faces = detector.detect(&image);

        Ok(faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                clamp_box(bbox.x(), bbox.y(), bbox.width(), bbox.height(), frame)
            })
            .collect())
    }
}

/// Convert signed detector coordinates to a box inside the frame.
fn clamp_box(x: i32, y: i32, width: u32, height: u32, frame: &GrayFrame) -> Option<BoundingBox> {
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = (x as i64 + width as i64).clamp(0, frame.width as i64) as u32;
    let y1 = (y as i64 + height as i64).clamp(0, frame.height as i64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
}

#[cfg(feature = "opencv")]
pub use haar::HaarCascadeDetector;

#[cfg(feature = "opencv")]
mod haar {
    use super::{clamp_box, DetectorError, FaceDetector, MIN_NEIGHBORS, SCALE_FACTOR};
    use crate::frame::GrayFrame;
    use crate::types::BoundingBox;
    use opencv::core::{Mat, Rect, Size, Vector};
    use opencv::objdetect::CascadeClassifier;
    use opencv::prelude::*;
    use std::path::Path;

    /// OpenCV Haar cascade (`haarcascade_frontalface_default.xml`).
    pub struct HaarCascadeDetector {
        cascade: CascadeClassifier,
    }

    impl HaarCascadeDetector {
        pub fn load(cascade_path: &Path) -> Result<Self, DetectorError> {
            let path_str = cascade_path.display().to_string();
            if !cascade_path.exists() {
                return Err(DetectorError::ModelNotFound(path_str));
            }
            let load_err = |reason: String| DetectorError::ModelLoad {
                path: path_str.clone(),
                reason,
            };

            let cascade = CascadeClassifier::new(&path_str).map_err(|e| load_err(e.to_string()))?;
            if cascade.empty().map_err(|e| load_err(e.to_string()))? {
                return Err(load_err("cascade classifier is empty".into()));
            }

            tracing::info!(path = %path_str, "loaded Haar cascade");
            Ok(Self { cascade })
        }
    }

    impl FaceDetector for HaarCascadeDetector {
        fn name(&self) -> &'static str {
            "opencv-haar"
        }

        fn detect(&mut self, frame: &GrayFrame) -> Result<Vec<BoundingBox>, DetectorError> {
            let failed = |e: opencv::Error| DetectorError::DetectionFailed(e.to_string());

            let mat = Mat::new_rows_cols_with_data(frame.height as i32, frame.width as i32, &frame.data)
                .map_err(failed)?;
            let mut faces = Vector::<Rect>::new();
            self.cascade
                .detect_multi_scale(
                    &mat,
                    &mut faces,
                    SCALE_FACTOR,
                    MIN_NEIGHBORS,
                    0,
                    Size::default(),
                    Size::default(),
                )
                .map_err(failed)?;

            Ok(faces
                .iter()
                .filter_map(|r| clamp_box(r.x, r.y, r.width.max(0) as u32, r.height.max(0) as u32, frame))
                .collect())
        }
    }
}

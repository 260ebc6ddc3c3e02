//! Image bytes in, descriptor out: decode → grayscale → detect → select →
//! extract.

use crate::detector::{DetectorError, FaceDetector, FaceSelection};
use crate::extractor;
use crate::frame::{FrameError, GrayFrame};
use crate::types::{BoundingBox, Descriptor};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("bad image: {0}")]
    Decode(#[from] FrameError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// A face found in a submitted image, with its descriptor.
#[derive(Debug, Clone)]
pub struct FaceCapture {
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
    /// Dimensions of the decoded source image.
    pub image_size: (u32, u32),
    /// Backend that found the face.
    pub detector: &'static str,
}

/// Owns a detector and turns encoded images into descriptors.
pub struct FacePipeline {
    detector: Box<dyn FaceDetector>,
    selection: FaceSelection,
}

impl FacePipeline {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self {
            detector,
            selection: FaceSelection::First,
        }
    }

    pub fn with_selection(mut self, selection: FaceSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Decode an encoded image and describe the selected face.
    pub fn capture(&mut self, image: &[u8]) -> Result<FaceCapture, FaceError> {
        let gray = GrayFrame::decode(image)?;
        self.capture_frame(&gray)
    }

    /// Describe the selected face of an already-decoded frame.
    pub fn capture_frame(&mut self, gray: &GrayFrame) -> Result<FaceCapture, FaceError> {
        let faces = self.detector.detect(gray)?;
        tracing::debug!(
            faces = faces.len(),
            width = gray.width,
            height = gray.height,
            "detection complete"
        );

        let bbox = self.selection.select(&faces).ok_or(FaceError::NoFaceDetected)?;
        let descriptor = extractor::extract(gray, &bbox).ok_or(FaceError::NoFaceDetected)?;

        Ok(FaceCapture {
            bbox,
            descriptor,
            image_size: (gray.width, gray.height),
            detector: self.detector.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Reports a fixed list of boxes regardless of content.
    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _frame: &GrayFrame) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    fn png(width: u32, height: u32, seed: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x as u8).wrapping_mul(seed), (y as u8).wrapping_add(seed), seed])
        });
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[test]
    fn test_capture_uses_first_face() {
        let first = BoundingBox::new(4, 4, 40, 40);
        let second = BoundingBox::new(30, 30, 60, 60);
        let mut pipeline = FacePipeline::new(Box::new(FixedDetector(vec![first, second])));

        let capture = pipeline.capture(&png(100, 100, 3)).unwrap();
        assert_eq!(capture.bbox, first);
        assert_eq!(capture.image_size, (100, 100));
        assert_eq!(capture.detector, "fixed");
    }

    #[test]
    fn test_capture_matches_direct_extraction() {
        let bbox = BoundingBox::new(10, 5, 50, 60);
        let image = png(80, 80, 9);
        let mut pipeline = FacePipeline::new(Box::new(FixedDetector(vec![bbox])));

        let capture = pipeline.capture(&image).unwrap();
        let gray = GrayFrame::decode(&image).unwrap();
        assert_eq!(capture.descriptor, extractor::extract(&gray, &bbox).unwrap());
    }

    #[test]
    fn test_capture_no_face() {
        let mut pipeline = FacePipeline::new(Box::new(FixedDetector(vec![])));
        let err = pipeline.capture(&png(32, 32, 1)).unwrap_err();
        assert!(matches!(err, FaceError::NoFaceDetected));
    }

    #[test]
    fn test_capture_bad_image_is_not_no_face() {
        let mut pipeline = FacePipeline::new(Box::new(FixedDetector(vec![BoundingBox::new(0, 0, 8, 8)])));
        let err = pipeline.capture(&[0xff, 0xd8, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, FaceError::Decode(_)));
    }

    #[test]
    fn test_capture_is_deterministic() {
        let image = png(64, 64, 21);
        let mut pipeline = FacePipeline::new(Box::new(FixedDetector(vec![BoundingBox::new(8, 8, 48, 48)])));
        let a = pipeline.capture(&image).unwrap();
        let b = pipeline.capture(&image).unwrap();
        assert_eq!(a.descriptor.to_le_bytes(), b.descriptor.to_le_bytes());
    }
}

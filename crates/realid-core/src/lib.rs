//! realid-core: face descriptor engine for REAL ID.
//!
//! Detects a face with a cascade classifier, crops and resizes it to a
//! 96x96 grayscale patch, and hashes the patch into a 128-value descriptor.
//! Descriptors are compared by Euclidean distance against a fixed threshold.

pub mod detector;
pub mod extractor;
pub mod frame;
pub mod pipeline;
pub mod types;

pub use detector::{FaceDetector, FaceSelection};
pub use frame::GrayFrame;
pub use pipeline::{FaceCapture, FaceError, FacePipeline};
pub use types::{
    BoundingBox, Descriptor, FirstWithinThreshold, GalleryEntry, IdentityRecord, MatchResult,
    Matcher, DESCRIPTOR_LEN, MATCH_THRESHOLD,
};

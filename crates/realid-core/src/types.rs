use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of values in a face descriptor.
pub const DESCRIPTOR_LEN: usize = 128;

/// Maximum Euclidean distance (exclusive) for two descriptors to match.
pub const MATCH_THRESHOLD: f32 = 5.0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor blob length {0} is not a multiple of 4 bytes")]
    MisalignedBlob(usize),
}

/// Pixel-space bounding box of a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Hash-derived face descriptor. Values lie in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    pub fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance over the common prefix of both descriptors.
    ///
    /// Callers compare descriptors of equal length; the matcher skips
    /// mismatched lengths before getting here.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Persisted layout: consecutive little-endian f32 values.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        if bytes.len() % 4 != 0 {
            return Err(DescriptorError::MisalignedBlob(bytes.len()));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self { values })
    }
}

/// A registered identity: email, display name, and its enrolled descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub email: String,
    pub name: String,
    pub descriptor: Descriptor,
    /// Enrollment time (RFC 3339). Absent for rows enrolled before it was
    /// recorded.
    pub created_at: Option<String>,
}

/// One stored descriptor as seen by the matcher.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub email: String,
    pub descriptor: Descriptor,
}

/// Result of matching a probe descriptor against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Email of the matched identity (if any).
    pub email: Option<String>,
    /// Distance to the matched identity (if any).
    pub distance: Option<f32>,
    /// Number of gallery entries with a comparable descriptor length.
    pub compared: usize,
}

impl MatchResult {
    fn no_match(compared: usize) -> Self {
        Self {
            matched: false,
            email: None,
            distance: None,
            compared,
        }
    }
}

/// Strategy for comparing a probe descriptor against the gallery.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, gallery: &[GalleryEntry], threshold: f32) -> MatchResult;
}

/// Returns the first gallery entry, in gallery order, whose distance to the
/// probe is strictly below the threshold.
///
/// Every entry is visited even after a hit, so the time taken does not
/// reveal the position of the match. Entries whose length differs from the
/// probe are skipped.
pub struct FirstWithinThreshold;

impl Matcher for FirstWithinThreshold {
    fn compare(&self, probe: &Descriptor, gallery: &[GalleryEntry], threshold: f32) -> MatchResult {
        let mut first: Option<(usize, f32)> = None;
        let mut compared = 0;

        for (i, entry) in gallery.iter().enumerate() {
            if entry.descriptor.len() != probe.len() {
                continue;
            }
            compared += 1;
            let distance = probe.euclidean_distance(&entry.descriptor);
            if first.is_none() && distance < threshold {
                first = Some((i, distance));
            }
        }

        match first {
            Some((idx, distance)) => MatchResult {
                matched: true,
                email: Some(gallery[idx].email.clone()),
                distance: Some(distance),
                compared,
            },
            None => MatchResult::no_match(compared),
        }
    }
}

//! Face descriptor extraction.
//!
//! The descriptor is a content fingerprint of the face crop, not a learned
//! embedding: the 96x96 grayscale patch is hashed with SHA-256 and the digest
//! bytes, repeated to 128, are scaled into [0, 1]. The layout must stay
//! byte-for-byte stable so that enrolled descriptors keep matching.

use crate::frame::{self, GrayFrame};
use crate::types::{BoundingBox, Descriptor, DESCRIPTOR_LEN};
use sha2::{Digest, Sha256};

/// Side length of the normalized face patch.
pub const FACE_PATCH_SIZE: u32 = 96;

/// Crop, resize, and hash the face region. `None` if the box is empty or
/// lies outside the frame.
pub fn extract(gray: &GrayFrame, bbox: &BoundingBox) -> Option<Descriptor> {
    if bbox.is_empty() {
        return None;
    }
    let face = gray.crop(bbox)?;
    let patch = resize_face(&face);
    Some(descriptor_from_patch(&patch.data))
}

/// Hash a normalized patch into a descriptor.
pub fn descriptor_from_patch(patch: &[u8]) -> Descriptor {
    let digest = Sha256::digest(patch);
    let values = digest
        .iter()
        .cycle()
        .take(DESCRIPTOR_LEN)
        .map(|&b| b as f32 / 255.0)
        .collect();
    Descriptor::from_values(values)
}

#[cfg(not(feature = "opencv"))]
fn resize_face(face: &GrayFrame) -> GrayFrame {
    frame::resize_linear(face, FACE_PATCH_SIZE, FACE_PATCH_SIZE)
}

#[cfg(feature = "opencv")]
fn resize_face(face: &GrayFrame) -> GrayFrame {
    match opencv_resize(face) {
        Ok(patch) => patch,
        Err(e) => {
            tracing::warn!(error = %e, "OpenCV resize failed; using built-in bilinear resize");
            frame::resize_linear(face, FACE_PATCH_SIZE, FACE_PATCH_SIZE)
        }
    }
}

#[cfg(feature = "opencv")]
fn opencv_resize(face: &GrayFrame) -> opencv::Result<GrayFrame> {
    use opencv::core::{Mat, Size};
    use opencv::imgproc;
    use opencv::prelude::*;

    let src = Mat::new_rows_cols_with_data(face.height as i32, face.width as i32, &face.data)?;
    let mut dst = Mat::default();
    let size = Size::new(FACE_PATCH_SIZE as i32, FACE_PATCH_SIZE as i32);
    imgproc::resize(&src, &mut dst, size, 0.0, 0.0, imgproc::INTER_LINEAR)?;
    Ok(GrayFrame {
        data: dst.data_bytes()?.to_vec(),
        width: FACE_PATCH_SIZE,
        height: FACE_PATCH_SIZE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MATCH_THRESHOLD;

    fn patterned(seed: u32, width: u32, height: u32) -> GrayFrame {
        let data = (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| ((x.wrapping_mul(seed + 3) ^ y.wrapping_mul(7)) % 256) as u8)
            })
            .collect();
        GrayFrame::new(data, width, height).unwrap()
    }

    #[test]
    fn test_descriptor_shape_and_range() {
        let d = descriptor_from_patch(&[0u8; 96 * 96]);
        assert_eq!(d.len(), DESCRIPTOR_LEN);
        assert!(d.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_descriptor_is_digest_tiled_four_times() {
        let patch = vec![42u8; 96 * 96];
        let d = descriptor_from_patch(&patch);
        let digest = Sha256::digest(&patch);

        for (i, v) in d.values().iter().enumerate() {
            assert_eq!(*v, digest[i % 32] as f32 / 255.0);
        }
    }

    #[test]
    fn test_descriptor_known_digest() {
        // SHA-256("") = e3b0c442...; first byte 0xe3 = 227.
        let d = descriptor_from_patch(&[]);
        assert_eq!(d.values()[0], 227.0 / 255.0);
        assert_eq!(d.values()[32], 227.0 / 255.0);
        assert_eq!(d.values()[1], 0xb0 as f32 / 255.0);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let frame = patterned(11, 200, 160);
        let bbox = BoundingBox::new(40, 20, 120, 120);
        let a = extract(&frame, &bbox).unwrap();
        let b = extract(&frame, &bbox).unwrap();
        assert_eq!(a.to_le_bytes(), b.to_le_bytes());
        assert_eq!(a.euclidean_distance(&b), 0.0);
    }

    #[test]
    fn test_extract_empty_box() {
        let frame = patterned(1, 64, 64);
        assert!(extract(&frame, &BoundingBox::new(10, 10, 0, 20)).is_none());
        assert!(extract(&frame, &BoundingBox::new(100, 100, 20, 20)).is_none());
    }

    #[test]
    fn test_extract_different_regions_differ() {
        let frame = patterned(5, 256, 256);
        let a = extract(&frame, &BoundingBox::new(0, 0, 100, 100)).unwrap();
        let b = extract(&frame, &BoundingBox::new(13, 29, 100, 100)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unrelated_patches_collide_often() {
        // Unrelated digests behave like uniform bytes, so the expected
        // distance is sqrt(128 / 6) ~= 4.6, inside the 5.0 threshold.
        let descriptors: Vec<Descriptor> = (0u32..40)
            .map(|seed| {
                let patch: Vec<u8> = (0u32..96 * 96)
                    .map(|i| (i.wrapping_mul(seed * 2 + 1).wrapping_add(seed * 97) >> 3) as u8)
                    .collect();
                descriptor_from_patch(&patch)
            })
            .collect();

        let mut pairs = 0usize;
        let mut within = 0usize;
        let mut total = 0.0f32;
        for i in 0..descriptors.len() {
            for j in i + 1..descriptors.len() {
                let d = descriptors[i].euclidean_distance(&descriptors[j]);
                pairs += 1;
                total += d;
                if d < MATCH_THRESHOLD {
                    within += 1;
                }
            }
        }

        let mean = total / pairs as f32;
        let rate = within as f32 / pairs as f32;
        assert!((4.0..5.2).contains(&mean), "mean distance {mean}");
        assert!(rate > 0.5 && rate < 0.97, "false-accept rate {rate}");
    }
}

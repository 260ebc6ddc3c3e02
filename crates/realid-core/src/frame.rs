//! Frame type and pixel operations: decode, grayscale, crop, bilinear resize.
//!
//! Grayscale conversion and resizing reproduce OpenCV's 8-bit fixed-point
//! arithmetic (`cvtColor(BGR2GRAY)` and `resize(INTER_LINEAR)`), since the
//! resized bytes feed a hash and any rounding difference changes the result.

use crate::types::BoundingBox;
use image::RgbImage;
use thiserror::Error;

// cvtColor fixed-point weights (Q14).
const GRAY_SHIFT: u32 = 14;
const GRAY_R: u32 = 4899;
const GRAY_G: u32 = 9617;
const GRAY_B: u32 = 1868;

// resize INTER_LINEAR fixed-point coefficients (Q11 per axis).
const RESIZE_COEF_BITS: u32 = 11;
const RESIZE_COEF_SCALE: i32 = 1 << RESIZE_COEF_BITS;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image data could not be decoded")]
    Undecodable,
    #[error("OpenCV error: {0}")]
    Codec(String),
    #[error("image dimensions are zero")]
    ZeroDimensions,
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// An 8-bit single-channel frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Decode an encoded image (JPEG, PNG, ...) straight to grayscale.
    ///
    /// With the `opencv` feature this is `imdecode(IMREAD_COLOR)` followed by
    /// `cvtColor(BGR2GRAY)`, so JPEG pixels and EXIF orientation match an
    /// OpenCV enrollment. Otherwise [`decode_builtin`](Self::decode_builtin).
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        #[cfg(feature = "opencv")]
        let frame = Self::decode_opencv(bytes)?;
        #[cfg(not(feature = "opencv"))]
        let frame = Self::decode_builtin(bytes)?;
        Ok(frame)
    }

    /// Decode with the `image` crate and convert with the fixed-point gray
    /// weights. Matches OpenCV exactly for lossless formats.
    pub fn decode_builtin(bytes: &[u8]) -> Result<Self, FrameError> {
        let rgb = image::load_from_memory(bytes)?.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(FrameError::ZeroDimensions);
        }
        Ok(Self::from_rgb(&rgb))
    }

    #[cfg(feature = "opencv")]
    fn decode_opencv(bytes: &[u8]) -> Result<Self, FrameError> {
        use opencv::core::{AlgorithmHint, Mat, Vector};
        use opencv::prelude::*;
        use opencv::{imgcodecs, imgproc};

        let codec = |e: opencv::Error| FrameError::Codec(e.to_string());
        let buf = Vector::<u8>::from_slice(bytes);
        let bgr = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR).map_err(codec)?;
        if bgr.empty() {
            return Err(FrameError::Undecodable);
        }

        let mut gray = Mat::default();
        imgproc::cvt_color(
            &bgr,
            &mut gray,
            imgproc::COLOR_BGR2GRAY,
            0,
            AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(codec)?;

        let (width, height) = (gray.cols() as u32, gray.rows() as u32);
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions);
        }
        Self::new(gray.data_bytes().map_err(codec)?.to_vec(), width, height)
    }

    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let data = rgb
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                let y = r as u32 * GRAY_R + g as u32 * GRAY_G + b as u32 * GRAY_B;
                ((y + (1 << (GRAY_SHIFT - 1))) >> GRAY_SHIFT) as u8
            })
            .collect();
        Self {
            data,
            width: rgb.width(),
            height: rgb.height(),
        }
    }

    /// Crop to `bbox`, clipped to the frame. `None` if nothing remains.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<GrayFrame> {
        let x0 = bbox.x.min(self.width);
        let y0 = bbox.y.min(self.height);
        let x1 = bbox.x.saturating_add(bbox.width).min(self.width);
        let y1 = bbox.y.saturating_add(bbox.height).min(self.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        let w = self.width as usize;
        let mut data = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
        for y in y0 as usize..y1 as usize {
            data.extend_from_slice(&self.data[y * w + x0 as usize..y * w + x1 as usize]);
        }
        Some(GrayFrame {
            data,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Resize with OpenCV `INTER_LINEAR` semantics for 8-bit input.
///
/// An exact 2x downscale on both axes is a 2x2 box average, as OpenCV
/// switches to its fast area path in that case.
pub fn resize_linear(src: &GrayFrame, dst_width: u32, dst_height: u32) -> GrayFrame {
    let (sw, sh) = (src.width as usize, src.height as usize);
    let (dw, dh) = (dst_width as usize, dst_height as usize);

    if sw == dw * 2 && sh == dh * 2 {
        return downscale_half(src, dw, dh);
    }

    let scale_x = sw as f64 / dw as f64;
    let scale_y = sh as f64 / dh as f64;

    // Horizontal taps: (left index, left coefficient, right coefficient).
    let xtaps: Vec<(usize, i32, i32)> = (0..dw)
        .map(|dx| {
            let mut fx = ((dx as f64 + 0.5) * scale_x - 0.5) as f32;
            let mut sx = fx.floor() as i64;
            fx -= sx as f32;
            if sx < 0 {
                fx = 0.0;
                sx = 0;
            }
            if sx >= sw as i64 - 1 {
                fx = 0.0;
                sx = sw as i64 - 1;
            }
            let (a0, a1) = fixed_coefficients(fx);
            (sx as usize, a0, a1)
        })
        .collect();

    let horizontal = |row: usize| -> Vec<i32> {
        let line = &src.data[row * sw..(row + 1) * sw];
        xtaps
            .iter()
            .map(|&(sx, a0, a1)| {
                let right = line[(sx + 1).min(sw - 1)] as i32;
                line[sx] as i32 * a0 + right * a1
            })
            .collect()
    };

    let mut data = Vec::with_capacity(dw * dh);
    for dy in 0..dh {
        let mut fy = ((dy as f64 + 0.5) * scale_y - 0.5) as f32;
        let sy = fy.floor() as i64;
        fy -= sy as f32;
        let (b0, b1) = fixed_coefficients(fy);

        let row0 = sy.clamp(0, sh as i64 - 1) as usize;
        let row1 = (sy + 1).clamp(0, sh as i64 - 1) as usize;
        let h0 = horizontal(row0);
        let h1 = horizontal(row1);

        for (p0, p1) in h0.iter().zip(h1.iter()) {
            let v = (p0 * b0 + p1 * b1 + (1 << (2 * RESIZE_COEF_BITS - 1))) >> (2 * RESIZE_COEF_BITS);
            data.push(v.clamp(0, 255) as u8);
        }
    }

    GrayFrame {
        data,
        width: dst_width,
        height: dst_height,
    }
}

// Rounds half to even, as cvRound does.
fn fixed_coefficients(f: f32) -> (i32, i32) {
    let c0 = ((1.0 - f) * RESIZE_COEF_SCALE as f32).round_ties_even() as i32;
    let c1 = (f * RESIZE_COEF_SCALE as f32).round_ties_even() as i32;
    (c0, c1)
}

fn downscale_half(src: &GrayFrame, dw: usize, dh: usize) -> GrayFrame {
    let sw = src.width as usize;
    let mut data = Vec::with_capacity(dw * dh);
    for dy in 0..dh {
        let top = &src.data[(2 * dy) * sw..(2 * dy + 1) * sw];
        let bottom = &src.data[(2 * dy + 1) * sw..(2 * dy + 2) * sw];
        for dx in 0..dw {
            let sum = top[2 * dx] as u32
                + top[2 * dx + 1] as u32
                + bottom[2 * dx] as u32
                + bottom[2 * dx + 1] as u32;
            data.push(((sum + 2) >> 2) as u8);
        }
    }
    GrayFrame {
        data,
        width: dw as u32,
        height: dh as u32,
    }
}

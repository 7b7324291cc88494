//! Perspective rectification of the page onto the canonical sheet.
//!
//! The mapping sends canonical corners `(0,0)`, `(W-1,0)`, `(W-1,H-1)`,
//! `(0,H-1)` onto the TL, TR, BR, BL fiducials. Degenerate fiducial
//! quadrilaterals are rejected before any resampling happens.

use image::{GrayImage, Rgb, RgbImage};
use nalgebra::Matrix3;

use crate::enhance::to_luma;
use crate::error::{QuadDefect, ScanError};
use crate::fiducial::FiducialSet;
use crate::homography::{conditioning, estimate_homography_dlt, project, projective_depth};
use crate::sheet_layout::CanonicalSize;

/// Configuration for [`rectify`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    /// Two corners closer than this (pixels) are treated as the same point.
    pub min_corner_separation_px: f64,
    /// A corner triangle with area below this fraction of the squared
    /// quad diameter counts as collinear.
    pub collinear_tolerance: f64,
    /// Minimum singular value ratio of the normalized homography.
    pub min_conditioning: f64,
    /// Color written where the mapping leaves the photo.
    pub fill: [u8; 3],
}

impl RectifyConfig {
    pub const DEFAULT_MIN_CORNER_SEPARATION_PX: f64 = 1.0;
    pub const DEFAULT_COLLINEAR_TOLERANCE: f64 = 1e-3;
    pub const DEFAULT_MIN_CONDITIONING: f64 = 1e-10;
}

impl Default for RectifyConfig {
    fn default() -> Self {
        Self {
            min_corner_separation_px: Self::DEFAULT_MIN_CORNER_SEPARATION_PX,
            collinear_tolerance: Self::DEFAULT_COLLINEAR_TOLERANCE,
            min_conditioning: Self::DEFAULT_MIN_CONDITIONING,
            fill: [255, 255, 255],
        }
    }
}

/// Flattened page of exactly the canonical size.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSheet {
    image: RgbImage,
}

impl CanonicalSheet {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn size(&self) -> CanonicalSize {
        CanonicalSize::new(self.image.width(), self.image.height())
    }

    /// BT.601 luminance of the sheet.
    pub fn luma(&self) -> GrayImage {
        to_luma(&self.image)
    }
}

/// Check that four corners (TL, TR, BR, BL) form a usable quadrilateral.
pub fn validate_quad(corners: &[[f64; 2]; 4], config: &RectifyConfig) -> Result<(), QuadDefect> {
    if corners.iter().flatten().any(|v| !v.is_finite()) {
        return Err(QuadDefect::NonFinite);
    }

    let dist = |a: [f64; 2], b: [f64; 2]| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
    let mut diameter = 0.0f64;
    for i in 0..4 {
        for j in i + 1..4 {
            let d = dist(corners[i], corners[j]);
            if d < config.min_corner_separation_px {
                return Err(QuadDefect::CoincidentCorners);
            }
            diameter = diameter.max(d);
        }
    }

    let cross = |o: [f64; 2], a: [f64; 2], b: [f64; 2]| {
        (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
    };
    let min_area = config.collinear_tolerance * diameter * diameter;
    let mut sign = 0.0f64;
    for i in 0..4 {
        let (a, b, c) = (corners[i], corners[(i + 1) % 4], corners[(i + 2) % 4]);
        let turn = cross(a, b, c);
        if 0.5 * turn.abs() < min_area {
            return Err(QuadDefect::Collinear);
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return Err(QuadDefect::NotConvex);
        }
    }
    Ok(())
}

/// Homography mapping canonical pixel coordinates onto photo coordinates.
pub fn rectification_homography(
    fiducials: &FiducialSet,
    size: CanonicalSize,
    config: &RectifyConfig,
) -> Result<Matrix3<f64>, ScanError> {
    let degenerate = |defect| ScanError::DegenerateQuadrilateral { defect };
    let dst = fiducials.corners();
    validate_quad(&dst, config).map_err(degenerate)?;

    let src = size.corners();
    let h = estimate_homography_dlt(&src, &dst)
        .map_err(|_| degenerate(QuadDefect::SingularHomography))?;
    if conditioning(&h) < config.min_conditioning || h.try_inverse().is_none() {
        return Err(degenerate(QuadDefect::SingularHomography));
    }

    // All canonical corners must stay on the same side of the line at infinity.
    let depths = src.map(|p| projective_depth(&h, p[0], p[1]));
    let same_side = depths.iter().all(|&w| w > 0.0) || depths.iter().all(|&w| w < 0.0);
    if !same_side || src.iter().any(|p| project(&h, p[0], p[1]).is_none()) {
        return Err(degenerate(QuadDefect::SingularHomography));
    }
    Ok(h)
}

/// Rectify the raw photo onto a `size` canonical sheet.
///
/// Returns the sheet together with the canonical-to-photo homography it was
/// resampled with.
pub fn rectify(
    raw: &RgbImage,
    fiducials: &FiducialSet,
    size: CanonicalSize,
    config: &RectifyConfig,
) -> Result<(CanonicalSheet, Matrix3<f64>), ScanError> {
    let h = rectification_homography(fiducials, size, config)?;
    let image = warp_perspective(raw, &h, size, Rgb(config.fill));
    tracing::debug!(width = size.width, height = size.height, "sheet rectified");
    Ok((CanonicalSheet::new(image), h))
}

/// Resample `src` into a `size` image; `dst_to_src` maps output pixel
/// coordinates to source pixel coordinates. Samples that fall outside the
/// source (beyond half a pixel) get `fill`.
pub fn warp_perspective(
    src: &RgbImage,
    dst_to_src: &Matrix3<f64>,
    size: CanonicalSize,
    fill: Rgb<u8>,
) -> RgbImage {
    RgbImage::from_fn(size.width, size.height, |u, v| {
        project(dst_to_src, f64::from(u), f64::from(v))
            .and_then(|[x, y]| bilinear_rgb_clamped(src, x, y))
            .map_or(fill, |c| Rgb(c.map(|ch| ch.round().clamp(0.0, 255.0) as u8)))
    })
}

/// Bilinear RGB sample; coordinates within half a pixel of the border are
/// clamped onto it, anything further out is `None`.
pub(crate) fn bilinear_rgb_clamped(img: &RgbImage, x: f64, y: f64) -> Option<[f64; 3]> {
    let (w, h) = img.dimensions();
    let (x, y) = clamp_to_extent(x, y, w, h)?;
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - f64::from(x0);
    let fy = y - f64::from(y0);

    let p = |px: u32, py: u32| img.get_pixel(px, py).0.map(f64::from);
    let (p00, p10, p01, p11) = (p(x0, y0), p(x1, y0), p(x0, y1), p(x1, y1));
    let mut out = [0.0; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        *slot = (1.0 - fx) * (1.0 - fy) * p00[c]
            + fx * (1.0 - fy) * p10[c]
            + (1.0 - fx) * fy * p01[c]
            + fx * fy * p11[c];
    }
    Some(out)
}

/// Grayscale counterpart of [`bilinear_rgb_clamped`].
pub(crate) fn bilinear_gray_clamped(img: &GrayImage, x: f64, y: f64) -> Option<f64> {
    let (w, h) = img.dimensions();
    let (x, y) = clamp_to_extent(x, y, w, h)?;
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - f64::from(x0);
    let fy = y - f64::from(y0);

    let p = |px: u32, py: u32| f64::from(img.get_pixel(px, py)[0]);
    Some(
        (1.0 - fx) * (1.0 - fy) * p(x0, y0)
            + fx * (1.0 - fy) * p(x1, y0)
            + (1.0 - fx) * fy * p(x0, y1)
            + fx * fy * p(x1, y1),
    )
}

#[inline]
fn clamp_to_extent(x: f64, y: f64, w: u32, h: u32) -> Option<(f64, f64)> {
    if w == 0 || h == 0 || !x.is_finite() || !y.is_finite() {
        return None;
    }
    let (wf, hf) = (f64::from(w), f64::from(h));
    if x < -0.5 || y < -0.5 || x > wf - 0.5 || y > hf - 0.5 {
        return None;
    }
    Some((x.clamp(0.0, wf - 1.0), y.clamp(0.0, hf - 1.0)))
}

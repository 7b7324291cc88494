//! Orientation resolution by decoding the payload marker.
//!
//! Candidate rotations are tried in the fixed order 0, 90, 180, 270 degrees
//! (clockwise, applied to the rectified sheet). For each candidate only the
//! marker region of the rotated view is resampled; the whole sheet is
//! rotated once, after a candidate decodes. Views of quarter-turn candidates
//! are stretched back to the canonical size, which undoes a page that was
//! photographed sideways.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use crate::error::ScanError;
use crate::marker::{decode_payload, MarkerDecodeConfig, MarkerDiagnostics, MarkerFormat};
use crate::rectify::{bilinear_gray_clamped, CanonicalSheet};
use crate::sheet_layout::MarkerRegion;

/// Candidate rotations in attempt order.
pub const CANDIDATE_ROTATIONS: [u16; 4] = [0, 90, 180, 270];

/// Configuration for [`resolve`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    /// Grid marker decoding parameters.
    pub decode: MarkerDecodeConfig,
    /// Symbologies tried on each candidate view, in order.
    pub formats: Vec<MarkerFormat>,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            decode: MarkerDecodeConfig::default(),
            formats: vec![MarkerFormat::Grid, MarkerFormat::Qr],
        }
    }
}

/// Upright sheet together with the decoded marker payload.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedSheet {
    pub sheet: CanonicalSheet,
    /// Clockwise rotation that was applied to the rectified sheet.
    pub rotation_deg: u16,
    pub payload: String,
    /// Symbology the payload was read from.
    pub format: MarkerFormat,
    pub marker: MarkerDiagnostics,
}

/// Find the rotation under which the marker decodes and return the upright sheet.
pub fn resolve(
    sheet: &CanonicalSheet,
    region: &MarkerRegion,
    config: &OrientationConfig,
) -> Result<OrientedSheet, ScanError> {
    let luma = sheet.luma();
    for rotation in CANDIDATE_ROTATIONS {
        let view = marker_view(&luma, region, rotation);
        for &format in &config.formats {
            let (payload, diag) = decode_payload(&view, format, &config.decode);
            let Some(payload) = payload else {
                tracing::trace!(
                    rotation,
                    %format,
                    reason = ?diag.reject_reason,
                    contrast = diag.contrast,
                    "marker not decoded"
                );
                continue;
            };
            tracing::debug!(rotation, %format, payload = %payload, "orientation resolved");
            return Ok(OrientedSheet {
                sheet: rotate_sheet(sheet, rotation),
                rotation_deg: rotation,
                payload,
                format,
                marker: diag,
            });
        }
    }
    Err(ScanError::OrientationNotResolved {
        attempts: CANDIDATE_ROTATIONS.len(),
    })
}

/// Marker region of the sheet as it would appear after rotating by `rotation`.
pub fn marker_view(luma: &GrayImage, region: &MarkerRegion, rotation: u16) -> GrayImage {
    let (w, h) = luma.dimensions();
    GrayImage::from_fn(region.width, region.height, |dx, dy| {
        let u = f64::from(region.x + dx);
        let v = f64::from(region.y + dy);
        let [sx, sy] = view_to_sheet(u, v, w, h, rotation);
        let value = bilinear_gray_clamped(luma, sx, sy).unwrap_or(255.0);
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

/// Map a pixel of the rotated (and, for quarter turns, restretched) view back
/// onto the unrotated sheet of size `w x h`.
fn view_to_sheet(u: f64, v: f64, w: u32, h: u32, rotation: u16) -> [f64; 2] {
    let (wf, hf) = (f64::from(w), f64::from(h));
    // Quarter-turn views are `h x w` images resized back to `w x h`.
    let stretched = |u: f64, v: f64| [(u + 0.5) * hf / wf - 0.5, (v + 0.5) * wf / hf - 0.5];
    match rotation {
        90 => {
            let [a, b] = stretched(u, v);
            [b, hf - 1.0 - a]
        }
        180 => [wf - 1.0 - u, hf - 1.0 - v],
        270 => {
            let [a, b] = stretched(u, v);
            [wf - 1.0 - b, a]
        }
        _ => [u, v],
    }
}

/// Rotate the full sheet clockwise, keeping the canonical size.
fn rotate_sheet(sheet: &CanonicalSheet, rotation: u16) -> CanonicalSheet {
    let img = sheet.image();
    let (w, h) = img.dimensions();
    let rotated = match rotation {
        90 => imageops::rotate90(img),
        180 => imageops::rotate180(img),
        270 => imageops::rotate270(img),
        _ => return sheet.clone(),
    };
    if rotated.dimensions() == (w, h) {
        CanonicalSheet::new(rotated)
    } else {
        CanonicalSheet::new(imageops::resize(&rotated, w, h, FilterType::Triangle))
    }
}

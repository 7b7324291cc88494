//! Payload marker localization and decoding inside a search rectangle.
//!
//! The marker bounding box is found from dark-pixel row and column
//! projections; modules are then sampled on a regular grid inside the box
//! and binarized with a 2-means threshold computed over the whole search
//! rectangle. The decoded bits must carry a dark border, the sync byte, a
//! valid length and a matching checksum before the payload is accepted.

use image::GrayImage;

use super::codec::{
    crc8, MarkerBits, DATA_BYTES, MARKER_MODULES, MAX_PAYLOAD_BYTES, SYNC_BYTE,
};

/// Configuration for marker decoding.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MarkerDecodeConfig {
    /// Minimum gray-level gap between the dark and light cluster means.
    /// Default: [`MarkerDecodeConfig::DEFAULT_MIN_CONTRAST`].
    pub min_contrast: f32,
    /// A row (column) belongs to the marker box when its dark-pixel count
    /// reaches this fraction of the densest row (column).
    pub projection_ratio: f32,
    /// Maximum border modules allowed to read light.
    pub max_border_errors: usize,
    /// Maximum bit errors tolerated in the sync byte.
    pub max_sync_errors: u32,
    /// Maximum iterations for iterative 2-means threshold refinement.
    pub threshold_max_iters: usize,
    /// Stop refinement when the threshold moves by at most this much.
    pub threshold_convergence_eps: f32,
}

impl MarkerDecodeConfig {
    pub const DEFAULT_MIN_CONTRAST: f32 = 40.0;
    pub const DEFAULT_PROJECTION_RATIO: f32 = 0.5;
    pub const DEFAULT_MAX_BORDER_ERRORS: usize = 4;
    pub const DEFAULT_MAX_SYNC_ERRORS: u32 = 1;
    pub const DEFAULT_THRESHOLD_MAX_ITERS: usize = 10;
    pub const DEFAULT_THRESHOLD_CONVERGENCE_EPS: f32 = 0.5;
}

impl Default for MarkerDecodeConfig {
    fn default() -> Self {
        Self {
            min_contrast: Self::DEFAULT_MIN_CONTRAST,
            projection_ratio: Self::DEFAULT_PROJECTION_RATIO,
            max_border_errors: Self::DEFAULT_MAX_BORDER_ERRORS,
            max_sync_errors: Self::DEFAULT_MAX_SYNC_ERRORS,
            threshold_max_iters: Self::DEFAULT_THRESHOLD_MAX_ITERS,
            threshold_convergence_eps: Self::DEFAULT_THRESHOLD_CONVERGENCE_EPS,
        }
    }
}

/// Stable reject code for a decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerRejectReason {
    NoMarker,
    LowContrast,
    BorderMismatch,
    SyncMismatch,
    BadLength,
    ChecksumMismatch,
    InvalidUtf8,
    /// A QR symbol was found but did not decode.
    QrUnreadable,
}

impl MarkerRejectReason {
    pub const fn code(self) -> &'static str {
        match self {
            Self::NoMarker => "no_marker",
            Self::LowContrast => "low_contrast",
            Self::BorderMismatch => "border_mismatch",
            Self::SyncMismatch => "sync_mismatch",
            Self::BadLength => "bad_length",
            Self::ChecksumMismatch => "checksum_mismatch",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::QrUnreadable => "qr_unreadable",
        }
    }
}

impl std::fmt::Display for MarkerRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Debug/diagnostic information about a decode attempt.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarkerDiagnostics {
    /// Gray level separating dark from light modules.
    pub threshold: f32,
    /// Gap between dark and light cluster means.
    pub contrast: f32,
    /// Located marker box `[x, y, width, height]` in search-rectangle pixels.
    pub bbox: Option<[u32; 4]>,
    /// Border modules that read light.
    pub border_errors: usize,
    /// Bit errors in the sync byte.
    pub sync_errors: u32,
    /// Stable reject code, if rejected.
    pub reject_reason: Option<MarkerRejectReason>,
}

/// Decode a payload marker and return `(payload, diagnostics)`.
///
/// `gray` is the search rectangle only; the marker must be axis aligned and
/// upright within it.
pub fn decode_marker(
    gray: &GrayImage,
    config: &MarkerDecodeConfig,
) -> (Option<String>, MarkerDiagnostics) {
    let mut diag = MarkerDiagnostics::default();
    let result = decode_marker_impl(gray, config, &mut diag);
    match result {
        Ok(payload) => (Some(payload), diag),
        Err(reason) => {
            diag.reject_reason = Some(reason);
            (None, diag)
        }
    }
}

fn decode_marker_impl(
    gray: &GrayImage,
    config: &MarkerDecodeConfig,
    diag: &mut MarkerDiagnostics,
) -> Result<String, MarkerRejectReason> {
    let (w, h) = gray.dimensions();
    if (w as usize) < MARKER_MODULES || (h as usize) < MARKER_MODULES {
        return Err(MarkerRejectReason::NoMarker);
    }

    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p[0] as usize] += 1;
    }
    let split = compute_iterative_two_means_threshold(
        &hist,
        config.threshold_max_iters,
        config.threshold_convergence_eps,
    );
    diag.threshold = split.threshold;
    diag.contrast = split.mean_hi - split.mean_lo;
    if diag.contrast < config.min_contrast {
        return Err(MarkerRejectReason::LowContrast);
    }

    let bbox = locate_marker_box(gray, split.threshold, config.projection_ratio)
        .ok_or(MarkerRejectReason::NoMarker)?;
    diag.bbox = Some(bbox);

    let bits = sample_modules(gray, bbox, split.threshold);
    diag.border_errors = bits.border_errors();
    if diag.border_errors > config.max_border_errors {
        return Err(MarkerRejectReason::BorderMismatch);
    }

    let data = bits.data_bytes();
    diag.sync_errors = (data[0] ^ SYNC_BYTE).count_ones();
    parse_data_bytes(&data, config.max_sync_errors)
}

/// Validate the data byte layout and extract the payload.
pub fn parse_data_bytes(
    data: &[u8; DATA_BYTES],
    max_sync_errors: u32,
) -> Result<String, MarkerRejectReason> {
    if (data[0] ^ SYNC_BYTE).count_ones() > max_sync_errors {
        return Err(MarkerRejectReason::SyncMismatch);
    }
    let len = data[1] as usize;
    if len > MAX_PAYLOAD_BYTES {
        return Err(MarkerRejectReason::BadLength);
    }
    if crc8(&data[1..2 + len]) != data[2 + len] {
        return Err(MarkerRejectReason::ChecksumMismatch);
    }
    String::from_utf8(data[2..2 + len].to_vec()).map_err(|_| MarkerRejectReason::InvalidUtf8)
}

#[derive(Debug, Clone, Copy)]
struct TwoMeansSplit {
    threshold: f32,
    mean_lo: f32,
    mean_hi: f32,
}

/// Gray-level threshold via 1D Lloyd updates on a histogram.
///
/// Equivalent to iterative 2-means with an explicit iteration cap and
/// convergence epsilon. Pixels `<= threshold` form the dark cluster.
fn compute_iterative_two_means_threshold(
    hist: &[u64; 256],
    max_iters: usize,
    convergence_eps: f32,
) -> TwoMeansSplit {
    let min_v = hist.iter().position(|&c| c > 0).unwrap_or(0) as f32;
    let max_v = hist.iter().rposition(|&c| c > 0).unwrap_or(0) as f32;
    let eps = if convergence_eps.is_finite() {
        convergence_eps.abs()
    } else {
        MarkerDecodeConfig::DEFAULT_THRESHOLD_CONVERGENCE_EPS
    };

    let cluster_means = |t: f32| -> (Option<f32>, Option<f32>) {
        let (mut sum_lo, mut cnt_lo, mut sum_hi, mut cnt_hi) = (0.0f64, 0u64, 0.0f64, 0u64);
        for (v, &c) in hist.iter().enumerate() {
            if v as f32 <= t {
                sum_lo += v as f64 * c as f64;
                cnt_lo += c;
            } else {
                sum_hi += v as f64 * c as f64;
                cnt_hi += c;
            }
        }
        (
            (cnt_lo > 0).then(|| (sum_lo / cnt_lo as f64) as f32),
            (cnt_hi > 0).then(|| (sum_hi / cnt_hi as f64) as f32),
        )
    };

    let mut threshold = 0.5 * (min_v + max_v);
    for _ in 0..max_iters {
        let (Some(lo), Some(hi)) = cluster_means(threshold) else {
            break;
        };
        let new_threshold = 0.5 * (lo + hi);
        let converged = (new_threshold - threshold).abs() <= eps;
        threshold = new_threshold;
        if converged {
            break;
        }
    }

    let (lo, hi) = cluster_means(threshold);
    TwoMeansSplit {
        threshold,
        mean_lo: lo.unwrap_or(min_v),
        mean_hi: hi.unwrap_or(max_v),
    }
}

/// First and last rows/columns whose dark count reaches `ratio` of the peak.
fn locate_marker_box(gray: &GrayImage, threshold: f32, ratio: f32) -> Option<[u32; 4]> {
    let (w, h) = gray.dimensions();
    let mut rows = vec![0u32; h as usize];
    let mut cols = vec![0u32; w as usize];
    for (x, y, p) in gray.enumerate_pixels() {
        if f32::from(p[0]) <= threshold {
            rows[y as usize] += 1;
            cols[x as usize] += 1;
        }
    }

    let span = |counts: &[u32]| -> Option<(u32, u32)> {
        let peak = *counts.iter().max()?;
        if peak == 0 {
            return None;
        }
        let cut = (ratio.clamp(0.0, 1.0) * peak as f32).max(1.0);
        let first = counts.iter().position(|&c| c as f32 >= cut)?;
        let last = counts.iter().rposition(|&c| c as f32 >= cut)?;
        Some((first as u32, last as u32))
    };

    let (y0, y1) = span(&rows)?;
    let (x0, x1) = span(&cols)?;
    let bw = x1 - x0 + 1;
    let bh = y1 - y0 + 1;
    if (bw as usize) < MARKER_MODULES || (bh as usize) < MARKER_MODULES {
        return None;
    }
    Some([x0, y0, bw, bh])
}

/// Sample every module at a 3x3 lattice around its center.
fn sample_modules(gray: &GrayImage, bbox: [u32; 4], threshold: f32) -> MarkerBits {
    let [x0, y0, bw, bh] = bbox;
    let mx = bw as f32 / MARKER_MODULES as f32;
    let my = bh as f32 / MARKER_MODULES as f32;
    let (w, h) = gray.dimensions();

    let mut modules = [[false; MARKER_MODULES]; MARKER_MODULES];
    for (r, row) in modules.iter_mut().enumerate() {
        for (c, module) in row.iter_mut().enumerate() {
            let cx = x0 as f32 + (c as f32 + 0.5) * mx;
            let cy = y0 as f32 + (r as f32 + 0.5) * my;
            let mut sum = 0.0f32;
            for dy in [-0.25f32, 0.0, 0.25] {
                for dx in [-0.25f32, 0.0, 0.25] {
                    let sx = ((cx + dx * mx).floor() as i64).clamp(0, i64::from(w) - 1) as u32;
                    let sy = ((cy + dy * my).floor() as i64).clamp(0, i64::from(h) - 1) as u32;
                    sum += f32::from(gray.get_pixel(sx, sy)[0]);
                }
            }
            *module = sum / 9.0 <= threshold;
        }
    }
    MarkerBits::from_modules(modules)
}

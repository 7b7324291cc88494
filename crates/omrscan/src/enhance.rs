//! Photo normalization: luminance, local contrast equalization, denoise.
//!
//! The output is what the fiducial detector binarizes. It is never used for
//! rectification, which resamples the original color image.

use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::filter3x3;

/// Configuration for [`enhance`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Apply contrast-limited adaptive histogram equalization.
    pub clahe: bool,
    /// CLAHE clip limit, as a multiple of the uniform bin height.
    /// Default: [`EnhanceConfig::DEFAULT_CLIP_LIMIT`].
    pub clip_limit: f32,
    /// CLAHE tile grid `[columns, rows]`.
    /// Default: [`EnhanceConfig::DEFAULT_TILE_GRID`].
    pub tile_grid: [u32; 2],
    /// Median filter radius (1 = 3x3 window, 0 disables).
    pub median_radius: u32,
    /// Apply a 3x3 high-boost sharpening kernel after denoising.
    pub sharpen: bool,
}

impl EnhanceConfig {
    pub const DEFAULT_CLIP_LIMIT: f32 = 2.0;
    pub const DEFAULT_TILE_GRID: [u32; 2] = [8, 8];
    pub const DEFAULT_MEDIAN_RADIUS: u32 = 1;
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            clahe: true,
            clip_limit: Self::DEFAULT_CLIP_LIMIT,
            tile_grid: Self::DEFAULT_TILE_GRID,
            median_radius: Self::DEFAULT_MEDIAN_RADIUS,
            sharpen: false,
        }
    }
}

/// Single-channel normalized image with the same extent as the raw photo.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedImage(GrayImage);

impl EnhancedImage {
    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_gray(self) -> GrayImage {
        self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }
}

impl From<GrayImage> for EnhancedImage {
    fn from(gray: GrayImage) -> Self {
        Self(gray)
    }
}

/// Normalize a color photo for fiducial detection.
///
/// Deterministic and infallible: luminance, optional CLAHE, optional median
/// denoise and optional sharpening, in that order.
pub fn enhance(raw: &RgbImage, config: &EnhanceConfig) -> EnhancedImage {
    let mut gray = to_luma(raw);
    if config.clahe {
        gray = clahe(&gray, config.clip_limit, config.tile_grid);
    }
    if config.median_radius > 0 {
        gray = imageproc::filter::median_filter(&gray, config.median_radius, config.median_radius);
    }
    if config.sharpen {
        gray = sharpen(&gray);
    }
    tracing::debug!(
        width = gray.width(),
        height = gray.height(),
        clahe = config.clahe,
        sharpen = config.sharpen,
        "image enhanced"
    );
    EnhancedImage(gray)
}

/// BT.601 luminance with integer weights, rounded.
pub fn to_luma(raw: &RgbImage) -> GrayImage {
    GrayImage::from_fn(raw.width(), raw.height(), |x, y| {
        let [r, g, b] = raw.get_pixel(x, y).0;
        let y = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000;
        Luma([y as u8])
    })
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into `tile_grid` tiles; each tile gets a clipped,
/// redistributed histogram equalization LUT and pixels are mapped through a
/// bilinear blend of the four nearest tile LUTs.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tile_grid: [u32; 2]) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let tiles_x = tile_grid[0].clamp(1, w) as usize;
    let tiles_y = tile_grid[1].clamp(1, h) as usize;
    let tile_w = (w as usize).div_ceil(tiles_x);
    let tile_h = (h as usize).div_ceil(tiles_y);

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = ((tx + 1) * tile_w).min(w as usize);
            let y1 = ((ty + 1) * tile_h).min(h as usize);
            luts[ty * tiles_x + tx] = tile_lut(gray, x0..x1, y0..y1, clip_limit);
        }
    }

    let axis = |pos: u32, tile: usize, n: usize| -> (usize, usize, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        if f <= 0.0 {
            return (0, 0, 0.0);
        }
        let i0 = (f.floor() as usize).min(n - 1);
        let i1 = (i0 + 1).min(n - 1);
        (i0, i1, (f - i0 as f32).clamp(0.0, 1.0))
    };

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, ax) = axis(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = axis(y, tile_h, tiles_y);
        let top = (1.0 - ax) * f32::from(luts[ty0 * tiles_x + tx0][v])
            + ax * f32::from(luts[ty0 * tiles_x + tx1][v]);
        let bottom = (1.0 - ax) * f32::from(luts[ty1 * tiles_x + tx0][v])
            + ax * f32::from(luts[ty1 * tiles_x + tx1][v]);
        Luma([((1.0 - ay) * top + ay * bottom).round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(
    gray: &GrayImage,
    xs: std::ops::Range<usize>,
    ys: std::ops::Range<usize>,
    clip_limit: f32,
) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in ys.clone() {
        for x in xs.clone() {
            hist[gray.get_pixel(x as u32, y as u32)[0] as usize] += 1;
        }
    }
    let n_pixels = (xs.len() * ys.len()) as u32;
    let mut lut = [0u8; 256];
    if n_pixels == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * n_pixels as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let per_bin = excess / 256;
        let remainder = (excess % 256) as usize;
        for bin in hist.iter_mut() {
            *bin += per_bin;
        }
        // Spread the remainder evenly across the histogram.
        if remainder > 0 {
            let step = (256 / remainder).max(1);
            for i in (0..256).step_by(step).take(remainder) {
                hist[i] += 1;
            }
        }
    }

    let scale = 255.0 / n_pixels as f32;
    let mut cdf = 0u32;
    for (bin, out) in hist.iter().zip(lut.iter_mut()) {
        cdf += bin;
        *out = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// 3x3 high-boost sharpening (`9` center, `-1` neighbors), clamped borders.
pub fn sharpen(gray: &GrayImage) -> GrayImage {
    const HIGH_BOOST: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];
    filter3x3::<_, i32, u8>(gray, &HIGH_BOOST)
}

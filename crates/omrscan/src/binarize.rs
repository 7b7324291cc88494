//! Ink masks: global (Otsu, fixed level) and local-mean thresholding.
//!
//! Every function returns a mask of the input extent where ink is `255` and
//! paper is `0`.

use image::{GrayImage, Luma};

/// Thresholding method used to separate ink from paper.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BinarizeMethod {
    /// Global level from the image histogram.
    #[default]
    Otsu,
    /// Ink iff `pixel <= level`.
    Fixed { level: u8 },
    /// Ink iff `pixel <= local_mean - offset`, mean over a
    /// `(2 * block_radius + 1)` square window.
    Adaptive { block_radius: u32, offset: f32 },
}

const INK: Luma<u8> = Luma([255]);
const PAPER: Luma<u8> = Luma([0]);

/// Build an ink mask with the given method.
pub fn ink_mask(gray: &GrayImage, method: BinarizeMethod) -> GrayImage {
    match method {
        BinarizeMethod::Otsu => {
            let level = imageproc::contrast::otsu_level(gray);
            tracing::trace!(level, "otsu level");
            fixed_ink_mask(gray, level)
        }
        BinarizeMethod::Fixed { level } => fixed_ink_mask(gray, level),
        BinarizeMethod::Adaptive {
            block_radius,
            offset,
        } => adaptive_ink_mask(gray, block_radius, offset),
    }
}

/// Ink iff `pixel <= level`.
pub fn fixed_ink_mask(gray: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= level {
            INK
        } else {
            PAPER
        }
    })
}

/// Ink iff `pixel <= local_mean - offset`.
///
/// The window is clamped at the image border, so border means use fewer
/// pixels instead of padding.
pub fn adaptive_ink_mask(gray: &GrayImage, block_radius: u32, offset: f32) -> GrayImage {
    let integral = IntegralImage::new(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let mean = integral.window_mean(x, y, block_radius);
        if f64::from(gray.get_pixel(x, y)[0]) <= mean - f64::from(offset) {
            INK
        } else {
            PAPER
        }
    })
}

/// Summed-area table with a zero border row and column.
pub(crate) struct IntegralImage {
    table: Vec<u64>,
    width: u32,
    height: u32,
}

impl IntegralImage {
    pub(crate) fn new(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let stride = w as usize + 1;
        let mut table = vec![0u64; stride * (h as usize + 1)];
        for y in 0..h as usize {
            let mut row_sum = 0u64;
            for x in 0..w as usize {
                row_sum += u64::from(gray.get_pixel(x as u32, y as u32)[0]);
                table[(y + 1) * stride + x + 1] = row_sum + table[y * stride + x + 1];
            }
        }
        Self {
            table,
            width: w,
            height: h,
        }
    }

    /// Sum over `[x0, x1) x [y0, y1)`.
    pub(crate) fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let stride = self.width as usize + 1;
        self.table[y1 * stride + x1] + self.table[y0 * stride + x0]
            - self.table[y0 * stride + x1]
            - self.table[y1 * stride + x0]
    }

    /// Mean over the square window of `radius` around `(cx, cy)`, clamped to the image.
    pub(crate) fn window_mean(&self, cx: u32, cy: u32, radius: u32) -> f64 {
        let x0 = cx.saturating_sub(radius) as usize;
        let y0 = cy.saturating_sub(radius) as usize;
        let x1 = (cx as usize + radius as usize + 1).min(self.width as usize);
        let y1 = (cy as usize + radius as usize + 1).min(self.height as usize);
        let area = (x1 - x0) * (y1 - y0);
        if area == 0 {
            return 128.0;
        }
        self.sum(x0, y0, x1, y1) as f64 / area as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_level(w: u32, h: u32, dark: u8, light: u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([if x < w / 2 { dark } else { light }]))
    }

    #[test]
    fn otsu_separates_two_levels() {
        let gray = two_level(40, 10, 30, 220);
        let mask = ink_mask(&gray, BinarizeMethod::Otsu);
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(39, 9)[0], 0);
        assert_eq!(mask.pixels().filter(|p| p[0] == 255).count(), 200);
    }

    #[test]
    fn fixed_level_is_inclusive() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([149 + x as u8]));
        let mask = ink_mask(&gray, BinarizeMethod::Fixed { level: 150 });
        let bits: Vec<u8> = mask.pixels().map(|p| p[0]).collect();
        assert_eq!(bits, [255, 255, 0]);
    }

    #[test]
    fn adaptive_follows_lighting_gradient() {
        // Paper brightens left to right; a dark dot sits on each side.
        let mut gray = GrayImage::from_fn(120, 40, |x, _| Luma([(90 + x) as u8]));
        for (cx, v) in [(20u32, 40u8), (100, 130)] {
            for y in 17..23 {
                for x in cx - 3..cx + 3 {
                    gray.put_pixel(x, y, Luma([v]));
                }
            }
        }
        // A global level at 135 cannot see both dots without flooding the left half.
        let global = ink_mask(&gray, BinarizeMethod::Fixed { level: 135 });
        assert_eq!(global.get_pixel(5, 5)[0], 255);

        let mask = ink_mask(
            &gray,
            BinarizeMethod::Adaptive {
                block_radius: 10,
                offset: 10.0,
            },
        );
        assert_eq!(mask.get_pixel(20, 20)[0], 255);
        assert_eq!(mask.get_pixel(100, 20)[0], 255);
        assert_eq!(mask.get_pixel(5, 5)[0], 0);
        assert_eq!(mask.get_pixel(110, 35)[0], 0);
    }

    #[test]
    fn integral_sum_matches_direct_sum() {
        let gray = GrayImage::from_fn(13, 9, |x, y| Luma([((x * 31 + y * 17) % 256) as u8]));
        let integral = IntegralImage::new(&gray);
        let direct: u64 = (2..7)
            .flat_map(|y| (3..11).map(move |x| (x, y)))
            .map(|(x, y)| u64::from(gray.get_pixel(x, y)[0]))
            .sum();
        assert_eq!(integral.sum(3, 2, 11, 7), direct);
    }

    #[test]
    fn method_serialization_is_tagged() {
        let json = serde_json::to_string(&BinarizeMethod::Adaptive {
            block_radius: 24,
            offset: 12.0,
        })
        .unwrap();
        assert_eq!(json, r#"{"method":"adaptive","block_radius":24,"offset":12.0}"#);
        let otsu: BinarizeMethod = serde_json::from_str(r#"{"method":"otsu"}"#).unwrap();
        assert_eq!(otsu, BinarizeMethod::Otsu);
    }
}

//! Synthetic image helpers shared by unit tests.

use image::{GrayImage, Luma, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fill the `size x size` square whose top-left pixel is
/// `(cx - size / 2, cy - size / 2)`, clipped to the image.
pub(crate) fn draw_filled_square(gray: &mut GrayImage, cx: i32, cy: i32, size: u32, value: u8) {
    let x0 = cx - (size / 2) as i32;
    let y0 = cy - (size / 2) as i32;
    fill_box(gray, x0, y0, x0 + size as i32, y0 + size as i32, value, None);
}

/// Square frame: the `2 * outer_half` square minus the `2 * inner_half`
/// square sharing its center.
pub(crate) fn draw_ring(
    gray: &mut GrayImage,
    cx: i32,
    cy: i32,
    outer_half: u32,
    inner_half: u32,
    value: u8,
) {
    let (o, i) = (outer_half as i32, inner_half as i32);
    let hole = [cx - i, cy - i, cx + i, cy + i];
    fill_box(gray, cx - o, cy - o, cx + o, cy + o, value, Some(hole));
}

fn fill_box(
    gray: &mut GrayImage,
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
    value: u8,
    hole: Option<[i32; 4]>,
) {
    let (w, h) = (gray.width() as i32, gray.height() as i32);
    for y in y0.max(0)..y1.min(h) {
        for x in x0.max(0)..x1.min(w) {
            let in_hole = hole.is_some_and(|[hx0, hy0, hx1, hy1]| {
                x >= hx0 && x < hx1 && y >= hy0 && y < hy1
            });
            if !in_hole {
                gray.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
    }
}

/// Seeded random color texture.
pub(crate) fn random_texture(w: u32, h: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(w, h, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]))
}

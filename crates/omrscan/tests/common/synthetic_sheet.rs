use image::{Rgb, RgbImage};
use nalgebra::Matrix3;
use omrscan::render::{cells_for, render_sheet};
use omrscan::{CanonicalSize, RenderOptions, SheetLayout};
use std::collections::BTreeMap;

/// Filled answers and codes shared by the end-to-end tests.
pub struct Marks {
    pub answers: Vec<(&'static str, &'static str)>,
    pub codes: Vec<(&'static str, &'static str)>,
    /// Extra cell ids filled on top of the answers (e.g. a second bubble).
    pub extra_cells: Vec<&'static str>,
}

impl Marks {
    pub fn standard() -> Self {
        Self {
            answers: vec![("Q1", "A"), ("Q2", "C"), ("Q37", "E"), ("Q5", "A"), ("Q120", "B")],
            codes: vec![("book_code", "407"), ("set_code", "123")],
            extra_cells: vec!["Q5.B"],
        }
    }
}

/// Render a sheet with `margin` white pixels around the canonical area.
pub fn render_page(layout: &SheetLayout, payload: &str, marks: &Marks, margin: u32) -> RgbImage {
    let opts = RenderOptions {
        margin_px: margin,
        ..RenderOptions::default()
    };
    render_page_with(layout, payload, marks, &opts)
}

/// Render a sheet with explicit render options.
pub fn render_page_with(
    layout: &SheetLayout,
    payload: &str,
    marks: &Marks,
    opts: &RenderOptions,
) -> RgbImage {
    let answers: BTreeMap<String, String> = marks
        .answers
        .iter()
        .map(|(q, l)| (q.to_string(), l.to_string()))
        .collect();
    let codes: BTreeMap<String, String> = marks
        .codes
        .iter()
        .map(|(c, d)| (c.to_string(), d.to_string()))
        .collect();
    let mut cells = cells_for(layout, &answers, &codes).expect("marks match the layout");
    cells.extend(marks.extra_cells.iter().map(|s| s.to_string()));
    render_sheet(layout, payload, &cells, opts).expect("payload fits the marker")
}

/// Mild perspective used to place a page into a photo.
pub fn page_to_photo() -> Matrix3<f64> {
    Matrix3::new(0.8, 0.02, 100.0, -0.015, 0.8, 80.0, 1.0e-5, 2.0e-5, 1.0)
}

/// Project `page` into a photo with the mild perspective of [`page_to_photo`]
/// over a uniform `background`.
pub fn photograph(page: &RgbImage, background: [u8; 3]) -> RgbImage {
    let (w, h) = page.dimensions();
    let canvas = CanonicalSize::new(w * 4 / 5 + 250, h * 4 / 5 + 250);
    let photo_to_page = page_to_photo()
        .try_inverse()
        .expect("fixture homography is invertible");
    omrscan::rectify::warp_perspective(page, &photo_to_page, canvas, Rgb(background))
}

/// Multiply brightness by a left-to-right gain ramp.
pub fn shade(img: &RgbImage, left_gain: f32, right_gain: f32) -> RgbImage {
    let w = img.width().max(2) as f32;
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let t = x as f32 / (w - 1.0);
        let gain = left_gain + (right_gain - left_gain) * t;
        Rgb(img.get_pixel(x, y).0.map(|c| (c as f32 * gain).round().clamp(0.0, 255.0) as u8))
    })
}

//! Printable sheet rendering from a [`SheetLayout`].
//!
//! The rendered page is the canonical sheet surrounded by an optional white
//! margin. Fiducials are solid squares centered on the canonical corner
//! pixels, so with a zero margin only their inner quarter is visible.

use std::collections::BTreeMap;

use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
use imageproc::rect::Rect;

use crate::marker::{encode_payload, render_marker, render_qr, MarkerError, MarkerFormat};
use crate::sheet_layout::SheetLayout;

const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([20, 20, 20]);
const OUTLINE: Rgb<u8> = Rgb([110, 110, 110]);

/// Options for [`render_sheet`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// White border around the canonical sheet, in pixels.
    pub margin_px: u32,
    /// Draw bubble outlines for every cell.
    pub outlines: bool,
    /// Symbology printed in the marker region.
    pub marker_format: MarkerFormat,
}

impl RenderOptions {
    pub const DEFAULT_MARGIN_PX: u32 = 60;
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            margin_px: Self::DEFAULT_MARGIN_PX,
            outlines: true,
            marker_format: MarkerFormat::default(),
        }
    }
}

/// Sheet rendering failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Marker(#[from] MarkerError),
    #[error("unknown cell id '{0}'")]
    UnknownCell(String),
    #[error("question '{question}' has no option '{label}'")]
    UnknownAnswer { question: String, label: String },
}

/// Render a sheet carrying `payload`, with the given cell ids filled in.
pub fn render_sheet(
    layout: &SheetLayout,
    payload: &str,
    filled_cells: &[String],
    options: &RenderOptions,
) -> Result<RgbImage, RenderError> {
    let marker = match options.marker_format {
        MarkerFormat::Grid => render_marker(&encode_payload(payload)?, layout.marker_module_px),
        MarkerFormat::Qr => {
            let region = &layout.marker_region;
            render_qr(payload, region.width.min(region.height))?
        }
    };
    let filled: Vec<_> = filled_cells
        .iter()
        .map(|id| {
            layout
                .cells()
                .find(|(_, c)| &c.id == id)
                .map(|(_, c)| c)
                .ok_or_else(|| RenderError::UnknownCell(id.clone()))
        })
        .collect::<Result<_, _>>()?;

    let m = options.margin_px as i32;
    let size = layout.canonical_size;
    let mut img = RgbImage::from_pixel(
        size.width + 2 * options.margin_px,
        size.height + 2 * options.margin_px,
        PAPER,
    );

    let half = (layout.fiducial_size_px / 2) as i32;
    for [cx, cy] in size.corners() {
        let rect = Rect::at(cx as i32 - half + m, cy as i32 - half + m)
            .of_size(2 * half as u32 + 1, 2 * half as u32 + 1);
        draw_filled_rect_mut(&mut img, rect, INK);
    }

    let [mx, my] = layout.centered_in_marker_region(marker.width());
    let marker = gray_to_rgb(&marker);
    imageops::overlay(&mut img, &marker, i64::from(mx) + i64::from(m), i64::from(my) + i64::from(m));

    if options.outlines {
        for (_, cell) in layout.cells() {
            let center = (cell.center_x.round() as i32 + m, cell.center_y.round() as i32 + m);
            draw_hollow_circle_mut(&mut img, center, cell.radius.round() as i32, OUTLINE);
        }
    }
    for cell in filled {
        let center = (cell.center_x.round() as i32 + m, cell.center_y.round() as i32 + m);
        draw_filled_circle_mut(&mut img, center, cell.radius.round() as i32, INK);
    }

    tracing::debug!(
        width = img.width(),
        height = img.height(),
        filled = filled_cells.len(),
        "sheet rendered"
    );
    Ok(img)
}

/// Cell ids that encode the given answers (question -> option label) and
/// calibration codes (code -> digit string).
pub fn cells_for(
    layout: &SheetLayout,
    answers: &BTreeMap<String, String>,
    codes: &BTreeMap<String, String>,
) -> Result<Vec<String>, RenderError> {
    let mut cells = Vec::new();
    for (question, label) in answers {
        cells.push(find_cell_id(layout, question, label)?);
    }
    let columns = layout.code_columns();
    for (code, digits) in codes {
        let (_, groups) = columns
            .iter()
            .find(|(name, _)| name == code)
            .ok_or_else(|| RenderError::UnknownCell(code.clone()))?;
        for (group, digit) in groups.iter().zip(digits.chars()) {
            cells.push(find_cell_id(layout, &group.name, &digit.to_string())?);
        }
    }
    Ok(cells)
}

fn find_cell_id(layout: &SheetLayout, group: &str, label: &str) -> Result<String, RenderError> {
    layout
        .group(group)
        .and_then(|g| g.cells.iter().find(|c| c.label == label))
        .map(|c| c.id.clone())
        .ok_or_else(|| RenderError::UnknownAnswer {
            question: group.to_string(),
            label: label.to_string(),
        })
}

fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let Luma([v]) = *gray.get_pixel(x, y);
        Rgb([v, v, v])
    })
}

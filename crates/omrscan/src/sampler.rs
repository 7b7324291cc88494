//! Bubble density sampling and per-group mark classification.

use std::collections::BTreeMap;

use image::GrayImage;

use crate::binarize::{ink_mask, BinarizeMethod};
use crate::rectify::CanonicalSheet;
use crate::sheet_layout::{GridCellSpec, GroupThresholds, SheetLayout};

/// Configuration for [`sample`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Ink mask method applied to the sheet luminance.
    pub binarize: BinarizeMethod,
    /// Fraction of the printed bubble radius that is sampled; keeps the
    /// printed outline out of the density.
    pub radius_scale: f64,
}

impl SamplingConfig {
    pub const DEFAULT_BLOCK_RADIUS: u32 = 24;
    pub const DEFAULT_OFFSET: f32 = 12.0;
    pub const DEFAULT_RADIUS_SCALE: f64 = 0.75;
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            binarize: BinarizeMethod::Adaptive {
                block_radius: Self::DEFAULT_BLOCK_RADIUS,
                offset: Self::DEFAULT_OFFSET,
            },
            radius_scale: Self::DEFAULT_RADIUS_SCALE,
        }
    }
}

/// Ink density measured at one cell.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MarkReading {
    pub cell_id: String,
    /// Ink fraction in `[0, 1]`.
    pub density: f64,
    pub is_filled: bool,
}

/// Classification of one cell group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GroupOutcome {
    Unmarked,
    /// Index into the group's cells.
    Selected { index: usize },
    Ambiguous,
}

/// Read every cell of the layout from an upright canonical sheet.
///
/// Keys are cell ids. Infallible: cells near the border simply sample fewer
/// pixels.
pub fn sample(
    sheet: &CanonicalSheet,
    layout: &SheetLayout,
    config: &SamplingConfig,
) -> BTreeMap<String, MarkReading> {
    let mask = ink_mask(&sheet.luma(), config.binarize);
    let mut readings = BTreeMap::new();
    for (group, cell) in layout.cells() {
        let thresholds = layout.thresholds_for(group);
        let density = disk_density(&mask, cell, config.radius_scale);
        readings.insert(
            cell.id.clone(),
            MarkReading {
                cell_id: cell.id.clone(),
                density,
                is_filled: density > thresholds.min_density,
            },
        );
    }
    tracing::debug!(
        cells = readings.len(),
        filled = readings.values().filter(|r| r.is_filled).count(),
        "grid sampled"
    );
    readings
}

/// Ink fraction of `mask` inside the sampling disk of `cell`.
pub fn disk_density(mask: &GrayImage, cell: &GridCellSpec, radius_scale: f64) -> f64 {
    let (w, h) = mask.dimensions();
    let r = (cell.radius * radius_scale).max(0.5);
    let r2 = r * r;
    let x0 = (cell.center_x - r).floor().max(0.0) as u32;
    let y0 = (cell.center_y - r).floor().max(0.0) as u32;
    let x1 = ((cell.center_x + r).ceil().max(0.0) as u32).min(w.saturating_sub(1));
    let y1 = ((cell.center_y + r).ceil().max(0.0) as u32).min(h.saturating_sub(1));

    let mut total = 0usize;
    let mut ink = 0usize;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = f64::from(x) - cell.center_x;
            let dy = f64::from(y) - cell.center_y;
            if dx * dx + dy * dy > r2 {
                continue;
            }
            total += 1;
            if mask.get_pixel(x, y)[0] != 0 {
                ink += 1;
            }
        }
    }
    if total == 0 {
        0.0
    } else {
        ink as f64 / total as f64
    }
}

/// Decide which cell of a group is marked.
///
/// The densest filled cell wins (first index on equal density) unless
/// another filled cell lies strictly within `ambiguity_margin` of it.
pub fn classify_group(readings: &[&MarkReading], thresholds: &GroupThresholds) -> GroupOutcome {
    let filled = |r: &MarkReading| r.density > thresholds.min_density;

    let mut best: Option<(usize, f64)> = None;
    for (i, &r) in readings.iter().enumerate() {
        if !filled(r) {
            continue;
        }
        if best.map_or(true, |(_, d)| r.density > d) {
            best = Some((i, r.density));
        }
    }
    let Some((index, best_density)) = best else {
        return GroupOutcome::Unmarked;
    };

    let contested = readings.iter().enumerate().any(|(i, &r)| {
        i != index && filled(r) && best_density - r.density < thresholds.ambiguity_margin
    });
    if contested {
        GroupOutcome::Ambiguous
    } else {
        GroupOutcome::Selected { index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;

    fn reading(id: &str, density: f64) -> MarkReading {
        MarkReading {
            cell_id: id.to_string(),
            density,
            is_filled: density > 0.4,
        }
    }

    fn thresholds(margin: f64) -> GroupThresholds {
        GroupThresholds {
            min_density: 0.4,
            ambiguity_margin: margin,
        }
    }

    #[test]
    fn empty_group_is_unmarked() {
        let rs = [reading("a", 0.02), reading("b", 0.1), reading("c", 0.4)];
        let refs: Vec<&MarkReading> = rs.iter().collect();
        assert_eq!(classify_group(&refs, &thresholds(0.1)), GroupOutcome::Unmarked);
        assert_eq!(classify_group(&[], &thresholds(0.1)), GroupOutcome::Unmarked);
    }

    #[test]
    fn close_densities_are_ambiguous() {
        let rs = [reading("a", 0.65), reading("b", 0.66), reading("c", 0.05)];
        let refs: Vec<&MarkReading> = rs.iter().collect();
        assert_eq!(classify_group(&refs, &thresholds(0.05)), GroupOutcome::Ambiguous);
    }

    #[test]
    fn clear_maximum_is_selected() {
        let rs = [reading("a", 0.1), reading("b", 0.5), reading("c", 0.9)];
        let refs: Vec<&MarkReading> = rs.iter().collect();
        for _ in 0..3 {
            assert_eq!(
                classify_group(&refs, &thresholds(0.1)),
                GroupOutcome::Selected { index: 2 }
            );
        }
    }

    #[test]
    fn margin_comparison_is_strict() {
        let rs = [reading("a", 0.5), reading("b", 0.75)];
        let refs: Vec<&MarkReading> = rs.iter().collect();
        assert_eq!(
            classify_group(&refs, &thresholds(0.25)),
            GroupOutcome::Selected { index: 1 }
        );
    }

    #[test]
    fn equal_maxima_pick_first_only_with_zero_margin() {
        let rs = [reading("a", 0.2), reading("b", 0.8), reading("c", 0.8)];
        let refs: Vec<&MarkReading> = rs.iter().collect();
        // Equal maxima are always within any positive margin.
        assert_eq!(
            classify_group(&refs, &thresholds(0.0)),
            GroupOutcome::Selected { index: 1 }
        );
        assert_eq!(
            classify_group(&refs, &thresholds(0.01)),
            GroupOutcome::Ambiguous
        );
    }

    #[test]
    fn sample_reads_filled_bubble_on_default_layout() {
        let layout = SheetLayout::default();
        let size = layout.canonical_size;
        let mut img = RgbImage::from_pixel(size.width, size.height, Rgb([245, 245, 245]));
        let q1a = layout.group("Q1").unwrap().cells[0].clone();
        draw_filled_circle_mut(
            &mut img,
            (q1a.center_x as i32, q1a.center_y as i32),
            q1a.radius as i32,
            Rgb([30, 30, 30]),
        );
        let readings = sample(&CanonicalSheet::new(img), &layout, &SamplingConfig::default());
        assert_eq!(readings.len(), layout.n_cells());
        assert!(readings["Q1.A"].is_filled);
        assert!(readings["Q1.A"].density > 0.95);
        assert!(!readings["Q1.B"].is_filled);
        assert_eq!(readings["Q2.A"].density, 0.0);
    }

    #[test]
    fn disk_density_clips_at_border() {
        let mask = GrayImage::from_pixel(10, 10, image::Luma([255]));
        let cell = GridCellSpec {
            id: "g.x".into(),
            label: "x".into(),
            row: 0,
            col: 0,
            center_x: 0.0,
            center_y: 0.0,
            radius: 4.0,
        };
        assert_eq!(disk_density(&mask, &cell, 1.0), 1.0);
    }
}

//! Corner fiducial detection and role assignment.
//!
//! Fiducials are solid dark squares printed at the four page corners. The
//! detector binarizes the enhanced image, labels 8-connected ink components
//! and keeps the ones whose area and shape match a filled square. The four
//! survivors are assigned to corner roles from coordinate sums and
//! differences.

use std::cmp::Ordering;

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::binarize::{ink_mask, BinarizeMethod};
use crate::enhance::EnhancedImage;
use crate::error::ScanError;

/// Configuration for fiducial candidate extraction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FiducialConfig {
    /// Ink/paper separation applied to the enhanced image.
    pub binarize: BinarizeMethod,
    /// Minimum component area in pixels (inclusive).
    pub min_area_px: u32,
    /// Maximum component area in pixels (inclusive).
    pub max_area_px: u32,
    /// Require an outer contour that simplifies to a convex quadrilateral.
    pub require_quad: bool,
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter.
    pub approx_epsilon_ratio: f64,
    /// Minimum ratio of component pixel count to outer contour area.
    pub min_solidity: f64,
    /// Anchor components cut by the image frame on the frame itself.
    ///
    /// A page image cropped exactly at the paper edge shows only the inner
    /// part of each corner square; its centroid would sit inside the page.
    /// Along every clipped axis the anchor coordinate becomes the border
    /// pixel coordinate instead.
    pub anchor_clipped_to_border: bool,
}

impl FiducialConfig {
    pub const DEFAULT_MIN_AREA_PX: u32 = 400;
    pub const DEFAULT_MAX_AREA_PX: u32 = 40_000;
    pub const DEFAULT_APPROX_EPSILON_RATIO: f64 = 0.03;
    pub const DEFAULT_MIN_SOLIDITY: f64 = 0.85;
}

impl Default for FiducialConfig {
    fn default() -> Self {
        Self {
            binarize: BinarizeMethod::Otsu,
            min_area_px: Self::DEFAULT_MIN_AREA_PX,
            max_area_px: Self::DEFAULT_MAX_AREA_PX,
            require_quad: true,
            approx_epsilon_ratio: Self::DEFAULT_APPROX_EPSILON_RATIO,
            min_solidity: Self::DEFAULT_MIN_SOLIDITY,
            anchor_clipped_to_border: true,
        }
    }
}

/// Centroid and pixel area of one fiducial candidate.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FiducialPoint {
    pub x: f64,
    pub y: f64,
    pub area: f64,
}

impl FiducialPoint {
    pub const fn new(x: f64, y: f64, area: f64) -> Self {
        Self { x, y, area }
    }

    pub fn xy(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    /// Total order on position, used to break ties deterministically.
    fn cmp_xy(&self, other: &Self) -> Ordering {
        self.x
            .total_cmp(&other.x)
            .then_with(|| self.y.total_cmp(&other.y))
    }
}

/// Four fiducials with assigned corner roles.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FiducialSet {
    pub top_left: FiducialPoint,
    pub top_right: FiducialPoint,
    pub bottom_right: FiducialPoint,
    pub bottom_left: FiducialPoint,
    /// Number of candidates that passed the filters before selection.
    pub candidate_count: usize,
}

impl FiducialSet {
    /// Corner positions in role order TL, TR, BR, BL.
    pub fn corners(&self) -> [[f64; 2]; 4] {
        [
            self.top_left.xy(),
            self.top_right.xy(),
            self.bottom_right.xy(),
            self.bottom_left.xy(),
        ]
    }
}

/// Why a connected component was not accepted as a fiducial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateRejectReason {
    AreaOutOfRange,
    NotQuadrilateral,
    LowSolidity,
}

impl CandidateRejectReason {
    pub const fn code(self) -> &'static str {
        match self {
            Self::AreaOutOfRange => "area_out_of_range",
            Self::NotQuadrilateral => "not_quadrilateral",
            Self::LowSolidity => "low_solidity",
        }
    }
}

impl std::fmt::Display for CandidateRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-label accumulator over the label image.
#[derive(Debug, Clone, Copy)]
struct ComponentStats {
    count: u64,
    sum_x: f64,
    sum_y: f64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl ComponentStats {
    fn new() -> Self {
        Self {
            count: 0,
            sum_x: 0.0,
            sum_y: 0.0,
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
        }
    }

    fn push(&mut self, x: u32, y: u32) {
        self.count += 1;
        self.sum_x += f64::from(x);
        self.sum_y += f64::from(y);
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }
}

/// Detect the four corner fiducials of an enhanced photo.
///
/// Fails with [`ScanError::InsufficientFiducials`] when fewer than four
/// candidates survive filtering. With more than four, the largest four by
/// area are kept.
pub fn detect(enhanced: &EnhancedImage, config: &FiducialConfig) -> Result<FiducialSet, ScanError> {
    let candidates = find_candidates(enhanced.as_gray(), config);
    let selected = select_largest(&candidates)?;
    let set = assign_roles(selected, candidates.len());
    tracing::debug!(
        candidates = candidates.len(),
        tl = ?set.top_left.xy(),
        tr = ?set.top_right.xy(),
        br = ?set.bottom_right.xy(),
        bl = ?set.bottom_left.xy(),
        "fiducials assigned"
    );
    Ok(set)
}

/// All ink components that pass the area and shape filters, in label order.
pub fn find_candidates(gray: &GrayImage, config: &FiducialConfig) -> Vec<FiducialPoint> {
    let mask = ink_mask(gray, config.binarize);
    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    let mut stats: Vec<ComponentStats> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let l = label[0] as usize;
        if l == 0 {
            continue;
        }
        if stats.len() < l {
            stats.resize(l, ComponentStats::new());
        }
        stats[l - 1].push(x, y);
    }

    let (w, h) = gray.dimensions();
    let mut out = Vec::new();
    for (idx, s) in stats.iter().enumerate() {
        if s.count == 0 {
            continue;
        }
        match check_component(&labels, idx as u32 + 1, s, config) {
            Ok(()) => {
                let mut x = s.sum_x / s.count as f64;
                let mut y = s.sum_y / s.count as f64;
                if config.anchor_clipped_to_border {
                    x = anchor_axis(x, s.min_x, s.max_x, w);
                    y = anchor_axis(y, s.min_y, s.max_y, h);
                }
                out.push(FiducialPoint::new(x, y, s.count as f64));
            }
            Err(reason) => {
                tracing::trace!(
                    label = idx + 1,
                    area = s.count,
                    reason = reason.code(),
                    "fiducial candidate rejected"
                );
            }
        }
    }
    out
}

fn anchor_axis(centroid: f64, min: u32, max: u32, extent: u32) -> f64 {
    if min == 0 && max + 1 >= extent {
        centroid
    } else if min == 0 {
        0.0
    } else if max + 1 >= extent {
        f64::from(extent - 1)
    } else {
        centroid
    }
}

fn check_component(
    labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>,
    label: u32,
    stats: &ComponentStats,
    config: &FiducialConfig,
) -> Result<(), CandidateRejectReason> {
    if stats.count < u64::from(config.min_area_px) || stats.count > u64::from(config.max_area_px) {
        return Err(CandidateRejectReason::AreaOutOfRange);
    }
    if !config.require_quad {
        return Ok(());
    }

    // Crop the component with a one-pixel paper border so the tracer
    // sees a closed outline even where the blob touches the image edge.
    let bw = stats.max_x - stats.min_x + 1;
    let bh = stats.max_y - stats.min_y + 1;
    let crop = GrayImage::from_fn(bw + 2, bh + 2, |x, y| {
        let inside = x >= 1 && y >= 1 && x <= bw && y <= bh;
        if inside && labels.get_pixel(stats.min_x + x - 1, stats.min_y + y - 1)[0] == label {
            Luma([255])
        } else {
            Luma([0])
        }
    });

    let outline = find_contours::<i32>(&crop)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .max_by_key(|c| c.points.len())
        .ok_or(CandidateRejectReason::NotQuadrilateral)?;
    if outline.points.len() < 4 {
        return Err(CandidateRejectReason::NotQuadrilateral);
    }

    let perimeter = arc_length(&outline.points, true);
    let epsilon = (config.approx_epsilon_ratio * perimeter).max(1.0);
    let poly = approximate_polygon_dp(&outline.points, epsilon, true);
    if poly.len() != 4 || !is_convex(&poly) {
        return Err(CandidateRejectReason::NotQuadrilateral);
    }

    // Contours trace pixel centers; pad by half a pixel per side.
    let outline_area = polygon_area(&outline.points) + 0.5 * perimeter + 1.0;
    let solidity = stats.count as f64 / outline_area.max(1.0);
    if solidity < config.min_solidity {
        return Err(CandidateRejectReason::LowSolidity);
    }
    Ok(())
}

/// Shoelace area of a closed polygon.
pub(crate) fn polygon_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0f64;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        twice += f64::from(a.x) * f64::from(b.y) - f64::from(b.x) * f64::from(a.y);
    }
    twice.abs() * 0.5
}

fn is_convex(poly: &[Point<i32>]) -> bool {
    let n = poly.len();
    let mut sign = 0i64;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        let c = poly[(i + 2) % n];
        let cross = i64::from(b.x - a.x) * i64::from(c.y - b.y)
            - i64::from(b.y - a.y) * i64::from(c.x - b.x);
        if cross == 0 {
            return false;
        }
        let s = cross.signum();
        if sign == 0 {
            sign = s;
        } else if s != sign {
            return false;
        }
    }
    true
}

/// Keep the four largest candidates by area; ties broken by position.
///
/// The result does not depend on the order of `candidates`.
pub fn select_largest(candidates: &[FiducialPoint]) -> Result<[FiducialPoint; 4], ScanError> {
    if candidates.len() < 4 {
        return Err(ScanError::InsufficientFiducials {
            count: candidates.len(),
        });
    }
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| b.area.total_cmp(&a.area).then_with(|| a.cmp_xy(b)));
    Ok([sorted[0], sorted[1], sorted[2], sorted[3]])
}

/// Assign corner roles in image coordinates (y grows downward).
///
/// `sum = x + y`, `diff = y - x`: min sum is TopLeft, max sum BottomRight,
/// min diff TopRight, max diff BottomLeft. Equal keys fall back to the
/// `(x, y)` total order, so any permutation of the input yields the same set.
pub fn assign_roles(points: [FiducialPoint; 4], candidate_count: usize) -> FiducialSet {
    let sum = |p: &FiducialPoint| p.x + p.y;
    let diff = |p: &FiducialPoint| p.y - p.x;

    FiducialSet {
        top_left: pick_extreme(&points, sum, Ordering::Less),
        top_right: pick_extreme(&points, diff, Ordering::Less),
        bottom_right: pick_extreme(&points, sum, Ordering::Greater),
        bottom_left: pick_extreme(&points, diff, Ordering::Greater),
        candidate_count,
    }
}

/// Extreme point under `key`, ties resolved by the full field order.
fn pick_extreme(
    points: &[FiducialPoint; 4],
    key: impl Fn(&FiducialPoint) -> f64,
    wanted: Ordering,
) -> FiducialPoint {
    let mut best = points[0];
    for p in &points[1..] {
        let ord = key(p)
            .total_cmp(&key(&best))
            .then_with(|| p.cmp_xy(&best))
            .then_with(|| p.area.total_cmp(&best.area));
        if ord == wanted {
            best = *p;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{draw_filled_square, draw_ring};
    use rand::seq::SliceRandom;
    use rand::{rngs::StdRng, SeedableRng};

    fn corner_points() -> [FiducialPoint; 4] {
        [
            FiducialPoint::new(812.0, 95.0, 6400.0),
            FiducialPoint::new(120.0, 2010.0, 6300.0),
            FiducialPoint::new(88.0, 130.0, 6500.0),
            FiducialPoint::new(905.0, 1890.0, 6100.0),
        ]
    }

    fn permutations(items: [FiducialPoint; 4]) -> Vec<[FiducialPoint; 4]> {
        let mut out = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                for c in 0..4 {
                    for d in 0..4 {
                        let idx = [a, b, c, d];
                        let mut seen = [false; 4];
                        idx.iter().for_each(|&i| seen[i] = true);
                        if seen.iter().all(|&s| s) {
                            out.push([items[a], items[b], items[c], items[d]]);
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn roles_follow_sum_and_difference() {
        let set = assign_roles(corner_points(), 4);
        assert_eq!(set.top_left.xy(), [88.0, 130.0]);
        assert_eq!(set.top_right.xy(), [812.0, 95.0]);
        assert_eq!(set.bottom_right.xy(), [905.0, 1890.0]);
        assert_eq!(set.bottom_left.xy(), [120.0, 2010.0]);
    }

    #[test]
    fn role_assignment_is_permutation_invariant() {
        let reference = assign_roles(corner_points(), 4);
        let perms = permutations(corner_points());
        assert_eq!(perms.len(), 24);
        for p in perms {
            assert_eq!(assign_roles(p, 4), reference);
        }
    }

    #[test]
    fn role_assignment_ties_are_order_independent() {
        // A square rotated by 45 degrees: sums and differences tie pairwise.
        let pts = [
            FiducialPoint::new(100.0, 0.0, 1.0),
            FiducialPoint::new(200.0, 100.0, 1.0),
            FiducialPoint::new(100.0, 200.0, 1.0),
            FiducialPoint::new(0.0, 100.0, 1.0),
        ];
        let reference = assign_roles(pts, 4);
        for p in permutations(pts) {
            assert_eq!(assign_roles(p, 4), reference);
        }
    }

    #[test]
    fn largest_four_win_regardless_of_order() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut candidates: Vec<FiducialPoint> = corner_points().to_vec();
        candidates.push(FiducialPoint::new(500.0, 500.0, 900.0));
        candidates.push(FiducialPoint::new(40.0, 40.0, 6100.0));
        let reference = select_largest(&candidates).unwrap();
        assert!(reference.iter().all(|p| p.area >= 6100.0));
        assert!(reference.iter().all(|p| p.xy() != [500.0, 500.0]));
        for _ in 0..32 {
            candidates.shuffle(&mut rng);
            assert_eq!(select_largest(&candidates).unwrap(), reference);
        }
    }

    #[test]
    fn fewer_than_four_reports_count() {
        let pts = &corner_points()[..3];
        assert_eq!(
            select_largest(pts),
            Err(ScanError::InsufficientFiducials { count: 3 })
        );
    }

    #[test]
    fn detects_squares_and_ignores_rings_and_dots() {
        let mut gray = GrayImage::from_pixel(400, 300, Luma([235]));
        for (cx, cy) in [(40, 40), (360, 40), (360, 260), (40, 260)] {
            draw_filled_square(&mut gray, cx, cy, 40, 15);
        }
        // Hollow frame (low solidity), a filled disk (not a quad), a speck (too small).
        draw_ring(&mut gray, 200, 150, 45, 30, 15);
        imageproc::drawing::draw_filled_circle_mut(&mut gray, (120, 150), 18, Luma([15]));
        draw_filled_square(&mut gray, 280, 150, 6, 15);

        let enhanced = EnhancedImage::from(gray);
        let cfg = FiducialConfig::default();
        let set = detect(&enhanced, &cfg).expect("four fiducials");
        assert_eq!(set.candidate_count, 4);
        approx::assert_abs_diff_eq!(set.top_left.x, 39.5, epsilon = 0.6);
        approx::assert_abs_diff_eq!(set.bottom_right.y, 259.5, epsilon = 0.6);
        approx::assert_abs_diff_eq!(set.top_right.area, 1600.0, epsilon = 1.0);
    }

    #[test]
    fn clipped_corner_squares_anchor_on_frame_corners() {
        let mut gray = GrayImage::from_pixel(300, 220, Luma([240]));
        for (cx, cy) in [(0, 0), (300, 0), (300, 220), (0, 220)] {
            draw_filled_square(&mut gray, cx, cy, 60, 10);
        }
        let set = detect(&EnhancedImage::from(gray.clone()), &FiducialConfig::default())
            .expect("four clipped fiducials");
        assert_eq!(
            set.corners(),
            [[0.0, 0.0], [299.0, 0.0], [299.0, 219.0], [0.0, 219.0]]
        );

        let raw_cfg = FiducialConfig {
            anchor_clipped_to_border: false,
            ..FiducialConfig::default()
        };
        let raw = detect(&EnhancedImage::from(gray), &raw_cfg).expect("four clipped fiducials");
        approx::assert_abs_diff_eq!(raw.top_left.x, 14.5, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(raw.top_left.y, 14.5, epsilon = 1e-9);
    }

    #[test]
    fn blank_image_has_no_fiducials() {
        let gray = GrayImage::from_pixel(120, 80, Luma([240]));
        let err = detect(&EnhancedImage::from(gray), &FiducialConfig::default()).unwrap_err();
        assert_eq!(err, ScanError::InsufficientFiducials { count: 0 });
    }

    #[test]
    fn polygon_area_of_axis_square() {
        let sq = [
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert_eq!(polygon_area(&sq), 100.0);
        assert!(is_convex(&sq));
    }
}

//! Stage orchestration: enhance -> fiducials -> rectify -> orient -> sample -> assemble.

use std::time::Instant;

use image::RgbImage;

use super::assemble::assemble;
use super::result::{ScanResult, ScanStage, ScanTrace};
use crate::config::ScanConfig;
use crate::enhance::enhance;
use crate::error::ScanError;
use crate::fiducial;
use crate::orientation;
use crate::rectify::rectify;
use crate::sampler::sample;
use crate::sheet_layout::SheetLayout;

/// Forward-only state holder for one scan.
struct StageTracker {
    stage: ScanStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: ScanStage::Captured,
        }
    }

    fn advance(&mut self, next: ScanStage) {
        debug_assert!(next > self.stage, "stage {next} re-entered after {}", self.stage);
        tracing::debug!(from = %self.stage, to = %next, "stage transition");
        self.stage = next;
    }

    fn fail(&self, error: ScanError) -> ScanResult {
        tracing::warn!(stage = %self.stage, code = error.code(), "scan failed: {}", error);
        ScanResult::failed(self.stage, error)
    }
}

/// Run one scan. Never panics on image content and never returns `Err`;
/// failures are carried inside the result.
pub(crate) fn scan_image(
    raw: &RgbImage,
    layout: &SheetLayout,
    config: &ScanConfig,
    mut trace: Option<&mut ScanTrace>,
) -> ScanResult {
    let started = Instant::now();
    let mut tracker = StageTracker::new();

    let enhanced = enhance(raw, &config.enhance);
    tracker.advance(ScanStage::Enhanced);

    let detected = fiducial::detect(&enhanced, &config.fiducial);
    if let Some(t) = trace.as_deref_mut() {
        t.enhanced = Some(enhanced);
    }
    let fiducials = match detected {
        Ok(f) => f,
        Err(e) => return tracker.fail(e),
    };
    if let Some(t) = trace.as_deref_mut() {
        t.fiducials = Some(fiducials);
    }
    tracker.advance(ScanStage::FiducialsFound);

    let (canonical, h) = match rectify(raw, &fiducials, layout.canonical_size, &config.rectify) {
        Ok(r) => r,
        Err(e) => return tracker.fail(e),
    };
    tracker.advance(ScanStage::Rectified);

    let oriented = orientation::resolve(&canonical, &layout.marker_region, &config.orientation);
    if let Some(t) = trace.as_deref_mut() {
        t.homography = Some(matrix_rows(&h));
        t.canonical = Some(canonical);
    }
    let oriented = match oriented {
        Ok(o) => o,
        Err(e) => return tracker.fail(e),
    };
    tracker.advance(ScanStage::Oriented);

    let readings = sample(&oriented.sheet, layout, &config.sampling);
    tracker.advance(ScanStage::Sampled);

    let result = assemble(layout, oriented.payload, oriented.rotation_deg, &readings);
    tracker.advance(ScanStage::Assembled);

    if let Some(t) = trace.as_deref_mut() {
        t.oriented = Some(oriented.sheet);
        t.readings = Some(readings);
    }
    tracing::debug!(
        elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
        "scan finished"
    );
    result
}

fn matrix_rows(h: &nalgebra::Matrix3<f64>) -> [[f64; 3]; 3] {
    std::array::from_fn(|r| std::array::from_fn(|c| h[(r, c)]))
}

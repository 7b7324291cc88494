//! omrscan: geometric correction and bubble sampling for photographed
//! OMR answer sheets.
//!
//! A photo of a printed sheet goes through these stages:
//!
//! 1. **Enhance** – luminance, CLAHE, median denoise.
//! 2. **Fiducials** – four solid corner squares found by connected components
//!    and contour shape tests; roles assigned from coordinate sums and
//!    differences.
//! 3. **Rectify** – DLT homography onto the canonical sheet, bilinear warp.
//! 4. **Orientation** – the payload marker is decoded under 0/90/180/270
//!    degree views; the first decodable view fixes the rotation.
//! 5. **Sampling** – adaptive ink mask, disk density per bubble, per-group
//!    classification into a label, `unmarked` or `ambiguous`.
//!
//! # Public API
//! - [`Scanner`] with a [`SheetLayout`] is the entry point
//! - [`ScanConfig`] tunes each stage
//! - [`ScanResult`] is always returned; failures are data, not `Err`
//!
//! Stage modules are public for tools that need a single stage (the CLI
//! marker decoder, sheet rendering, benches).

mod api;
pub mod binarize;
mod config;
pub mod enhance;
mod error;
pub mod fiducial;
pub mod homography;
pub mod marker;
pub mod orientation;
mod pipeline;
pub mod rectify;
pub mod render;
pub mod sampler;
mod sheet_layout;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::Scanner;
pub use config::{ConfigError, ScanConfig};
pub use enhance::{EnhanceConfig, EnhancedImage};
pub use error::{LayoutError, QuadDefect, ScanError};
pub use fiducial::{FiducialConfig, FiducialPoint, FiducialSet};
pub use marker::MarkerFormat;
pub use orientation::{OrientationConfig, OrientedSheet};
pub use pipeline::{
    assemble, group_outcome, ErrorRecord, ScanResult, ScanStage, ScanTrace, AMBIGUOUS,
    AMBIGUOUS_DIGIT, UNMARKED, UNMARKED_DIGIT,
};
pub use rectify::{CanonicalSheet, RectifyConfig};
pub use render::{RenderError, RenderOptions};
pub use sampler::{GroupOutcome, MarkReading, SamplingConfig};
pub use sheet_layout::{
    CanonicalSize, CellGroup, GridCellSpec, GroupRole, GroupThresholds, MarkerRegion,
    SheetLayout, SHEET_SCHEMA_V1,
};

//! High-level scanning API.
//!
//! [`Scanner`] is the primary entry point. It holds a validated
//! [`SheetLayout`] and a [`ScanConfig`]; create it once and scan many images.

use std::path::Path;

use image::RgbImage;
use rayon::prelude::*;

use crate::config::ScanConfig;
use crate::error::LayoutError;
use crate::pipeline::{self, ScanResult, ScanTrace};
use crate::sheet_layout::SheetLayout;

/// Primary scanning interface.
///
/// # Examples
///
/// ```no_run
/// use omrscan::{Scanner, SheetLayout};
///
/// let scanner = Scanner::new(SheetLayout::default());
/// let photo = image::open("sheet.jpg").unwrap().to_rgb8();
/// let result = scanner.scan(&photo);
/// println!("{}", serde_json::to_string_pretty(&result).unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct Scanner {
    layout: SheetLayout,
    config: ScanConfig,
}

impl Scanner {
    /// Create a scanner with default stage configuration.
    pub fn new(layout: SheetLayout) -> Self {
        Self::with_config(layout, ScanConfig::default())
    }

    pub fn with_config(layout: SheetLayout, config: ScanConfig) -> Self {
        Self { layout, config }
    }

    /// Load a layout JSON file and create a scanner with default configuration.
    pub fn from_layout_json_file(path: &Path) -> Result<Self, LayoutError> {
        Ok(Self::new(SheetLayout::from_json_file(path)?))
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut ScanConfig {
        &mut self.config
    }

    /// Scan one photo.
    pub fn scan(&self, image: &RgbImage) -> ScanResult {
        pipeline::scan_image(image, &self.layout, &self.config, None)
    }

    /// Scan one photo and return the stage intermediates as well.
    pub fn scan_with_trace(&self, image: &RgbImage) -> (ScanResult, ScanTrace) {
        let mut trace = ScanTrace::default();
        let result = pipeline::scan_image(image, &self.layout, &self.config, Some(&mut trace));
        (result, trace)
    }

    /// Scan many photos in parallel; results keep the input order.
    pub fn scan_batch(&self, images: &[RgbImage]) -> Vec<ScanResult> {
        images.par_iter().map(|img| self.scan(img)).collect()
    }
}

use std::collections::BTreeMap;

use crate::enhance::EnhancedImage;
use crate::error::ScanError;
use crate::fiducial::FiducialSet;
use crate::rectify::CanonicalSheet;
use crate::sampler::MarkReading;

/// Answer value of a question with no filled bubble.
pub const UNMARKED: &str = "unmarked";
/// Answer value of a question with competing filled bubbles.
pub const AMBIGUOUS: &str = "ambiguous";
/// Code digit written for an unmarked column.
pub const UNMARKED_DIGIT: char = '-';
/// Code digit written for an ambiguous column.
pub const AMBIGUOUS_DIGIT: char = '*';

/// Pipeline state. A scan moves strictly forward and never re-enters a state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Captured,
    Enhanced,
    FiducialsFound,
    Rectified,
    Oriented,
    Sampled,
    Assembled,
    Failed,
}

impl ScanStage {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Captured => "captured",
            Self::Enhanced => "enhanced",
            Self::FiducialsFound => "fiducials_found",
            Self::Rectified => "rectified",
            Self::Oriented => "oriented",
            Self::Sampled => "sampled",
            Self::Assembled => "assembled",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Assembled | Self::Failed)
    }
}

impl std::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One terminal failure, tagged with the last state reached before it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorRecord {
    pub stage: ScanStage,
    pub error: ScanError,
    /// Human-readable message.
    pub message: String,
}

impl ErrorRecord {
    pub fn new(stage: ScanStage, error: ScanError) -> Self {
        Self {
            stage,
            message: error.to_string(),
            error,
        }
    }
}

/// Structured outcome of one scan.
///
/// Always produced, success or failure. On failure the data fields are
/// empty and `errors` holds exactly one record.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanResult {
    /// Payload of the orientation marker.
    pub document_id: Option<String>,
    /// Code name -> one character per digit column.
    pub calibration_codes: BTreeMap<String, String>,
    /// Question id -> selected label, [`UNMARKED`] or [`AMBIGUOUS`].
    pub answers: BTreeMap<String, String>,
    pub errors: Vec<ErrorRecord>,
    /// Clockwise rotation applied to the rectified sheet.
    pub rotation_deg: Option<u16>,
    /// Last state reached.
    pub stage: ScanStage,
}

impl ScanResult {
    /// Result of a scan that stopped at `stage` with `error`.
    pub fn failed(stage: ScanStage, error: ScanError) -> Self {
        Self {
            document_id: None,
            calibration_codes: BTreeMap::new(),
            answers: BTreeMap::new(),
            errors: vec![ErrorRecord::new(stage, error)],
            rotation_deg: None,
            stage: ScanStage::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stage == ScanStage::Assembled && self.errors.is_empty()
    }
}

/// Intermediates of one scan, filled up to the stage that was reached.
#[derive(Debug, Clone, Default)]
pub struct ScanTrace {
    pub enhanced: Option<EnhancedImage>,
    pub fiducials: Option<FiducialSet>,
    /// Canonical -> photo homography.
    pub homography: Option<[[f64; 3]; 3]>,
    /// Rectified sheet before rotation.
    pub canonical: Option<CanonicalSheet>,
    /// Upright sheet.
    pub oriented: Option<CanonicalSheet>,
    pub readings: Option<BTreeMap<String, MarkReading>>,
}

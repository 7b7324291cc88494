//! Error taxonomy for scanning and configuration.
//!
//! [`ScanError`] values are terminal for one document and are surfaced as data
//! inside [`ScanResult`](crate::ScanResult); they never escape a scan as `Err`.
//! [`LayoutError`] is raised once, when a sheet layout is loaded or validated.

/// Geometric defect that makes a fiducial quadrilateral unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuadDefect {
    /// A corner coordinate is NaN or infinite.
    NonFinite,
    /// Two roles were assigned to (nearly) the same point.
    CoincidentCorners,
    /// Three of the four corners lie on a line.
    Collinear,
    /// The corners do not form a convex, non-self-intersecting polygon.
    NotConvex,
    /// The solved homography is singular or maps a corner to infinity.
    SingularHomography,
}

impl QuadDefect {
    pub const fn code(self) -> &'static str {
        match self {
            Self::NonFinite => "non_finite",
            Self::CoincidentCorners => "coincident_corners",
            Self::Collinear => "collinear",
            Self::NotConvex => "not_convex",
            Self::SingularHomography => "singular_homography",
        }
    }
}

impl std::fmt::Display for QuadDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Terminal failure of one scan.
#[derive(Debug, Clone, PartialEq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanError {
    /// Fewer than four usable corner marks were found.
    #[error("only {count} fiducial mark(s) found, need 4; check lighting and that all page corners are visible")]
    InsufficientFiducials { count: usize },
    /// The fiducial points cannot define a rectification mapping.
    #[error("fiducial points do not form a valid quadrilateral ({defect})")]
    DegenerateQuadrilateral { defect: QuadDefect },
    /// The orientation marker did not decode in any candidate rotation.
    #[error("orientation marker not decodable in any of {attempts} rotations")]
    OrientationNotResolved { attempts: usize },
}

impl ScanError {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InsufficientFiducials { .. } => "insufficient_fiducials",
            Self::DegenerateQuadrilateral { .. } => "degenerate_quadrilateral",
            Self::OrientationNotResolved { .. } => "orientation_not_resolved",
        }
    }
}

/// Sheet layout loading or validation failure.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("failed to read layout file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse layout json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported layout schema '{found}' (expected '{expected}')")]
    Schema {
        found: String,
        expected: &'static str,
    },
    #[error("invalid layout: {0}")]
    Invalid(String),
}

//! Runtime answer-sheet layout specification.
//!
//! Layout JSON follows schema `omrscan.sheet.v1`: the canonical pixel size of
//! the flattened sheet, the printed fiducial size, the rectangle holding the
//! payload marker, default classification thresholds and an explicit list of
//! cell groups. Every coordinate is in canonical-sheet pixels.
//!
//! A layout is validated once at load and is immutable afterwards, so one
//! instance can be shared across threads by reference.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::LayoutError;
use crate::marker::MARKER_MODULES;

pub const SHEET_SCHEMA_V1: &str = "omrscan.sheet.v1";

const DEFAULT_NAME: &str = "a5_120q";
const DEFAULT_WIDTH_PX: u32 = 1480;
const DEFAULT_HEIGHT_PX: u32 = 2100;
const DEFAULT_FIDUCIAL_SIZE_PX: u32 = 80;
const DEFAULT_MARKER_REGION: MarkerRegion = MarkerRegion {
    x: 1120,
    y: 80,
    width: 280,
    height: 280,
};
const DEFAULT_MARKER_MODULE_PX: u32 = 16;
const DEFAULT_BUBBLE_RADIUS_PX: f64 = 16.0;
const DEFAULT_MIN_DENSITY: f64 = 0.40;
const DEFAULT_AMBIGUITY_MARGIN: f64 = 0.10;

const DEFAULT_CODES: [(&str, [f64; 3]); 2] = [
    ("book_code", [185.0, 235.0, 285.0]),
    ("set_code", [420.0, 470.0, 520.0]),
];
const DEFAULT_CODE_FIRST_Y: f64 = 300.0;
const DEFAULT_CODE_PITCH_Y: f64 = 44.0;

const DEFAULT_OPTIONS: [&str; 5] = ["A", "B", "C", "D", "E"];
const DEFAULT_BLOCK_X: [f64; 4] = [185.0, 505.0, 825.0, 1145.0];
const DEFAULT_QUESTIONS_PER_BLOCK: usize = 30;
const DEFAULT_OPTION_PITCH_X: f64 = 50.0;
const DEFAULT_ANSWER_FIRST_Y: f64 = 904.0;
const DEFAULT_ANSWER_PITCH_Y: f64 = 38.0;
const DEFAULT_ANSWER_FIRST_ROW: u32 = 10;

/// Size of the canonical (rectified) sheet in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CanonicalSize {
    pub width: u32,
    pub height: u32,
}

impl CanonicalSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Canonical corner coordinates in role order TL, TR, BR, BL.
    pub fn corners(&self) -> [[f64; 2]; 4] {
        let w = f64::from(self.width.saturating_sub(1));
        let h = f64::from(self.height.saturating_sub(1));
        [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
    }
}

/// Axis-aligned rectangle of the canonical sheet searched for the payload marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MarkerRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Fill and ambiguity thresholds applied to one cell group.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupThresholds {
    /// A cell is filled iff its ink density is strictly above this value.
    pub min_density: f64,
    /// Two filled cells closer than this in density make the group ambiguous.
    pub ambiguity_margin: f64,
}

impl Default for GroupThresholds {
    fn default() -> Self {
        Self {
            min_density: DEFAULT_MIN_DENSITY,
            ambiguity_margin: DEFAULT_AMBIGUITY_MARGIN,
        }
    }
}

/// What a cell group contributes to the scan result.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupRole {
    /// One answered question; the group name is the question id.
    Answer,
    /// One digit column of a calibration code.
    CodeDigit { code: String, position: usize },
}

/// One candidate mark position.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GridCellSpec {
    /// Stable id, `"{group}.{label}"`.
    pub id: String,
    pub label: String,
    pub row: u32,
    pub col: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
}

/// Cells that are classified together (one question, one code digit).
#[derive(Debug, Clone, PartialEq)]
pub struct CellGroup {
    pub name: String,
    pub role: GroupRole,
    /// Per-group override of the layout thresholds.
    pub thresholds: Option<GroupThresholds>,
    pub cells: Vec<GridCellSpec>,
}

/// Runtime sheet layout used by the scanner.
#[derive(Debug, Clone)]
pub struct SheetLayout {
    pub name: String,
    pub canonical_size: CanonicalSize,
    /// Printed side length of a square fiducial, centered on each canonical corner.
    pub fiducial_size_px: u32,
    pub marker_region: MarkerRegion,
    /// Printed module size of the payload marker.
    pub marker_module_px: u32,
    /// Thresholds for groups without an override.
    pub thresholds: GroupThresholds,
    pub groups: Vec<CellGroup>,

    /// Fast lookup: group name -> index into `groups`.
    group_index: HashMap<String, usize>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct SheetLayoutSpecV1 {
    schema: String,
    name: String,
    canonical_size: CanonicalSize,
    fiducial_size_px: u32,
    marker_region: MarkerRegion,
    marker_module_px: u32,
    thresholds: GroupThresholds,
    groups: Vec<CellGroupSpec>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct CellGroupSpec {
    name: String,
    role: GroupRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thresholds: Option<GroupThresholds>,
    cells: Vec<CellSpec>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct CellSpec {
    label: String,
    row: u32,
    col: u32,
    center_x: f64,
    center_y: f64,
    radius: f64,
}

impl SheetLayout {
    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&CellGroup> {
        self.group_index.get(name).map(|&idx| &self.groups[idx])
    }

    /// Effective thresholds of a group (override or layout default).
    pub fn thresholds_for(&self, group: &CellGroup) -> GroupThresholds {
        group.thresholds.unwrap_or(self.thresholds)
    }

    /// Iterator over all cells with their owning group.
    pub fn cells(&self) -> impl Iterator<Item = (&CellGroup, &GridCellSpec)> + '_ {
        self.groups
            .iter()
            .flat_map(|g| g.cells.iter().map(move |c| (g, c)))
    }

    /// Total number of cells on the sheet.
    pub fn n_cells(&self) -> usize {
        self.groups.iter().map(|g| g.cells.len()).sum()
    }

    /// Answer groups in layout order.
    pub fn answer_groups(&self) -> impl Iterator<Item = &CellGroup> + '_ {
        self.groups
            .iter()
            .filter(|g| matches!(g.role, GroupRole::Answer))
    }

    /// Calibration code names with their digit groups sorted by position.
    pub fn code_columns(&self) -> Vec<(&str, Vec<&CellGroup>)> {
        let mut codes: Vec<(&str, Vec<(usize, &CellGroup)>)> = Vec::new();
        for group in &self.groups {
            let GroupRole::CodeDigit { code, position } = &group.role else {
                continue;
            };
            match codes.iter_mut().find(|(name, _)| *name == code.as_str()) {
                Some((_, cols)) => cols.push((*position, group)),
                None => codes.push((code.as_str(), vec![(*position, group)])),
            }
        }
        codes
            .into_iter()
            .map(|(name, mut cols)| {
                cols.sort_by_key(|(pos, _)| *pos);
                (name, cols.into_iter().map(|(_, g)| g).collect())
            })
            .collect()
    }

    /// Top-left pixel of the printed payload marker (centered in its region).
    pub fn marker_origin(&self) -> [u32; 2] {
        self.centered_in_marker_region(self.marker_side_px())
    }

    /// Top-left pixel of a square of `side` pixels centered in the marker region.
    pub fn centered_in_marker_region(&self, side: u32) -> [u32; 2] {
        [
            self.marker_region.x + (self.marker_region.width.saturating_sub(side)) / 2,
            self.marker_region.y + (self.marker_region.height.saturating_sub(side)) / 2,
        ]
    }

    /// Printed side length of the payload marker.
    pub fn marker_side_px(&self) -> u32 {
        MARKER_MODULES as u32 * self.marker_module_px
    }

    /// Load a sheet layout from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, LayoutError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Parse and validate a sheet layout from a JSON string.
    pub fn from_json_str(data: &str) -> Result<Self, LayoutError> {
        let spec: SheetLayoutSpecV1 = serde_json::from_str(data)?;
        Self::from_layout_spec(spec)
    }

    /// Serialize to the `omrscan.sheet.v1` JSON form accepted by [`Self::from_json_str`].
    pub fn to_json_string(&self) -> Result<String, LayoutError> {
        Ok(serde_json::to_string_pretty(&self.to_layout_spec())?)
    }

    fn to_layout_spec(&self) -> SheetLayoutSpecV1 {
        SheetLayoutSpecV1 {
            schema: SHEET_SCHEMA_V1.to_string(),
            name: self.name.clone(),
            canonical_size: self.canonical_size,
            fiducial_size_px: self.fiducial_size_px,
            marker_region: self.marker_region,
            marker_module_px: self.marker_module_px,
            thresholds: self.thresholds,
            groups: self
                .groups
                .iter()
                .map(|g| CellGroupSpec {
                    name: g.name.clone(),
                    role: g.role.clone(),
                    thresholds: g.thresholds,
                    cells: g
                        .cells
                        .iter()
                        .map(|c| CellSpec {
                            label: c.label.clone(),
                            row: c.row,
                            col: c.col,
                            center_x: c.center_x,
                            center_y: c.center_y,
                            radius: c.radius,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn from_layout_spec(spec: SheetLayoutSpecV1) -> Result<Self, LayoutError> {
        if spec.schema != SHEET_SCHEMA_V1 {
            return Err(LayoutError::Schema {
                found: spec.schema,
                expected: SHEET_SCHEMA_V1,
            });
        }

        validate_layout_spec(&spec).map_err(LayoutError::Invalid)?;

        let groups: Vec<CellGroup> = spec
            .groups
            .into_iter()
            .map(|g| CellGroup {
                cells: g
                    .cells
                    .into_iter()
                    .map(|c| GridCellSpec {
                        id: cell_id(&g.name, &c.label),
                        label: c.label,
                        row: c.row,
                        col: c.col,
                        center_x: c.center_x,
                        center_y: c.center_y,
                        radius: c.radius,
                    })
                    .collect(),
                name: g.name,
                role: g.role,
                thresholds: g.thresholds,
            })
            .collect();
        let group_index = groups
            .iter()
            .enumerate()
            .map(|(i, g)| (g.name.clone(), i))
            .collect();

        Ok(Self {
            name: spec.name,
            canonical_size: spec.canonical_size,
            fiducial_size_px: spec.fiducial_size_px,
            marker_region: spec.marker_region,
            marker_module_px: spec.marker_module_px,
            thresholds: spec.thresholds,
            groups,
            group_index,
        })
    }
}

impl Default for SheetLayout {
    /// A5 sheet at 10 px/mm: marker top-right, two 3-digit calibration codes
    /// top-left, 120 questions with options A-E in four blocks of 30.
    fn default() -> Self {
        let spec = SheetLayoutSpecV1 {
            schema: SHEET_SCHEMA_V1.to_string(),
            name: DEFAULT_NAME.to_string(),
            canonical_size: CanonicalSize::new(DEFAULT_WIDTH_PX, DEFAULT_HEIGHT_PX),
            fiducial_size_px: DEFAULT_FIDUCIAL_SIZE_PX,
            marker_region: DEFAULT_MARKER_REGION,
            marker_module_px: DEFAULT_MARKER_MODULE_PX,
            thresholds: GroupThresholds::default(),
            groups: generate_default_groups(),
        };

        Self::from_layout_spec(spec).expect("default sheet spec must be valid")
    }
}

fn generate_default_groups() -> Vec<CellGroupSpec> {
    let mut groups = Vec::new();
    let mut col_base = 0u32;

    for (code, column_x) in DEFAULT_CODES {
        for (position, &x) in column_x.iter().enumerate() {
            let col = col_base + position as u32;
            groups.push(CellGroupSpec {
                name: format!("{code}.{position}"),
                role: GroupRole::CodeDigit {
                    code: code.to_string(),
                    position,
                },
                thresholds: None,
                cells: (0..10u32)
                    .map(|digit| CellSpec {
                        label: digit.to_string(),
                        row: digit,
                        col,
                        center_x: x,
                        center_y: DEFAULT_CODE_FIRST_Y + f64::from(digit) * DEFAULT_CODE_PITCH_Y,
                        radius: DEFAULT_BUBBLE_RADIUS_PX,
                    })
                    .collect(),
            });
        }
        col_base += column_x.len() as u32;
    }

    for (block, &block_x) in DEFAULT_BLOCK_X.iter().enumerate() {
        for i in 0..DEFAULT_QUESTIONS_PER_BLOCK {
            let question = block * DEFAULT_QUESTIONS_PER_BLOCK + i + 1;
            groups.push(CellGroupSpec {
                name: format!("Q{question}"),
                role: GroupRole::Answer,
                thresholds: None,
                cells: DEFAULT_OPTIONS
                    .iter()
                    .enumerate()
                    .map(|(opt, label)| CellSpec {
                        label: (*label).to_string(),
                        row: DEFAULT_ANSWER_FIRST_ROW + i as u32,
                        col: (block * DEFAULT_OPTIONS.len() + opt) as u32,
                        center_x: block_x + opt as f64 * DEFAULT_OPTION_PITCH_X,
                        center_y: DEFAULT_ANSWER_FIRST_Y + i as f64 * DEFAULT_ANSWER_PITCH_Y,
                        radius: DEFAULT_BUBBLE_RADIUS_PX,
                    })
                    .collect(),
            });
        }
    }

    groups
}

fn validate_thresholds(t: &GroupThresholds, context: &str) -> Result<(), String> {
    if !t.min_density.is_finite() || !(0.0..=1.0).contains(&t.min_density) {
        return Err(format!("{context}: min_density must be in [0, 1]"));
    }
    if !t.ambiguity_margin.is_finite() || t.ambiguity_margin < 0.0 {
        return Err(format!("{context}: ambiguity_margin must be finite and >= 0"));
    }
    Ok(())
}

/// Stable cell id, `"{group}.{label}"`.
fn cell_id(group: &str, label: &str) -> String {
    format!("{group}.{label}")
}

fn validate_layout_spec(spec: &SheetLayoutSpecV1) -> Result<(), String> {
    if spec.name.trim().is_empty() {
        return Err("sheet name must not be empty".to_string());
    }

    let size = spec.canonical_size;
    if size.width < 2 || size.height < 2 {
        return Err("canonical_size must be at least 2x2".to_string());
    }
    let (w, h) = (f64::from(size.width), f64::from(size.height));

    if spec.fiducial_size_px == 0 {
        return Err("fiducial_size_px must be >= 1".to_string());
    }

    let region = spec.marker_region;
    if region.width == 0 || region.height == 0 {
        return Err("marker_region must not be empty".to_string());
    }
    if u64::from(region.x) + u64::from(region.width) > u64::from(size.width)
        || u64::from(region.y) + u64::from(region.height) > u64::from(size.height)
    {
        return Err("marker_region must lie inside the canonical sheet".to_string());
    }
    if spec.marker_module_px == 0 {
        return Err("marker_module_px must be >= 1".to_string());
    }
    let marker_side = u64::from(spec.marker_module_px) * MARKER_MODULES as u64;
    if marker_side > u64::from(region.width) || marker_side > u64::from(region.height) {
        return Err(format!(
            "payload marker ({marker_side}px) does not fit in marker_region ({}x{})",
            region.width, region.height
        ));
    }

    validate_thresholds(&spec.thresholds, "thresholds")?;

    if spec.groups.is_empty() {
        return Err("layout must define at least one cell group".to_string());
    }

    let mut group_names = HashSet::new();
    let mut grid_positions = HashSet::new();
    let mut code_positions = HashSet::new();
    let mut cell_ids = HashSet::new();
    for group in &spec.groups {
        if group.name.trim().is_empty() {
            return Err("group name must not be empty".to_string());
        }
        if !group_names.insert(group.name.as_str()) {
            return Err(format!("duplicate group name '{}'", group.name));
        }
        if group.cells.is_empty() {
            return Err(format!("group '{}' has no cells", group.name));
        }
        if let Some(t) = &group.thresholds {
            validate_thresholds(t, &format!("group '{}'", group.name))?;
        }
        if let GroupRole::CodeDigit { code, position } = &group.role {
            if code.trim().is_empty() {
                return Err(format!("group '{}': code name must not be empty", group.name));
            }
            if !code_positions.insert((code.as_str(), *position)) {
                return Err(format!(
                    "group '{}': duplicate position {position} for code '{code}'",
                    group.name
                ));
            }
        }

        let mut labels = HashSet::new();
        for cell in &group.cells {
            if cell.label.is_empty() {
                return Err(format!("group '{}': cell label must not be empty", group.name));
            }
            if !labels.insert(cell.label.as_str()) {
                return Err(format!(
                    "group '{}': duplicate cell label '{}'",
                    group.name, cell.label
                ));
            }
            let id = cell_id(&group.name, &cell.label);
            if !cell_ids.insert(id.clone()) {
                return Err(format!(
                    "duplicate cell id '{id}' (group '{}', label '{}')",
                    group.name, cell.label
                ));
            }
            if !grid_positions.insert((cell.row, cell.col)) {
                return Err(format!(
                    "duplicate grid position (row {}, col {}) at cell '{}.{}'",
                    cell.row, cell.col, group.name, cell.label
                ));
            }
            if !cell.radius.is_finite() || cell.radius <= 0.0 {
                return Err(format!(
                    "cell '{}.{}': radius must be finite and > 0",
                    group.name, cell.label
                ));
            }
            let inside = cell.center_x.is_finite()
                && cell.center_y.is_finite()
                && cell.center_x - cell.radius >= 0.0
                && cell.center_y - cell.radius >= 0.0
                && cell.center_x + cell.radius <= w - 1.0
                && cell.center_y + cell.radius <= h - 1.0;
            if !inside {
                return Err(format!(
                    "cell '{}.{}' at ({}, {}) r={} lies outside the {}x{} sheet",
                    group.name, cell.label, cell.center_x, cell.center_y, cell.radius, size.width,
                    size.height
                ));
            }
        }
    }

    Ok(())
}

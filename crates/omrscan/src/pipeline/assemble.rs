//! Fold per-cell readings into answers and calibration codes.

use std::collections::BTreeMap;

use super::result::{
    ScanResult, ScanStage, AMBIGUOUS, AMBIGUOUS_DIGIT, UNMARKED, UNMARKED_DIGIT,
};
use crate::sampler::{classify_group, GroupOutcome, MarkReading};
use crate::sheet_layout::{CellGroup, SheetLayout};

/// Build the result of a scan that reached the sampling stage.
pub fn assemble(
    layout: &SheetLayout,
    payload: String,
    rotation_deg: u16,
    readings: &BTreeMap<String, MarkReading>,
) -> ScanResult {
    let answers: BTreeMap<String, String> = layout
        .answer_groups()
        .map(|group| {
            let value = match group_outcome(layout, group, readings) {
                GroupOutcome::Selected { index } => group.cells[index].label.clone(),
                GroupOutcome::Unmarked => UNMARKED.to_string(),
                GroupOutcome::Ambiguous => AMBIGUOUS.to_string(),
            };
            (group.name.clone(), value)
        })
        .collect();

    let calibration_codes: BTreeMap<String, String> = layout
        .code_columns()
        .into_iter()
        .map(|(code, columns)| {
            let digits: String = columns
                .into_iter()
                .map(|group| match group_outcome(layout, group, readings) {
                    GroupOutcome::Selected { index } => group.cells[index].label.clone(),
                    GroupOutcome::Unmarked => UNMARKED_DIGIT.to_string(),
                    GroupOutcome::Ambiguous => AMBIGUOUS_DIGIT.to_string(),
                })
                .collect();
            (code.to_string(), digits)
        })
        .collect();

    tracing::info!(
        document_id = %payload,
        rotation_deg,
        answered = answers.values().filter(|v| *v != UNMARKED && *v != AMBIGUOUS).count(),
        ambiguous = answers.values().filter(|v| *v == AMBIGUOUS).count(),
        "scan assembled"
    );

    ScanResult {
        document_id: Some(payload),
        calibration_codes,
        answers,
        errors: Vec::new(),
        rotation_deg: Some(rotation_deg),
        stage: ScanStage::Assembled,
    }
}

static NO_READING: MarkReading = MarkReading {
    cell_id: String::new(),
    density: 0.0,
    is_filled: false,
};

/// Classify one group; cells without a reading count as empty.
pub fn group_outcome(
    layout: &SheetLayout,
    group: &CellGroup,
    readings: &BTreeMap<String, MarkReading>,
) -> GroupOutcome {
    let group_readings: Vec<&MarkReading> = group
        .cells
        .iter()
        .map(|c| readings.get(&c.id).unwrap_or(&NO_READING))
        .collect();
    classify_group(&group_readings, &layout.thresholds_for(group))
}

//! Scan pipeline: stage orchestration and result assembly.
//!
//! Algorithmic stages live in `crate::enhance`, `crate::fiducial`,
//! `crate::rectify`, `crate::orientation` and `crate::sampler`. This module
//! owns the state machine, the call order and the shape of [`ScanResult`].

mod assemble;
mod result;
mod run;

pub use assemble::{assemble, group_outcome};
pub use result::{
    ErrorRecord, ScanResult, ScanStage, ScanTrace, AMBIGUOUS, AMBIGUOUS_DIGIT, UNMARKED,
    UNMARKED_DIGIT,
};

pub(crate) use run::scan_image;

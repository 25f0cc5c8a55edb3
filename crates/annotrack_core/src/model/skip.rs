//! Skip-record audit model.
//!
//! # Invariants
//! - One skip row per (record, grader, criteria); regrades update the row in
//!   place instead of inserting a second one.

use crate::model::assignment::RecordId;
use crate::model::grade::GradeState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Fixed reason recorded for out-of-scope records.
pub const OUT_OF_SCOPE_REASON: &str = "OUTSIDE SCAN";

/// Audit row explaining why an assignment left the happy path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub record_id: RecordId,
    /// Assignment state at the time the row was written or last updated.
    pub state: GradeState,
    pub grader_name: String,
    pub skip_date: Option<NaiveDate>,
    pub skip_reason: String,
    pub regrade_date: Option<NaiveDate>,
    pub regrade_reason: String,
    pub grade_criteria: String,
}

impl SkipRecord {
    /// Creates the initial skip row for a skip/escalate/out-of-scope commit.
    pub fn logged(
        record_id: impl Into<RecordId>,
        state: GradeState,
        grader_name: impl Into<String>,
        skip_date: NaiveDate,
        skip_reason: impl Into<String>,
        grade_criteria: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            state,
            grader_name: grader_name.into(),
            skip_date: Some(skip_date),
            skip_reason: skip_reason.into(),
            regrade_date: None,
            regrade_reason: String::new(),
            grade_criteria: grade_criteria.into(),
        }
    }

    /// Creates a row for a regrade of a skip that was never logged.
    ///
    /// Only the regrade fields are populated; the original skip reason is
    /// genuinely unavailable at this point.
    pub fn regrade_only(
        record_id: impl Into<RecordId>,
        state: GradeState,
        grader_name: impl Into<String>,
        regrade_date: NaiveDate,
        regrade_reason: impl Into<String>,
        grade_criteria: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            state,
            grader_name: grader_name.into(),
            skip_date: None,
            skip_reason: String::new(),
            regrade_date: Some(regrade_date),
            regrade_reason: regrade_reason.into(),
            grade_criteria: grade_criteria.into(),
        }
    }
}

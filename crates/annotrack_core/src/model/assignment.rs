//! Grade assignment domain model.
//!
//! # Responsibility
//! - Define the central mutable entity of the workflow: one grader's
//!   assignment to grade one record under one criteria version.
//! - Provide lifecycle helpers used by the state machine and the allocator.
//!
//! # Invariants
//! - (record_id, grader_name, grade_criteria) is unique across the ledger.
//! - `grade_date` is `None` exactly while the assignment is unresolved.

use crate::model::grade::GradeState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable identifier of an annotatable report record.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type RecordId = String;

/// Name prefix identifying automated pseudo-graders whose rows are excluded
/// from validation counters and agreement statistics.
pub const SYSTEM_GRADER_PREFIX: &str = "Coarse Text Search";

/// Why an assignment row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeCategory {
    /// Member of the fixed multi-grader reliability set.
    Reliability,
    /// Regular cohort work, covered by at most the validation cap.
    Unique,
    /// Calibration example graded before any real work is issued.
    SelfEval,
}

impl GradeCategory {
    /// Stable string id stored in the ledger.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reliability => "Reliability",
            Self::Unique => "Unique",
            Self::SelfEval => "SelfEval",
        }
    }

    /// Parses a stored category value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Reliability" => Some(Self::Reliability),
            "Unique" => Some(Self::Unique),
            "SelfEval" => Some(Self::SelfEval),
            _ => None,
        }
    }
}

/// Unique key of one assignment row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentKey {
    pub record_id: RecordId,
    pub grader_name: String,
    pub grade_criteria: String,
}

impl AssignmentKey {
    pub fn new(
        record_id: impl Into<RecordId>,
        grader_name: impl Into<String>,
        grade_criteria: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            grader_name: grader_name.into(),
            grade_criteria: grade_criteria.into(),
        }
    }
}

impl std::fmt::Display for AssignmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.record_id, self.grader_name, self.grade_criteria
        )
    }
}

/// Validation failures raised before an assignment reaches the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentValidationError {
    EmptyRecordId,
    EmptyGraderName,
    EmptyCriteria,
}

impl std::fmt::Display for AssignmentValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRecordId => write!(f, "assignment record_id cannot be empty"),
            Self::EmptyGraderName => write!(f, "assignment grader_name cannot be empty"),
            Self::EmptyCriteria => write!(f, "assignment grade_criteria cannot be empty"),
        }
    }
}

impl std::error::Error for AssignmentValidationError {}

/// One grader's assignment to grade one record under one criteria version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeAssignment {
    pub record_id: RecordId,
    pub grader_name: String,
    pub state: GradeState,
    pub category: GradeCategory,
    /// Patient/context key carried from the procedure order.
    pub pat_id: String,
    /// Age at scan in days, used by cohort sort orders.
    pub age_in_days: Option<i64>,
    /// Year of the procedure order, used by cohort sort orders.
    pub proc_ord_year: Option<i32>,
    /// Procedure description.
    pub proc_name: String,
    /// Marker for the physical table the record came from.
    pub report_origin: String,
    /// Optional cohort project label.
    pub project: Option<String>,
    /// `None` until the assignment is resolved.
    pub grade_date: Option<NaiveDate>,
    pub grade_criteria: String,
}

impl GradeAssignment {
    /// Creates a fresh queued assignment with empty context metadata.
    pub fn queued(
        record_id: impl Into<RecordId>,
        grader_name: impl Into<String>,
        category: GradeCategory,
        grade_criteria: impl Into<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            grader_name: grader_name.into(),
            state: GradeState::Queued,
            category,
            pat_id: String::new(),
            age_in_days: None,
            proc_ord_year: None,
            proc_name: String::new(),
            report_origin: String::new(),
            project: None,
            grade_date: None,
            grade_criteria: grade_criteria.into(),
        }
    }

    /// Returns the unique ledger key of this assignment.
    pub fn key(&self) -> AssignmentKey {
        AssignmentKey::new(
            self.record_id.clone(),
            self.grader_name.clone(),
            self.grade_criteria.clone(),
        )
    }

    /// Whether this row belongs to an automated pseudo-grader.
    pub fn is_system_grader(&self) -> bool {
        self.grader_name.starts_with(SYSTEM_GRADER_PREFIX)
    }

    /// Checks field invariants before the row is persisted.
    pub fn validate(&self) -> Result<(), AssignmentValidationError> {
        if self.record_id.trim().is_empty() {
            return Err(AssignmentValidationError::EmptyRecordId);
        }
        if self.grader_name.trim().is_empty() {
            return Err(AssignmentValidationError::EmptyGraderName);
        }
        if self.grade_criteria.trim().is_empty() {
            return Err(AssignmentValidationError::EmptyCriteria);
        }
        Ok(())
    }
}

//! Assignment lifecycle states and the confirmed grade scale.
//!
//! # Responsibility
//! - Model the (record, grader) assignment lifecycle as a tagged enum.
//! - Keep the numeric wire encoding (999/-1/-2/503/404) a storage detail.
//!
//! # Invariants
//! - Only `Approved` grades carry statistical meaning; every other state is
//!   excluded from agreement computation.
//! - Wire values round-trip: `from_wire(state.wire_value()) == Some(state)`.

use serde::{Deserialize, Serialize};

/// Confirmed grade on the three-level usability scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovedGrade {
    /// 0 — do not use.
    DoNotUse,
    /// 1 — maybe use.
    MaybeUse,
    /// 2 — definitely use.
    DefinitelyUse,
}

impl ApprovedGrade {
    /// Numeric value stored in the ledger and used by agreement statistics.
    pub fn value(self) -> i64 {
        match self {
            Self::DoNotUse => 0,
            Self::MaybeUse => 1,
            Self::DefinitelyUse => 2,
        }
    }

    /// Parses a stored numeric grade value.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::DoNotUse),
            1 => Some(Self::MaybeUse),
            2 => Some(Self::DefinitelyUse),
            _ => None,
        }
    }

    /// Short label shown in prompts and progress output.
    pub fn label(self) -> &'static str {
        match self {
            Self::DoNotUse => "do not use",
            Self::MaybeUse => "maybe use",
            Self::DefinitelyUse => "definitely use",
        }
    }
}

/// Lifecycle state of one (record, grader, criteria) assignment.
///
/// The ledger stores these as the historical numeric sentinels; the rest of
/// the core only ever sees this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeState {
    /// Waiting in the grader's queue (wire 999).
    Queued,
    /// Graded on the 0/1/2 scale.
    Approved(ApprovedGrade),
    /// Grader could not decide; a skip reason was recorded (wire -1).
    Skipped,
    /// Flagged for clinician review (wire -2).
    Escalated,
    /// Outside the clinical scope of the cohort (wire 503).
    OutOfScope,
    /// Report text could not be located in the source store (wire 404).
    Missing,
}

impl GradeState {
    /// Numeric wire encoding used by the relational ledger.
    pub fn wire_value(self) -> i64 {
        match self {
            Self::Queued => 999,
            Self::Approved(grade) => grade.value(),
            Self::Skipped => -1,
            Self::Escalated => -2,
            Self::OutOfScope => 503,
            Self::Missing => 404,
        }
    }

    /// Parses a stored wire value; unknown values are rejected by read paths.
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            999 => Some(Self::Queued),
            0 | 1 | 2 => ApprovedGrade::from_value(value).map(Self::Approved),
            -1 => Some(Self::Skipped),
            -2 => Some(Self::Escalated),
            503 => Some(Self::OutOfScope),
            404 => Some(Self::Missing),
            _ => None,
        }
    }

    /// Returns the confirmed grade when this state carries one.
    pub fn approved(self) -> Option<ApprovedGrade> {
        match self {
            Self::Approved(grade) => Some(grade),
            _ => None,
        }
    }

    /// Whether this state is resolved (anything but `Queued`).
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Queued)
    }

    /// Whether this state entitles the assignment to a skip-record row.
    pub fn needs_skip_record(self) -> bool {
        matches!(self, Self::Skipped | Self::Escalated | Self::OutOfScope)
    }
}

impl std::fmt::Display for GradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Approved(grade) => write!(f, "approved({})", grade.value()),
            Self::Skipped => write!(f, "skipped"),
            Self::Escalated => write!(f, "escalated"),
            Self::OutOfScope => write!(f, "out_of_scope"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApprovedGrade, GradeState};

    #[test]
    fn wire_values_round_trip() {
        let states = [
            GradeState::Queued,
            GradeState::Approved(ApprovedGrade::DoNotUse),
            GradeState::Approved(ApprovedGrade::MaybeUse),
            GradeState::Approved(ApprovedGrade::DefinitelyUse),
            GradeState::Skipped,
            GradeState::Escalated,
            GradeState::OutOfScope,
            GradeState::Missing,
        ];
        for state in states {
            assert_eq!(GradeState::from_wire(state.wire_value()), Some(state));
        }
    }

    #[test]
    fn unknown_wire_values_are_rejected() {
        assert_eq!(GradeState::from_wire(3), None);
        assert_eq!(GradeState::from_wire(-3), None);
        assert_eq!(GradeState::from_wire(500), None);
    }

    #[test]
    fn only_approved_states_carry_a_grade() {
        assert_eq!(
            GradeState::Approved(ApprovedGrade::MaybeUse).approved(),
            Some(ApprovedGrade::MaybeUse)
        );
        assert_eq!(GradeState::Queued.approved(), None);
        assert_eq!(GradeState::Skipped.approved(), None);
    }
}

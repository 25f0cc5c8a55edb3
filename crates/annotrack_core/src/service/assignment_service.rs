//! Grade state machine.
//!
//! # Responsibility
//! - Advance one (record, grader, criteria) assignment at a time through its
//!   lifecycle and write the result back to the ledger.
//! - Keep the skip-record audit trail consistent with every transition that
//!   leaves the happy path.
//!
//! # Invariants
//! - Transitions validate the current state before writing; an assignment is
//!   never moved out of a state that does not admit the transition.
//! - Skip and regrade commits require reasons above the minimum length.
//! - A grade update whose companion skip-record write fails is surfaced as a
//!   fatal inconsistency, never retried with a different reason.

use crate::model::assignment::{AssignmentKey, GradeAssignment, RecordId};
use crate::model::grade::{ApprovedGrade, GradeState};
use crate::model::skip::{SkipRecord, OUT_OF_SCOPE_REASON};
use crate::prompt::MIN_REASON_LEN;
use crate::repo::grade_repo::{GradeLedger, LedgerError};
use crate::service::today;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TransitionResult<T> = Result<T, TransitionError>;

/// State machine errors.
#[derive(Debug)]
pub enum TransitionError {
    AssignmentNotFound(AssignmentKey),
    /// Escalation was attempted without the clinician-flag capability.
    CapabilityNotEnabled { capability: &'static str },
    InvalidTransition {
        from: GradeState,
        attempted: GradeState,
    },
    ReasonTooShort { len: usize },
    /// Grade updated but the companion skip-record write failed; the ledger
    /// needs manual reconciliation.
    InconsistentCommit {
        key: AssignmentKey,
        source: LedgerError,
    },
    Ledger(LedgerError),
}

impl Display for TransitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AssignmentNotFound(key) => write!(f, "assignment not found: {key}"),
            Self::CapabilityNotEnabled { capability } => {
                write!(f, "capability not enabled: {capability}")
            }
            Self::InvalidTransition { from, attempted } => {
                write!(f, "cannot transition assignment from {from} to {attempted}")
            }
            Self::ReasonTooShort { len } => write!(
                f,
                "reason of {len} characters is too short; at least {MIN_REASON_LEN} required"
            ),
            Self::InconsistentCommit { key, source } => write!(
                f,
                "grade for {key} was written but its skip record was not ({source}); manual reconciliation required"
            ),
            Self::Ledger(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TransitionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InconsistentCommit { source, .. } => Some(source),
            Self::Ledger(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LedgerError> for TransitionError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NotFound(key) => Self::AssignmentNotFound(key),
            other => Self::Ledger(other),
        }
    }
}

/// Target of a regrade: a skipped/escalated assignment may only move to a
/// confirmed grade or to clinician escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegradeTarget {
    Approve(ApprovedGrade),
    Escalate,
}

/// Use-case service advancing assignment state.
pub struct AssignmentService<'a, L: GradeLedger> {
    ledger: &'a L,
}

impl<'a, L: GradeLedger> AssignmentService<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Commits a confirmed grade on a queued assignment.
    pub fn approve(&self, key: &AssignmentKey, grade: ApprovedGrade) -> TransitionResult<()> {
        let state = GradeState::Approved(grade);
        self.require_state(key, GradeState::Queued, state)?;
        self.ledger.update_state(key, state, Some(today()))?;
        info!(
            "event=grade_commit module=state_machine status=ok record={} grader={} state={state}",
            key.record_id, key.grader_name
        );
        Ok(())
    }

    /// Skips a queued assignment with a grader-supplied reason.
    pub fn skip(&self, key: &AssignmentKey, reason: &str) -> TransitionResult<()> {
        self.leave_queue_with_reason(key, GradeState::Skipped, reason)
    }

    /// Escalates a queued assignment for clinician review.
    ///
    /// Only available when the capture session runs with the clinician flag;
    /// callers without it must steer the grader to `skip` instead.
    pub fn escalate(
        &self,
        key: &AssignmentKey,
        clinician_flag: bool,
        reason: &str,
    ) -> TransitionResult<()> {
        if !clinician_flag {
            return Err(TransitionError::CapabilityNotEnabled {
                capability: "clinician-flag",
            });
        }
        self.leave_queue_with_reason(key, GradeState::Escalated, reason)
    }

    /// Marks a queued assignment as outside the cohort's clinical scope.
    pub fn out_of_scope(&self, key: &AssignmentKey) -> TransitionResult<()> {
        let state = GradeState::OutOfScope;
        self.require_state(key, GradeState::Queued, state)?;
        let date = today();
        self.ledger.update_state(key, state, Some(date))?;
        self.insert_skip_or_flag(
            key,
            SkipRecord::logged(
                key.record_id.clone(),
                state,
                key.grader_name.clone(),
                date,
                OUT_OF_SCOPE_REASON,
                key.grade_criteria.clone(),
            ),
        )?;
        info!(
            "event=grade_commit module=state_machine status=ok record={} grader={} state={state}",
            key.record_id, key.grader_name
        );
        Ok(())
    }

    /// System-driven transition: flips every still-queued assignment of a
    /// record to Missing when its text cannot be located at serving time.
    pub fn mark_missing(&self, record_id: &RecordId) -> TransitionResult<usize> {
        let changed = self.ledger.mark_missing_all(record_id, today())?;
        warn!(
            "event=record_missing module=state_machine status=ok record={record_id} affected={changed}"
        );
        Ok(changed)
    }

    /// Administrative batch reset back to Queued with a cleared date.
    ///
    /// Only for an explicitly enumerated, pre-validated assignment list;
    /// every key is checked for existence before any row is touched.
    pub fn release(&self, keys: &[AssignmentKey]) -> TransitionResult<usize> {
        for key in keys {
            if self.ledger.find(key)?.is_none() {
                return Err(TransitionError::AssignmentNotFound(key.clone()));
            }
        }
        for key in keys {
            self.ledger.update_state(key, GradeState::Queued, None)?;
        }
        info!(
            "event=assignments_released module=state_machine status=ok count={}",
            keys.len()
        );
        Ok(keys.len())
    }

    /// Regrades a skipped or escalated assignment.
    ///
    /// The skip record is updated with the regrade reason and date; when the
    /// original skip was never logged, a row carrying only regrade fields is
    /// inserted instead.
    pub fn regrade(
        &self,
        key: &AssignmentKey,
        target: RegradeTarget,
        reason: &str,
    ) -> TransitionResult<GradeState> {
        check_reason(reason)?;

        let current = self.current_state(key)?;
        let state = match target {
            RegradeTarget::Approve(grade) => GradeState::Approved(grade),
            RegradeTarget::Escalate => GradeState::Escalated,
        };
        if !matches!(current, GradeState::Skipped | GradeState::Escalated) {
            return Err(TransitionError::InvalidTransition {
                from: current,
                attempted: state,
            });
        }

        let date = today();
        self.ledger.update_state(key, state, Some(date))?;

        let updated = self
            .ledger
            .record_regrade(
                &key.record_id,
                &key.grader_name,
                &key.grade_criteria,
                state,
                reason,
                date,
            )
            .map_err(|source| TransitionError::InconsistentCommit {
                key: key.clone(),
                source,
            })?;

        if !updated {
            self.insert_skip_or_flag(
                key,
                SkipRecord::regrade_only(
                    key.record_id.clone(),
                    state,
                    key.grader_name.clone(),
                    date,
                    reason,
                    key.grade_criteria.clone(),
                ),
            )?;
        }

        info!(
            "event=regrade_commit module=state_machine status=ok record={} grader={} state={state}",
            key.record_id, key.grader_name
        );
        Ok(state)
    }

    fn leave_queue_with_reason(
        &self,
        key: &AssignmentKey,
        state: GradeState,
        reason: &str,
    ) -> TransitionResult<()> {
        check_reason(reason)?;
        self.require_state(key, GradeState::Queued, state)?;

        let date = today();
        self.ledger.update_state(key, state, Some(date))?;
        self.insert_skip_or_flag(
            key,
            SkipRecord::logged(
                key.record_id.clone(),
                state,
                key.grader_name.clone(),
                date,
                reason,
                key.grade_criteria.clone(),
            ),
        )?;
        info!(
            "event=grade_commit module=state_machine status=ok record={} grader={} state={state}",
            key.record_id, key.grader_name
        );
        Ok(())
    }

    fn insert_skip_or_flag(
        &self,
        key: &AssignmentKey,
        record: SkipRecord,
    ) -> TransitionResult<()> {
        self.ledger
            .insert_skip(&record)
            .map_err(|source| TransitionError::InconsistentCommit {
                key: key.clone(),
                source,
            })
    }

    fn current_state(&self, key: &AssignmentKey) -> TransitionResult<GradeState> {
        self.ledger
            .find(key)?
            .map(|assignment: GradeAssignment| assignment.state)
            .ok_or_else(|| TransitionError::AssignmentNotFound(key.clone()))
    }

    fn require_state(
        &self,
        key: &AssignmentKey,
        expected: GradeState,
        attempted: GradeState,
    ) -> TransitionResult<()> {
        let current = self.current_state(key)?;
        if current != expected {
            return Err(TransitionError::InvalidTransition {
                from: current,
                attempted,
            });
        }
        Ok(())
    }
}

fn check_reason(reason: &str) -> TransitionResult<()> {
    let len = reason.trim().len();
    if len < MIN_REASON_LEN {
        return Err(TransitionError::ReasonTooShort { len });
    }
    Ok(())
}

//! Self-evaluation gate.
//!
//! # Responsibility
//! - Track a grader's progress through the calibration example set.
//! - Serve calibration records, commit the grade/reason pair and expose the
//!   other graders' answers as read-only feedback.
//!
//! # Invariants
//! - Any queued calibration assignment blocks Reliability and Unique work.
//! - Feedback never includes the requesting grader's own row and never
//!   alters any recorded grade.

use crate::model::assignment::{GradeAssignment, GradeCategory, RecordId};
use crate::model::grade::{ApprovedGrade, GradeState};
use crate::prompt::{capture_calibration_grade, Prompter};
use crate::repo::grade_repo::{GradeLedger, GradeQuery, LedgerError};
use crate::repo::report_repo::{ReportStore, ReportStoreError};
use crate::service::today;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SelfEvalResult<T> = Result<T, SelfEvalError>;

#[derive(Debug)]
pub enum SelfEvalError {
    Ledger(LedgerError),
    ReportStore(ReportStoreError),
}

impl Display for SelfEvalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(err) => write!(f, "{err}"),
            Self::ReportStore(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SelfEvalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            Self::ReportStore(err) => Some(err),
        }
    }
}

impl From<LedgerError> for SelfEvalError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<ReportStoreError> for SelfEvalError {
    fn from(value: ReportStoreError) -> Self {
        Self::ReportStore(value)
    }
}

/// Where a grader stands in the calibration phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfEvalStatus {
    /// No calibration assignments exist yet.
    NotStarted,
    /// Some calibration assignments are still queued.
    InProgress { remaining: u32 },
    /// Every calibration assignment carries a confirmed grade.
    Complete,
}

/// One peer's answer for a calibration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFeedback {
    pub grader_name: String,
    pub grade: ApprovedGrade,
    pub reason: String,
}

/// Outcome of grading one calibration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfEvalOutcome {
    pub record_id: RecordId,
    pub grade: ApprovedGrade,
    pub feedback: Vec<PeerFeedback>,
}

/// Use-case service for the calibration gate.
pub struct SelfEvalService<'a, L: GradeLedger, R: ReportStore> {
    ledger: &'a L,
    reports: &'a R,
}

impl<'a, L: GradeLedger, R: ReportStore> SelfEvalService<'a, L, R> {
    pub fn new(ledger: &'a L, reports: &'a R) -> Self {
        Self { ledger, reports }
    }

    /// Gate state derived from the grader's calibration assignments.
    pub fn status(&self, grader: &str) -> SelfEvalResult<SelfEvalStatus> {
        let assignments = self.ledger.query(&GradeQuery {
            grader_name: Some(grader.to_string()),
            category: Some(GradeCategory::SelfEval),
            ..GradeQuery::default()
        })?;

        if assignments.is_empty() {
            return Ok(SelfEvalStatus::NotStarted);
        }

        let remaining = assignments
            .iter()
            .filter(|assignment| assignment.state == GradeState::Queued)
            .count() as u32;
        if remaining > 0 {
            return Ok(SelfEvalStatus::InProgress { remaining });
        }

        Ok(SelfEvalStatus::Complete)
    }

    /// Next queued calibration assignment, if any.
    pub fn next_queued(&self, grader: &str) -> SelfEvalResult<Option<GradeAssignment>> {
        let mut queued = self.ledger.query(&GradeQuery {
            grader_name: Some(grader.to_string()),
            category: Some(GradeCategory::SelfEval),
            state: Some(GradeState::Queued),
            limit: Some(1),
            ..GradeQuery::default()
        })?;
        Ok(queued.pop())
    }

    /// Commits a calibration grade and its reason, then returns peer
    /// feedback for the same record.
    pub fn submit(
        &self,
        grader: &str,
        assignment: &GradeAssignment,
        grade: ApprovedGrade,
        reason: &str,
    ) -> SelfEvalResult<SelfEvalOutcome> {
        self.ledger.update_state(
            &assignment.key(),
            GradeState::Approved(grade),
            Some(today()),
        )?;
        self.ledger
            .upsert_self_eval_reason(&assignment.record_id, grader, reason)?;
        info!(
            "event=self_eval_commit module=self_eval status=ok record={} grader={grader} grade={}",
            assignment.record_id,
            grade.value()
        );

        let feedback = self.feedback(grader, &assignment.record_id)?;
        Ok(SelfEvalOutcome {
            record_id: assignment.record_id.clone(),
            grade,
            feedback,
        })
    }

    /// Read-only peer answers for a calibration record, excluding the
    /// requesting grader and any peer row still queued.
    pub fn feedback(&self, grader: &str, record_id: &str) -> SelfEvalResult<Vec<PeerFeedback>> {
        let peers = self.ledger.query(&GradeQuery {
            category: Some(GradeCategory::SelfEval),
            record_ids: Some(vec![record_id.to_string()]),
            ..GradeQuery::default()
        })?;
        let reasons = self.ledger.self_eval_reasons(record_id)?;

        let mut feedback = Vec::new();
        for peer in peers {
            if peer.grader_name == grader {
                continue;
            }
            let Some(grade) = peer.state.approved() else {
                continue;
            };
            let reason = reasons
                .iter()
                .find(|(name, _)| *name == peer.grader_name)
                .map(|(_, reason)| reason.clone())
                .unwrap_or_default();
            feedback.push(PeerFeedback {
                grader_name: peer.grader_name,
                grade,
                reason,
            });
        }

        Ok(feedback)
    }

    /// Serves and grades the next calibration record through the prompt
    /// capability. Records with no locatable text are flipped to Missing and
    /// skipped. Returns `None` once the grader's calibration queue is empty.
    pub fn grade_next(
        &self,
        grader: &str,
        prompter: &mut dyn Prompter,
    ) -> SelfEvalResult<Option<SelfEvalOutcome>> {
        while let Some(assignment) = self.next_queued(grader)? {
            let Some(record) = self.reports.fetch(&assignment.record_id)? else {
                self.ledger
                    .mark_missing_all(&assignment.record_id, today())?;
                prompter.notify(&format!(
                    "Calibration report {} could not be located and was flagged for technical review.",
                    assignment.record_id
                ));
                continue;
            };

            prompter.notify(&record.body());
            let grade = capture_calibration_grade(prompter);
            let reason = prompter.ask("Why does this report get that grade? ");
            let outcome = self.submit(grader, &assignment, grade, reason.trim())?;

            if outcome.feedback.is_empty() {
                prompter.notify("No other graders have graded this report yet.");
            } else {
                prompter.notify(
                    "For reference, other graders have given this report the following grades \
for the specified reasons:",
                );
                for peer in &outcome.feedback {
                    prompter.notify(&format!(
                        "Grade: {} For reason: {}",
                        peer.grade.value(),
                        peer.reason
                    ));
                }
            }

            return Ok(Some(outcome));
        }

        Ok(None)
    }
}

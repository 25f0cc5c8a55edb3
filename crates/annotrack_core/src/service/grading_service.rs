//! Grading session orchestration.
//!
//! # Responsibility
//! - Derive a grader's workflow phase and seed the assignments that phase
//!   needs.
//! - Serve queued assignments one at a time through the prompt capability
//!   and commit the grader's decision via the state machine.
//! - Drive the regrade workflow over previously skipped/escalated work.
//!
//! # Invariants
//! - Reliability work is served exclusively until exhausted; Unique work
//!   only after.
//! - Records with no locatable text flip to Missing and are reported, never
//!   served and never fatal to the batch.

use crate::model::assignment::{AssignmentKey, GradeAssignment, GradeCategory, RecordId};
use crate::model::grade::GradeState;
use crate::model::record::ReportRecord;
use crate::prompt::{
    capture_grade, capture_reason, CaptureOptions, GradeDecision, Prompter, ReasonKind,
};
use crate::reliability_set::ReliabilitySet;
use crate::repo::grade_repo::{GradeLedger, GradeQuery, LedgerError};
use crate::repo::report_repo::{ReportStore, ReportStoreError};
use crate::service::allocation_service::{seed_reliability, seed_self_eval};
use crate::service::assignment_service::{
    AssignmentService, RegradeTarget, TransitionError,
};
use crate::service::self_eval_service::{SelfEvalService, SelfEvalStatus};
use crate::service::today;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug)]
pub enum SessionError {
    Ledger(LedgerError),
    ReportStore(ReportStoreError),
    Transition(TransitionError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(err) => write!(f, "{err}"),
            Self::ReportStore(err) => write!(f, "{err}"),
            Self::Transition(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            Self::ReportStore(err) => Some(err),
            Self::Transition(err) => Some(err),
        }
    }
}

impl From<LedgerError> for SessionError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<ReportStoreError> for SessionError {
    fn from(value: ReportStoreError) -> Self {
        Self::ReportStore(value)
    }
}

impl From<TransitionError> for SessionError {
    fn from(value: TransitionError) -> Self {
        Self::Transition(value)
    }
}

impl From<crate::service::self_eval_service::SelfEvalError> for SessionError {
    fn from(value: crate::service::self_eval_service::SelfEvalError) -> Self {
        use crate::service::self_eval_service::SelfEvalError;
        match value {
            SelfEvalError::Ledger(err) => Self::Ledger(err),
            SelfEvalError::ReportStore(err) => Self::ReportStore(err),
        }
    }
}

/// Session behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Enables the escalation decision during grade capture.
    pub clinician_flag: bool,
}

/// Where a grader stands in the ordered workflow progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraderPhase {
    SelfEval { remaining: u32 },
    Reliability { remaining: u32 },
    Unique { queued: u32 },
}

/// One queued assignment paired with its report text, ready to serve.
#[derive(Debug, Clone)]
pub struct ServingItem {
    pub assignment: GradeAssignment,
    pub record: ReportRecord,
}

/// A batch of servable work plus the ids dropped as missing.
#[derive(Debug, Clone, Default)]
pub struct ServingBatch {
    pub items: Vec<ServingItem>,
    pub missing: Vec<RecordId>,
}

/// A committed grading decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub key: AssignmentKey,
    pub state: GradeState,
}

/// Outcome of one regrade interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegradeOutcome {
    Committed(CommitResult),
    /// The grader kept the assignment in its skip branch.
    Unchanged { key: AssignmentKey },
}

/// One human-paced grading session for a single grader.
pub struct GradingService<'a, L: GradeLedger, R: ReportStore> {
    ledger: &'a L,
    reports: &'a R,
    session_id: Uuid,
}

impl<'a, L: GradeLedger, R: ReportStore> GradingService<'a, L, R> {
    pub fn new(ledger: &'a L, reports: &'a R) -> Self {
        let session_id = Uuid::new_v4();
        info!("event=session_start module=session status=ok session={session_id}");
        Self {
            ledger,
            reports,
            session_id,
        }
    }

    /// Derives the grader's phase and seeds the assignments it needs.
    pub fn welcome(
        &self,
        grader: &str,
        reliability: &ReliabilitySet,
        self_eval_examples: &[RecordId],
        grade_criteria: &str,
    ) -> SessionResult<GraderPhase> {
        let gate = SelfEvalService::new(self.ledger, self.reports);
        let phase = match gate.status(grader)? {
            SelfEvalStatus::NotStarted => {
                let added =
                    seed_self_eval(self.ledger, grader, self_eval_examples, grade_criteria)?;
                GraderPhase::SelfEval {
                    remaining: added as u32,
                }
            }
            SelfEvalStatus::InProgress { remaining } => GraderPhase::SelfEval { remaining },
            SelfEvalStatus::Complete => {
                seed_reliability(self.ledger, grader, reliability, grade_criteria)?;
                let backlog = self.ledger.query(&GradeQuery {
                    grader_name: Some(grader.to_string()),
                    category: Some(GradeCategory::Reliability),
                    state: Some(GradeState::Queued),
                    ..GradeQuery::default()
                })?;
                if backlog.is_empty() {
                    GraderPhase::Unique {
                        queued: self.ledger.ungraded_count(grader)?,
                    }
                } else {
                    GraderPhase::Reliability {
                        remaining: backlog.len() as u32,
                    }
                }
            }
        };

        info!(
            "event=welcome module=session status=ok session={} grader={grader} phase={phase:?}",
            self.session_id
        );
        Ok(phase)
    }

    /// Next servable assignments: reliability first, then Unique, both in
    /// record id order, joined with their report text.
    pub fn next_queue(&self, grader: &str, limit: u32) -> SessionResult<ServingBatch> {
        let mut queued = self.queued_assignments(grader, GradeCategory::Reliability, limit)?;
        if queued.is_empty() {
            queued = self.queued_assignments(grader, GradeCategory::Unique, limit)?;
        }

        let record_ids: Vec<RecordId> = queued
            .iter()
            .map(|assignment| assignment.record_id.clone())
            .collect();
        let fetched = self.reports.fetch_batch(&record_ids)?;

        for missing_id in &fetched.missing {
            self.ledger.mark_missing_all(missing_id, today())?;
            info!(
                "event=record_missing module=session status=dropped session={} record={missing_id}",
                self.session_id
            );
        }

        let mut batch = ServingBatch {
            missing: fetched.missing,
            ..ServingBatch::default()
        };
        for record in fetched.found {
            if let Some(assignment) = queued
                .iter()
                .find(|assignment| assignment.record_id == record.record_id)
            {
                batch.items.push(ServingItem {
                    assignment: assignment.clone(),
                    record,
                });
            }
        }

        Ok(batch)
    }

    /// Serves one queued assignment through the prompt capability and
    /// commits the grader's confirmed decision.
    ///
    /// Returns `None` when the grader's queue is exhausted.
    pub fn grade_next(
        &self,
        grader: &str,
        prompter: &mut dyn Prompter,
        options: SessionOptions,
    ) -> SessionResult<Option<CommitResult>> {
        loop {
            let batch = self.next_queue(grader, 1)?;
            let Some(item) = batch.items.into_iter().next() else {
                if batch.missing.is_empty() {
                    return Ok(None);
                }
                // Missing records were consumed from the queue; try the next
                // candidates.
                continue;
            };

            self.present(&item, prompter);
            let decision = capture_grade(
                prompter,
                CaptureOptions {
                    clinician_flag: options.clinician_flag,
                },
            );

            let key = item.assignment.key();
            let machine = AssignmentService::new(self.ledger);
            let state = match decision {
                GradeDecision::Approve(grade) => {
                    machine.approve(&key, grade)?;
                    GradeState::Approved(grade)
                }
                GradeDecision::Skip => {
                    let reason = capture_reason(prompter, ReasonKind::Skip);
                    machine.skip(&key, &reason)?;
                    GradeState::Skipped
                }
                GradeDecision::Escalate => {
                    let reason = capture_reason(prompter, ReasonKind::Skip);
                    machine.escalate(&key, options.clinician_flag, &reason)?;
                    GradeState::Escalated
                }
                GradeDecision::OutOfScope => {
                    machine.out_of_scope(&key)?;
                    GradeState::OutOfScope
                }
            };

            prompter.notify("Grade saved.");
            return Ok(Some(CommitResult { key, state }));
        }
    }

    /// Serves the next skipped/escalated assignment for regrading.
    ///
    /// `level` selects the skip branch to review (`Skipped` for peer skips,
    /// `Escalated` for clinician flags). Returns `None` when nothing is
    /// waiting at that level.
    pub fn regrade_next(
        &self,
        grader: Option<&str>,
        level: GradeState,
        prompter: &mut dyn Prompter,
    ) -> SessionResult<Option<RegradeOutcome>> {
        loop {
            let mut flagged = self.ledger.query(&GradeQuery {
                grader_name: grader.map(str::to_string),
                state: Some(level),
                limit: Some(1),
                ..GradeQuery::default()
            })?;
            let Some(assignment) = flagged.pop() else {
                prompter.notify(&format!(
                    "There are currently no reports with the grade of {level}."
                ));
                return Ok(None);
            };

            let Some(record) = self.reports.fetch(&assignment.record_id)? else {
                self.ledger
                    .mark_missing_all(&assignment.record_id, today())?;
                prompter.notify(&format!(
                    "Report {} could not be located and was flagged for technical review.",
                    assignment.record_id
                ));
                continue;
            };

            let skip = self.ledger.find_skip(
                &assignment.record_id,
                &assignment.grader_name,
                &assignment.grade_criteria,
            )?;
            prompter.notify(&format!("Grader: {}", assignment.grader_name));
            prompter.notify(&format!("Grading criteria: {}", assignment.grade_criteria));
            match &skip {
                Some(skip) if !skip.skip_reason.is_empty() => {
                    prompter.notify(&format!("Reason report was flagged: {}", skip.skip_reason));
                }
                _ => prompter.notify("Skipped reason not available."),
            }

            self.present(
                &ServingItem {
                    assignment: assignment.clone(),
                    record,
                },
                prompter,
            );

            // Regrade review always runs with the clinician capability.
            let decision = capture_grade(
                prompter,
                CaptureOptions {
                    clinician_flag: true,
                },
            );

            let key = assignment.key();
            let machine = AssignmentService::new(self.ledger);
            let outcome = match decision {
                GradeDecision::Approve(grade) => {
                    let reason = capture_reason(prompter, ReasonKind::Regrade);
                    let state = machine.regrade(&key, RegradeTarget::Approve(grade), &reason)?;
                    RegradeOutcome::Committed(CommitResult { key, state })
                }
                GradeDecision::Escalate if assignment.state == GradeState::Skipped => {
                    let reason = capture_reason(prompter, ReasonKind::Regrade);
                    let state = machine.regrade(&key, RegradeTarget::Escalate, &reason)?;
                    RegradeOutcome::Committed(CommitResult { key, state })
                }
                _ => {
                    prompter.notify("The report stays in its current skip state.");
                    RegradeOutcome::Unchanged { key }
                }
            };

            if let RegradeOutcome::Committed(_) = &outcome {
                prompter.notify("New grade saved.");
            }
            return Ok(Some(outcome));
        }
    }

    fn queued_assignments(
        &self,
        grader: &str,
        category: GradeCategory,
        limit: u32,
    ) -> SessionResult<Vec<GradeAssignment>> {
        let queued = self.ledger.query(&GradeQuery {
            grader_name: Some(grader.to_string()),
            category: Some(category),
            state: Some(GradeState::Queued),
            limit: Some(limit),
            ..GradeQuery::default()
        })?;
        Ok(queued)
    }

    fn present(&self, item: &ServingItem, prompter: &mut dyn Prompter) {
        prompter.notify(&format!("Report ID: {}", item.assignment.record_id));
        if let Some(year) = item.assignment.proc_ord_year {
            prompter.notify(&format!("Year of scan: {year}"));
        }
        if let Some(days) = item.assignment.age_in_days {
            let years = (days as f64 / 365.25 * 100.0).round() / 100.0;
            prompter.notify(&format!("Age at scan: {years} years"));
        }
        prompter.notify(&format!(
            "Grading criteria: {}",
            item.assignment.grade_criteria
        ));
        if item.assignment.category == GradeCategory::Reliability {
            prompter.notify("This is a Reliability report, not a unique report");
        } else if let Some(project) = &item.assignment.project {
            prompter.notify(&format!("Project: {project}"));
        }
        prompter.notify(&item.record.body());
    }
}

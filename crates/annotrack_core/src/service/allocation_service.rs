//! Task allocator.
//!
//! # Responsibility
//! - Populate a grader's queue with the next records to grade, honoring the
//!   ordered priority: self-evaluation gate, reliability backlog, then
//!   validation/new Unique candidates.
//! - Seed the reliability and self-evaluation assignment sets.
//!
//! # Invariants
//! - No Unique or Reliability work is issued before the self-evaluation gate
//!   is complete.
//! - A record is never newly admitted as validation work once the cap of
//!   other graders holds confirmed grades for it (best-effort bound; see the
//!   concurrency notes on the ledger).
//! - Umbrella cohort identifiers are rejected before any allocation work.
//! - Records whose text is absent from the source store are marked Missing
//!   and reported, never silently dropped or allowed to fail the batch.

use crate::config::{CandidateSortKey, CohortConfigSet, CohortProject, ConfigError, SortField};
use crate::model::assignment::{GradeAssignment, GradeCategory, RecordId};
use crate::model::grade::GradeState;
use crate::reliability_set::ReliabilitySet;
use crate::repo::grade_repo::{
    CandidateKind, GradeLedger, GradeQuery, LedgerError, UniqueCandidate, ValidationCandidateSpec,
};
use crate::repo::report_repo::{ReportStore, ReportStoreError};
use crate::service::self_eval_service::{SelfEvalService, SelfEvalStatus};
use crate::service::today;
use log::{info, warn};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Origin marker written onto assignments created by the allocator.
pub const PROCEDURE_ORDER_ORIGIN: &str = "procedure_order";

pub type AllocationResult<T> = Result<T, AllocationError>;

/// Allocator errors.
#[derive(Debug)]
pub enum AllocationError {
    /// The self-evaluation gate is not complete; no real work is issued.
    SelfEvalIncomplete { grader: String, remaining: u32 },
    /// The cohort identifier is an umbrella over configured sub-cohorts.
    CohortTooBroad(String),
    Config(ConfigError),
    Ledger(LedgerError),
    ReportStore(ReportStoreError),
}

impl Display for AllocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfEvalIncomplete { grader, remaining } => write!(
                f,
                "grader `{grader}` must finish the self-evaluation first ({remaining} remaining)"
            ),
            Self::CohortTooBroad(name) => write!(
                f,
                "cohort `{name}` is too broad; use a specific sub-cohort identifier"
            ),
            Self::Config(err) => write!(f, "{err}"),
            Self::Ledger(err) => write!(f, "{err}"),
            Self::ReportStore(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AllocationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Ledger(err) => Some(err),
            Self::ReportStore(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for AllocationError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<LedgerError> for AllocationError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<ReportStoreError> for AllocationError {
    fn from(value: ReportStoreError) -> Self {
        Self::ReportStore(value)
    }
}

impl From<crate::service::self_eval_service::SelfEvalError> for AllocationError {
    fn from(value: crate::service::self_eval_service::SelfEvalError) -> Self {
        use crate::service::self_eval_service::SelfEvalError;
        match value {
            SelfEvalError::Ledger(err) => Self::Ledger(err),
            SelfEvalError::ReportStore(err) => Self::ReportStore(err),
        }
    }
}

/// Allocation policy knobs, passed in explicitly at construction.
#[derive(Debug, Clone, Copy)]
pub struct AllocationConfig {
    /// Admission cap for validation coverage of a record.
    pub num_validation_graders: u32,
    /// Batch size used when the caller does not specify one.
    pub default_num_to_add: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            num_validation_graders: 2,
            default_num_to_add: 100,
        }
    }
}

/// Result of a Unique allocation run.
#[derive(Debug, Clone, Default)]
pub struct AllocationReport {
    /// Record ids enqueued, in serving order.
    pub added: Vec<RecordId>,
    pub validation_added: usize,
    pub new_added: usize,
    /// Ids dropped because their text is absent from the source store.
    pub missing: Vec<RecordId>,
    /// The grader's total queued assignment count after this run.
    pub queued_total: u32,
}

/// What an allocation call produced.
#[derive(Debug, Clone)]
pub enum AllocationOutcome {
    /// The grader still has reliability work; it is served exclusively.
    Reliability { queued: Vec<GradeAssignment> },
    /// New Unique assignments were enqueued.
    Unique(AllocationReport),
}

/// Use-case service selecting the next records for a grader.
pub struct AllocationService<'a, L: GradeLedger, R: ReportStore> {
    ledger: &'a L,
    reports: &'a R,
    cohorts: &'a CohortConfigSet,
    config: AllocationConfig,
}

impl<'a, L: GradeLedger, R: ReportStore> AllocationService<'a, L, R> {
    pub fn new(
        ledger: &'a L,
        reports: &'a R,
        cohorts: &'a CohortConfigSet,
        config: AllocationConfig,
    ) -> Self {
        Self {
            ledger,
            reports,
            cohorts,
            config,
        }
    }

    /// Populates the grader's queue for a cohort, per the ordered priority.
    pub fn allocate(
        &self,
        grader: &str,
        cohort_name: &str,
        num_to_add: Option<u32>,
    ) -> AllocationResult<AllocationOutcome> {
        if self.cohorts.is_umbrella(cohort_name) {
            return Err(AllocationError::CohortTooBroad(cohort_name.to_string()));
        }
        let cohort = self.cohorts.get(cohort_name)?;

        self.check_self_eval_gate(grader)?;

        let reliability_backlog = self.reliability_backlog(grader)?;
        if !reliability_backlog.is_empty() {
            info!(
                "event=allocation module=allocator status=reliability_backlog grader={grader} count={}",
                reliability_backlog.len()
            );
            return Ok(AllocationOutcome::Reliability {
                queued: reliability_backlog,
            });
        }

        let num_to_add = num_to_add.unwrap_or(self.config.default_num_to_add) as usize;
        let report = self.allocate_unique(grader, cohort, num_to_add)?;
        Ok(AllocationOutcome::Unique(report))
    }

    fn check_self_eval_gate(&self, grader: &str) -> AllocationResult<()> {
        let gate = SelfEvalService::new(self.ledger, self.reports);
        match gate.status(grader)? {
            SelfEvalStatus::Complete => Ok(()),
            SelfEvalStatus::NotStarted => Err(AllocationError::SelfEvalIncomplete {
                grader: grader.to_string(),
                remaining: 0,
            }),
            SelfEvalStatus::InProgress { remaining } => {
                Err(AllocationError::SelfEvalIncomplete {
                    grader: grader.to_string(),
                    remaining,
                })
            }
        }
    }

    /// Unresolved reliability assignments, record id ascending.
    pub fn reliability_backlog(&self, grader: &str) -> AllocationResult<Vec<GradeAssignment>> {
        let backlog = self.ledger.query(&GradeQuery {
            grader_name: Some(grader.to_string()),
            category: Some(GradeCategory::Reliability),
            state: Some(GradeState::Queued),
            ..GradeQuery::default()
        })?;
        Ok(backlog)
    }

    fn allocate_unique(
        &self,
        grader: &str,
        cohort: &CohortProject,
        num_to_add: usize,
    ) -> AllocationResult<AllocationReport> {
        let mut candidates = Vec::new();

        if cohort.validation {
            candidates.extend(self.ledger.validation_candidates(&ValidationCandidateSpec {
                project: cohort.name.clone(),
                grade_criteria: cohort.grade_criteria.clone(),
                exclude_grader: grader.to_string(),
                max_other_graders: self.config.num_validation_graders,
            })?);
        }
        candidates.extend(
            self.ledger
                .new_candidates(&cohort.name, &cohort.grade_criteria)?,
        );

        dedup_candidates(&mut candidates);
        sort_candidates(&mut candidates, cohort);
        candidates.truncate(num_to_add);

        let selected_ids: Vec<RecordId> = candidates
            .iter()
            .map(|candidate| candidate.meta.record_id.clone())
            .collect();
        let batch = self.reports.fetch_batch(&selected_ids)?;

        for missing_id in &batch.missing {
            // Serving such a record is impossible for every grader; all
            // pending assignments flip to Missing together.
            self.ledger.mark_missing_all(missing_id, today())?;
            warn!(
                "event=allocation_missing module=allocator status=dropped record={missing_id} grader={grader}"
            );
        }

        let missing: HashSet<&RecordId> = batch.missing.iter().collect();
        let mut report = AllocationReport {
            missing: batch.missing.clone(),
            ..AllocationReport::default()
        };

        for candidate in &candidates {
            if missing.contains(&candidate.meta.record_id) {
                continue;
            }

            let mut assignment = GradeAssignment::queued(
                candidate.meta.record_id.clone(),
                grader,
                GradeCategory::Unique,
                cohort.grade_criteria.clone(),
            );
            assignment.pat_id = candidate.meta.pat_id.clone();
            assignment.age_in_days = candidate.meta.age_in_days;
            assignment.proc_ord_year = candidate.meta.proc_ord_year;
            assignment.proc_name = candidate.meta.proc_name.clone();
            assignment.report_origin = PROCEDURE_ORDER_ORIGIN.to_string();
            assignment.project = Some(cohort.name.clone());

            self.ledger.insert(&assignment)?;
            report.added.push(candidate.meta.record_id.clone());
            match candidate.kind {
                CandidateKind::Validation => report.validation_added += 1,
                CandidateKind::New => report.new_added += 1,
            }
        }

        report.queued_total = self.ledger.ungraded_count(grader)?;
        info!(
            "event=allocation module=allocator status=ok grader={grader} cohort={} validation={} new={} missing={} queued_total={}",
            cohort.name,
            report.validation_added,
            report.new_added,
            report.missing.len(),
            report.queued_total
        );
        Ok(report)
    }

    /// Seeds any missing reliability-set assignments for the grader.
    pub fn seed_reliability(
        &self,
        grader: &str,
        set: &ReliabilitySet,
        grade_criteria: &str,
    ) -> AllocationResult<usize> {
        Ok(seed_reliability(self.ledger, grader, set, grade_criteria)?)
    }

    /// Seeds the calibration example set for a new grader.
    pub fn seed_self_eval(
        &self,
        grader: &str,
        example_ids: &[RecordId],
        grade_criteria: &str,
    ) -> AllocationResult<usize> {
        Ok(seed_self_eval(self.ledger, grader, example_ids, grade_criteria)?)
    }
}

/// Inserts reliability assignments the grader does not hold yet.
///
/// Idempotent: members already assigned are left untouched.
pub fn seed_reliability<L: GradeLedger>(
    ledger: &L,
    grader: &str,
    set: &ReliabilitySet,
    grade_criteria: &str,
) -> Result<usize, LedgerError> {
    let existing: HashSet<RecordId> = ledger
        .query(&GradeQuery {
            grader_name: Some(grader.to_string()),
            category: Some(GradeCategory::Reliability),
            ..GradeQuery::default()
        })?
        .into_iter()
        .map(|assignment| assignment.record_id)
        .collect();

    let mut added = 0;
    for member in set.members() {
        if existing.contains(&member.meta.record_id) {
            continue;
        }
        let mut assignment = GradeAssignment::queued(
            member.meta.record_id.clone(),
            grader,
            GradeCategory::Reliability,
            grade_criteria,
        );
        assignment.pat_id = member.meta.pat_id.clone();
        assignment.age_in_days = member.meta.age_in_days;
        assignment.proc_ord_year = member.meta.proc_ord_year;
        assignment.proc_name = member.meta.proc_name.clone();
        assignment.report_origin = member.report_origin.clone();
        ledger.insert(&assignment)?;
        added += 1;
    }

    if added > 0 {
        info!(
            "event=seed_reliability module=allocator status=ok grader={grader} added={added}"
        );
    }
    Ok(added)
}

/// Inserts calibration assignments the grader does not hold yet.
pub fn seed_self_eval<L: GradeLedger>(
    ledger: &L,
    grader: &str,
    example_ids: &[RecordId],
    grade_criteria: &str,
) -> Result<usize, LedgerError> {
    let existing: HashSet<RecordId> = ledger
        .query(&GradeQuery {
            grader_name: Some(grader.to_string()),
            category: Some(GradeCategory::SelfEval),
            ..GradeQuery::default()
        })?
        .into_iter()
        .map(|assignment| assignment.record_id)
        .collect();

    let mut added = 0;
    for record_id in example_ids {
        if existing.contains(record_id) {
            continue;
        }
        let assignment = GradeAssignment::queued(
            record_id.clone(),
            grader,
            GradeCategory::SelfEval,
            grade_criteria,
        );
        ledger.insert(&assignment)?;
        added += 1;
    }

    if added > 0 {
        info!("event=seed_self_eval module=allocator status=ok grader={grader} added={added}");
    }
    Ok(added)
}

fn dedup_candidates(candidates: &mut Vec<UniqueCandidate>) {
    let mut seen: HashSet<RecordId> = HashSet::new();
    candidates.retain(|candidate| seen.insert(candidate.meta.record_id.clone()));
}

/// Applies the cohort's configured multi-key order, optionally serving
/// validation-type rows first.
fn sort_candidates(candidates: &mut [UniqueCandidate], cohort: &CohortProject) {
    let prioritize_validation = cohort.validation && cohort.prioritize_validation;
    candidates.sort_by(|a, b| {
        if prioritize_validation {
            let by_kind = kind_rank(a.kind).cmp(&kind_rank(b.kind));
            if by_kind != Ordering::Equal {
                return by_kind;
            }
        }
        for key in &cohort.sort {
            let ordering = compare_by_key(a, b, key);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.meta.record_id.cmp(&b.meta.record_id)
    });
}

fn kind_rank(kind: CandidateKind) -> u8 {
    match kind {
        CandidateKind::Validation => 0,
        CandidateKind::New => 1,
    }
}

fn compare_by_key(a: &UniqueCandidate, b: &UniqueCandidate, key: &CandidateSortKey) -> Ordering {
    let ordering = match key.field {
        SortField::ProcOrdYear => cmp_option(a.meta.proc_ord_year, b.meta.proc_ord_year),
        SortField::AgeInDays => cmp_option(a.meta.age_in_days, b.meta.age_in_days),
        SortField::RecordId => a.meta.record_id.cmp(&b.meta.record_id),
        SortField::AvgGrade => a
            .avg_grade
            .partial_cmp(&b.avg_grade)
            .unwrap_or(Ordering::Equal),
        SortField::GraderCounter => a.counter.cmp(&b.counter),
    };
    if key.descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn cmp_option<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

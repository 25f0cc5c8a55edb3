//! Grading progress reporting.
//!
//! # Responsibility
//! - Summarize per-grader activity since a date, per-grader workflow status
//!   and per-cohort coverage, for the weekly interaction report and the
//!   status views.

use crate::model::assignment::GradeCategory;
use crate::model::grade::GradeState;
use crate::reliability_set::ReliabilitySet;
use crate::repo::grade_repo::{GradeLedger, GradeQuery, LedgerError};
use crate::repo::report_repo::{ReportStore, ReportStoreError};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ProgressResult<T> = Result<T, ProgressError>;

#[derive(Debug)]
pub enum ProgressError {
    Ledger(LedgerError),
    ReportStore(ReportStoreError),
}

impl Display for ProgressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(err) => write!(f, "{err}"),
            Self::ReportStore(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProgressError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            Self::ReportStore(err) => Some(err),
        }
    }
}

impl From<LedgerError> for ProgressError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<ReportStoreError> for ProgressError {
    fn from(value: ReportStoreError) -> Self {
        Self::ReportStore(value)
    }
}

/// One grader's grading activity over a reporting window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraderActivity {
    pub grader_name: String,
    pub graded: u32,
}

/// One grader's workflow status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraderStatus {
    pub reliability_assigned: u32,
    pub reliability_graded: u32,
    pub unique_assigned: u32,
    pub unique_graded: u32,
    /// Confirmed Unique grades, indexed by grade value 0/1/2.
    pub unique_histogram: [u32; 3],
}

/// Coverage snapshot for one cohort project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CohortStats {
    pub total_records: u32,
    /// Confirmed grades, indexed by grade value 0/1/2.
    pub graded: [u32; 3],
    pub queued: u32,
    pub skipped: u32,
}

/// Use-case service producing progress summaries.
pub struct ProgressService<'a, L: GradeLedger, R: ReportStore> {
    ledger: &'a L,
    reports: &'a R,
}

impl<'a, L: GradeLedger, R: ReportStore> ProgressService<'a, L, R> {
    pub fn new(ledger: &'a L, reports: &'a R) -> Self {
        Self { ledger, reports }
    }

    /// Per-grader counts of grades entered on or after the given date.
    ///
    /// Graders absent from the result have not graded since the date.
    pub fn grade_counts_since(&self, date: NaiveDate) -> ProgressResult<Vec<GraderActivity>> {
        let rows = self.ledger.query(&GradeQuery {
            min_grade_date: Some(date),
            ..GradeQuery::default()
        })?;

        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for row in rows {
            *counts.entry(row.grader_name).or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|(grader_name, graded)| GraderActivity {
                grader_name,
                graded,
            })
            .collect())
    }

    /// Reliability and Unique progress for one grader.
    pub fn grader_status(
        &self,
        grader: &str,
        reliability: &ReliabilitySet,
    ) -> ProgressResult<GraderStatus> {
        let mut status = GraderStatus::default();

        let reliability_rows = self.ledger.query(&GradeQuery {
            grader_name: Some(grader.to_string()),
            category: Some(GradeCategory::Reliability),
            ..GradeQuery::default()
        })?;
        for row in &reliability_rows {
            if !reliability.contains(&row.record_id) {
                continue;
            }
            status.reliability_assigned += 1;
            if row.state.is_resolved() {
                status.reliability_graded += 1;
            }
        }

        let unique_rows = self.ledger.query(&GradeQuery {
            grader_name: Some(grader.to_string()),
            category: Some(GradeCategory::Unique),
            ..GradeQuery::default()
        })?;
        for row in &unique_rows {
            status.unique_assigned += 1;
            if row.state.is_resolved() {
                status.unique_graded += 1;
            }
            if let Some(grade) = row.state.approved() {
                status.unique_histogram[grade.value() as usize] += 1;
            }
        }

        Ok(status)
    }

    /// Coverage snapshot for a cohort under one grading criteria.
    pub fn cohort_stats(&self, project: &str, grade_criteria: &str) -> ProgressResult<CohortStats> {
        let mut stats = CohortStats {
            total_records: self.reports.cohort_record_count(project)?,
            ..CohortStats::default()
        };

        let rows = self.ledger.query(&GradeQuery {
            project: Some(project.to_string()),
            grade_criteria: Some(grade_criteria.to_string()),
            ..GradeQuery::default()
        })?;
        for row in rows {
            match row.state {
                GradeState::Approved(grade) => stats.graded[grade.value() as usize] += 1,
                GradeState::Queued => stats.queued += 1,
                GradeState::Skipped | GradeState::Escalated => stats.skipped += 1,
                GradeState::OutOfScope | GradeState::Missing => {}
            }
        }

        Ok(stats)
    }
}

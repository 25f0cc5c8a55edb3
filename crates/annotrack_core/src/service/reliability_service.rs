//! Inter-rater reliability reporting over the ledger.
//!
//! # Responsibility
//! - Pull graders' rating vectors for the reliability set or a cohort.
//! - Produce pairwise agreement metrics and disagreement lists for
//!   adjudication.
//!
//! # Invariants
//! - Only confirmed grades enter metric computation.
//! - A pair with no overlapping confirmed records yields an explicit
//!   `InsufficientOverlap` cell; the matrix computation continues.

use crate::model::assignment::{GradeCategory, RecordId};
use crate::reliability_set::ReliabilitySet;
use crate::repo::grade_repo::{GradeLedger, GradeQuery, LedgerError};
use crate::stats::agreement::{
    align, intersect_confirmed, AgreementError, AgreementMetric, MetricOutcome, PairwiseMatrix,
    Rating,
};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ReliabilityResult<T> = Result<T, ReliabilityError>;

#[derive(Debug)]
pub enum ReliabilityError {
    Ledger(LedgerError),
    Agreement(AgreementError),
}

impl Display for ReliabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger(err) => write!(f, "{err}"),
            Self::Agreement(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ReliabilityError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger(err) => Some(err),
            Self::Agreement(err) => Some(err),
        }
    }
}

impl From<LedgerError> for ReliabilityError {
    fn from(value: LedgerError) -> Self {
        Self::Ledger(value)
    }
}

impl From<AgreementError> for ReliabilityError {
    fn from(value: AgreementError) -> Self {
        Self::Agreement(value)
    }
}

/// Which grades a comparison covers.
#[derive(Debug, Clone)]
pub enum RatingScope<'set> {
    /// The fixed reliability reference set.
    Reliability(&'set ReliabilitySet),
    /// One cohort project's Unique grades.
    Cohort { project: String },
}

/// Use-case service computing agreement reports.
pub struct ReliabilityService<'a, L: GradeLedger> {
    ledger: &'a L,
}

impl<'a, L: GradeLedger> ReliabilityService<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// One grader's rating vector for the scope, id-sorted. Includes
    /// unresolved entries; metric computations filter them.
    pub fn ratings(&self, grader: &str, scope: &RatingScope<'_>) -> ReliabilityResult<Vec<Rating>> {
        let assignments = match scope {
            RatingScope::Reliability(set) => {
                let rows = self.ledger.query(&GradeQuery {
                    grader_name: Some(grader.to_string()),
                    category: Some(GradeCategory::Reliability),
                    ..GradeQuery::default()
                })?;
                rows.into_iter()
                    .filter(|assignment| set.contains(&assignment.record_id))
                    .collect::<Vec<_>>()
            }
            RatingScope::Cohort { project } => self.ledger.query(&GradeQuery {
                grader_name: Some(grader.to_string()),
                category: Some(GradeCategory::Unique),
                project: Some(project.clone()),
                ..GradeQuery::default()
            })?,
        };

        Ok(assignments
            .into_iter()
            .map(|assignment| (assignment.record_id, assignment.state))
            .collect())
    }

    /// Disagreement list between two graders over strictly aligned rating
    /// sets. Fails fast with `UnalignedRatingSets` when the graders do not
    /// cover the same records.
    pub fn disagreements(
        &self,
        grader_a: &str,
        grader_b: &str,
        scope: &RatingScope<'_>,
    ) -> ReliabilityResult<Vec<RecordId>> {
        let left = self.ratings(grader_a, scope)?;
        let right = self.ratings(grader_b, scope)?;
        let pair = align(&left, &right)?;
        Ok(pair.disagreements())
    }

    /// One metric for one unordered grader pair, restricted to the records
    /// both graders have confirmed.
    pub fn pair_metric(
        &self,
        grader_a: &str,
        grader_b: &str,
        scope: &RatingScope<'_>,
        metric: AgreementMetric,
    ) -> ReliabilityResult<MetricOutcome> {
        let left = self.ratings(grader_a, scope)?;
        let right = self.ratings(grader_b, scope)?;

        let (left, right) = intersect_confirmed(&left, &right);
        info!(
            "event=pair_overlap module=reliability status=ok grader_a={grader_a} grader_b={grader_b} common={}",
            left.len()
        );
        if left.is_empty() {
            return Ok(MetricOutcome::InsufficientOverlap);
        }

        // Intersection yields identical record sets, so alignment holds by
        // construction.
        let pair = align(&left, &right)?;
        Ok(pair.metric(metric))
    }

    /// The triangular pairwise metric table for a grader list.
    ///
    /// Undefined pairs are reported per cell; one empty pair never aborts
    /// the rest of the table.
    pub fn pairwise_matrix(
        &self,
        graders: &[String],
        scope: &RatingScope<'_>,
        metric: AgreementMetric,
    ) -> ReliabilityResult<PairwiseMatrix> {
        let mut matrix = PairwiseMatrix::new(graders, metric);

        for (idx_a, grader_a) in graders.iter().enumerate().take(graders.len().saturating_sub(1))
        {
            for (idx_b, grader_b) in graders.iter().enumerate().skip(idx_a + 1) {
                let outcome = self.pair_metric(grader_a, grader_b, scope, metric)?;
                matrix.set(idx_a, idx_b - 1, outcome);
            }
        }

        Ok(matrix)
    }
}

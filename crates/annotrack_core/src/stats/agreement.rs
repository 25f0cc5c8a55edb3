//! Pairwise inter-rater agreement computations.
//!
//! # Responsibility
//! - Align two graders' rating vectors over an identical record set.
//! - Flag disagreements and compute chance-corrected agreement (Cohen's
//!   kappa) on the raw and binarized grade scales.
//!
//! # Invariants
//! - Pairwise statistics are only computed over aligned record sets;
//!   mismatched sets fail fast instead of silently truncating.
//! - Sentinel states (queued, skipped, escalated, out-of-scope, missing)
//!   never enter statistical computation.
//! - A pair with no overlapping confirmed grades yields an explicit
//!   `InsufficientOverlap` outcome, never an error.

use crate::model::assignment::RecordId;
use crate::model::grade::GradeState;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AgreementResult<T> = Result<T, AgreementError>;

/// Agreement-layer errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgreementError {
    /// The two rating vectors do not cover an identical record set.
    UnalignedRatingSets {
        left_len: usize,
        right_len: usize,
    },
}

impl Display for AgreementError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnalignedRatingSets { left_len, right_len } => write!(
                f,
                "unaligned rating sets: left covers {left_len} records, right covers {right_len}, or the record ids differ"
            ),
        }
    }
}

impl Error for AgreementError {}

/// One grader's rating of one record.
pub type Rating = (RecordId, GradeState);

/// Metric selector for pairwise computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgreementMetric {
    /// Count of records where both grades are confirmed and differ.
    Disagreement,
    /// Chance-corrected agreement over the raw 0/1/2 scale.
    Kappa,
    /// Kappa after collapsing {0,1} to 0 — agreement on "definitely use".
    KappaTwoVsRest,
    /// Kappa after collapsing {1,2} to 2 — agreement on "do not use".
    KappaZeroVsRest,
}

/// Outcome of one pairwise metric computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricOutcome {
    Kappa(f64),
    DisagreementCount(usize),
    /// No overlapping confirmed grades for the pair; reported per cell so a
    /// matrix-wide computation can continue.
    InsufficientOverlap,
}

/// Two rating vectors aligned over an identical, id-sorted record set.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    entries: Vec<(RecordId, GradeState, GradeState)>,
}

/// Sorts both vectors by record id and verifies they cover the same records.
pub fn align(left: &[Rating], right: &[Rating]) -> AgreementResult<AlignedPair> {
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    left.sort_by(|a, b| a.0.cmp(&b.0));
    right.sort_by(|a, b| a.0.cmp(&b.0));

    let mismatch = left.len() != right.len()
        || left
            .iter()
            .zip(right.iter())
            .any(|((left_id, _), (right_id, _))| left_id != right_id);
    if mismatch {
        return Err(AgreementError::UnalignedRatingSets {
            left_len: left.len(),
            right_len: right.len(),
        });
    }

    let entries = left
        .into_iter()
        .zip(right)
        .map(|((record_id, left_state), (_, right_state))| (record_id, left_state, right_state))
        .collect();

    Ok(AlignedPair { entries })
}

/// Restricts both vectors to the records confirmed by *both* graders, in
/// id order. The result is alignable by construction.
pub fn intersect_confirmed(left: &[Rating], right: &[Rating]) -> (Vec<Rating>, Vec<Rating>) {
    let confirmed_right: HashMap<&RecordId, GradeState> = right
        .iter()
        .filter(|(_, state)| state.approved().is_some())
        .map(|(record_id, state)| (record_id, *state))
        .collect();

    let mut left_subset = Vec::new();
    let mut right_subset = Vec::new();
    for (record_id, state) in left {
        if state.approved().is_none() {
            continue;
        }
        if let Some(other) = confirmed_right.get(record_id) {
            left_subset.push((record_id.clone(), *state));
            right_subset.push((record_id.clone(), *other));
        }
    }

    (left_subset, right_subset)
}

impl AlignedPair {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record ids where both grades are confirmed and differ, in id order.
    ///
    /// Entries where either side is unresolved or a sentinel are excluded
    /// from comparison, not treated as disagreements.
    pub fn disagreements(&self) -> Vec<RecordId> {
        self.entries
            .iter()
            .filter_map(|(record_id, left, right)| {
                match (left.approved(), right.approved()) {
                    (Some(a), Some(b)) if a != b => Some(record_id.clone()),
                    _ => None,
                }
            })
            .collect()
    }

    /// Paired confirmed grade values, excluding entries where either side is
    /// unresolved.
    fn confirmed_values(&self) -> (Vec<i64>, Vec<i64>) {
        let mut left_values = Vec::new();
        let mut right_values = Vec::new();
        for (_, left, right) in &self.entries {
            if let (Some(a), Some(b)) = (left.approved(), right.approved()) {
                left_values.push(a.value());
                right_values.push(b.value());
            }
        }
        (left_values, right_values)
    }

    /// Computes the selected metric for this pair.
    pub fn metric(&self, metric: AgreementMetric) -> MetricOutcome {
        match metric {
            AgreementMetric::Disagreement => {
                let (left, _) = self.confirmed_values();
                if left.is_empty() {
                    return MetricOutcome::InsufficientOverlap;
                }
                MetricOutcome::DisagreementCount(self.disagreements().len())
            }
            AgreementMetric::Kappa => self.kappa(|value| value),
            AgreementMetric::KappaTwoVsRest => {
                self.kappa(|value| if value == 2 { 2 } else { 0 })
            }
            AgreementMetric::KappaZeroVsRest => {
                self.kappa(|value| if value == 0 { 0 } else { 2 })
            }
        }
    }

    fn kappa(&self, collapse: impl Fn(i64) -> i64) -> MetricOutcome {
        let (left, right) = self.confirmed_values();
        if left.is_empty() {
            return MetricOutcome::InsufficientOverlap;
        }
        let left: Vec<i64> = left.into_iter().map(&collapse).collect();
        let right: Vec<i64> = right.into_iter().map(&collapse).collect();
        MetricOutcome::Kappa(cohen_kappa(&left, &right))
    }
}

/// Standard chance-corrected agreement between two equal-length label
/// vectors.
///
/// When both vectors use a single identical label throughout, expected
/// agreement is 1 and the ratio degenerates; that case is reported as
/// perfect agreement (1.0).
pub fn cohen_kappa(left: &[i64], right: &[i64]) -> f64 {
    debug_assert_eq!(left.len(), right.len());
    let n = left.len() as f64;

    let mut left_counts: HashMap<i64, f64> = HashMap::new();
    let mut right_counts: HashMap<i64, f64> = HashMap::new();
    let mut observed_matches = 0.0;

    for (a, b) in left.iter().zip(right.iter()) {
        *left_counts.entry(*a).or_default() += 1.0;
        *right_counts.entry(*b).or_default() += 1.0;
        if a == b {
            observed_matches += 1.0;
        }
    }

    let observed = observed_matches / n;
    let expected: f64 = left_counts
        .iter()
        .filter_map(|(label, left_count)| {
            right_counts
                .get(label)
                .map(|right_count| (left_count / n) * (right_count / n))
        })
        .sum();

    if (1.0 - expected).abs() < f64::EPSILON {
        return 1.0;
    }

    (observed - expected) / (1.0 - expected)
}

/// Triangular pairwise metric table for a grader list.
///
/// Rows cover all graders but the last, columns all but the first; the
/// diagonal and lower triangle stay unset.
#[derive(Debug, Clone)]
pub struct PairwiseMatrix {
    graders: Vec<String>,
    metric: AgreementMetric,
    cells: Vec<Option<MetricOutcome>>,
}

impl PairwiseMatrix {
    pub fn new(graders: &[String], metric: AgreementMetric) -> Self {
        let rows = graders.len().saturating_sub(1);
        let cols = graders.len().saturating_sub(1);
        Self {
            graders: graders.to_vec(),
            metric,
            cells: vec![None; rows * cols],
        }
    }

    pub fn metric(&self) -> AgreementMetric {
        self.metric
    }

    /// Row labels: every grader except the last.
    pub fn row_graders(&self) -> &[String] {
        &self.graders[..self.graders.len().saturating_sub(1)]
    }

    /// Column labels: every grader except the first.
    pub fn col_graders(&self) -> &[String] {
        if self.graders.is_empty() {
            &[]
        } else {
            &self.graders[1..]
        }
    }

    pub fn set(&mut self, row: usize, col: usize, outcome: MetricOutcome) {
        let cols = self.col_graders().len();
        self.cells[row * cols + col] = Some(outcome);
    }

    /// Cell by position; `None` for the unset diagonal/lower triangle.
    pub fn cell(&self, row: usize, col: usize) -> Option<MetricOutcome> {
        let cols = self.col_graders().len();
        self.cells.get(row * cols + col).copied().flatten()
    }

    /// Cell by grader names.
    pub fn get(&self, row_grader: &str, col_grader: &str) -> Option<MetricOutcome> {
        let row = self
            .row_graders()
            .iter()
            .position(|name| name == row_grader)?;
        let col = self
            .col_graders()
            .iter()
            .position(|name| name == col_grader)?;
        self.cell(row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::{align, cohen_kappa, AgreementError, AgreementMetric, MetricOutcome};
    use crate::model::grade::{ApprovedGrade, GradeState};

    fn approved(value: i64) -> GradeState {
        GradeState::Approved(ApprovedGrade::from_value(value).unwrap())
    }

    fn ratings(pairs: &[(&str, GradeState)]) -> Vec<(String, GradeState)> {
        pairs
            .iter()
            .map(|(record_id, state)| (record_id.to_string(), *state))
            .collect()
    }

    #[test]
    fn align_rejects_mismatched_record_sets() {
        let left = ratings(&[("1", approved(0)), ("2", approved(1))]);
        let right = ratings(&[("1", approved(0)), ("3", approved(1))]);
        assert!(matches!(
            align(&left, &right),
            Err(AgreementError::UnalignedRatingSets { .. })
        ));
    }

    #[test]
    fn queued_entries_are_excluded_not_disagreements() {
        let left = ratings(&[("1", approved(0)), ("2", GradeState::Queued)]);
        let right = ratings(&[("1", approved(2)), ("2", approved(1))]);
        let pair = align(&left, &right).unwrap();
        assert_eq!(pair.disagreements(), vec!["1".to_string()]);
    }

    #[test]
    fn kappa_of_perfect_single_category_agreement_is_one() {
        assert_eq!(cohen_kappa(&[0, 0, 0], &[0, 0, 0]), 1.0);
    }

    #[test]
    fn kappa_matches_closed_form() {
        // po = 0.8, pe = 0.32 -> kappa = 0.48 / 0.68
        let kappa = cohen_kappa(&[0, 1, 2, 2, 0], &[0, 1, 1, 2, 0]);
        assert!((kappa - 0.48 / 0.68).abs() < 1e-9);
    }

    #[test]
    fn empty_overlap_reports_insufficient_overlap() {
        let left = ratings(&[("1", GradeState::Queued)]);
        let right = ratings(&[("1", approved(1))]);
        let pair = align(&left, &right).unwrap();
        assert_eq!(
            pair.metric(AgreementMetric::Kappa),
            MetricOutcome::InsufficientOverlap
        );
        assert_eq!(
            pair.metric(AgreementMetric::Disagreement),
            MetricOutcome::InsufficientOverlap
        );
    }
}

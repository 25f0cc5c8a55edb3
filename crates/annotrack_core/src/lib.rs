//! Core domain logic for annotrack, the annotation task allocation and
//! inter-rater reliability engine.
//! This crate is the single source of truth for workflow invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod prompt;
pub mod reliability_set;
pub mod repo;
pub mod service;
pub mod stats;

pub use config::{CandidateSortKey, CohortConfigSet, CohortProject, ConfigError, SortField};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::assignment::{
    AssignmentKey, GradeAssignment, GradeCategory, RecordId, SYSTEM_GRADER_PREFIX,
};
pub use model::grade::{ApprovedGrade, GradeState};
pub use model::record::{RecordMeta, ReportRecord, ReportSection};
pub use model::skip::{SkipRecord, OUT_OF_SCOPE_REASON};
pub use prompt::{
    capture_calibration_grade, capture_grade, capture_reason, CaptureOptions, GradeDecision,
    Prompter, ReasonKind, MIN_REASON_LEN,
};
pub use reliability_set::{ReliabilityMember, ReliabilitySet, ReliabilitySetError};
pub use repo::grade_repo::{
    CandidateKind, GradeLedger, GradeQuery, LedgerError, LedgerResult, LedgerSortKey,
    SqliteGradeLedger, UniqueCandidate, ValidationCandidateSpec, UNGRADED_DATE,
};
pub use repo::report_repo::{
    ReportBatch, ReportStore, ReportStoreError, SqliteReportStore,
};
pub use service::allocation_service::{
    AllocationConfig, AllocationError, AllocationOutcome, AllocationReport, AllocationService,
};
pub use service::assignment_service::{
    AssignmentService, RegradeTarget, TransitionError, TransitionResult,
};
pub use service::grading_service::{
    CommitResult, GraderPhase, GradingService, RegradeOutcome, ServingBatch, ServingItem,
    SessionError, SessionOptions,
};
pub use service::progress_service::{
    CohortStats, GraderActivity, GraderStatus, ProgressService,
};
pub use service::reliability_service::{RatingScope, ReliabilityError, ReliabilityService};
pub use service::self_eval_service::{
    PeerFeedback, SelfEvalOutcome, SelfEvalService, SelfEvalStatus,
};
pub use stats::agreement::{
    align, cohen_kappa, AgreementError, AgreementMetric, AlignedPair, MetricOutcome,
    PairwiseMatrix, Rating,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

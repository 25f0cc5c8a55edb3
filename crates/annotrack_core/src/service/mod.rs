//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate ledger and source-store calls into workflow-level APIs:
//!   state transitions, task allocation, agreement reporting, calibration
//!   gating and progress summaries.
//! - Keep prompt/display layers decoupled from storage details.

pub mod allocation_service;
pub mod assignment_service;
pub mod grading_service;
pub mod progress_service;
pub mod reliability_service;
pub mod self_eval_service;

use chrono::NaiveDate;

/// Current local calendar date, stamped onto committed transitions.
pub(crate) fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

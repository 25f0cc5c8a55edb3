//! Agreement statistics over completed grades.
//!
//! # Responsibility
//! - Provide the pure inter-rater computations consumed by the reliability
//!   workflow: alignment, disagreement sets, Cohen's kappa and its
//!   binarized collapses, and the pairwise grader matrix.

pub mod agreement;

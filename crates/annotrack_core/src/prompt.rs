//! Grade capture protocol over an injected prompt capability.
//!
//! # Responsibility
//! - Define the `Prompter` seam the core consumes for human input.
//! - Implement the capture rules: enumerated accepted values, re-prompt
//!   until valid, exact re-entry confirmation, clinician-flag gating and
//!   minimum-length reasons.
//!
//! # Invariants
//! - A grade is only committed after the confirmation entry matches the
//!   (possibly revised) first entry exactly.
//! - Escalation tokens are rejected with a corrective message unless the
//!   clinician flag is enabled.
//! - Console I/O never lives in this crate; callers supply the `Prompter`.

use crate::model::grade::ApprovedGrade;

/// Shortest acceptable skip/regrade reason; anything this short or shorter
/// is re-asked.
pub const MIN_REASON_LEN: usize = 6;

/// Input capability consumed by the capture protocol.
pub trait Prompter {
    /// Shows a message and returns the grader's raw reply.
    fn ask(&mut self, message: &str) -> String;
    /// Shows an informational message without collecting input.
    fn notify(&mut self, message: &str);
}

/// Grader decision produced by a completed capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeDecision {
    Approve(ApprovedGrade),
    Skip,
    Escalate,
    OutOfScope,
}

impl GradeDecision {
    fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "0" => Some(Self::Approve(ApprovedGrade::DoNotUse)),
            "1" => Some(Self::Approve(ApprovedGrade::MaybeUse)),
            "2" => Some(Self::Approve(ApprovedGrade::DefinitelyUse)),
            "-1" => Some(Self::Skip),
            "-2" => Some(Self::Escalate),
            "503" => Some(Self::OutOfScope),
            _ => None,
        }
    }
}

/// Capture behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureOptions {
    /// Enables the `-2` escalation token. Outside this mode the token is
    /// rejected with a corrective message steering the grader to skip.
    pub clinician_flag: bool,
}

const RATING_PROMPT_FLAGGED: &str = "Assign a rating to this report \
(0 do not use/1 maybe use/2 definitely use/-1 skip/-2 escalate to clinician/503 outside scan): ";
const RATING_PROMPT_PLAIN: &str = "Assign a rating to this report \
(0 do not use/1 maybe use/2 definitely use/-1 skip/503 outside scan): ";
const CONFIRM_PROMPT: &str =
    "Please confirm your grade by reentering it OR enter a revised value to change the grade: ";
const ESCALATION_BLOCKED: &str = "Reports cannot be marked for clinician review without \
undergoing peer review first. Please flag using a grade of -1 instead.";

/// Collects one confirmed grade decision.
///
/// The first valid entry becomes the candidate; the grader must re-enter it
/// exactly to commit. A different valid entry replaces the candidate and
/// restarts confirmation, so a mistyped grade can never be committed by a
/// mismatched confirmation.
pub fn capture_grade(prompter: &mut dyn Prompter, options: CaptureOptions) -> GradeDecision {
    let rating_prompt = if options.clinician_flag {
        RATING_PROMPT_FLAGGED
    } else {
        RATING_PROMPT_PLAIN
    };

    let mut candidate = ask_decision(prompter, rating_prompt, options);

    loop {
        let confirmation = ask_decision(prompter, CONFIRM_PROMPT, options);
        if confirmation == candidate {
            break;
        }
        candidate = confirmation;
    }

    match candidate {
        GradeDecision::Skip => {
            prompter.notify("This report is being marked as SKIPPED (-1) for you.");
        }
        GradeDecision::Escalate => {
            prompter.notify(
                "WARNING: this report is being marked as SKIPPED for you AND is being \
escalated to a clinician for further review.",
            );
        }
        GradeDecision::OutOfScope => {
            prompter.notify("This report is being SKIPPED and labeled as an outside scan.");
        }
        GradeDecision::Approve(grade) => {
            prompter.notify(&format!(
                "Saving your grade of {} for this report.",
                grade.value()
            ));
        }
    }

    candidate
}

fn ask_decision(
    prompter: &mut dyn Prompter,
    message: &str,
    options: CaptureOptions,
) -> GradeDecision {
    let mut message = message.to_string();
    loop {
        let reply = prompter.ask(&message);
        match GradeDecision::parse(&reply) {
            Some(GradeDecision::Escalate) if !options.clinician_flag => {
                prompter.notify(ESCALATION_BLOCKED);
                message =
                    "Please enter a grade value from the acceptable grade list (0/1/2/-1/503): "
                        .to_string();
            }
            Some(decision) => return decision,
            None => {
                message = format!(
                    "Invalid input. {}",
                    if options.clinician_flag {
                        RATING_PROMPT_FLAGGED
                    } else {
                        RATING_PROMPT_PLAIN
                    }
                );
            }
        }
    }
}

/// What a collected free-text reason explains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonKind {
    Skip,
    Regrade,
}

/// Collects a free-text reason, re-asking until it is long enough.
pub fn capture_reason(prompter: &mut dyn Prompter, kind: ReasonKind) -> String {
    let message = match kind {
        ReasonKind::Skip => {
            "This report was skipped. Please include the part(s) of the report that were confusing: "
        }
        ReasonKind::Regrade => {
            "This report was previously skipped. Please include an explanation why it received \
its updated grade: "
        }
    };

    loop {
        let reason = prompter.ask(message).trim().to_string();
        if reason.len() >= MIN_REASON_LEN {
            return reason;
        }
    }
}

/// Collects a calibration grade; only the 0/1/2 scale is accepted.
pub fn capture_calibration_grade(prompter: &mut dyn Prompter) -> ApprovedGrade {
    let mut message =
        "Assign a rating to this report (0 do not use/1 maybe use/2 definitely use): ".to_string();
    loop {
        let reply = prompter.ask(&message);
        match reply.trim().parse::<i64>().ok().and_then(ApprovedGrade::from_value) {
            Some(grade) => return grade,
            None => {
                message = "Invalid input. Assign a rating to this report \
(0 do not use/1 maybe use/2 definitely use): "
                    .to_string();
            }
        }
    }
}

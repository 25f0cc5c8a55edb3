use annotrack_core::db::open_db_in_memory;
use annotrack_core::{
    ApprovedGrade, GradeAssignment, GradeCategory, GradeLedger, GradeState, Prompter,
    SelfEvalService, SelfEvalStatus, SqliteGradeLedger, SqliteReportStore,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection};

struct Scripted {
    replies: Vec<&'static str>,
    cursor: usize,
    notices: Vec<String>,
}

impl Scripted {
    fn new(replies: &[&'static str]) -> Self {
        Self {
            replies: replies.to_vec(),
            cursor: 0,
            notices: Vec::new(),
        }
    }
}

impl Prompter for Scripted {
    fn ask(&mut self, _message: &str) -> String {
        let reply = self.replies[self.cursor];
        self.cursor += 1;
        reply.to_string()
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

fn add_narrative(conn: &Connection, record_id: &str, text: &str) {
    conn.execute(
        "INSERT INTO report_narratives (record_id, narrative_text) VALUES (?1, ?2);",
        params![record_id, text],
    )
    .unwrap();
}

fn seed_self_eval(ledger: &SqliteGradeLedger<'_>, grader: &str, record_id: &str) -> GradeAssignment {
    let assignment = GradeAssignment::queued(record_id, grader, GradeCategory::SelfEval, "SLIP");
    ledger.insert(&assignment).unwrap();
    assignment
}

fn approve_self_eval(
    ledger: &SqliteGradeLedger<'_>,
    assignment: &GradeAssignment,
    grade: ApprovedGrade,
    reason: &str,
) {
    ledger
        .update_state(
            &assignment.key(),
            GradeState::Approved(grade),
            NaiveDate::from_ymd_opt(2024, 1, 10),
        )
        .unwrap();
    ledger
        .upsert_self_eval_reason(&assignment.record_id, &assignment.grader_name, reason)
        .unwrap();
}

#[test]
fn status_progresses_from_not_started_to_complete() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let gate = SelfEvalService::new(&ledger, &reports);

    assert_eq!(gate.status("A").unwrap(), SelfEvalStatus::NotStarted);

    let first = seed_self_eval(&ledger, "A", "se-1");
    let second = seed_self_eval(&ledger, "A", "se-2");
    assert_eq!(
        gate.status("A").unwrap(),
        SelfEvalStatus::InProgress { remaining: 2 }
    );

    approve_self_eval(&ledger, &first, ApprovedGrade::MaybeUse, "borderline motion");
    assert_eq!(
        gate.status("A").unwrap(),
        SelfEvalStatus::InProgress { remaining: 1 }
    );

    approve_self_eval(&ledger, &second, ApprovedGrade::DoNotUse, "severe artifact");
    assert_eq!(gate.status("A").unwrap(), SelfEvalStatus::Complete);
}

#[test]
fn feedback_excludes_own_row_and_queued_peers() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let gate = SelfEvalService::new(&ledger, &reports);

    let own = seed_self_eval(&ledger, "A", "se-1");
    approve_self_eval(&ledger, &own, ApprovedGrade::MaybeUse, "my own take");

    let ben = seed_self_eval(&ledger, "Ben Okafor", "se-1");
    approve_self_eval(&ledger, &ben, ApprovedGrade::DefinitelyUse, "textbook normal study");

    // Cara has not graded the example yet; her row must not appear.
    seed_self_eval(&ledger, "Cara Diaz", "se-1");

    let feedback = gate.feedback("A", "se-1").unwrap();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].grader_name, "Ben Okafor");
    assert_eq!(feedback[0].grade, ApprovedGrade::DefinitelyUse);
    assert_eq!(feedback[0].reason, "textbook normal study");
}

#[test]
fn grade_next_commits_grade_and_reason_then_shows_feedback() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let gate = SelfEvalService::new(&ledger, &reports);

    add_narrative(&conn, "se-1", "Unremarkable brain MRI.");
    let assignment = seed_self_eval(&ledger, "A", "se-1");

    let peer = seed_self_eval(&ledger, "Ben Okafor", "se-1");
    approve_self_eval(&ledger, &peer, ApprovedGrade::DefinitelyUse, "clean exam");

    // Calibration capture accepts only 0/1/2: the invalid entries re-prompt,
    // then the reason is collected.
    let mut prompter = Scripted::new(&["-1", "2", "no focal findings at all"]);
    let outcome = gate.grade_next("A", &mut prompter).unwrap().unwrap();

    assert_eq!(outcome.record_id, "se-1");
    assert_eq!(outcome.grade, ApprovedGrade::DefinitelyUse);
    assert_eq!(outcome.feedback.len(), 1);
    assert_eq!(outcome.feedback[0].grader_name, "Ben Okafor");

    let committed = ledger.find(&assignment.key()).unwrap().unwrap();
    assert_eq!(
        committed.state,
        GradeState::Approved(ApprovedGrade::DefinitelyUse)
    );
    assert!(committed.grade_date.is_some());

    let reasons = ledger.self_eval_reasons("se-1").unwrap();
    assert!(reasons.contains(&("A".to_string(), "no focal findings at all".to_string())));

    // The peer's grade/reason were surfaced read-only.
    assert!(prompter
        .notices
        .iter()
        .any(|notice| notice.contains("clean exam")));
    assert_eq!(
        ledger.find(&peer.key()).unwrap().unwrap().state,
        GradeState::Approved(ApprovedGrade::DefinitelyUse)
    );
}

#[test]
fn grade_next_returns_none_when_the_queue_is_empty() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let gate = SelfEvalService::new(&ledger, &reports);

    let mut prompter = Scripted::new(&[]);
    assert!(gate.grade_next("A", &mut prompter).unwrap().is_none());
}

#[test]
fn grade_next_flags_missing_calibration_text_and_moves_on() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let gate = SelfEvalService::new(&ledger, &reports);

    let unreadable = seed_self_eval(&ledger, "A", "se-0");
    add_narrative(&conn, "se-1", "Readable example.");
    seed_self_eval(&ledger, "A", "se-1");

    let mut prompter = Scripted::new(&["1", "mild but usable artifact"]);
    let outcome = gate.grade_next("A", &mut prompter).unwrap().unwrap();

    assert_eq!(outcome.record_id, "se-1");
    assert_eq!(
        ledger.find(&unreadable.key()).unwrap().unwrap().state,
        GradeState::Missing
    );
}

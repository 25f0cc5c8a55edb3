use annotrack_core::db::open_db_in_memory;
use annotrack_core::{
    ApprovedGrade, AssignmentKey, GradeAssignment, GradeCategory, GradeLedger, GradeQuery,
    GradeState, LedgerError, LedgerSortKey, SkipRecord, SqliteGradeLedger,
};
use chrono::NaiveDate;
use rusqlite::Connection;

fn queued(record_id: &str, grader: &str) -> GradeAssignment {
    GradeAssignment::queued(record_id, grader, GradeCategory::Unique, "SLIP")
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

#[test]
fn insert_and_find_round_trip() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    let mut assignment = queued("1001", "Alice Chen");
    assignment.pat_id = "p-1".to_string();
    assignment.age_in_days = Some(730);
    assignment.proc_ord_year = Some(2021);
    assignment.proc_name = "MR BRAIN WO CONTRAST".to_string();
    assignment.report_origin = "procedure_order".to_string();
    assignment.project = Some("SLIP Infants".to_string());
    ledger.insert(&assignment).unwrap();

    let loaded = ledger.find(&assignment.key()).unwrap().unwrap();
    assert_eq!(loaded, assignment);
    assert_eq!(loaded.state, GradeState::Queued);
    assert_eq!(loaded.grade_date, None);
}

#[test]
fn duplicate_key_is_rejected_but_new_criteria_is_allowed() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    let assignment = queued("1001", "Alice Chen");
    ledger.insert(&assignment).unwrap();

    let err = ledger.insert(&assignment).unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateAssignment(key) if key == assignment.key()));

    let mut second_criteria = queued("1001", "Alice Chen");
    second_criteria.grade_criteria = "SLIP-v2".to_string();
    ledger.insert(&second_criteria).unwrap();
}

#[test]
fn validation_failure_blocks_insert() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    let invalid = queued("", "Alice Chen");
    assert!(matches!(
        ledger.insert(&invalid),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn update_state_stamps_grade_and_date() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    let assignment = queued("1001", "Alice Chen");
    ledger.insert(&assignment).unwrap();

    let graded_on = date(2024, 3, 9);
    ledger
        .update_state(
            &assignment.key(),
            GradeState::Approved(ApprovedGrade::DefinitelyUse),
            Some(graded_on),
        )
        .unwrap();

    let loaded = ledger.find(&assignment.key()).unwrap().unwrap();
    assert_eq!(
        loaded.state,
        GradeState::Approved(ApprovedGrade::DefinitelyUse)
    );
    assert_eq!(loaded.grade_date, Some(graded_on));
}

#[test]
fn update_state_for_unknown_key_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    let key = AssignmentKey::new("nope", "Alice Chen", "SLIP");
    let err = ledger
        .update_state(&key, GradeState::Skipped, Some(date(2024, 3, 9)))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(missing) if missing == key));
}

#[test]
fn query_filters_by_grader_category_and_state() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    let mut reliability = GradeAssignment::queued("2001", "Alice Chen", GradeCategory::Reliability, "SLIP");
    reliability.proc_ord_year = Some(2019);
    ledger.insert(&reliability).unwrap();
    ledger.insert(&queued("2002", "Alice Chen")).unwrap();
    ledger.insert(&queued("2003", "Ben Okafor")).unwrap();
    ledger
        .update_state(
            &AssignmentKey::new("2002", "Alice Chen", "SLIP"),
            GradeState::Approved(ApprovedGrade::MaybeUse),
            Some(date(2024, 1, 2)),
        )
        .unwrap();

    let alice_queued = ledger
        .query(&GradeQuery {
            grader_name: Some("Alice Chen".to_string()),
            state: Some(GradeState::Queued),
            ..GradeQuery::default()
        })
        .unwrap();
    assert_eq!(alice_queued.len(), 1);
    assert_eq!(alice_queued[0].record_id, "2001");

    let reliability_rows = ledger
        .query(&GradeQuery {
            category: Some(GradeCategory::Reliability),
            ..GradeQuery::default()
        })
        .unwrap();
    assert_eq!(reliability_rows.len(), 1);
    assert_eq!(reliability_rows[0].grader_name, "Alice Chen");
}

#[test]
fn query_orders_by_caller_supplied_sort_keys() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    for (record_id, year) in [("3001", 2018), ("3002", 2022), ("3003", 2020)] {
        let mut assignment = queued(record_id, "Alice Chen");
        assignment.proc_ord_year = Some(year);
        ledger.insert(&assignment).unwrap();
    }

    let newest_first = ledger
        .query(&GradeQuery {
            order_by: vec![LedgerSortKey::desc("proc_ord_year").unwrap()],
            ..GradeQuery::default()
        })
        .unwrap();
    let ids: Vec<_> = newest_first
        .iter()
        .map(|assignment| assignment.record_id.as_str())
        .collect();
    assert_eq!(ids, vec!["3002", "3003", "3001"]);
}

#[test]
fn unknown_sort_columns_are_rejected_up_front() {
    let err = LedgerSortKey::asc("narrative_text; DROP TABLE grade_assignments").unwrap_err();
    assert!(matches!(err, LedgerError::UnknownSortColumn(_)));
}

#[test]
fn query_filters_by_minimum_grade_date() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    ledger.insert(&queued("4001", "Alice Chen")).unwrap();
    ledger.insert(&queued("4002", "Alice Chen")).unwrap();
    ledger
        .update_state(
            &AssignmentKey::new("4001", "Alice Chen", "SLIP"),
            GradeState::Approved(ApprovedGrade::DoNotUse),
            Some(date(2024, 2, 1)),
        )
        .unwrap();
    ledger
        .update_state(
            &AssignmentKey::new("4002", "Alice Chen", "SLIP"),
            GradeState::Approved(ApprovedGrade::MaybeUse),
            Some(date(2024, 4, 15)),
        )
        .unwrap();

    let recent = ledger
        .query(&GradeQuery {
            min_grade_date: Some(date(2024, 3, 1)),
            ..GradeQuery::default()
        })
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].record_id, "4002");
}

#[test]
fn count_distinct_graders_ignores_duplicates_per_grader() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    ledger.insert(&queued("5001", "Alice Chen")).unwrap();
    ledger.insert(&queued("5001", "Ben Okafor")).unwrap();
    let mut other_criteria = queued("5001", "Alice Chen");
    other_criteria.grade_criteria = "SLIP-v2".to_string();
    ledger.insert(&other_criteria).unwrap();

    assert_eq!(ledger.count_distinct_graders("5001").unwrap(), 2);
    assert_eq!(ledger.count_distinct_graders("absent").unwrap(), 0);
}

#[test]
fn mark_missing_all_flips_only_queued_rows() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    ledger.insert(&queued("6001", "Alice Chen")).unwrap();
    ledger.insert(&queued("6001", "Ben Okafor")).unwrap();
    ledger
        .update_state(
            &AssignmentKey::new("6001", "Ben Okafor", "SLIP"),
            GradeState::Approved(ApprovedGrade::DefinitelyUse),
            Some(date(2024, 1, 2)),
        )
        .unwrap();

    let changed = ledger.mark_missing_all("6001", date(2024, 5, 5)).unwrap();
    assert_eq!(changed, 1);

    let alice = ledger
        .find(&AssignmentKey::new("6001", "Alice Chen", "SLIP"))
        .unwrap()
        .unwrap();
    assert_eq!(alice.state, GradeState::Missing);

    let ben = ledger
        .find(&AssignmentKey::new("6001", "Ben Okafor", "SLIP"))
        .unwrap()
        .unwrap();
    assert_eq!(
        ben.state,
        GradeState::Approved(ApprovedGrade::DefinitelyUse)
    );
}

#[test]
fn skip_records_round_trip_and_regrade_updates_in_place() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    let skip = SkipRecord::logged(
        "7001",
        GradeState::Skipped,
        "Alice Chen",
        date(2024, 3, 1),
        "ambiguous wording in findings",
        "SLIP",
    );
    ledger.insert_skip(&skip).unwrap();

    let loaded = ledger.find_skip("7001", "Alice Chen", "SLIP").unwrap().unwrap();
    assert_eq!(loaded.skip_reason, "ambiguous wording in findings");
    assert_eq!(loaded.regrade_date, None);
    assert_eq!(loaded.regrade_reason, "");

    let updated = ledger
        .record_regrade(
            "7001",
            "Alice Chen",
            "SLIP",
            GradeState::Approved(ApprovedGrade::MaybeUse),
            "peer review resolved the ambiguity",
            date(2024, 3, 8),
        )
        .unwrap();
    assert!(updated);

    let regraded = ledger.find_skip("7001", "Alice Chen", "SLIP").unwrap().unwrap();
    assert_eq!(regraded.state, GradeState::Approved(ApprovedGrade::MaybeUse));
    assert_eq!(regraded.regrade_reason, "peer review resolved the ambiguity");
    assert_eq!(regraded.regrade_date, Some(date(2024, 3, 8)));
    // The original skip fields stay untouched.
    assert_eq!(regraded.skip_reason, "ambiguous wording in findings");
    assert_eq!(regraded.skip_date, Some(date(2024, 3, 1)));

    let absent = ledger
        .record_regrade(
            "7002",
            "Alice Chen",
            "SLIP",
            GradeState::Approved(ApprovedGrade::MaybeUse),
            "never skipped in the first place",
            date(2024, 3, 8),
        )
        .unwrap();
    assert!(!absent);
}

#[test]
fn self_eval_reasons_upsert_and_list() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();

    ledger
        .upsert_self_eval_reason("8001", "Alice Chen", "clear signal, no motion")
        .unwrap();
    ledger
        .upsert_self_eval_reason("8001", "Ben Okafor", "mild artifact")
        .unwrap();
    ledger
        .upsert_self_eval_reason("8001", "Alice Chen", "clear signal")
        .unwrap();

    let reasons = ledger.self_eval_reasons("8001").unwrap();
    assert_eq!(
        reasons,
        vec![
            ("Alice Chen".to_string(), "clear signal".to_string()),
            ("Ben Okafor".to_string(), "mild artifact".to_string()),
        ]
    );
}

#[test]
fn ledger_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteGradeLedger::try_new(&conn) {
        Err(LedgerError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert!(expected_version > 0),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn ledger_rejects_connection_without_required_tables() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA user_version = 3;").unwrap();

    let result = SqliteGradeLedger::try_new(&conn);
    assert!(matches!(
        result,
        Err(LedgerError::MissingRequiredTable("grade_assignments"))
    ));
}

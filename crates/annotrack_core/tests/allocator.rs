use annotrack_core::db::open_db_in_memory;
use annotrack_core::{
    AllocationConfig, AllocationError, AllocationOutcome, AllocationService, ApprovedGrade,
    AssignmentKey, CohortConfigSet, GradeAssignment, GradeCategory, GradeLedger, GradeQuery,
    GradeState, ReliabilitySet, SqliteGradeLedger, SqliteReportStore,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection};

const CONFIG_DOC: &str = r#"{
    "Infant-2024": {
        "grade_criteria": "SLIP",
        "sort": ["proc_ord_year desc"],
        "validation": "yes",
        "prioritize_validation": "yes"
    },
    "SLIP": {
        "grade_criteria": "SLIP",
        "sort": ["proc_ord_year desc"]
    },
    "SLIP Adolescents": {
        "grade_criteria": "SLIP",
        "sort": ["proc_ord_year desc"]
    }
}"#;

fn cohorts() -> CohortConfigSet {
    CohortConfigSet::from_json(CONFIG_DOC).unwrap()
}

fn add_record(conn: &Connection, record_id: &str, year: i32, project: &str) {
    conn.execute(
        "INSERT INTO report_narratives (record_id, narrative_text) VALUES (?1, ?2);",
        params![record_id, format!("Narrative for record {record_id}.")],
    )
    .unwrap();
    add_unreadable_record(conn, record_id, year, project);
}

/// Metadata and cohort membership only; no text in any partition.
fn add_unreadable_record(conn: &Connection, record_id: &str, year: i32, project: &str) {
    conn.execute(
        "INSERT INTO procedure_orders (record_id, pat_id, age_in_days, proc_ord_year, proc_name)
         VALUES (?1, ?2, 400, ?3, 'MR BRAIN');",
        params![record_id, format!("pat-{record_id}"), year],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO cohort_records (record_id, pat_id, project) VALUES (?1, ?2, ?3);",
        params![record_id, format!("pat-{record_id}"), project],
    )
    .unwrap();
}

/// Marks the grader's self-evaluation as complete so the gate opens.
fn pass_self_eval(ledger: &SqliteGradeLedger<'_>, grader: &str) {
    let assignment = GradeAssignment::queued("se-1", grader, GradeCategory::SelfEval, "SLIP");
    ledger.insert(&assignment).unwrap();
    ledger
        .update_state(
            &assignment.key(),
            GradeState::Approved(ApprovedGrade::MaybeUse),
            NaiveDate::from_ymd_opt(2024, 1, 1),
        )
        .unwrap();
}

fn grade_unique(
    ledger: &SqliteGradeLedger<'_>,
    record_id: &str,
    grader: &str,
    project: &str,
    grade: ApprovedGrade,
) {
    let mut assignment = GradeAssignment::queued(record_id, grader, GradeCategory::Unique, "SLIP");
    assignment.project = Some(project.to_string());
    ledger.insert(&assignment).unwrap();
    ledger
        .update_state(
            &assignment.key(),
            GradeState::Approved(grade),
            NaiveDate::from_ymd_opt(2024, 1, 15),
        )
        .unwrap();
}

#[test]
fn fresh_grader_receives_up_to_num_to_add_new_queued_assignments() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let cohorts = cohorts();
    let allocator =
        AllocationService::new(&ledger, &reports, &cohorts, AllocationConfig::default());

    for (record_id, year) in [("101", 2020), ("102", 2022), ("103", 2021), ("104", 2019), ("105", 2023)]
    {
        add_record(&conn, record_id, year, "Infant-2024");
    }
    pass_self_eval(&ledger, "A");

    let outcome = allocator.allocate("A", "Infant-2024", Some(3)).unwrap();
    let report = match outcome {
        AllocationOutcome::Unique(report) => report,
        other => panic!("expected unique allocation, got {other:?}"),
    };

    assert_eq!(report.added.len(), 3);
    assert_eq!(report.new_added, 3);
    assert_eq!(report.validation_added, 0);
    assert!(report.missing.is_empty());
    // Sort key is proc_ord_year desc: 2023, 2022, 2021.
    assert_eq!(report.added, vec!["105", "102", "103"]);

    let queued = ledger
        .query(&GradeQuery {
            grader_name: Some("A".to_string()),
            category: Some(GradeCategory::Unique),
            state: Some(GradeState::Queued),
            ..GradeQuery::default()
        })
        .unwrap();
    assert_eq!(queued.len(), 3);
    for assignment in &queued {
        assert_eq!(assignment.grade_criteria, "SLIP");
        assert_eq!(assignment.project.as_deref(), Some("Infant-2024"));
        assert_eq!(assignment.report_origin, "procedure_order");
    }

    // A second run must not duplicate any pre-existing assignment.
    let outcome = allocator.allocate("A", "Infant-2024", Some(10)).unwrap();
    let report = match outcome {
        AllocationOutcome::Unique(report) => report,
        other => panic!("expected unique allocation, got {other:?}"),
    };
    assert_eq!(report.added, vec!["101", "104"]);
    assert_eq!(report.queued_total, 5);
}

#[test]
fn self_eval_gate_blocks_before_any_work_is_issued() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let cohorts = cohorts();
    let allocator =
        AllocationService::new(&ledger, &reports, &cohorts, AllocationConfig::default());

    add_record(&conn, "201", 2021, "Infant-2024");

    let err = allocator.allocate("A", "Infant-2024", Some(5)).unwrap_err();
    assert!(matches!(err, AllocationError::SelfEvalIncomplete { .. }));

    // A queued calibration assignment also blocks.
    let pending = GradeAssignment::queued("se-9", "A", GradeCategory::SelfEval, "SLIP");
    ledger.insert(&pending).unwrap();
    let err = allocator.allocate("A", "Infant-2024", Some(5)).unwrap_err();
    assert!(matches!(
        err,
        AllocationError::SelfEvalIncomplete { remaining: 1, .. }
    ));

    let queued = ledger
        .query(&GradeQuery {
            grader_name: Some("A".to_string()),
            category: Some(GradeCategory::Unique),
            ..GradeQuery::default()
        })
        .unwrap();
    assert!(queued.is_empty());
}

#[test]
fn queued_reliability_work_is_served_exclusively() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let cohorts = cohorts();
    let allocator =
        AllocationService::new(&ledger, &reports, &cohorts, AllocationConfig::default());

    add_record(&conn, "301", 2021, "Infant-2024");
    pass_self_eval(&ledger, "A");
    for record_id in ["r-2", "r-1"] {
        let assignment =
            GradeAssignment::queued(record_id, "A", GradeCategory::Reliability, "SLIP");
        ledger.insert(&assignment).unwrap();
    }

    let outcome = allocator.allocate("A", "Infant-2024", Some(5)).unwrap();
    let queued = match outcome {
        AllocationOutcome::Reliability { queued } => queued,
        other => panic!("expected reliability backlog, got {other:?}"),
    };
    assert_eq!(queued.len(), 2);
    // Record id ascending.
    assert_eq!(queued[0].record_id, "r-1");
    assert_eq!(queued[1].record_id, "r-2");

    // No Unique work was issued alongside.
    let unique = ledger
        .query(&GradeQuery {
            grader_name: Some("A".to_string()),
            category: Some(GradeCategory::Unique),
            ..GradeQuery::default()
        })
        .unwrap();
    assert!(unique.is_empty());
}

#[test]
fn validation_candidates_respect_the_grader_cap_and_average_bounds() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let cohorts = cohorts();
    let allocator =
        AllocationService::new(&ledger, &reports, &cohorts, AllocationConfig::default());
    pass_self_eval(&ledger, "A");

    // Covered by one other grader with a usable grade: offered.
    add_record(&conn, "401", 2022, "Infant-2024");
    grade_unique(&ledger, "401", "Ben Okafor", "Infant-2024", ApprovedGrade::MaybeUse);

    // Already covered by two other graders: full, not offered.
    add_record(&conn, "402", 2022, "Infant-2024");
    grade_unique(&ledger, "402", "Ben Okafor", "Infant-2024", ApprovedGrade::MaybeUse);
    grade_unique(&ledger, "402", "Cara Diaz", "Infant-2024", ApprovedGrade::DefinitelyUse);

    // Unanimously rejected (average 0): not offered.
    add_record(&conn, "403", 2022, "Infant-2024");
    grade_unique(&ledger, "403", "Ben Okafor", "Infant-2024", ApprovedGrade::DoNotUse);

    // Only covered by an automated pseudo-grader: does not count as
    // validation coverage, and with no confirmed human grade the record is
    // not a validation candidate at all.
    add_record(&conn, "404", 2022, "Infant-2024");
    grade_unique(
        &ledger,
        "404",
        "Coarse Text Search v2",
        "Infant-2024",
        ApprovedGrade::MaybeUse,
    );

    let outcome = allocator.allocate("A", "Infant-2024", Some(10)).unwrap();
    let report = match outcome {
        AllocationOutcome::Unique(report) => report,
        other => panic!("expected unique allocation, got {other:?}"),
    };

    assert!(report.added.contains(&"401".to_string()));
    assert!(!report.added.contains(&"402".to_string()));
    assert!(!report.added.contains(&"403".to_string()));
    assert!(!report.added.contains(&"404".to_string()));
    assert_eq!(report.validation_added, 1);
}

#[test]
fn validation_rows_are_served_before_new_rows_when_prioritized() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let cohorts = cohorts();
    let allocator =
        AllocationService::new(&ledger, &reports, &cohorts, AllocationConfig::default());
    pass_self_eval(&ledger, "A");

    // A new record from a newer year than the validation record.
    add_record(&conn, "501", 2023, "Infant-2024");
    add_record(&conn, "502", 2018, "Infant-2024");
    grade_unique(&ledger, "502", "Ben Okafor", "Infant-2024", ApprovedGrade::MaybeUse);

    let outcome = allocator.allocate("A", "Infant-2024", Some(2)).unwrap();
    let report = match outcome {
        AllocationOutcome::Unique(report) => report,
        other => panic!("expected unique allocation, got {other:?}"),
    };

    // Validation first despite the older year, then the newest new record.
    assert_eq!(report.added, vec!["502", "501"]);
}

#[test]
fn records_without_text_are_marked_missing_and_reported() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let cohorts = cohorts();
    let allocator =
        AllocationService::new(&ledger, &reports, &cohorts, AllocationConfig::default());
    pass_self_eval(&ledger, "A");

    add_record(&conn, "601", 2022, "Infant-2024");
    // Validation candidate whose text is absent from every partition: Ben
    // already graded it, Cara is still queued on it.
    add_unreadable_record(&conn, "602", 2023, "Infant-2024");
    grade_unique(&ledger, "602", "Ben Okafor", "Infant-2024", ApprovedGrade::MaybeUse);
    let pending = GradeAssignment::queued("602", "Cara Diaz", GradeCategory::Unique, "SLIP");
    ledger.insert(&pending).unwrap();

    let outcome = allocator.allocate("A", "Infant-2024", Some(10)).unwrap();
    let report = match outcome {
        AllocationOutcome::Unique(report) => report,
        other => panic!("expected unique allocation, got {other:?}"),
    };

    assert_eq!(report.added, vec!["601"]);
    assert_eq!(report.missing, vec!["602"]);

    // The requesting grader got no assignment for the missing record; the
    // pending assignment flipped to Missing; the confirmed grade survived.
    assert!(ledger
        .find(&AssignmentKey::new("602", "A", "SLIP"))
        .unwrap()
        .is_none());
    let cara = ledger
        .find(&AssignmentKey::new("602", "Cara Diaz", "SLIP"))
        .unwrap()
        .unwrap();
    assert_eq!(cara.state, GradeState::Missing);
    let ben = ledger
        .find(&AssignmentKey::new("602", "Ben Okafor", "SLIP"))
        .unwrap()
        .unwrap();
    assert_eq!(ben.state, GradeState::Approved(ApprovedGrade::MaybeUse));
}

#[test]
fn umbrella_cohort_identifiers_are_rejected() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let cohorts = cohorts();
    let allocator =
        AllocationService::new(&ledger, &reports, &cohorts, AllocationConfig::default());
    pass_self_eval(&ledger, "A");

    let err = allocator.allocate("A", "SLIP", Some(5)).unwrap_err();
    assert!(matches!(err, AllocationError::CohortTooBroad(name) if name == "SLIP"));
}

#[test]
fn reliability_and_self_eval_seeding_are_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteGradeLedger::try_new(&conn).unwrap();
    let reports = SqliteReportStore::new(&conn);
    let cohorts = cohorts();
    let allocator =
        AllocationService::new(&ledger, &reports, &cohorts, AllocationConfig::default());

    let set = ReliabilitySet::from_csv(
        "record_id,pat_id,age_in_days,proc_ord_year,proc_name,report_origin\n\
         r-1,p1,365,2019,MR BRAIN,procedure_order\n\
         r-2,p2,730,2020,MR BRAIN,procedure_order\n",
    )
    .unwrap();

    assert_eq!(allocator.seed_reliability("A", &set, "SLIP").unwrap(), 2);
    assert_eq!(allocator.seed_reliability("A", &set, "SLIP").unwrap(), 0);

    let examples = vec!["se-1".to_string(), "se-2".to_string()];
    assert_eq!(allocator.seed_self_eval("A", &examples, "SLIP").unwrap(), 2);
    assert_eq!(allocator.seed_self_eval("A", &examples, "SLIP").unwrap(), 0);

    let reliability = ledger
        .query(&GradeQuery {
            grader_name: Some("A".to_string()),
            category: Some(GradeCategory::Reliability),
            ..GradeQuery::default()
        })
        .unwrap();
    assert_eq!(reliability.len(), 2);
    assert!(reliability
        .iter()
        .all(|assignment| assignment.state == GradeState::Queued));
}

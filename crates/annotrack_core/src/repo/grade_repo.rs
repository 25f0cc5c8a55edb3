//! Grade ledger contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the append/update/query surface the workflow core depends on.
//! - Keep SQL details inside the core persistence boundary; callers supply
//!   typed filters and validated sort keys, never query text.
//!
//! # Invariants
//! - Write paths must call `GradeAssignment::validate()` before SQL
//!   mutations.
//! - Read paths must reject invalid persisted state instead of masking it.
//! - (record_id, grader_name, grade_criteria) uniqueness is enforced by the
//!   primary key and surfaced as `DuplicateAssignment`.

use crate::db::DbError;
use crate::model::assignment::{
    AssignmentKey, AssignmentValidationError, GradeAssignment, GradeCategory, RecordId,
    SYSTEM_GRADER_PREFIX,
};
use crate::model::grade::GradeState;
use crate::model::record::RecordMeta;
use crate::model::skip::SkipRecord;
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Date value stored while an assignment or skip row has no real date.
pub const UNGRADED_DATE: &str = "0000-00-00";

const ASSIGNMENT_SELECT_SQL: &str = "SELECT
    record_id,
    grader_name,
    grade,
    grade_category,
    pat_id,
    age_in_days,
    proc_ord_year,
    proc_name,
    report_origin,
    project,
    grade_date,
    grade_criteria
FROM grade_assignments";

const REQUIRED_TABLES: &[&str] = &["grade_assignments", "skip_records"];

/// Columns ledger queries may sort by.
const SORTABLE_COLUMNS: &[&str] = &[
    "record_id",
    "grader_name",
    "grade",
    "grade_category",
    "age_in_days",
    "proc_ord_year",
    "grade_date",
    "grade_criteria",
];

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error for grade persistence and query operations.
#[derive(Debug)]
pub enum LedgerError {
    Validation(AssignmentValidationError),
    Db(DbError),
    NotFound(AssignmentKey),
    DuplicateAssignment(AssignmentKey),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    UnknownSortColumn(String),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(key) => write!(f, "assignment not found: {key}"),
            Self::DuplicateAssignment(key) => {
                write!(f, "assignment already exists: {key}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection has schema version {actual_version}, expected {expected_version}; run migrations first"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "connection is missing required table `{table}`")
            }
            Self::UnknownSortColumn(column) => {
                write!(f, "unknown ledger sort column `{column}`")
            }
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AssignmentValidationError> for LedgerError {
    fn from(value: AssignmentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for LedgerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One validated ORDER BY entry for ledger queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSortKey {
    column: &'static str,
    descending: bool,
}

impl LedgerSortKey {
    /// Resolves a caller-supplied column name against the known column set.
    pub fn new(column: &str, descending: bool) -> LedgerResult<Self> {
        let column = SORTABLE_COLUMNS
            .iter()
            .find(|known| **known == column)
            .copied()
            .ok_or_else(|| LedgerError::UnknownSortColumn(column.to_string()))?;
        Ok(Self { column, descending })
    }

    pub fn asc(column: &str) -> LedgerResult<Self> {
        Self::new(column, false)
    }

    pub fn desc(column: &str) -> LedgerResult<Self> {
        Self::new(column, true)
    }

    fn to_sql(&self) -> String {
        if self.descending {
            format!("{} DESC", self.column)
        } else {
            format!("{} ASC", self.column)
        }
    }
}

/// Typed filter options for ledger queries.
#[derive(Debug, Clone, Default)]
pub struct GradeQuery {
    pub grader_name: Option<String>,
    pub category: Option<GradeCategory>,
    pub grade_criteria: Option<String>,
    pub state: Option<GradeState>,
    pub record_ids: Option<Vec<RecordId>>,
    pub project: Option<String>,
    /// Keep only rows graded on or after this date (sentinel rows excluded).
    pub min_grade_date: Option<NaiveDate>,
    /// Composite sort order; defaults to record_id ascending when empty.
    pub order_by: Vec<LedgerSortKey>,
    pub limit: Option<u32>,
}

/// Whether a unique candidate is re-coverage of a graded record or new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Validation,
    New,
}

/// One record eligible for Unique allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueCandidate {
    pub kind: CandidateKind,
    /// Distinct other graders holding a confirmed grade (0 for new records).
    pub counter: u32,
    /// Average confirmed grade across those graders.
    pub avg_grade: Option<f64>,
    pub meta: RecordMeta,
}

/// Filter for the validation-candidate admission query.
#[derive(Debug, Clone)]
pub struct ValidationCandidateSpec {
    pub project: String,
    pub grade_criteria: String,
    /// The requesting grader; their own rows never count and records they
    /// already hold are excluded.
    pub exclude_grader: String,
    /// Admission cap: records covered by this many other graders are full.
    pub max_other_graders: u32,
}

/// Repository interface for the grade ledger.
pub trait GradeLedger {
    fn insert(&self, assignment: &GradeAssignment) -> LedgerResult<()>;
    fn insert_batch(&self, assignments: &[GradeAssignment]) -> LedgerResult<usize>;
    fn find(&self, key: &AssignmentKey) -> LedgerResult<Option<GradeAssignment>>;
    fn query(&self, query: &GradeQuery) -> LedgerResult<Vec<GradeAssignment>>;
    fn update_state(
        &self,
        key: &AssignmentKey,
        state: GradeState,
        date: Option<NaiveDate>,
    ) -> LedgerResult<()>;
    /// Flips every still-queued assignment of a record to Missing.
    fn mark_missing_all(&self, record_id: &str, date: NaiveDate) -> LedgerResult<usize>;
    fn count_distinct_graders(&self, record_id: &str) -> LedgerResult<u32>;
    fn ungraded_count(&self, grader_name: &str) -> LedgerResult<u32>;
    fn validation_candidates(
        &self,
        spec: &ValidationCandidateSpec,
    ) -> LedgerResult<Vec<UniqueCandidate>>;
    /// Cohort records with no assignment at all under the given criteria.
    fn new_candidates(&self, project: &str, grade_criteria: &str)
        -> LedgerResult<Vec<UniqueCandidate>>;
    fn insert_skip(&self, record: &SkipRecord) -> LedgerResult<()>;
    fn find_skip(
        &self,
        record_id: &str,
        grader_name: &str,
        grade_criteria: &str,
    ) -> LedgerResult<Option<SkipRecord>>;
    /// Updates a logged skip row with regrade fields. Returns `false` when
    /// no skip row was ever logged for the key.
    fn record_regrade(
        &self,
        record_id: &str,
        grader_name: &str,
        grade_criteria: &str,
        state: GradeState,
        regrade_reason: &str,
        regrade_date: NaiveDate,
    ) -> LedgerResult<bool>;
    /// Stores (or replaces) the justification a grader gave for a
    /// self-evaluation grade.
    fn upsert_self_eval_reason(
        &self,
        record_id: &str,
        grader_name: &str,
        reason: &str,
    ) -> LedgerResult<()>;
    /// All (grader, reason) pairs recorded for a self-evaluation record.
    fn self_eval_reasons(&self, record_id: &str) -> LedgerResult<Vec<(String, String)>>;
}

/// SQLite-backed grade ledger.
pub struct SqliteGradeLedger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGradeLedger<'conn> {
    /// Wraps a connection after verifying migrations were applied.
    pub fn try_new(conn: &'conn Connection) -> LedgerResult<Self> {
        let expected_version = crate::db::migrations::latest_version();
        let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if actual_version == 0 {
            return Err(LedgerError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        for table in REQUIRED_TABLES {
            let present: bool = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
                [table],
                |row| row.get(0),
            )?;
            if !present {
                return Err(LedgerError::MissingRequiredTable(table));
            }
        }

        Ok(Self { conn })
    }
}

impl GradeLedger for SqliteGradeLedger<'_> {
    fn insert(&self, assignment: &GradeAssignment) -> LedgerResult<()> {
        assignment.validate()?;

        let result = self.conn.execute(
            "INSERT INTO grade_assignments (
                record_id,
                grader_name,
                grade,
                grade_category,
                pat_id,
                age_in_days,
                proc_ord_year,
                proc_name,
                report_origin,
                project,
                grade_date,
                grade_criteria
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                assignment.record_id,
                assignment.grader_name,
                assignment.state.wire_value(),
                assignment.category.as_str(),
                assignment.pat_id,
                assignment.age_in_days,
                assignment.proc_ord_year,
                assignment.proc_name,
                assignment.report_origin,
                assignment.project.as_deref(),
                date_to_db(assignment.grade_date),
                assignment.grade_criteria,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => {
                Err(LedgerError::DuplicateAssignment(assignment.key()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn insert_batch(&self, assignments: &[GradeAssignment]) -> LedgerResult<usize> {
        for assignment in assignments {
            self.insert(assignment)?;
        }
        Ok(assignments.len())
    }

    fn find(&self, key: &AssignmentKey) -> LedgerResult<Option<GradeAssignment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ASSIGNMENT_SELECT_SQL}
             WHERE record_id = ?1 AND grader_name = ?2 AND grade_criteria = ?3;"
        ))?;

        let mut rows = stmt.query(params![key.record_id, key.grader_name, key.grade_criteria])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_assignment_row(row)?));
        }

        Ok(None)
    }

    fn query(&self, query: &GradeQuery) -> LedgerResult<Vec<GradeAssignment>> {
        let mut sql = format!("{ASSIGNMENT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(grader) = &query.grader_name {
            sql.push_str(" AND grader_name = ?");
            bind_values.push(Value::Text(grader.clone()));
        }

        if let Some(category) = query.category {
            sql.push_str(" AND grade_category = ?");
            bind_values.push(Value::Text(category.as_str().to_string()));
        }

        if let Some(criteria) = &query.grade_criteria {
            sql.push_str(" AND grade_criteria = ?");
            bind_values.push(Value::Text(criteria.clone()));
        }

        if let Some(state) = query.state {
            sql.push_str(" AND grade = ?");
            bind_values.push(Value::Integer(state.wire_value()));
        }

        if let Some(project) = &query.project {
            sql.push_str(" AND project = ?");
            bind_values.push(Value::Text(project.clone()));
        }

        if let Some(min_date) = query.min_grade_date {
            // ISO dates compare correctly as text; the sentinel sorts below
            // every real date but is excluded explicitly for clarity.
            sql.push_str(" AND grade_date != ? AND grade_date >= ?");
            bind_values.push(Value::Text(UNGRADED_DATE.to_string()));
            bind_values.push(Value::Text(date_to_db(Some(min_date))));
        }

        if let Some(record_ids) = &query.record_ids {
            if record_ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; record_ids.len()].join(", ");
            sql.push_str(&format!(" AND record_id IN ({placeholders})"));
            for record_id in record_ids {
                bind_values.push(Value::Text(record_id.clone()));
            }
        }

        if query.order_by.is_empty() {
            sql.push_str(" ORDER BY record_id ASC");
        } else {
            let keys: Vec<String> = query.order_by.iter().map(LedgerSortKey::to_sql).collect();
            sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut assignments = Vec::new();

        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }

        Ok(assignments)
    }

    fn update_state(
        &self,
        key: &AssignmentKey,
        state: GradeState,
        date: Option<NaiveDate>,
    ) -> LedgerResult<()> {
        let changed = self.conn.execute(
            "UPDATE grade_assignments
             SET grade = ?1, grade_date = ?2
             WHERE record_id = ?3 AND grader_name = ?4 AND grade_criteria = ?5;",
            params![
                state.wire_value(),
                date_to_db(date),
                key.record_id,
                key.grader_name,
                key.grade_criteria,
            ],
        )?;

        if changed == 0 {
            return Err(LedgerError::NotFound(key.clone()));
        }

        Ok(())
    }

    fn mark_missing_all(&self, record_id: &str, date: NaiveDate) -> LedgerResult<usize> {
        let changed = self.conn.execute(
            "UPDATE grade_assignments
             SET grade = ?1, grade_date = ?2
             WHERE record_id = ?3 AND grade = ?4;",
            params![
                GradeState::Missing.wire_value(),
                date_to_db(Some(date)),
                record_id,
                GradeState::Queued.wire_value(),
            ],
        )?;
        Ok(changed)
    }

    fn count_distinct_graders(&self, record_id: &str) -> LedgerResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(DISTINCT grader_name) FROM grade_assignments WHERE record_id = ?1;",
            [record_id],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn ungraded_count(&self, grader_name: &str) -> LedgerResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM grade_assignments WHERE grader_name = ?1 AND grade = ?2;",
            params![grader_name, GradeState::Queued.wire_value()],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }

    fn validation_candidates(
        &self,
        spec: &ValidationCandidateSpec,
    ) -> LedgerResult<Vec<UniqueCandidate>> {
        let mut stmt = self.conn.prepare(
            "WITH confirmed AS (
                SELECT
                    record_id,
                    COUNT(DISTINCT grader_name) AS counter,
                    AVG(grade) AS avg_grade
                FROM grade_assignments
                WHERE grade IN (0, 1, 2)
                  AND grade_category = 'Unique'
                  AND grade_criteria = ?1
                  AND grader_name != ?2
                  AND grader_name NOT LIKE ?3
                GROUP BY record_id
            )
            SELECT
                confirmed.record_id,
                confirmed.counter,
                confirmed.avg_grade,
                COALESCE(po.pat_id, '') AS pat_id,
                po.age_in_days,
                po.proc_ord_year,
                COALESCE(po.proc_name, '') AS proc_name
            FROM confirmed
            JOIN cohort_records cohort
              ON cohort.record_id = confirmed.record_id AND cohort.project = ?4
            LEFT JOIN procedure_orders po
              ON po.record_id = confirmed.record_id
            WHERE confirmed.counter < ?5
              AND confirmed.avg_grade > 0
              AND confirmed.avg_grade <= 2
              AND confirmed.record_id NOT IN (
                  SELECT record_id FROM grade_assignments
                  WHERE grader_name = ?2 AND grade_criteria = ?1
              )
            ORDER BY confirmed.record_id ASC;",
        )?;

        let system_pattern = format!("{SYSTEM_GRADER_PREFIX}%");
        let mut rows = stmt.query(params![
            spec.grade_criteria,
            spec.exclude_grader,
            system_pattern,
            spec.project,
            spec.max_other_graders,
        ])?;

        let mut candidates = Vec::new();
        while let Some(row) = rows.next()? {
            candidates.push(UniqueCandidate {
                kind: CandidateKind::Validation,
                counter: row.get("counter")?,
                avg_grade: row.get("avg_grade")?,
                meta: parse_meta_row(row)?,
            });
        }

        Ok(candidates)
    }

    fn new_candidates(
        &self,
        project: &str,
        grade_criteria: &str,
    ) -> LedgerResult<Vec<UniqueCandidate>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                cohort.record_id,
                COALESCE(po.pat_id, cohort.pat_id) AS pat_id,
                po.age_in_days,
                po.proc_ord_year,
                COALESCE(po.proc_name, '') AS proc_name
            FROM cohort_records cohort
            LEFT JOIN procedure_orders po
              ON po.record_id = cohort.record_id
            WHERE cohort.project = ?1
              AND cohort.record_id NOT IN (
                  SELECT record_id FROM grade_assignments WHERE grade_criteria = ?2
              )
            ORDER BY cohort.record_id ASC;",
        )?;

        let mut rows = stmt.query(params![project, grade_criteria])?;
        let mut candidates = Vec::new();
        while let Some(row) = rows.next()? {
            candidates.push(UniqueCandidate {
                kind: CandidateKind::New,
                counter: 0,
                avg_grade: None,
                meta: parse_meta_row(row)?,
            });
        }

        Ok(candidates)
    }

    fn insert_skip(&self, record: &SkipRecord) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO skip_records (
                record_id,
                grade,
                grader_name,
                skip_date,
                skip_reason,
                regrade_date,
                regrade_reason,
                grade_criteria
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                record.record_id,
                record.state.wire_value(),
                record.grader_name,
                date_to_db(record.skip_date),
                record.skip_reason,
                date_to_db(record.regrade_date),
                record.regrade_reason,
                record.grade_criteria,
            ],
        )?;
        Ok(())
    }

    fn find_skip(
        &self,
        record_id: &str,
        grader_name: &str,
        grade_criteria: &str,
    ) -> LedgerResult<Option<SkipRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                record_id,
                grade,
                grader_name,
                skip_date,
                skip_reason,
                regrade_date,
                regrade_reason,
                grade_criteria
            FROM skip_records
            WHERE record_id = ?1 AND grader_name = ?2 AND grade_criteria = ?3;",
        )?;

        let mut rows = stmt.query(params![record_id, grader_name, grade_criteria])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_skip_row(row)?));
        }

        Ok(None)
    }

    fn record_regrade(
        &self,
        record_id: &str,
        grader_name: &str,
        grade_criteria: &str,
        state: GradeState,
        regrade_reason: &str,
        regrade_date: NaiveDate,
    ) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE skip_records
             SET grade = ?1, regrade_reason = ?2, regrade_date = ?3
             WHERE record_id = ?4 AND grader_name = ?5 AND grade_criteria = ?6;",
            params![
                state.wire_value(),
                regrade_reason,
                date_to_db(Some(regrade_date)),
                record_id,
                grader_name,
                grade_criteria,
            ],
        )?;
        Ok(changed > 0)
    }

    fn upsert_self_eval_reason(
        &self,
        record_id: &str,
        grader_name: &str,
        reason: &str,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO self_eval_reasons (record_id, grader_name, reason)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (record_id, grader_name) DO UPDATE SET reason = excluded.reason;",
            params![record_id, grader_name, reason],
        )?;
        Ok(())
    }

    fn self_eval_reasons(&self, record_id: &str) -> LedgerResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT grader_name, reason FROM self_eval_reasons
             WHERE record_id = ?1 ORDER BY grader_name ASC;",
        )?;
        let mut rows = stmt.query([record_id])?;
        let mut reasons = Vec::new();
        while let Some(row) = rows.next()? {
            reasons.push((row.get(0)?, row.get(1)?));
        }
        Ok(reasons)
    }
}

fn parse_assignment_row(row: &Row<'_>) -> LedgerResult<GradeAssignment> {
    let grade: i64 = row.get("grade")?;
    let state = GradeState::from_wire(grade).ok_or_else(|| {
        LedgerError::InvalidData(format!(
            "invalid grade value `{grade}` in grade_assignments.grade"
        ))
    })?;

    let category_text: String = row.get("grade_category")?;
    let category = GradeCategory::parse(&category_text).ok_or_else(|| {
        LedgerError::InvalidData(format!(
            "invalid category `{category_text}` in grade_assignments.grade_category"
        ))
    })?;

    let date_text: String = row.get("grade_date")?;
    let grade_date = date_from_db(&date_text, "grade_assignments.grade_date")?;

    Ok(GradeAssignment {
        record_id: row.get("record_id")?,
        grader_name: row.get("grader_name")?,
        state,
        category,
        pat_id: row.get("pat_id")?,
        age_in_days: row.get("age_in_days")?,
        proc_ord_year: row.get("proc_ord_year")?,
        proc_name: row.get("proc_name")?,
        report_origin: row.get("report_origin")?,
        project: row.get("project")?,
        grade_date,
        grade_criteria: row.get("grade_criteria")?,
    })
}

fn parse_skip_row(row: &Row<'_>) -> LedgerResult<SkipRecord> {
    let grade: i64 = row.get("grade")?;
    let state = GradeState::from_wire(grade).ok_or_else(|| {
        LedgerError::InvalidData(format!("invalid grade value `{grade}` in skip_records.grade"))
    })?;

    let skip_date_text: String = row.get("skip_date")?;
    let regrade_date_text: String = row.get("regrade_date")?;

    Ok(SkipRecord {
        record_id: row.get("record_id")?,
        state,
        grader_name: row.get("grader_name")?,
        skip_date: date_from_db(&skip_date_text, "skip_records.skip_date")?,
        skip_reason: row.get("skip_reason")?,
        regrade_date: date_from_db(&regrade_date_text, "skip_records.regrade_date")?,
        regrade_reason: row.get("regrade_reason")?,
        grade_criteria: row.get("grade_criteria")?,
    })
}

fn parse_meta_row(row: &Row<'_>) -> LedgerResult<RecordMeta> {
    Ok(RecordMeta {
        record_id: row.get("record_id")?,
        pat_id: row.get("pat_id")?,
        age_in_days: row.get("age_in_days")?,
        proc_ord_year: row.get("proc_ord_year")?,
        proc_name: row.get("proc_name")?,
    })
}

/// Maps an optional date to the ledger representation.
pub fn date_to_db(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => UNGRADED_DATE.to_string(),
    }
}

/// Parses a stored date, mapping the sentinel back to `None`.
pub fn date_from_db(value: &str, column: &str) -> LedgerResult<Option<NaiveDate>> {
    if value == UNGRADED_DATE || value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| LedgerError::InvalidData(format!("invalid date value `{value}` in {column}")))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
    )
}

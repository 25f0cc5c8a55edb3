//! Record source store access.
//!
//! # Responsibility
//! - Look up report text by record id across the two physical partitions:
//!   the legacy combined table and the current narrative/impression pair.
//! - Resolve batches, separating found records from missing ids instead of
//!   failing whole batches.
//!
//! # Invariants
//! - Records are read-only to the core; the source store is populated
//!   upstream.
//! - A record present in neither partition is reported as missing, never as
//!   an error.

use crate::db::DbError;
use crate::model::assignment::RecordId;
use crate::model::record::{RecordMeta, ReportRecord};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ReportStoreResult<T> = Result<T, ReportStoreError>;

/// Source-store error for report lookup operations.
#[derive(Debug)]
pub enum ReportStoreError {
    Db(DbError),
    InvalidData(String),
}

impl Display for ReportStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid source store data: {message}"),
        }
    }
}

impl Error for ReportStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for ReportStoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ReportStoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of resolving a batch of record ids against the source store.
#[derive(Debug, Clone, Default)]
pub struct ReportBatch {
    pub found: Vec<ReportRecord>,
    /// Ids present in neither partition, reported for technical follow-up.
    pub missing: Vec<RecordId>,
}

/// Read interface over the record source store.
pub trait ReportStore {
    /// Looks one record up, falling back from the legacy combined table to
    /// the current narrative/impression pair.
    fn fetch(&self, record_id: &str) -> ReportStoreResult<Option<ReportRecord>>;
    /// Resolves a batch, separating found records from missing ids.
    fn fetch_batch(&self, record_ids: &[RecordId]) -> ReportStoreResult<ReportBatch>;
    /// Procedure-order metadata for one record.
    fn record_meta(&self, record_id: &str) -> ReportStoreResult<Option<RecordMeta>>;
    /// Number of records carrying the given cohort project label.
    fn cohort_record_count(&self, project: &str) -> ReportStoreResult<u32>;
}

/// SQLite-backed record source store.
pub struct SqliteReportStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReportStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ReportStore for SqliteReportStore<'_> {
    fn fetch(&self, record_id: &str) -> ReportStoreResult<Option<ReportRecord>> {
        // Legacy combined partition first; it carries both text columns.
        let legacy = self
            .conn
            .query_row(
                "SELECT narrative_text, impression_text
                 FROM reports_combined WHERE record_id = ?1;",
                [record_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;

        if let Some((narrative, impression)) = legacy {
            return Ok(Some(ReportRecord::new(record_id, narrative, impression)));
        }

        let narrative = self
            .conn
            .query_row(
                "SELECT narrative_text FROM report_narratives WHERE record_id = ?1;",
                [record_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        let Some(narrative) = narrative else {
            return Ok(None);
        };

        let impression = self
            .conn
            .query_row(
                "SELECT impression_text FROM report_impressions WHERE record_id = ?1;",
                [record_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(Some(ReportRecord::new(record_id, narrative, impression)))
    }

    fn fetch_batch(&self, record_ids: &[RecordId]) -> ReportStoreResult<ReportBatch> {
        let mut batch = ReportBatch::default();
        for record_id in record_ids {
            match self.fetch(record_id)? {
                Some(record) => batch.found.push(record),
                None => batch.missing.push(record_id.clone()),
            }
        }
        Ok(batch)
    }

    fn record_meta(&self, record_id: &str) -> ReportStoreResult<Option<RecordMeta>> {
        let meta = self
            .conn
            .query_row(
                "SELECT record_id, pat_id, age_in_days, proc_ord_year, proc_name
                 FROM procedure_orders WHERE record_id = ?1;",
                [record_id],
                |row| {
                    Ok(RecordMeta {
                        record_id: row.get(0)?,
                        pat_id: row.get(1)?,
                        age_in_days: row.get(2)?,
                        proc_ord_year: row.get(3)?,
                        proc_name: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(meta)
    }

    fn cohort_record_count(&self, project: &str) -> ReportStoreResult<u32> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM cohort_records WHERE project = ?1;",
            params![project],
            |row| row.get::<_, u32>(0),
        )?;
        Ok(count)
    }
}

//! Fixed reliability reference set.
//!
//! # Responsibility
//! - Load the project-wide list of records designated for multi-grader
//!   reliability grading, together with the seeding metadata.
//!
//! # Invariants
//! - The set is immutable once loaded; loading happens once per process.
//! - A missing or malformed file is fatal to the reliability flow.

use crate::model::assignment::RecordId;
use crate::model::record::RecordMeta;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const EXPECTED_HEADER: &str = "record_id,pat_id,age_in_days,proc_ord_year,proc_name,report_origin";

pub type ReliabilitySetResult<T> = Result<T, ReliabilitySetError>;

#[derive(Debug)]
pub enum ReliabilitySetError {
    Io {
        path: String,
        source: std::io::Error,
    },
    MissingHeader {
        expected: &'static str,
    },
    InvalidRow {
        line: usize,
        message: String,
    },
    Empty,
}

impl Display for ReliabilitySetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read reliability set `{path}`: {source}")
            }
            Self::MissingHeader { expected } => {
                write!(f, "reliability set header must be `{expected}`")
            }
            Self::InvalidRow { line, message } => {
                write!(f, "reliability set line {line}: {message}")
            }
            Self::Empty => write!(f, "reliability set contains no records"),
        }
    }
}

impl Error for ReliabilitySetError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One member of the reliability set with its seeding metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliabilityMember {
    pub meta: RecordMeta,
    pub report_origin: String,
}

/// The fixed, project-wide reliability reference set.
#[derive(Debug, Clone)]
pub struct ReliabilitySet {
    members: Vec<ReliabilityMember>,
}

impl ReliabilitySet {
    /// Loads the set from its CSV-style reference file.
    pub fn load(path: impl AsRef<Path>) -> ReliabilitySetResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ReliabilitySetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_csv(&text)
    }

    /// Parses the reference file content. Field values must not contain
    /// commas; the upstream export never produces quoted fields.
    pub fn from_csv(text: &str) -> ReliabilitySetResult<Self> {
        let mut lines = text.lines().enumerate();

        let header = lines
            .next()
            .map(|(_, line)| line.trim())
            .unwrap_or_default();
        if header != EXPECTED_HEADER {
            return Err(ReliabilitySetError::MissingHeader {
                expected: EXPECTED_HEADER,
            });
        }

        let mut members: Vec<ReliabilityMember> = Vec::new();
        for (index, line) in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != 6 {
                return Err(ReliabilitySetError::InvalidRow {
                    line: index + 1,
                    message: format!("expected 6 fields, got {}", fields.len()),
                });
            }
            if fields[0].is_empty() {
                return Err(ReliabilitySetError::InvalidRow {
                    line: index + 1,
                    message: "record_id cannot be empty".to_string(),
                });
            }
            let age_in_days = parse_optional_int(fields[2], index + 1, "age_in_days")?;
            let proc_ord_year = parse_optional_int(fields[3], index + 1, "proc_ord_year")?
                .map(|year| year as i32);

            members.push(ReliabilityMember {
                meta: RecordMeta {
                    record_id: fields[0].to_string(),
                    pat_id: fields[1].to_string(),
                    age_in_days,
                    proc_ord_year,
                    proc_name: fields[4].to_string(),
                },
                report_origin: fields[5].to_string(),
            });
        }

        if members.is_empty() {
            return Err(ReliabilitySetError::Empty);
        }

        members.sort_by(|a, b| a.meta.record_id.cmp(&b.meta.record_id));
        members.dedup_by(|a, b| a.meta.record_id == b.meta.record_id);

        Ok(Self { members })
    }

    pub fn members(&self) -> &[ReliabilityMember] {
        &self.members
    }

    /// Record ids in ascending order.
    pub fn record_ids(&self) -> impl Iterator<Item = &RecordId> {
        self.members.iter().map(|member| &member.meta.record_id)
    }

    pub fn contains(&self, record_id: &str) -> bool {
        self.members
            .binary_search_by(|member| member.meta.record_id.as_str().cmp(record_id))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn parse_optional_int(
    value: &str,
    line: usize,
    field: &str,
) -> ReliabilitySetResult<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i64>()
        .map(Some)
        .map_err(|_| ReliabilitySetError::InvalidRow {
            line,
            message: format!("invalid {field} value `{value}`"),
        })
}

//! Cohort project configuration.
//!
//! # Responsibility
//! - Load the per-cohort JSON documents driving allocation (criteria label,
//!   sort order, validation flags).
//! - Parse configured sort expressions into typed sort fields so no caller
//!   text ever reaches query construction.
//!
//! # Invariants
//! - Unknown cohorts and unknown sort fields are configuration errors, not
//!   silent defaults.
//! - Loaded configuration is immutable; components receive it by reference.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration-layer errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    UnknownCohort(String),
    UnknownSortField {
        cohort: String,
        expression: String,
    },
    InvalidFlag {
        cohort: String,
        field: &'static str,
        value: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read cohort config `{path}`: {source}")
            }
            Self::Parse(err) => write!(f, "invalid cohort config document: {err}"),
            Self::UnknownCohort(name) => write!(f, "unknown cohort project `{name}`"),
            Self::UnknownSortField { cohort, expression } => write!(
                f,
                "cohort `{cohort}` configures unknown sort expression `{expression}`"
            ),
            Self::InvalidFlag {
                cohort,
                field,
                value,
            } => write!(
                f,
                "cohort `{cohort}` field `{field}` must be yes or no, got `{value}`"
            ),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Candidate attribute a cohort may sort its allocation queue by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    ProcOrdYear,
    AgeInDays,
    RecordId,
    AvgGrade,
    GraderCounter,
}

impl SortField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "proc_ord_year" => Some(Self::ProcOrdYear),
            "age_in_days" => Some(Self::AgeInDays),
            "record_id" | "proc_ord_id" => Some(Self::RecordId),
            "avg_grade" => Some(Self::AvgGrade),
            "counter" => Some(Self::GraderCounter),
            _ => None,
        }
    }
}

/// One parsed sort expression, e.g. `proc_ord_year desc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateSortKey {
    pub field: SortField,
    pub descending: bool,
}

impl CandidateSortKey {
    /// Parses `<field> [asc|desc]`; direction defaults to ascending.
    pub fn parse(expression: &str) -> Option<Self> {
        let mut parts = expression.split_whitespace();
        let field = SortField::parse(parts.next()?)?;
        let descending = match parts.next() {
            None => false,
            Some("asc") => false,
            Some("desc") => true,
            Some(_) => return None,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self { field, descending })
    }
}

/// One cohort project: a named record filter plus allocation policy.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortProject {
    pub name: String,
    /// Opaque label of the upstream cohort query document.
    pub query: Option<String>,
    pub grade_criteria: String,
    pub sort: Vec<CandidateSortKey>,
    pub validation: bool,
    pub prioritize_validation: bool,
}

#[derive(Debug, Deserialize)]
struct RawCohortDoc {
    #[serde(default)]
    query: Option<String>,
    grade_criteria: String,
    #[serde(default)]
    sort: Vec<String>,
    #[serde(default)]
    validation: Option<String>,
    #[serde(default)]
    prioritize_validation: Option<String>,
}

/// The full set of configured cohort projects.
#[derive(Debug, Clone, Default)]
pub struct CohortConfigSet {
    cohorts: BTreeMap<String, CohortProject>,
}

impl CohortConfigSet {
    /// Loads the configuration document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Parses the configuration document from JSON text.
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let raw: BTreeMap<String, RawCohortDoc> = serde_json::from_str(text)?;
        let mut cohorts = BTreeMap::new();

        for (name, doc) in raw {
            let mut sort = Vec::with_capacity(doc.sort.len());
            for expression in &doc.sort {
                let key = CandidateSortKey::parse(expression).ok_or_else(|| {
                    ConfigError::UnknownSortField {
                        cohort: name.clone(),
                        expression: expression.clone(),
                    }
                })?;
                sort.push(key);
            }

            let validation = parse_flag(&name, "validation", doc.validation.as_deref(), true)?;
            let prioritize_validation = parse_flag(
                &name,
                "prioritize_validation",
                doc.prioritize_validation.as_deref(),
                false,
            )?;

            cohorts.insert(
                name.clone(),
                CohortProject {
                    name,
                    query: doc.query,
                    grade_criteria: doc.grade_criteria,
                    sort,
                    validation,
                    prioritize_validation,
                },
            );
        }

        Ok(Self { cohorts })
    }

    /// Looks up a cohort project by name.
    pub fn get(&self, name: &str) -> ConfigResult<&CohortProject> {
        self.cohorts
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCohort(name.to_string()))
    }

    /// Whether a cohort identifier is an umbrella over configured sub-cohorts.
    ///
    /// An identifier that is a proper name-prefix of another configured
    /// cohort (`SLIP` vs `SLIP Adolescents`) selects records across
    /// unintended sub-cohorts and must be rejected by the allocator.
    pub fn is_umbrella(&self, name: &str) -> bool {
        let prefixed = format!("{name} ");
        self.cohorts
            .keys()
            .any(|other| other != name && other.starts_with(&prefixed))
    }

    /// Names of all configured cohorts.
    pub fn cohort_names(&self) -> impl Iterator<Item = &str> {
        self.cohorts.keys().map(String::as_str)
    }
}

fn parse_flag(
    cohort: &str,
    field: &'static str,
    value: Option<&str>,
    default: bool,
) -> ConfigResult<bool> {
    match value.map(str::trim) {
        None => Ok(default),
        Some(v) if v.eq_ignore_ascii_case("yes") => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("no") => Ok(false),
        Some(other) => Err(ConfigError::InvalidFlag {
            cohort: cohort.to_string(),
            field,
            value: other.to_string(),
        }),
    }
}

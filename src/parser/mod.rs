//! Per-service log line grammars.
//!
//! Every probe appends one line per result to its own log file. Each
//! [`ServiceKind`] owns exactly one grammar; the pipeline looks the parser up
//! once through [`parser_for`] and never branches on service names.

pub mod dask;
pub mod notebook;
pub mod openeo;
pub mod openstack;
pub mod stac;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp formats written by the probes, most precise first.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Placeholder timestamp for services without any valid log data.
pub const NEVER_TESTED: &str = "Never Tested";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed {grammar} line: expected at least {expected} fields, found {found}")]
    Malformed {
        grammar: ServiceKind,
        expected: usize,
        found: usize,
    },

    #[error("{grammar} line is missing the `{field}` field")]
    MissingField {
        grammar: ServiceKind,
        field: &'static str,
    },

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

// ---------------------------------------------------------------------------
// ServiceKind
// ---------------------------------------------------------------------------

/// The grammar a service's probe writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// `<ts> - <STATUS>[ - <message>]`
    Dask,
    /// `<ts>, <status>, collection: <id>[, item: <id>][, reason: <msg>]`
    #[serde(rename = "openeo")]
    OpenEo,
    /// `<ts>, <STATUS>, collection: <id>, item: <id>[, reason: <msg>]`
    Stac,
    /// `<ts> - <STATUS>[ - <error>] - <notebook path>`
    Notebook,
    /// `<ts>, <STATUS>[, <message>]`
    #[serde(rename = "openstack")]
    OpenStack,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 5] = [
        ServiceKind::Dask,
        ServiceKind::OpenEo,
        ServiceKind::Stac,
        ServiceKind::Notebook,
        ServiceKind::OpenStack,
    ];
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Dask => write!(f, "dask"),
            ServiceKind::OpenEo => write!(f, "openeo"),
            ServiceKind::Stac => write!(f, "stac"),
            ServiceKind::Notebook => write!(f, "notebook"),
            ServiceKind::OpenStack => write!(f, "openstack"),
        }
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown service kind: {s}"))
    }
}

// ---------------------------------------------------------------------------
// StatusKind
// ---------------------------------------------------------------------------

/// Normalized outcome of one probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    Success,
    Failure,
    Skipped,
    Unknown,
    Invalid,
}

impl StatusKind {
    /// Case-insensitive token mapping. Unrecognized tokens are `Unknown`.
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "success" | "ok" | "passed" => StatusKind::Success,
            "failure" | "failed" | "error" => StatusKind::Failure,
            "skipped" | "skip" => StatusKind::Skipped,
            "invalid" => StatusKind::Invalid,
            _ => StatusKind::Unknown,
        }
    }

    /// Canonical token written to the snapshot.
    pub fn as_token(self) -> &'static str {
        match self {
            StatusKind::Success => "SUCCESS",
            StatusKind::Failure => "FAILURE",
            StatusKind::Skipped => "SKIPPED",
            StatusKind::Unknown => "UNKNOWN",
            StatusKind::Invalid => "INVALID",
        }
    }

    pub fn is_success(self) -> bool {
        self == StatusKind::Success
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// A probe timestamp kept in its original fixed-width textual form.
///
/// `YYYY-MM-DD HH:MM[:SS]` sorts lexicographically in chronological order, so
/// ordering compares the raw text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// Validate and wrap a probe timestamp.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim();
        if Self::naive(raw).is_some() {
            Ok(Self(raw.to_string()))
        } else {
            Err(ParseError::InvalidTimestamp(raw.to_string()))
        }
    }

    /// The "Never Tested" sentinel.
    pub fn never() -> Self {
        Self(NEVER_TESTED.to_string())
    }

    /// Wrap a previously persisted value without validation.
    pub fn from_persisted(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn is_never(&self) -> bool {
        self.0 == NEVER_TESTED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Calendar value, `None` for the sentinel or unparseable text.
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        Self::naive(&self.0)
    }

    fn naive(raw: &str) -> Option<NaiveDateTime> {
        TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// ParsedEntry
// ---------------------------------------------------------------------------

/// Well-known keys in [`ParsedEntry::extra`].
pub mod fields {
    pub const COLLECTION: &str = "collection";
    pub const ITEM: &str = "item";
    pub const REASON: &str = "reason";
    pub const MESSAGE: &str = "message";
    pub const NOTEBOOK: &str = "notebook";
    pub const ERROR: &str = "error";
}

/// One normalized probe result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub timestamp: Timestamp,
    pub status: StatusKind,
    /// Service-specific fields; no schema is shared across services.
    pub extra: BTreeMap<String, String>,
}

impl ParsedEntry {
    pub fn new(timestamp: Timestamp, status: StatusKind) -> Self {
        Self {
            timestamp,
            status,
            extra: BTreeMap::new(),
        }
    }

    /// The "Never Tested" / `Unknown` placeholder.
    pub fn sentinel() -> Self {
        Self::new(Timestamp::never(), StatusKind::Unknown)
    }

    pub fn is_sentinel(&self) -> bool {
        self.timestamp.is_never()
    }

    /// Builder-style setter for an extra field; empty values are dropped.
    pub fn with_extra(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.extra.insert(key.to_string(), value);
        }
        self
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// LineParser
// ---------------------------------------------------------------------------

/// Parses one raw log line of a single grammar.
pub trait LineParser: Send + Sync {
    fn kind(&self) -> ServiceKind;

    fn parse(&self, line: &str) -> Result<ParsedEntry, ParseError>;
}

static DASK: dask::DaskParser = dask::DaskParser;
static OPENEO: openeo::OpenEoParser = openeo::OpenEoParser;
static STAC: stac::StacParser = stac::StacParser;
static NOTEBOOK: notebook::NotebookParser = notebook::NotebookParser;
static OPENSTACK: openstack::OpenStackParser = openstack::OpenStackParser;

/// Lookup table from grammar to its parser.
pub fn parser_for(kind: ServiceKind) -> &'static dyn LineParser {
    match kind {
        ServiceKind::Dask => &DASK,
        ServiceKind::OpenEo => &OPENEO,
        ServiceKind::Stac => &STAC,
        ServiceKind::Notebook => &NOTEBOOK,
        ServiceKind::OpenStack => &OPENSTACK,
    }
}

/// Parse a single line with the grammar of `kind`.
pub fn parse(line: &str, kind: ServiceKind) -> Result<ParsedEntry, ParseError> {
    parser_for(kind).parse(line)
}

/// Split on `sep`, trimming the line end and every field.
pub(crate) fn split_fields<'a>(line: &'a str, sep: &str) -> Vec<&'a str> {
    line.trim_end_matches(['\r', '\n'])
        .trim()
        .split(sep)
        .map(str::trim)
        .collect()
}

/// Strip a `key: ` prefix from a field, matching the key case-insensitively.
pub(crate) fn prefixed<'a>(field: &'a str, key: &str) -> Option<&'a str> {
    let (head, rest) = field.split_once(':')?;
    head.trim()
        .eq_ignore_ascii_case(key)
        .then(|| rest.trim())
}

pub(crate) fn require_arity(
    grammar: ServiceKind,
    fields: &[&str],
    expected: usize,
) -> Result<(), ParseError> {
    if fields.len() < expected || fields.iter().take(expected).any(|f| f.is_empty()) {
        return Err(ParseError::Malformed {
            grammar,
            expected,
            found: fields.iter().filter(|f| !f.is_empty()).count(),
        });
    }
    Ok(())
}

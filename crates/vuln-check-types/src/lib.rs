//! Shared DTOs and the error type for vuln-check.
//!
//! This crate is deliberately boring: it should be safe to depend on from
//! any layer (policy, engine, renderers, adapters).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TOOL_NAME: &str = "vuln-check";
pub const REPORT_SCHEMA: &str = "vuln-check.report.v1";

/// A provenance-tagged value fed to an evaluator.
///
/// The identifier traces where the value came from: a package name, a file
/// path, or a synthesized composite (`concat:...`). The test value is the
/// string the evaluator actually inspects (a version string, matched file
/// content, a captured filename fragment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub identifier: String,
    pub test_value: String,
}

/// The outcome of evaluating one criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub criterion: Criterion,
    pub result: bool,
}

/// An installed package as reported by a host backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    pub version: String,
    pub kind: PackageKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Rpm,
    Dpkg,
    Fixture,
}

impl PackageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::Rpm => "rpm",
            PackageKind::Dpkg => "dpkg",
            PackageKind::Fixture => "fixture",
        }
    }
}

/// Opaque key/value metadata attached to a test in the policy document and
/// carried through to its record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// The per-criterion slice of a test record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubResult {
    pub result: bool,
    pub identifier: String,
}

/// The external, serializable record for a single test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRecord {
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub master_result: bool,
    pub has_true_results: bool,
    #[serde(default)]
    pub results: Vec<SubResult>,
}

/// A test whose outcome disagreed with its declared expectation: either the
/// master result differed from `expectedresult`, or the test declared
/// `expecterror` and evaluated without erroring.
///
/// Collected on the analysis output; the CLI decides whether to escalate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedMismatch {
    pub record: TestRecord,
    /// The declared `expectedresult` value.
    pub expected: bool,
    /// True when the unmet expectation was `expecterror`.
    pub expected_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolMeta {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunMeta {
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// The machine-readable report: tool identity, run timing, one record per
/// test in document order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportEnvelope {
    pub schema: String,
    pub tool: ToolMeta,
    pub run: RunMeta,
    #[serde(default)]
    pub results: Vec<TestRecord>,
}

/// Error taxonomy for the engine.
///
/// `Document` errors abort analysis; `Preparation` errors stick to the
/// owning object; `Evaluation` errors stick to the owning test.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VulnCheckError {
    #[error("document error: {0}")]
    Document(String),
    #[error("preparation error: {0}")]
    Preparation(String),
    #[error("evaluation error: {0}")]
    Evaluation(String),
    #[error("io error: {0}")]
    Io(String),
}

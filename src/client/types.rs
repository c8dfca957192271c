//! Typed views of the daemon's known success responses.
//!
//! All fields are lenient: a missing key becomes `None` or empty rather
//! than a decode failure, since the daemon omits fields it has no value for.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of the full `run` pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Structural analysis of the task.
    #[serde(default)]
    pub byakugan: Option<String>,
    #[serde(default)]
    pub mode_sage: Option<String>,
    /// Diagnostic narrative produced before execution.
    #[serde(default)]
    pub jougan: Option<String>,
    /// The execution transcript (generated code).
    #[serde(default)]
    pub execution: Option<String>,
    #[serde(default)]
    pub skills_used: Vec<String>,
    /// Per-step durations, keyed by step name.
    #[serde(default)]
    pub timing: Map<String, Value>,
    /// Wall-clock seconds for the whole pipeline.
    #[serde(default)]
    pub total_time: Option<f64>,
}

/// Result of the analysis-only `byakugan` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByakuganOutput {
    #[serde(default)]
    pub byakugan: Option<String>,
    #[serde(default)]
    pub time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillsCount {
    pub count: u64,
}

/// Result of `check_skill`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCheck {
    pub safe: bool,
    #[serde(default)]
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub providers: Vec<String>,
}

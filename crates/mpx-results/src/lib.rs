#![forbid(unsafe_code)]

//! Solver result documents as written by the modeling driver's
//! `--results-format=yaml` output, reduced to the objective values that the
//! conformance harness compares.

mod compare;

pub use compare::{
    ComparisonSummary, DEFAULT_PLACES, ObjectiveMismatch, Tolerance, almost_equal,
    compare_objectives,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

pub const SOLUTION_KEY: &str = "Solution";
pub const OBJECTIVE_KEY: &str = "Objective";

/// Placeholder the driver writes for `Objective` when a model declares none.
pub const NO_VALUES_PLACEHOLDER: &str = "No values";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveValue {
    #[serde(rename = "Value")]
    pub value: f64,
}

impl ObjectiveValue {
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

/// Objective name to value, for one entry of the `Solution` list.
pub type SolutionRecord = BTreeMap<String, ObjectiveValue>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultDocument {
    pub solutions: Vec<SolutionRecord>,
}

impl ResultDocument {
    #[must_use]
    pub fn new(solutions: Vec<SolutionRecord>) -> Self {
        Self { solutions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ResultError> {
        parse_document(raw)
    }

    #[must_use]
    pub fn into_solutions(self) -> Vec<SolutionRecord> {
        self.solutions
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    ReadFailed(String),
    YamlInvalid(String),
    SchemaInvalid(String),
    YamlUnavailable,
    WriteFailed(String),
}

impl ResultError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ReadFailed(_) => "result_read_failed",
            Self::YamlInvalid(_) => "result_yaml_invalid",
            Self::SchemaInvalid(_) => "result_schema_invalid",
            Self::YamlUnavailable => "result_yaml_unavailable",
            Self::WriteFailed(_) => "result_write_failed",
        }
    }
}

impl fmt::Display for ResultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(msg) => write!(f, "{msg}"),
            Self::YamlInvalid(msg) => write!(f, "invalid yaml: {msg}"),
            Self::SchemaInvalid(msg) => write!(f, "unexpected result layout: {msg}"),
            Self::YamlUnavailable => write!(f, "yaml support was not compiled in"),
            Self::WriteFailed(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for ResultError {}

/// Whether this build can read result files at all.
#[must_use]
pub fn yaml_available() -> bool {
    cfg!(feature = "yaml")
}

pub fn load_result_document(path: &Path) -> Result<ResultDocument, ResultError> {
    let raw = fs::read_to_string(path).map_err(|err| {
        ResultError::ReadFailed(format!("failed reading {}: {err}", path.display()))
    })?;
    ResultDocument::from_yaml_str(&raw).map_err(|err| match err {
        ResultError::YamlInvalid(msg) => {
            ResultError::YamlInvalid(format!("{}: {msg}", path.display()))
        }
        ResultError::SchemaInvalid(msg) => {
            ResultError::SchemaInvalid(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

/// Objective mappings of every `Solution` entry, in file order.
pub fn load_objectives(path: &Path) -> Result<Vec<SolutionRecord>, ResultError> {
    load_result_document(path).map(ResultDocument::into_solutions)
}

#[cfg(feature = "yaml")]
#[derive(Serialize)]
struct SerializedDocument<'a> {
    #[serde(rename = "Solution")]
    solution: Vec<SerializedSolution<'a>>,
}

#[cfg(feature = "yaml")]
#[derive(Serialize)]
struct SerializedSolution<'a> {
    #[serde(rename = "Objective")]
    objective: &'a SolutionRecord,
}

pub fn write_result_document(path: &Path, document: &ResultDocument) -> Result<(), ResultError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            ResultError::WriteFailed(format!("failed creating {}: {err}", parent.display()))
        })?;
    }
    let raw = render_document(document)?;
    fs::write(path, raw)
        .map_err(|err| ResultError::WriteFailed(format!("failed writing {}: {err}", path.display())))
}

#[cfg(feature = "yaml")]
fn serializable(document: &ResultDocument) -> SerializedDocument<'_> {
    SerializedDocument {
        solution: document
            .solutions
            .iter()
            .map(|objective| SerializedSolution { objective })
            .collect(),
    }
}

#[cfg(feature = "yaml")]
fn render_document(document: &ResultDocument) -> Result<String, ResultError> {
    serde_yaml::to_string(&serializable(document))
        .map_err(|err| ResultError::WriteFailed(format!("failed serializing yaml: {err}")))
}

#[cfg(not(feature = "yaml"))]
fn render_document(_document: &ResultDocument) -> Result<String, ResultError> {
    Err(ResultError::YamlUnavailable)
}

#[cfg(not(feature = "yaml"))]
fn parse_document(_raw: &str) -> Result<ResultDocument, ResultError> {
    Err(ResultError::YamlUnavailable)
}

#[cfg(feature = "yaml")]
fn parse_document(raw: &str) -> Result<ResultDocument, ResultError> {
    use serde_yaml::Value;

    let root: Value =
        serde_yaml::from_str(raw).map_err(|err| ResultError::YamlInvalid(err.to_string()))?;
    let entries = match root {
        Value::Null => Vec::new(),
        Value::Mapping(mut map) => match map.remove(SOLUTION_KEY) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(entries)) => entries,
            Some(other) => {
                return Err(ResultError::SchemaInvalid(format!(
                    "`{SOLUTION_KEY}` must be a list, found {}",
                    value_kind(&other)
                )));
            }
        },
        other => {
            return Err(ResultError::SchemaInvalid(format!(
                "document root must be a mapping, found {}",
                value_kind(&other)
            )));
        }
    };

    let solutions = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| parse_solution_entry(index, entry))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ResultDocument { solutions })
}

#[cfg(feature = "yaml")]
fn parse_solution_entry(index: usize, entry: serde_yaml::Value) -> Result<SolutionRecord, ResultError> {
    use serde_yaml::Value;

    let mut entry = match entry {
        Value::Null => return Ok(SolutionRecord::new()),
        Value::Mapping(map) => map,
        other => {
            return Err(ResultError::SchemaInvalid(format!(
                "solution {index} must be a mapping, found {}",
                value_kind(&other)
            )));
        }
    };

    let objectives = match entry.remove(OBJECTIVE_KEY) {
        None | Some(Value::Null) => return Ok(SolutionRecord::new()),
        Some(Value::String(text)) if text.trim() == NO_VALUES_PLACEHOLDER => {
            return Ok(SolutionRecord::new());
        }
        Some(Value::Mapping(map)) => map,
        Some(other) => {
            return Err(ResultError::SchemaInvalid(format!(
                "solution {index} `{OBJECTIVE_KEY}` must be a mapping, found {}",
                value_kind(&other)
            )));
        }
    };

    let mut record = SolutionRecord::new();
    for (name, value) in objectives {
        let name = match name {
            Value::String(name) => name,
            Value::Number(number) => number.to_string(),
            other => {
                return Err(ResultError::SchemaInvalid(format!(
                    "solution {index} has an objective keyed by {}",
                    value_kind(&other)
                )));
            }
        };
        let value: ObjectiveValue = serde_yaml::from_value(value).map_err(|err| {
            ResultError::SchemaInvalid(format!("solution {index} objective `{name}`: {err}"))
        })?;
        record.insert(name, value);
    }
    Ok(record)
}

#[cfg(feature = "yaml")]
fn value_kind(value: &serde_yaml::Value) -> &'static str {
    use serde_yaml::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

// src/core/graph/analysis.rs
//! Decoding of the structural analyzer's call-graph output.
//!
//! The analyzer writes `{"functions": [...], "relationships": [...]}`. Records
//! are decoded one at a time so that a single malformed entry is skipped
//! instead of failing the whole document.

use std::path::Path;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CodeweaveError, Result};

/// Raw component record as emitted by the analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawComponentRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub component_type: Option<String>,
    pub node_type: Option<String>,
    pub file_path: Option<String>,
    pub relative_path: Option<String>,
    pub source_code: Option<String>,
    pub code_snippet: Option<String>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub has_docstring: Option<bool>,
    pub docstring: Option<String>,
    pub parameters: Option<Vec<Value>>,
    pub base_classes: Option<Vec<String>>,
    pub class_name: Option<String>,
    pub display_name: Option<String>,
}

impl RawComponentRecord {
    /// The declared type, preferring `component_type` over `node_type`
    pub fn type_label(&self) -> &str {
        self.component_type
            .as_deref()
            .or(self.node_type.as_deref())
            .unwrap_or("function")
    }

    pub fn source(&self) -> &str {
        self.source_code
            .as_deref()
            .or(self.code_snippet.as_deref())
            .unwrap_or_default()
    }

    /// Parameter descriptors flattened to display strings
    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters
            .iter()
            .flatten()
            .map(|param| match param {
                Value::String(s) => s.clone(),
                Value::Object(map) => map
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| param.to_string()),
                other => other.to_string(),
            })
            .collect()
    }
}

/// Raw caller/callee relationship
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEdgeRecord {
    pub caller: Option<String>,
    pub callee: Option<String>,
    pub call_line: Option<usize>,
    pub is_resolved: bool,
}

impl RawEdgeRecord {
    pub fn new(caller: &str, callee: &str) -> Self {
        Self {
            caller: Some(caller.to_string()),
            callee: Some(callee.to_string()),
            call_line: None,
            is_resolved: false,
        }
    }
}

/// Undecoded analyzer document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisOutput {
    pub functions: Vec<Value>,
    pub relationships: Vec<Value>,
}

/// Analyzer output after per-record decoding
#[derive(Debug, Clone, Default)]
pub struct DecodedAnalysis {
    pub functions: Vec<RawComponentRecord>,
    pub relationships: Vec<RawEdgeRecord>,
    /// Records that could not be decoded at all
    pub malformed_records: usize,
}

impl AnalysisOutput {
    /// Read an analyzer document from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CodeweaveError::file_system(path, e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| CodeweaveError::Analysis(format!("expected functions/relationships document: {}", e)))
    }

    /// Decode every record, skipping the ones that don't fit the expected shape
    pub fn decode(self) -> DecodedAnalysis {
        let mut decoded = DecodedAnalysis::default();

        for (i, value) in self.functions.into_iter().enumerate() {
            match serde_json::from_value::<RawComponentRecord>(value) {
                Ok(record) => decoded.functions.push(record),
                Err(e) => {
                    warn!("Skipping malformed component record #{}: {}", i, e);
                    decoded.malformed_records += 1;
                }
            }
        }

        for (i, value) in self.relationships.into_iter().enumerate() {
            match serde_json::from_value::<RawEdgeRecord>(value) {
                Ok(record) => decoded.relationships.push(record),
                Err(e) => {
                    debug!("Skipping malformed relationship record #{}: {}", i, e);
                    decoded.malformed_records += 1;
                }
            }
        }

        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_skips_malformed_records() {
        let output = AnalysisOutput::from_json(
            r#"{
                "functions": [
                    {"id": "pkg.a", "name": "a", "node_type": "class", "code_snippet": "class A: pass"},
                    {"id": 42, "name": "broken"},
                    "not even an object"
                ],
                "relationships": [
                    {"caller": "pkg.a", "callee": "b", "is_resolved": true},
                    {"caller": ["nope"]}
                ]
            }"#,
        )
        .unwrap();

        let decoded = output.decode();
        assert_eq!(decoded.functions.len(), 1);
        assert_eq!(decoded.relationships.len(), 1);
        assert_eq!(decoded.malformed_records, 3);

        let record = &decoded.functions[0];
        assert_eq!(record.type_label(), "class");
        assert_eq!(record.source(), "class A: pass");
    }

    #[test]
    fn test_parameter_descriptors() {
        let record: RawComponentRecord = serde_json::from_str(
            r#"{"id": "m.f", "parameters": ["self", {"name": "count", "type": "int"}, 3]}"#,
        )
        .unwrap();

        assert_eq!(record.parameter_names(), vec!["self", "count", "3"]);
        assert_eq!(record.type_label(), "function");
    }

    #[test]
    fn test_rejects_non_document() {
        assert!(matches!(
            AnalysisOutput::from_json("[1, 2, 3]"),
            Err(CodeweaveError::Analysis(_))
        ));
    }
}

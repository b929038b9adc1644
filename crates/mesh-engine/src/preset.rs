//! Unit configuration trees (presets)
//!
//! A preset is a small tree: an optional unit type tag plus a map of named
//! values. Blobs arrive as YAML or JSON text (JSON is accepted because YAML
//! is a superset for our purposes) and are parsed on the producer thread, so
//! the processing thread only ever validates and swaps an already-built tree.
//!
//! ```yaml
//! type: tone
//! params:
//!   freq: 220.0
//!   gain: 0.5
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{PresetError, PresetResult};

/// A single value in a preset tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PresetValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<PresetValue>),
}

impl PresetValue {
    /// Numeric view of the value (bools map to 0/1)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PresetValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            PresetValue::Int(i) => Some(*i as f64),
            PresetValue::Float(f) => Some(*f),
            PresetValue::Text(_) | PresetValue::List(_) => None,
        }
    }
}

/// A unit's full configuration tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresetTree {
    /// Unit type this preset was written for (optional on input)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<String>,
    /// Parameter values by name
    #[serde(default)]
    pub params: BTreeMap<String, PresetValue>,
}

impl PresetTree {
    /// Create an empty tree tagged with a unit type
    pub fn for_type(unit_type: &str) -> Self {
        Self {
            unit_type: Some(unit_type.to_string()),
            params: BTreeMap::new(),
        }
    }

    /// Parse a YAML or JSON blob
    pub fn parse(blob: &str) -> PresetResult<Self> {
        if blob.trim().is_empty() {
            return Err(PresetError::Parse("empty preset".to_string()));
        }
        serde_yaml::from_str(blob).map_err(|e| PresetError::Parse(e.to_string()))
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> PresetResult<String> {
        serde_yaml::to_string(self).map_err(|e| PresetError::Parse(e.to_string()))
    }

    /// Serialize to compact JSON (for single-line control messages)
    pub fn to_json(&self) -> PresetResult<String> {
        serde_json::to_string(self).map_err(|e| PresetError::Parse(e.to_string()))
    }

    /// Insert a numeric parameter
    pub fn with_param(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), PresetValue::Float(value));
        self
    }

    /// Check the type tag against a unit type (an untagged tree matches any)
    pub fn check_type(&self, expected: &str) -> PresetResult<()> {
        match &self.unit_type {
            Some(found) if found != expected => Err(PresetError::WrongType {
                expected: expected.to_string(),
                found: found.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Load a preset file from disk
pub fn load_preset(path: &Path) -> anyhow::Result<PresetTree> {
    let blob = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read preset: {:?}", path))?;
    PresetTree::parse(&blob).with_context(|| format!("Invalid preset: {:?}", path))
}

/// Save a preset file to disk as YAML
pub fn save_preset(tree: &PresetTree, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create preset directory: {:?}", parent))?;
    }
    let yaml = tree.to_yaml()?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write preset: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = PresetTree::parse("type: tone\nparams:\n  freq: 220.0\n  gain: 1\n").unwrap();
        let json = PresetTree::parse(r#"{"type":"tone","params":{"freq":220.0,"gain":1}}"#).unwrap();
        assert_eq!(yaml, json);
        assert_eq!(yaml.params.get("gain"), Some(&PresetValue::Int(1)));
        assert_eq!(yaml.params["freq"].as_f64(), Some(220.0));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PresetTree::parse("").is_err());
        assert!(PresetTree::parse("params: [1, 2").is_err());
        assert!(PresetTree::parse("colour: red").is_err());
    }

    #[test]
    fn test_check_type() {
        let tree = PresetTree::for_type("tone");
        assert!(tree.check_type("tone").is_ok());
        assert!(matches!(
            tree.check_type("player"),
            Err(PresetError::WrongType { .. })
        ));
        assert!(PresetTree::default().check_type("player").is_ok());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets").join("tone.yaml");
        let tree = PresetTree::for_type("tone").with_param("freq", 330.0);

        save_preset(&tree, &path).unwrap();
        assert_eq!(load_preset(&path).unwrap(), tree);
    }

    #[test]
    fn test_json_is_single_line() {
        let tree = PresetTree::for_type("tone").with_param("gain", 0.5);
        let json = tree.to_json().unwrap();
        assert!(!json.contains('\n'));
        assert_eq!(PresetTree::parse(&json).unwrap(), tree);
    }
}

//! Versioned preset document
//!
//! The wire form is a UTF-8 JSON object with a `formatVersion` integer.
//! The document keeps the full JSON tree it was loaded from: typed writes
//! merge into it, so keys written by newer versions survive a load/save
//! round trip untouched, at every nesting level.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Current document format version
pub const PRESET_FORMAT_VERSION: i64 = 4;

/// A preset: typed access over a preserved JSON tree
#[derive(Debug, Clone, PartialEq)]
pub struct PresetDocument {
    root: Map<String, Value>,
}

impl PresetDocument {
    /// Empty document at the current format version
    pub fn new() -> Self {
        let mut root = Map::new();
        root.insert(
            "formatVersion".to_string(),
            Value::from(PRESET_FORMAT_VERSION),
        );
        Self { root }
    }

    /// Parse a document, rejecting unusable format versions
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let root = match value {
            Value::Object(map) => map,
            other => {
                return Err(CoreError::ConfigInvalid(format!(
                    "preset root must be an object, found {}",
                    json_kind(&other)
                )))
            }
        };
        let version = root
            .get("formatVersion")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                CoreError::ConfigInvalid("preset is missing an integer formatVersion".into())
            })?;
        if version < PRESET_FORMAT_VERSION {
            return Err(CoreError::ConfigInvalid(format!(
                "preset format {version} is older than supported {PRESET_FORMAT_VERSION}"
            )));
        }
        Ok(Self { root })
    }

    /// Serialise with stable key order
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&Value::Object(self.root.clone()))
            .expect("JSON tree serialises")
    }

    /// Read a document from disk
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let doc = Self::from_json(&text)?;
        tracing::info!("Preset loaded from {}", path.display());
        Ok(doc)
    }

    /// Write the document atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_json_pretty())?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!("Preset saved to {}", path.display());
        Ok(())
    }

    /// Declared format version
    pub fn format_version(&self) -> i64 {
        self.root
            .get("formatVersion")
            .and_then(Value::as_i64)
            .unwrap_or(PRESET_FORMAT_VERSION)
    }

    /// The raw tree
    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    // -- Navigation --

    /// Value at a nested key path
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.root.get(*first)?;
        for key in rest {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    /// Float at a nested key path
    pub fn get_f32(&self, path: &[&str]) -> Option<f32> {
        self.get(path)?.as_f64().map(|v| v as f32)
    }

    /// Bool at a nested key path
    pub fn get_bool(&self, path: &[&str]) -> Option<bool> {
        self.get(path)?.as_bool()
    }

    /// String at a nested key path
    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get(path)?.as_str()
    }

    /// String list at a nested key path (non-strings skipped)
    pub fn get_str_list(&self, path: &[&str]) -> Option<Vec<String>> {
        let list = self.get(path)?.as_array()?;
        Some(
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }

    /// Merge-write a value at a nested key path
    ///
    /// Intermediate objects are created as needed; sibling keys (including
    /// unknown ones) are left untouched. A non-object intermediate value is
    /// replaced.
    pub fn set(&mut self, path: &[&str], value: impl Into<Value>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };
        let mut current = &mut self.root;
        for key in parents {
            let entry = current
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry.as_object_mut().expect("just ensured object");
        }
        current.insert(last.to_string(), value.into());
    }
}

impl Default for PresetDocument {
    fn default() -> Self {
        Self::new()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Raw mapping-spec documents as written by users.
//!
//! These types mirror the on-disk shape one to one and do no validation
//! beyond what serde enforces. [`super::model`] turns a document into a
//! validated [`super::MappingSpec`].

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use super::SpecError;
use crate::value::Value;

/// Supported document encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Yaml,
    Json,
    Toml,
}

impl SpecFormat {
    /// Pick a format from a file extension. Unknown extensions are read as
    /// YAML, which also accepts JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => SpecFormat::Json,
            Some("toml") => SpecFormat::Toml,
            _ => SpecFormat::Yaml,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpecFormat::Yaml => "YAML",
            SpecFormat::Json => "JSON",
            SpecFormat::Toml => "TOML",
        }
    }
}

/// Top-level spec document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_dedupe_on: Option<Vec<String>>,

    #[serde(default)]
    pub columns: IndexMap<String, RuleDocument>,

    /// Anything else at the top level. Keys starting with `_` are driver
    /// annotations and are ignored; others are rejected during validation.
    #[serde(flatten, skip_serializing)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// One rule: a column rule, or a lookup `match`/`defaults` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// `const: null` is a valid rule, so presence is tracked separately
    /// from the value.
    #[serde(
        rename = "const",
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub constant: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformList>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_type: Option<String>,
}

fn deserialize_present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

/// Transform chain, either `"strip|lower"` or `[strip, lower]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformList {
    Pipe(String),
    List(Vec<String>),
}

impl TransformList {
    /// Individual operation names, trimmed and lowercased. Empty segments
    /// are dropped.
    pub fn names(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            TransformList::Pipe(s) => s.split('|').collect(),
            TransformList::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Lookup block inside a column rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,

    #[serde(rename = "match", default, skip_serializing_if = "IndexMap::is_empty")]
    pub matches: IndexMap<String, RuleDocument>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_if_missing: bool,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub defaults: IndexMap<String, RuleDocument>,
}

impl SpecDocument {
    /// Parse a document from text in the given format.
    pub fn parse(text: &str, format: SpecFormat) -> Result<Self, SpecError> {
        let parse_error = |message: String| SpecError::Parse {
            format: format.as_str(),
            message,
        };
        match format {
            SpecFormat::Yaml => serde_yaml::from_str(text).map_err(|e| parse_error(e.to_string())),
            SpecFormat::Json => serde_json::from_str(text).map_err(|e| parse_error(e.to_string())),
            SpecFormat::Toml => toml::from_str(text).map_err(|e| parse_error(e.to_string())),
        }
    }

    /// Read and parse a document, choosing the format by extension.
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let text = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, SpecFormat::from_path(path))
    }

    /// Serialize the document in the given format.
    pub fn render(&self, format: SpecFormat) -> Result<String, SpecError> {
        let serialize_error = |message: String| SpecError::Serialize {
            format: format.as_str(),
            message,
        };
        match format {
            SpecFormat::Yaml => serde_yaml::to_string(self).map_err(|e| serialize_error(e.to_string())),
            SpecFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| serialize_error(e.to_string()))
            }
            SpecFormat::Toml => toml::to_string(self).map_err(|e| serialize_error(e.to_string())),
        }
    }
}

//! Flat JSON exchange format
//!
//! ```json
//! { "annotations": [...], "docFiles": [...], "codeFiles": [...] }
//! ```
//!
//! All three keys are required on import. Field names are camelCase, times
//! are RFC 3339.

use crate::annotation::{Annotation, AnnotationId};
use crate::error::ExchangeError;
use crate::source_index::{SourceIndex, SourceKind, decode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;
use uuid::Uuid;

/// Top-level keys an exchange document must carry.
pub const REQUIRED_KEYS: [&str; 3] = ["annotations", "docFiles", "codeFiles"];

/// A source file as the surrounding product supplies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    /// Raw text as uploaded, before normalization
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_document: Option<String>,
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub last_modified: OffsetDateTime,
    #[serde(default)]
    pub local_path: String,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content: content.into(),
            kind,
            rendered_document: None,
            last_modified: OffsetDateTime::now_utc(),
            local_path: String::new(),
        }
    }

    /// Build a file from raw bytes, decoding legacy encodings if needed.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8], kind: SourceKind) -> Self {
        Self::new(name, decode(bytes), kind)
    }

    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = path.into();
        self
    }

    /// Normalize and index the content.
    pub fn index(&self, split_adjacent_math: bool) -> SourceIndex {
        SourceIndex::prepare(&self.content, self.kind, split_adjacent_math)
    }
}

/// The exchange object, as written to and read from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeDocument {
    pub annotations: Vec<Annotation>,
    pub doc_files: Vec<ProjectFile>,
    pub code_files: Vec<ProjectFile>,
}

impl ExchangeDocument {
    /// Parse and validate an exchange document.
    pub fn from_json(text: &str) -> Result<Self, ExchangeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let object = value.as_object().ok_or(ExchangeError::NotAnObject)?;
        if let Some(missing) = REQUIRED_KEYS.iter().find(|key| !object.contains_key(**key)) {
            return Err(ExchangeError::MissingKey(*missing));
        }
        let document: Self = serde_json::from_value(value)?;
        document.validate()?;
        Ok(document)
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, ExchangeError> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// Reject duplicate annotation ids and inverted ranges.
    pub fn validate(&self) -> Result<(), ExchangeError> {
        let mut seen: HashSet<AnnotationId> = HashSet::new();
        for annotation in &self.annotations {
            if !seen.insert(annotation.id) {
                return Err(ExchangeError::DuplicateId(annotation.id));
            }
            let mut ranges = annotation.doc_ranges.iter().chain(&annotation.code_ranges);
            if let Some(bad) = ranges.find(|r| r.start > r.end) {
                return Err(ExchangeError::InvertedRange {
                    id: annotation.id,
                    document_id: bad.document_id.clone(),
                    start: bad.start,
                    end: bad.end,
                });
            }
        }
        Ok(())
    }
}

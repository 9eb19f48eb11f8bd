//! Annotation entities

use crate::offset::SourceOffset;
use crate::source_index::{SourceIndex, SourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Category given to annotations created without an explicit one.
pub const DEFAULT_CATEGORY: &str = "New annotation";

/// Stable identifier of an [`Annotation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(Uuid);

impl AnnotationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for AnnotationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AnnotationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A `[start, end)` range inside one source file.
///
/// `content` is a copy of the source text taken when the range was created.
/// It exists for export and display only; `start`/`end` are authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchoredRange {
    pub document_id: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub content: String,
}

/// Range inside a requirement document.
pub type DocumentRange = AnchoredRange;

/// Range inside a code file.
pub type CodeRange = AnchoredRange;

impl AnchoredRange {
    pub fn new(document_id: impl Into<String>, range: SourceOffset, content: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            start: range.start,
            end: range.end,
            content: content.into(),
        }
    }

    /// Build a range and snapshot its text from `source`.
    pub fn capture(document_id: impl Into<String>, source: &SourceIndex, range: SourceOffset) -> Self {
        Self::new(document_id, range, source.slice(range))
    }

    /// The authoritative offsets, or `None` when inverted.
    pub fn offset(&self) -> Option<SourceOffset> {
        SourceOffset::new(self.start, self.end)
    }

    /// Whether this range is in `document_id` and covers `offset`.
    pub fn covers(&self, document_id: &str, offset: usize) -> bool {
        self.document_id == document_id && self.start <= offset && offset < self.end
    }
}

/// A link between requirement-document ranges and code ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(default = "AnnotationId::generate")]
    pub id: AnnotationId,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub doc_ranges: Vec<DocumentRange>,
    #[serde(default)]
    pub code_ranges: Vec<CodeRange>,
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub update_time: OffsetDateTime,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_owned()
}

impl Annotation {
    pub(crate) fn new(category: impl Into<String>) -> Self {
        Self {
            id: AnnotationId::generate(),
            category: category.into(),
            doc_ranges: Vec::new(),
            code_ranges: Vec::new(),
            update_time: OffsetDateTime::now_utc(),
        }
    }

    pub fn ranges(&self, kind: SourceKind) -> &[AnchoredRange] {
        match kind {
            SourceKind::Doc => &self.doc_ranges,
            SourceKind::Code => &self.code_ranges,
        }
    }

    pub(crate) fn ranges_mut(&mut self, kind: SourceKind) -> &mut Vec<AnchoredRange> {
        match kind {
            SourceKind::Doc => &mut self.doc_ranges,
            SourceKind::Code => &mut self.code_ranges,
        }
    }

    /// An annotation without ranges must not outlive the operation that
    /// emptied it.
    pub fn is_empty(&self) -> bool {
        self.doc_ranges.is_empty() && self.code_ranges.is_empty()
    }

    pub fn range_count(&self) -> usize {
        self.doc_ranges.len() + self.code_ranges.len()
    }

    pub(crate) fn touch(&mut self) {
        self.update_time = OffsetDateTime::now_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_snapshots_source_text() {
        let index = SourceIndex::new("The rate is $x^2$ today.");
        let range = AnchoredRange::capture("req.md", &index, SourceOffset::at(12, 5));
        assert_eq!(range.content, "$x^2$");
        assert_eq!(range.offset(), Some(SourceOffset::at(12, 5)));
        assert!(range.covers("req.md", 16));
        assert!(!range.covers("req.md", 17));
        assert!(!range.covers("other.md", 12));
    }

    #[test]
    fn annotation_id_parses_back() {
        let id = AnnotationId::generate();
        let parsed: AnnotationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn missing_fields_get_defaults_on_deserialize() {
        let json = r#"{"docRanges":[{"documentId":"a.md","start":1,"end":3}]}"#;
        let annotation: Annotation = serde_json::from_str(json).unwrap();
        assert_eq!(annotation.category, DEFAULT_CATEGORY);
        assert_eq!(annotation.doc_ranges[0].content, "");
        assert!(annotation.code_ranges.is_empty());
    }
}

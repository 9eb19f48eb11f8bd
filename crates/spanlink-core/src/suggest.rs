//! Related-code suggestions
//!
//! An external collaborator, given a requirement excerpt and the project's
//! code files, answers with line ranges it considers related. This module
//! defines that contract and folds answers into an annotation's code ranges.
//! At most one request per annotation may be in flight.

use crate::annotation::{AnchoredRange, AnnotationId};
use crate::error::SuggestError;
use crate::registry::AnnotationRegistry;
use crate::source_index::{SourceIndex, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// One code file as sent to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestFile {
    pub name: String,
    pub content: String,
    /// `content` with a `N:` gutter on every line
    pub numbered_content: String,
}

impl SuggestFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let numbered_content = number_lines(&content);
        Self {
            name: name.into(),
            content,
            numbered_content,
        }
    }
}

/// Prefix every line with its 1-based number, left-aligned in five columns.
pub fn number_lines(content: &str) -> String {
    content
        .split('\n')
        .enumerate()
        .map(|(i, line)| format!("{:<5}{line}\n", format!("{}:", i + 1)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestRequest {
    pub requirement: String,
    pub code_files: Vec<SuggestFile>,
}

impl SuggestRequest {
    /// A request for `requirement` against every code file in `registry`.
    pub fn for_registry(requirement: impl Into<String>, registry: &AnnotationRegistry) -> Self {
        Self {
            requirement: requirement.into(),
            code_files: registry
                .files(SourceKind::Code)
                .iter()
                .map(|f| {
                    let normalized = f.index(false);
                    SuggestFile::new(f.name.clone(), normalized.text())
                })
                .collect(),
        }
    }
}

/// A related span, with 1-based inclusive line numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedCode {
    pub filename: String,
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    #[serde(default)]
    pub related_code: Vec<RelatedCode>,
}

/// The collaborator.
pub trait Suggester {
    fn suggest(&self, request: &SuggestRequest) -> Result<SuggestResponse, SuggestError>;
}

impl<F> Suggester for F
where
    F: Fn(&SuggestRequest) -> Result<SuggestResponse, SuggestError>,
{
    fn suggest(&self, request: &SuggestRequest) -> Result<SuggestResponse, SuggestError> {
        self(request)
    }
}

/// Proof that a request for `annotation` was started.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct Ticket {
    annotation: AnnotationId,
}

impl Ticket {
    pub fn annotation(&self) -> AnnotationId {
        self.annotation
    }
}

/// Tracks in-flight requests so the same annotation is never asked twice at
/// once.
#[derive(Debug, Default)]
pub struct SuggestionTracker {
    in_flight: HashSet<AnnotationId>,
}

impl SuggestionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, annotation: AnnotationId) -> Result<Ticket, SuggestError> {
        if !self.in_flight.insert(annotation) {
            return Err(SuggestError::AlreadyInFlight(annotation));
        }
        Ok(Ticket { annotation })
    }

    pub fn is_in_flight(&self, annotation: AnnotationId) -> bool {
        self.in_flight.contains(&annotation)
    }

    /// Finish a request and fold its answer into the annotation's code
    /// ranges. Returns how many ranges were added.
    ///
    /// A failed request, or an answer naming an unknown file or invalid
    /// lines, adds nothing. An answer for an annotation that has since been
    /// deleted is ignored.
    pub fn complete(
        &mut self,
        ticket: Ticket,
        registry: &mut AnnotationRegistry,
        result: Result<SuggestResponse, SuggestError>,
    ) -> Result<usize, SuggestError> {
        if !self.in_flight.remove(&ticket.annotation) {
            return Err(SuggestError::NotInFlight(ticket.annotation));
        }
        let response = result?;
        if registry.get(ticket.annotation).is_none() {
            debug!(id = %ticket.annotation, "ignoring suggestion for deleted annotation");
            return Ok(0);
        }

        let ranges = fold_ranges(registry, &response)?;
        let added = ranges.len();
        for range in ranges {
            registry
                .append_range(ticket.annotation, range, SourceKind::Code)
                .map_err(|err| SuggestError::Failed(err.to_string()))?;
        }
        Ok(added)
    }

    /// Begin, call the collaborator, and complete in one step.
    pub fn run(
        &mut self,
        suggester: &dyn Suggester,
        annotation: AnnotationId,
        requirement: &str,
        registry: &mut AnnotationRegistry,
    ) -> Result<usize, SuggestError> {
        let ticket = self.begin(annotation)?;
        let request = SuggestRequest::for_registry(requirement, registry);
        let result = suggester.suggest(&request);
        if let Err(err) = &result {
            warn!("suggestion request failed: {err}");
        }
        self.complete(ticket, registry, result)
    }
}

/// Convert every related span to a code range, or fail without converting any.
fn fold_ranges(
    registry: &AnnotationRegistry,
    response: &SuggestResponse,
) -> Result<Vec<AnchoredRange>, SuggestError> {
    let mut indexes: HashMap<&str, SourceIndex> = HashMap::new();
    let mut ranges = Vec::with_capacity(response.related_code.len());
    for related in &response.related_code {
        let name = related.filename.as_str();
        if !indexes.contains_key(name) {
            let file = registry
                .file_by_name(SourceKind::Code, name)
                .ok_or_else(|| SuggestError::UnknownFile(related.filename.clone()))?;
            indexes.insert(name, file.index(false));
        }
        let index = &indexes[name];
        let span = index
            .lines_span(related.start, related.end)
            .ok_or_else(|| SuggestError::InvalidLines {
                file: related.filename.clone(),
                start: related.start,
                end: related.end,
            })?;
        ranges.push(AnchoredRange::capture(related.filename.clone(), index, span));
    }
    Ok(ranges)
}

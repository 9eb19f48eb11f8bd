//! Error taxonomy
//!
//! Resolution failures are not errors: the resolver returns `None` and the
//! caller treats it as "nothing selected".

use crate::annotation::AnnotationId;
use crate::offset::SourceOffset;
use crate::source_index::SourceKind;

/// The document could not be turned into a display tree.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("node {node} has provenance {range} outside a source of {len} codepoints")]
    ProvenanceOutOfBounds {
        node: usize,
        range: SourceOffset,
        len: usize,
    },
}

/// A registry operation broke a contract. The registry is left unchanged.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("annotation {0} does not exist")]
    UnknownAnnotation(AnnotationId),

    #[error("annotation {id} has no {kind} range at index {index} ({len} present)")]
    RangeIndexOutOfBounds {
        id: AnnotationId,
        kind: SourceKind,
        index: usize,
        len: usize,
    },

    #[error("range [{start}, {end}) in `{document_id}` is inverted")]
    InvertedRange {
        document_id: String,
        start: usize,
        end: usize,
    },

    #[error("a {kind} file named `{name}` is already registered")]
    DuplicateFile { kind: SourceKind, name: String },

    #[error("no {kind} file named `{name}` is registered")]
    UnknownFile { kind: SourceKind, name: String },
}

/// An exchange document could not be imported. Nothing was mutated.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("exchange document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("exchange document must be a JSON object")]
    NotAnObject,

    #[error("exchange document is missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("annotation {id} has inverted range [{start}, {end}) in `{document_id}`")]
    InvertedRange {
        id: AnnotationId,
        document_id: String,
        start: usize,
        end: usize,
    },

    #[error("annotation id {0} appears more than once")]
    DuplicateId(AnnotationId),
}

/// The external suggestion collaborator failed. Stored ranges are untouched.
#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("suggestion request failed: {0}")]
    Failed(String),

    #[error("a suggestion request for annotation {0} is already in flight")]
    AlreadyInFlight(AnnotationId),

    #[error("no suggestion request for annotation {0} is in flight")]
    NotInFlight(AnnotationId),

    #[error("suggestion names unknown code file `{0}`")]
    UnknownFile(String),

    #[error("suggestion for `{file}` has invalid lines {start}..={end}")]
    InvalidLines {
        file: String,
        start: usize,
        end: usize,
    },
}

/// Umbrella error for callers that do not care which layer failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Suggest(#[from] SuggestError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

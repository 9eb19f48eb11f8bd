//! spanlink-core - Core library for anchoring rendered selections to source ranges
//!
//! This crate provides the building blocks for:
//! - Rendering Markdown (with math) or code into a display tree whose nodes
//!   remember the source range they came from
//! - Resolving a selection made in the rendered view back to an exact
//!   `[start, end)` range of the original source
//! - Storing annotations that link requirement-document ranges to code ranges,
//!   and exchanging them as JSON
//! - Mapping stored ranges back onto display nodes for scroll-and-highlight
//!
//! All offsets are codepoint indices into the normalized source (line
//! endings folded to `\n`, zero-width spaces removed). See [`SourceIndex`].
//!
//! # Rendering and resolving
//!
//! ```
//! use spanlink_core::{RangeResolver, SelectionPoint, SourceIndex, render};
//!
//! let source = SourceIndex::new("The rate is $x^2$ today.");
//! let tree = render(&source).unwrap();
//!
//! // A selection from inside the rendered formula into "today"
//! let (math, _) = tree.iter().find(|(_, n)| n.is_atomic()).unwrap();
//! let (after, _) = tree.iter().find(|(_, n)| n.text == " today.").unwrap();
//!
//! let range = RangeResolver::new(&tree)
//!     .resolve_nonempty(SelectionPoint::new(math, 1), SelectionPoint::new(after, 4))
//!     .unwrap();
//! assert_eq!(source.slice(range), "$x^2$ tod");
//! ```
//!
//! # Annotating
//!
//! ```
//! use spanlink_core::{AnchoredRange, AnnotationRegistry, SourceIndex, SourceKind, SourceOffset};
//!
//! let source = SourceIndex::new("The rate is $x^2$ today.");
//! let mut registry = AnnotationRegistry::new();
//! let id = registry
//!     .create(
//!         "Rate",
//!         AnchoredRange::capture("req.md", &source, SourceOffset::at(12, 5)),
//!         SourceKind::Doc,
//!     )
//!     .unwrap()
//!     .id;
//!
//! // Removing the only range removes the annotation too
//! registry.remove_range(id, SourceKind::Doc, 0).unwrap();
//! assert!(registry.get(id).is_none());
//! ```

mod annotation;
pub mod display;
mod error;
mod exchange;
pub mod html;
pub mod navigate;
mod offset;
mod registry;
pub mod render;
mod resolve;
mod source_index;
pub mod suggest;

pub use annotation::{
    AnchoredRange, Annotation, AnnotationId, CodeRange, DEFAULT_CATEGORY, DocumentRange,
};
pub use display::{Bias, DisplayNode, DisplayTree, NodeId, NodeKind, NodeTag, SelectionPoint};
pub use error::{Error, ExchangeError, ParseError, RegistryError, Result, SuggestError};
pub use exchange::{ExchangeDocument, ProjectFile, REQUIRED_KEYS};
pub use navigate::{
    HighlightState, LineBlock, NavigationIndex, RangeCursor, SegmentKind, coalesce_lines,
};
pub use offset::SourceOffset;
pub use registry::{AnnotationRegistry, RemoveOutcome};
pub use render::{ProvenanceRenderer, RenderMode, RenderOptions, placeholder, render};
pub use resolve::{RangeResolver, TextLayout};
pub use source_index::{
    CODE_EXTENSIONS, DOC_EXTENSIONS, SourceIndex, SourceKind, build_line_index, decode, normalize,
};

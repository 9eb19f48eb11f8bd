//! Provenance-preserving rendering
//!
//! Turns a normalized source text into a [`DisplayTree`] whose nodes carry the
//! source range they were produced from. Three paths exist:
//!
//! - [`markdown`]: the structural path. Spans come straight from the parser's
//!   byte offsets, never from searching the rendered text.
//! - [`code`]: one node per line of a code file.
//! - [`degraded`]: sequential substring search over the source. Ambiguous when
//!   text repeats; only used when explicitly configured.
//!
//! # Example
//!
//! ```
//! use spanlink_core::render::render;
//! use spanlink_core::SourceIndex;
//!
//! let source = SourceIndex::new("The rate is $x^2$ today.");
//! let tree = render(&source).unwrap();
//! let math = tree
//!     .iter()
//!     .find_map(|(_, node)| node.is_atomic().then_some(node.provenance).flatten())
//!     .unwrap();
//! assert_eq!(source.slice(math), "$x^2$");
//! ```

pub mod code;
pub mod degraded;
pub mod markdown;

use crate::display::{DisplayTree, NodeKind, NodeTag, TreeBuilder};
use crate::error::ParseError;
use crate::source_index::{SourceIndex, SourceKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How document provenance is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    /// Parser-reported spans on every node
    #[default]
    Structural,
    /// Sequential substring search, leaf and paragraph granularity only
    SubstringSearch,
}

impl RenderMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "structural" => Some(RenderMode::Structural),
            "substring-search" => Some(RenderMode::SubstringSearch),
            _ => None,
        }
    }
}

/// Knobs for the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub mode: RenderMode,
    /// Tables, strikethrough, task lists and footnotes
    pub gfm: bool,
    /// Insert a space into `$a$$b$` during normalization
    pub split_adjacent_math: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            mode: RenderMode::Structural,
            gfm: true,
            split_adjacent_math: true,
        }
    }
}

impl RenderOptions {
    pub(crate) fn parser_options(&self) -> pulldown_cmark::Options {
        use pulldown_cmark::Options;
        let mut options = Options::ENABLE_MATH;
        if self.gfm {
            options |= Options::ENABLE_TABLES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_FOOTNOTES;
        }
        options
    }
}

/// Renders sources into display trees according to [`RenderOptions`].
#[derive(Debug, Clone, Default)]
pub struct ProvenanceRenderer {
    options: RenderOptions,
}

impl ProvenanceRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Normalize raw text for `kind` with this renderer's options and index it.
    pub fn prepare(&self, raw: &str, kind: SourceKind) -> SourceIndex {
        SourceIndex::prepare(raw, kind, self.options.split_adjacent_math)
    }

    /// Render a Markdown document.
    pub fn render_document(&self, source: &SourceIndex) -> Result<DisplayTree, ParseError> {
        let tree = match self.options.mode {
            RenderMode::Structural => markdown::render(source, &self.options),
            RenderMode::SubstringSearch => degraded::render(source, &self.options),
        };
        let tree = validate(tree)?;
        debug!(
            nodes = tree.len(),
            mode = ?self.options.mode,
            "rendered document"
        );
        Ok(tree)
    }

    /// Render a code file, one node per line.
    pub fn render_code(&self, source: &SourceIndex) -> DisplayTree {
        code::render(source)
    }

    /// Render through the path that matches `kind`.
    pub fn render(&self, source: &SourceIndex, kind: SourceKind) -> Result<DisplayTree, ParseError> {
        match kind {
            SourceKind::Doc => self.render_document(source),
            SourceKind::Code => Ok(self.render_code(source)),
        }
    }

    /// Like [`render`](Self::render), but a failure yields a placeholder tree
    /// instead of an error.
    pub fn render_or_placeholder(&self, source: &SourceIndex, kind: SourceKind) -> DisplayTree {
        self.render(source, kind).unwrap_or_else(|err| {
            warn!("rendering failed, showing placeholder: {err}");
            placeholder(source, &format!("Rendering failed: {err}"))
        })
    }
}

/// Render a Markdown document with default options.
pub fn render(source: &SourceIndex) -> Result<DisplayTree, ParseError> {
    ProvenanceRenderer::default().render_document(source)
}

/// A tree holding a single message leaf whose root still covers the source.
pub fn placeholder(source: &SourceIndex, message: &str) -> DisplayTree {
    let mut builder = TreeBuilder::new(NodeTag::Document, Some(source.full_range()));
    builder.leaf(NodeKind::TextRun, NodeTag::Placeholder, message, None);
    builder.finish(source.len())
}

fn validate(tree: DisplayTree) -> Result<DisplayTree, ParseError> {
    match tree.find_out_of_bounds() {
        Some((node, range)) => Err(ParseError::ProvenanceOutOfBounds {
            node: node.0,
            range,
            len: tree.source_len(),
        }),
        None => Ok(tree),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_keeps_root_provenance() {
        let source = SourceIndex::new("# title");
        let tree = placeholder(&source, "boom");
        assert_eq!(tree.root_node().provenance, Some(source.full_range()));
        assert_eq!(tree.text(tree.root()), "boom");
    }

    #[test]
    fn render_dispatches_on_kind() {
        let renderer = ProvenanceRenderer::default();
        let source = renderer.prepare("a\r\nb", SourceKind::Code);
        let tree = renderer.render(&source, SourceKind::Code).unwrap();
        assert_eq!(tree.root_node().tag, NodeTag::CodeFile);
        assert_eq!(tree.children(tree.root()).len(), 2);
    }

    #[test]
    fn substring_mode_is_selectable() {
        let renderer = ProvenanceRenderer::new(RenderOptions {
            mode: RenderMode::SubstringSearch,
            ..RenderOptions::default()
        });
        let source = renderer.prepare("hello *world*", SourceKind::Doc);
        let tree = renderer.render_or_placeholder(&source, SourceKind::Doc);
        assert_eq!(tree.text(tree.root()), "hello world");
    }
}

//! Substring-search rendering
//!
//! Builds the same tree shape as the structural path but ignores the parser's
//! spans. Each text leaf is located by searching the source for its displayed
//! text, starting where the previous match ended. Containers get the union of
//! their children's spans. When a phrase repeats earlier in the document than
//! the cursor expects, the match lands on the wrong occurrence; this path
//! exists for comparison and recovery, not as the default.

use super::RenderOptions;
use crate::display::{DisplayTree, NodeKind, NodeTag, TreeBuilder};
use crate::offset::SourceOffset;
use crate::source_index::SourceIndex;
use pulldown_cmark::{Event, Parser};
use tracing::trace;

/// Search state threaded through one render call.
#[derive(Debug)]
pub struct RenderContext<'s> {
    source: &'s SourceIndex,
    cursor: usize,
}

impl<'s> RenderContext<'s> {
    pub fn new(source: &'s SourceIndex) -> Self {
        Self { source, cursor: 0 }
    }

    /// Codepoint offset where the next search starts.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Find `needle` at or after the cursor and advance past it.
    /// Whitespace-only needles are never searched.
    pub fn locate(&mut self, needle: &str) -> Option<SourceOffset> {
        if needle.trim().is_empty() {
            return None;
        }
        let from = self.source.char_to_byte(self.cursor);
        let byte = self.source.text()[from..].find(needle)? + from;
        let start = self.source.byte_to_char(byte);
        let range = SourceOffset::at(start, needle.chars().count());
        self.cursor = range.end;
        Some(range)
    }
}

pub(crate) fn render(source: &SourceIndex, options: &RenderOptions) -> DisplayTree {
    let mut ctx = RenderContext::new(source);
    let mut builder = TreeBuilder::new(NodeTag::Document, Some(source.full_range()));

    for event in Parser::new_ext(source.text(), options.parser_options()) {
        match event {
            Event::Start(tag) => {
                builder.open(super::markdown::node_tag(&tag), None);
            }
            Event::End(end) => {
                let id = builder.open_container();
                builder.enclose_children(id);
                trace!(?end, provenance = ?builder.provenance(id), "closed container");
                builder.close();
            }
            Event::Text(text) | Event::Html(text) | Event::InlineHtml(text) => {
                let range = ctx.locate(&text);
                builder.leaf(NodeKind::TextRun, NodeTag::Text, text.to_string(), range);
            }
            Event::Code(text) => {
                let range = ctx.locate(&text);
                builder.open(NodeTag::InlineCode, range);
                builder.leaf(NodeKind::Atomic, NodeTag::InlineCodeText, text.to_string(), range);
                builder.close();
            }
            Event::InlineMath(text) => {
                let range = ctx.locate(&text);
                builder.leaf(NodeKind::Atomic, NodeTag::InlineMath, text.to_string(), range);
            }
            Event::DisplayMath(text) => {
                let range = ctx.locate(&text);
                builder.leaf(NodeKind::Atomic, NodeTag::DisplayMath, text.to_string(), range);
            }
            Event::SoftBreak => {
                builder.leaf(NodeKind::TextRun, NodeTag::SoftBreak, "\n", None);
            }
            Event::HardBreak => {
                builder.leaf(NodeKind::TextRun, NodeTag::HardBreak, "\n", None);
            }
            Event::Rule => {
                builder.open(NodeTag::ThematicBreak, None);
                builder.close();
            }
            #[allow(unreachable_patterns)]
            other => trace!(?other, "ignored markdown event"),
        }
    }

    builder.finish(source.len())
}

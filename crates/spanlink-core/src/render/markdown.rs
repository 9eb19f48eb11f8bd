//! Structural Markdown rendering
//!
//! Walks the parser's `(event, byte range)` stream and mirrors it into a
//! [`DisplayTree`]. Each node's provenance is the parser span converted to
//! codepoints, taken verbatim. The only spans computed here are the inner
//! spans of code: the text of a fenced block excludes the fences and
//! language tag, and the text of an inline code span excludes its backticks.

use super::RenderOptions;
use crate::display::{DisplayTree, NodeKind, NodeTag, TreeBuilder};
use crate::offset::SourceOffset;
use crate::source_index::SourceIndex;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};
use std::ops::Range;
use tracing::trace;

pub(crate) fn render(source: &SourceIndex, options: &RenderOptions) -> DisplayTree {
    let mut renderer = MarkdownRenderer::new(source);
    let parser = Parser::new_ext(source.text(), options.parser_options()).into_offset_iter();
    for (event, span) in parser {
        renderer.event(event, span);
    }
    renderer.builder.finish(source.len())
}

struct MarkdownRenderer<'s> {
    source: &'s SourceIndex,
    builder: TreeBuilder,
    code_block: Option<PendingCodeBlock>,
}

/// A code block whose text is still being collected.
struct PendingCodeBlock {
    outer: SourceOffset,
    lang: Option<String>,
    fenced: bool,
    text: String,
    text_span: Option<SourceOffset>,
}

impl<'s> MarkdownRenderer<'s> {
    fn new(source: &'s SourceIndex) -> Self {
        Self {
            source,
            builder: TreeBuilder::new(NodeTag::Document, Some(source.full_range())),
            code_block: None,
        }
    }

    fn event(&mut self, event: Event<'_>, span: Range<usize>) {
        let range = self.source.span_to_offset(span);
        trace!(?event, %range, "markdown event");
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let (fenced, lang) = match kind {
                    CodeBlockKind::Fenced(info) => (
                        true,
                        info.split_whitespace().next().map(str::to_owned),
                    ),
                    CodeBlockKind::Indented => (false, None),
                };
                self.builder
                    .open(NodeTag::CodeBlock { lang: lang.clone() }, Some(range));
                self.code_block = Some(PendingCodeBlock {
                    outer: range,
                    lang,
                    fenced,
                    text: String::new(),
                    text_span: None,
                });
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(block) = self.code_block.take() {
                    let inner = block.inner_span(self.source);
                    self.builder
                        .leaf(NodeKind::TextRun, NodeTag::CodeBlockText, block.text, Some(inner));
                }
                self.builder.close();
            }
            Event::Text(text) if self.code_block.is_some() => {
                if let Some(block) = self.code_block.as_mut() {
                    block.text.push_str(&text);
                    block.text_span = Some(match block.text_span {
                        Some(span) => SourceOffset {
                            start: span.start.min(range.start),
                            end: span.end.max(range.end),
                        },
                        None => range,
                    });
                }
            }
            Event::Start(tag) => {
                self.builder.open(node_tag(&tag), Some(range));
            }
            Event::End(_) => self.builder.close(),
            Event::Text(text) => {
                self.builder
                    .leaf(NodeKind::TextRun, NodeTag::Text, text.to_string(), Some(range));
            }
            Event::Code(text) => self.inline_code(&text, range),
            Event::InlineMath(text) => {
                self.builder
                    .leaf(NodeKind::Atomic, NodeTag::InlineMath, text.to_string(), Some(range));
            }
            Event::DisplayMath(text) => {
                self.builder
                    .leaf(NodeKind::Atomic, NodeTag::DisplayMath, text.to_string(), Some(range));
            }
            Event::SoftBreak => {
                self.builder
                    .leaf(NodeKind::TextRun, NodeTag::SoftBreak, "\n", Some(range));
            }
            Event::HardBreak => {
                self.builder
                    .leaf(NodeKind::TextRun, NodeTag::HardBreak, "\n", Some(range));
            }
            Event::Rule => {
                self.builder.open(NodeTag::ThematicBreak, Some(range));
                self.builder.close();
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                self.builder
                    .leaf(NodeKind::TextRun, NodeTag::Text, marker, Some(range));
            }
            // Pure text without a rendering override: plain text node.
            Event::Html(text) | Event::InlineHtml(text) | Event::FootnoteReference(text) => {
                self.builder
                    .leaf(NodeKind::TextRun, NodeTag::Text, text.to_string(), Some(range));
            }
            #[allow(unreachable_patterns)]
            other => trace!(?other, "ignored markdown event"),
        }
    }

    fn inline_code(&mut self, text: &str, range: SourceOffset) {
        let ticks = self
            .source
            .slice(range)
            .chars()
            .take_while(|&c| c == '`')
            .count();
        let inner = if range.len() >= 2 * ticks {
            SourceOffset {
                start: range.start + ticks,
                end: range.end - ticks,
            }
        } else {
            range
        };
        self.builder.open(NodeTag::InlineCode, Some(range));
        self.builder.leaf(
            NodeKind::Atomic,
            NodeTag::InlineCodeText,
            text.replace('\n', " "),
            Some(inner),
        );
        self.builder.close();
    }
}

impl PendingCodeBlock {
    /// Span of the code text: after the opening fence and language tag, up to
    /// the closing fence. Indented blocks use the span of their text.
    fn inner_span(&self, source: &SourceIndex) -> SourceOffset {
        if !self.fenced {
            return self.text_span.unwrap_or(SourceOffset {
                start: self.outer.end,
                end: self.outer.end,
            });
        }

        let raw: Vec<char> = source.slice(self.outer).chars().collect();
        let indent = raw.iter().take_while(|&&c| c == ' ').count();
        let Some(&fence) = raw.get(indent) else {
            return self.outer;
        };
        let fence_len = raw[indent..].iter().take_while(|&&c| c == fence).count();
        let opener_end = indent + fence_len;
        let first_line_end = raw
            .iter()
            .position(|&c| c == '\n')
            .unwrap_or(raw.len())
            .max(opener_end);

        let lang_end = match &self.lang {
            Some(lang) => {
                let info: String = raw[opener_end..first_line_end].iter().collect();
                match info.find(lang.as_str()) {
                    Some(byte) => {
                        opener_end + info[..byte].chars().count() + lang.chars().count()
                    }
                    None => opener_end,
                }
            }
            None => opener_end,
        };

        let trimmed_len = raw.len() - raw.iter().rev().take_while(|c| c.is_whitespace()).count();
        let closing = raw[..trimmed_len]
            .iter()
            .rev()
            .take_while(|&&c| c == fence)
            .count();
        let close_start = trimmed_len - closing;
        let inner_end = if closing >= fence_len && close_start > first_line_end {
            close_start
        } else {
            raw.len()
        };

        SourceOffset {
            start: self.outer.start + lang_end.min(inner_end),
            end: self.outer.start + inner_end,
        }
    }
}

pub(super) fn node_tag(tag: &Tag<'_>) -> NodeTag {
    match tag {
        Tag::Paragraph => NodeTag::Paragraph,
        Tag::Heading { level, .. } => NodeTag::Heading {
            level: heading_level(*level),
        },
        Tag::BlockQuote(_) => NodeTag::BlockQuote,
        Tag::List(start) => NodeTag::List {
            ordered: start.is_some(),
        },
        Tag::Item => NodeTag::ListItem,
        Tag::Emphasis => NodeTag::Emphasis,
        Tag::Strong => NodeTag::Strong,
        Tag::Strikethrough => NodeTag::Strikethrough,
        Tag::Link { dest_url, .. } => NodeTag::Link {
            dest: dest_url.to_string(),
        },
        Tag::CodeBlock(_) => NodeTag::CodeBlock { lang: None },
        other => NodeTag::Generic {
            name: generic_name(other).to_owned(),
        },
    }
}

fn generic_name(tag: &Tag<'_>) -> &'static str {
    match tag {
        Tag::Table(_) => "table",
        Tag::TableHead => "thead",
        Tag::TableRow => "tr",
        Tag::TableCell => "td",
        Tag::Image { .. } => "img",
        Tag::FootnoteDefinition(_) => "footnote",
        Tag::HtmlBlock => "html",
        _ => "div",
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::NodeId;

    fn render_str(text: &str) -> (SourceIndex, DisplayTree) {
        let source = SourceIndex::new(text);
        let tree = render(&source, &RenderOptions::default());
        (source, tree)
    }

    fn find(tree: &DisplayTree, tag: &NodeTag) -> Vec<NodeId> {
        tree.iter()
            .filter(|(_, node)| &node.tag == tag)
            .map(|(id, _)| id)
            .collect()
    }

    #[test]
    fn root_covers_whole_source() {
        let (source, tree) = render_str("# Title\n\nBody text.\n");
        assert_eq!(tree.root_node().provenance, Some(source.full_range()));
    }

    #[test]
    fn text_runs_slice_back_to_their_source() {
        let (source, tree) = render_str("Plain *emphasis* and **strong** text.");
        for id in find(&tree, &NodeTag::Text) {
            let node = tree.node(id);
            assert_eq!(source.slice(node.provenance.unwrap()), node.text);
        }
        let em = find(&tree, &NodeTag::Emphasis)[0];
        assert_eq!(source.slice(tree.node(em).provenance.unwrap()), "*emphasis*");
    }

    #[test]
    fn inline_math_is_atomic_and_keeps_delimiters() {
        let (source, tree) = render_str("The rate is $x^2$ today.");
        let math = find(&tree, &NodeTag::InlineMath)[0];
        let node = tree.node(math);
        assert!(node.is_atomic());
        assert_eq!(node.provenance, Some(SourceOffset { start: 12, end: 17 }));
        assert_eq!(source.slice(node.provenance.unwrap()), "$x^2$");
    }

    #[test]
    fn inline_code_inner_span_excludes_backticks() {
        let (source, tree) = render_str("call `foo()` now");
        let outer = find(&tree, &NodeTag::InlineCode)[0];
        let inner = find(&tree, &NodeTag::InlineCodeText)[0];
        assert_eq!(source.slice(tree.node(outer).provenance.unwrap()), "`foo()`");
        assert_eq!(source.slice(tree.node(inner).provenance.unwrap()), "foo()");
        assert!(tree.node(inner).is_atomic());
    }

    #[test]
    fn fenced_code_inner_span_excludes_fences_and_language() {
        let (source, tree) = render_str("```rust\nlet x = 1;\n```\n");
        let block = find(&tree, &NodeTag::CodeBlock {
            lang: Some("rust".into()),
        })[0];
        let text = find(&tree, &NodeTag::CodeBlockText)[0];
        assert!(source.slice(tree.node(block).provenance.unwrap()).starts_with("```rust"));
        let inner = tree.node(text).provenance.unwrap();
        assert_eq!(inner.start, 7);
        assert_eq!(source.slice(inner), "\nlet x = 1;\n");
        assert_eq!(tree.node(text).text, "let x = 1;\n");
    }

    #[test]
    fn unclosed_fence_runs_to_block_end() {
        let (source, tree) = render_str("```\nopen");
        let text = find(&tree, &NodeTag::CodeBlockText)[0];
        let inner = tree.node(text).provenance.unwrap();
        assert_eq!(inner.start, 3);
        assert!(source.slice(inner).ends_with("open"));
    }

    #[test]
    fn children_stay_inside_their_parents() {
        let (_, tree) = render_str("- one *two*\n- three `four`\n\n> quote $y$\n");
        for (id, node) in tree.iter() {
            let (Some(parent), Some(range)) = (node.parent, node.provenance) else {
                continue;
            };
            let parent_range = tree.node(parent).provenance.unwrap();
            assert!(
                parent_range.encloses(range),
                "{id:?} {range} escapes parent {parent_range}"
            );
        }
    }

    #[test]
    fn tables_fall_back_to_generic_containers() {
        let (_, tree) = render_str("| a | b |\n|---|---|\n| 1 | 2 |\n");
        let cells = find(&tree, &NodeTag::Generic { name: "td".into() });
        assert!(!cells.is_empty());
        assert!(cells.iter().all(|&c| tree.node(c).provenance.is_some()));
    }
}

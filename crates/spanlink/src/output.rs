//! Output formatting for display trees, line indexes and annotations

use clap::ValueEnum;
use owo_colors::OwoColorize;
use spanlink_core::{
    Annotation, DisplayTree, LineBlock, NodeId, NodeTag, SegmentKind, SourceIndex, SourceKind,
};
use std::fmt::Write;

/// Output format for `render`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented node tree with provenance
    #[default]
    Tree,
    /// Host markup carrying parse-start / parse-end
    Html,
    /// The display tree as JSON
    Json,
}

/// Render a display tree in the specified format
pub fn render_tree(tree: &DisplayTree, format: OutputFormat) -> eyre::Result<String> {
    Ok(match format {
        OutputFormat::Tree => render_tree_text(tree),
        OutputFormat::Html => spanlink_core::html::to_html(tree),
        OutputFormat::Json => serde_json::to_string_pretty(tree)?,
    })
}

fn render_tree_text(tree: &DisplayTree) -> String {
    let mut output = String::new();
    write_node(tree, tree.root(), 0, &mut output);
    output
}

fn write_node(tree: &DisplayTree, id: NodeId, depth: usize, output: &mut String) {
    let node = tree.node(id);
    let _ = write!(
        output,
        "{:indent$}{}",
        "",
        tag_label(&node.tag).cyan(),
        indent = depth * 2
    );
    match node.provenance {
        Some(span) => {
            let _ = write!(output, " {}", span.to_string().dimmed());
        }
        None => output.push_str(" -"),
    }
    if node.is_leaf() {
        let _ = write!(output, " {}", format!("{:?}", node.text).green());
    }
    if node.is_atomic() {
        let _ = write!(output, " {}", "atomic".yellow());
    }
    output.push('\n');

    for &child in tree.children(id) {
        write_node(tree, child, depth + 1, output);
    }
}

/// Short label for a node tag.
pub fn tag_label(tag: &NodeTag) -> String {
    match tag {
        NodeTag::Document => "document".into(),
        NodeTag::Paragraph => "paragraph".into(),
        NodeTag::Heading { level } => format!("h{level}"),
        NodeTag::List { ordered: true } => "ordered-list".into(),
        NodeTag::List { ordered: false } => "list".into(),
        NodeTag::ListItem => "item".into(),
        NodeTag::BlockQuote => "blockquote".into(),
        NodeTag::Link { dest } => format!("link({dest})"),
        NodeTag::Emphasis => "em".into(),
        NodeTag::Strong => "strong".into(),
        NodeTag::Strikethrough => "strike".into(),
        NodeTag::ThematicBreak => "rule".into(),
        NodeTag::CodeBlock { lang: Some(lang) } => format!("code-block({lang})"),
        NodeTag::CodeBlock { lang: None } => "code-block".into(),
        NodeTag::CodeBlockText => "code-text".into(),
        NodeTag::InlineCode => "code".into(),
        NodeTag::InlineCodeText => "code-text".into(),
        NodeTag::Text => "text".into(),
        NodeTag::SoftBreak => "soft-break".into(),
        NodeTag::HardBreak => "hard-break".into(),
        NodeTag::InlineMath => "inline-math".into(),
        NodeTag::DisplayMath => "display-math".into(),
        NodeTag::CodeFile => "code-file".into(),
        NodeTag::CodeLine { line } => format!("line({line})"),
        NodeTag::Generic { name } => name.clone(),
        NodeTag::Placeholder => "placeholder".into(),
    }
}

/// One row per line: number, span, text.
pub fn render_lines(source: &SourceIndex) -> String {
    let mut output = String::new();
    for (i, span) in source.lines().iter().enumerate() {
        let _ = writeln!(
            output,
            "{:>5} {:<12} {}",
            (i + 1).to_string().dimmed(),
            span.to_string(),
            source.slice(*span)
        );
    }
    output
}

pub fn render_annotation(annotation: &Annotation) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{} {} ({} ranges)",
        annotation.id.to_string().dimmed(),
        annotation.category.bold(),
        annotation.range_count()
    );
    for kind in [SourceKind::Doc, SourceKind::Code] {
        for (i, range) in annotation.ranges(kind).iter().enumerate() {
            let _ = writeln!(
                output,
                "  {:<4} {i:>2} {} [{}, {}) {:?}",
                kind.as_str().blue(),
                range.document_id,
                range.start,
                range.end,
                range.content
            );
        }
    }
    output
}

/// Code lines partitioned into highlighted, muted and plain blocks.
pub fn render_line_blocks(tree: &DisplayTree, blocks: &[LineBlock]) -> String {
    let mut output = String::new();
    for block in blocks {
        for &id in &block.nodes {
            let node = tree.node(id);
            let NodeTag::CodeLine { line } = node.tag else {
                continue;
            };
            let number = format!("{line:>5}");
            let _ = match block.kind {
                SegmentKind::Highlighted => writeln!(
                    output,
                    "{} {} {}",
                    ">".green().bold(),
                    number.green(),
                    node.text.green()
                ),
                SegmentKind::Muted => {
                    writeln!(output, "  {} {}", number.dimmed(), node.text.dimmed())
                }
                SegmentKind::Plain => writeln!(output, "  {} {}", number.dimmed(), node.text),
            };
        }
    }
    output
}

//! HTML serialization of a display tree
//!
//! Every node with provenance carries `parse-start` and `parse-end`
//! attributes. The markup is output for a host page only; resolution always
//! works on the [`DisplayTree`] itself and never reads these attributes back.

use crate::display::{DisplayNode, DisplayTree, NodeId, NodeTag};
use std::fmt::Write;

/// Render `tree` as HTML.
pub fn to_html(tree: &DisplayTree) -> String {
    let mut out = String::new();
    write_node(tree, tree.root(), &mut out);
    out
}

fn write_node(tree: &DisplayTree, id: NodeId, out: &mut String) {
    let node = tree.node(id);
    match &node.tag {
        NodeTag::Text | NodeTag::SoftBreak | NodeTag::HardBreak | NodeTag::CodeBlockText => {
            leaf(out, "span", Some("parse-text-wrapper"), node);
        }
        NodeTag::InlineMath => leaf(out, "span", Some("parse-math"), node),
        NodeTag::DisplayMath => leaf(out, "div", Some("parse-math"), node),
        NodeTag::InlineCodeText => leaf(out, "span", Some("parse-code"), node),
        NodeTag::Placeholder => leaf(out, "p", Some("parse-placeholder"), node),
        NodeTag::CodeLine { .. } => {
            out.push_str("<code class=\"annotation-skip\">");
            leaf(out, "span", Some("parse-wrapper-span"), node);
            out.push_str("</code>");
        }
        NodeTag::ThematicBreak => {
            out.push_str("<hr");
            attributes(out, None, node);
            out.push_str(" />");
        }
        NodeTag::CodeBlock { lang } => {
            out.push_str("<pre");
            attributes(out, None, node);
            out.push_str("><code");
            if let Some(lang) = lang {
                let _ = write!(out, " class=\"language-{}\"", escape(lang));
            }
            out.push('>');
            children(tree, id, out);
            out.push_str("</code></pre>");
        }
        NodeTag::Link { dest } => {
            let _ = write!(out, "<a href=\"{}\"", escape(dest));
            attributes(out, None, node);
            out.push('>');
            children(tree, id, out);
            out.push_str("</a>");
        }
        tag => {
            let (name, class) = element(tag);
            let _ = write!(out, "<{name}");
            attributes(out, class, node);
            out.push('>');
            children(tree, id, out);
            let _ = write!(out, "</{name}>");
        }
    }
}

fn element(tag: &NodeTag) -> (&'static str, Option<&'static str>) {
    match tag {
        NodeTag::Document => ("div", Some("parse-document")),
        NodeTag::CodeFile => ("pre", Some("parse-code-file")),
        NodeTag::Paragraph => ("p", None),
        NodeTag::Heading { level } => (
            match level {
                1 => "h1",
                2 => "h2",
                3 => "h3",
                4 => "h4",
                5 => "h5",
                _ => "h6",
            },
            None,
        ),
        NodeTag::List { ordered: true } => ("ol", None),
        NodeTag::List { ordered: false } => ("ul", None),
        NodeTag::ListItem => ("li", None),
        NodeTag::BlockQuote => ("blockquote", None),
        NodeTag::Emphasis => ("em", None),
        NodeTag::Strong => ("strong", None),
        NodeTag::Strikethrough => ("del", None),
        NodeTag::InlineCode => ("code", None),
        NodeTag::Generic { name } => match name.as_str() {
            "table" => ("table", None),
            "thead" => ("thead", None),
            "tr" => ("tr", None),
            "td" => ("td", None),
            _ => ("div", Some("parse-generic")),
        },
        _ => ("span", None),
    }
}

fn children(tree: &DisplayTree, id: NodeId, out: &mut String) {
    for &child in tree.children(id) {
        write_node(tree, child, out);
    }
}

fn leaf(out: &mut String, name: &str, class: Option<&str>, node: &DisplayNode) {
    let _ = write!(out, "<{name}");
    attributes(out, class, node);
    let _ = write!(out, ">{}</{name}>", escape(&node.text));
}

fn attributes(out: &mut String, class: Option<&str>, node: &DisplayNode) {
    if let Some(class) = class {
        let _ = write!(out, " class=\"{class}\"");
    }
    if let Some(p) = node.provenance {
        let _ = write!(out, " parse-start=\"{}\" parse-end=\"{}\"", p.start, p.end);
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ProvenanceRenderer, render};
    use crate::source_index::SourceIndex;

    #[test]
    fn text_and_math_carry_offsets() {
        let tree = render(&SourceIndex::new("The rate is $x^2$ today.")).unwrap();
        let html = to_html(&tree);
        assert!(html.contains(
            r#"<span class="parse-text-wrapper" parse-start="0" parse-end="12">The rate is </span>"#
        ));
        assert!(html.contains(r#"<span class="parse-math" parse-start="12" parse-end="17">x^2</span>"#));
    }

    #[test]
    fn code_lines_are_skippable_wrappers() {
        let source = SourceIndex::new("a<b\nc");
        let tree = ProvenanceRenderer::default().render_code(&source);
        let html = to_html(&tree);
        assert!(html.contains(
            r#"<code class="annotation-skip"><span class="parse-wrapper-span" parse-start="0" parse-end="3">a&lt;b</span></code>"#
        ));
    }
}

//! Line-numbered code rendering

use crate::display::{DisplayTree, NodeKind, NodeTag, TreeBuilder};
use crate::source_index::SourceIndex;

/// One text leaf per source line. A line's provenance excludes its newline,
/// and its displayed text is exactly the source slice.
pub(crate) fn render(source: &SourceIndex) -> DisplayTree {
    let mut builder = TreeBuilder::new(NodeTag::CodeFile, Some(source.full_range()));
    for (i, &span) in source.lines().iter().enumerate() {
        builder.leaf(
            NodeKind::TextRun,
            NodeTag::CodeLine { line: i + 1 },
            source.slice(span),
            Some(span),
        );
    }
    builder.finish(source.len())
}

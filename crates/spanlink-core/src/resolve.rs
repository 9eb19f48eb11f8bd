//! Selection to source-range resolution
//!
//! A host reports a selection as two [`SelectionPoint`]s. Each endpoint is
//! resolved on its own by walking up from the node that holds it until an
//! ancestor with provenance is found:
//!
//! - atomic nodes resolve to their whole span (`start` for a selection start,
//!   `end` for a selection end);
//! - other nodes map the endpoint's offset inside their rendered text onto
//!   their span, anchored at `start` when the offset is zero and at `end`
//!   otherwise;
//! - when nothing below the root carries provenance, the offset is treated as
//!   a flat count into the root's rendered text.
//!
//! An endpoint on a container names a child boundary. It is first moved down
//! to the leaf edge on that boundary: the start of the following child for a
//! selection start, the end of the preceding child for a selection end.
//!
//! Resolution failure is not an error. Every entry point returns `None` and
//! the caller treats it as "nothing selected".

use crate::display::{Bias, DisplayTree, NodeId, SelectionPoint};
use crate::offset::SourceOffset;
use tracing::debug;

/// What the resolver needs from the host's rendered tree: an ordered text
/// walk (flat text ranges and point offsets) and a containment test.
pub trait TextLayout {
    fn root(&self) -> NodeId;

    /// Whether `node` belongs to this layout.
    fn has_node(&self, node: NodeId) -> bool;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Children in document order; empty for leaves.
    fn children(&self, node: NodeId) -> &[NodeId];

    /// Source range the node was produced from, if it carries one.
    fn provenance(&self, node: NodeId) -> Option<SourceOffset>;

    fn is_atomic(&self, node: NodeId) -> bool;

    /// Range the node occupies in the flat rendered text.
    fn text_range(&self, node: NodeId) -> SourceOffset;

    /// Position of a selection endpoint in the flat rendered text.
    fn point_offset(&self, point: SelectionPoint) -> usize;

    /// Whether `node` is `ancestor` or lies underneath it.
    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool;
}

impl TextLayout for DisplayTree {
    fn root(&self) -> NodeId {
        DisplayTree::root(self)
    }

    fn has_node(&self, node: NodeId) -> bool {
        self.get(node).is_some()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        DisplayTree::parent(self, node)
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        DisplayTree::children(self, node)
    }

    fn provenance(&self, node: NodeId) -> Option<SourceOffset> {
        self.get(node).and_then(|n| n.provenance)
    }

    fn is_atomic(&self, node: NodeId) -> bool {
        self.get(node).is_some_and(|n| n.is_atomic())
    }

    fn text_range(&self, node: NodeId) -> SourceOffset {
        self.node(node).text_range()
    }

    fn point_offset(&self, point: SelectionPoint) -> usize {
        DisplayTree::point_offset(self, point)
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.is_ancestor_or_self(ancestor, node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Start,
    End,
}

/// Resolves selections against one rendered tree. Must not outlive a
/// re-render: build a new resolver for the new tree.
#[derive(Debug, Clone, Copy)]
pub struct RangeResolver<'t, L: ?Sized = DisplayTree> {
    layout: &'t L,
}

impl<'t, L: TextLayout + ?Sized> RangeResolver<'t, L> {
    pub fn new(layout: &'t L) -> Self {
        Self { layout }
    }

    /// Resolve a selection against the whole tree.
    pub fn resolve(&self, start: SelectionPoint, end: SelectionPoint) -> Option<SourceOffset> {
        self.resolve_within(start, end, self.layout.root())
    }

    /// Like [`resolve`](Self::resolve), but zero-width results are `None`.
    pub fn resolve_nonempty(
        &self,
        start: SelectionPoint,
        end: SelectionPoint,
    ) -> Option<SourceOffset> {
        self.resolve(start, end).filter(|range| !range.is_empty())
    }

    /// Resolve a selection clamped to the subtree under `root`.
    ///
    /// An endpoint outside `root` snaps to `root`'s edge. A selection that
    /// lies entirely before or after `root`, or only touches its boundary,
    /// yields `None`, as does one naming a node from another tree.
    pub fn resolve_within(
        &self,
        start: SelectionPoint,
        end: SelectionPoint,
        root: NodeId,
    ) -> Option<SourceOffset> {
        if ![start.node, end.node, root]
            .into_iter()
            .all(|node| self.layout.has_node(node))
        {
            debug!(?start, ?end, ?root, "selection names a node outside the tree");
            return None;
        }
        let (start, end) = self.clamp(start, end, root)?;
        let resolved_start = self.resolve_endpoint(start, Endpoint::Start, root)?;
        let resolved_end = self.resolve_endpoint(end, Endpoint::End, root)?;
        if resolved_end < resolved_start {
            debug!(resolved_start, resolved_end, "selection resolved to an inverted range");
            return None;
        }
        Some(SourceOffset {
            start: resolved_start,
            end: resolved_end,
        })
    }

    fn clamp(
        &self,
        start: SelectionPoint,
        end: SelectionPoint,
        root: NodeId,
    ) -> Option<(SelectionPoint, SelectionPoint)> {
        let bounds = self.layout.text_range(root);
        let start_flat = self.layout.point_offset(start);
        let end_flat = self.layout.point_offset(end);
        let (start, start_flat) = if self.layout.contains(root, start.node) {
            (start, start_flat)
        } else if start_flat >= bounds.end {
            debug!("selection starts after the root");
            return None;
        } else {
            (SelectionPoint::new(root, 0), bounds.start)
        };
        let (end, end_flat) = if self.layout.contains(root, end.node) {
            (end, end_flat)
        } else if end_flat <= bounds.start {
            debug!("selection ends before the root");
            return None;
        } else {
            (SelectionPoint::new(root, usize::MAX), bounds.end)
        };
        if start_flat >= bounds.end || end_flat <= bounds.start {
            debug!(start_flat, end_flat, "selection only touches the root's boundary");
            return None;
        }
        Some((start, end))
    }

    /// Move a container point down to the leaf edge on its child boundary.
    fn descend(&self, mut point: SelectionPoint, endpoint: Endpoint) -> SelectionPoint {
        loop {
            let children = self.layout.children(point.node);
            if children.is_empty() {
                return point;
            }
            let child = match endpoint {
                Endpoint::Start => match children.get(point.offset) {
                    Some(&child) => child,
                    None => return point,
                },
                Endpoint::End => match point.offset.min(children.len()).checked_sub(1) {
                    Some(index) => children[index],
                    None => return point,
                },
            };
            point = match endpoint {
                Endpoint::Start => SelectionPoint::new(child, 0),
                Endpoint::End => SelectionPoint::new(child, self.end_offset(child)),
            };
        }
    }

    /// Offset of the last position inside `node`.
    fn end_offset(&self, node: NodeId) -> usize {
        match self.layout.children(node) {
            [] => self.layout.text_range(node).len(),
            children => children.len(),
        }
    }

    fn resolve_endpoint(
        &self,
        point: SelectionPoint,
        endpoint: Endpoint,
        root: NodeId,
    ) -> Option<usize> {
        let point = self.descend(point, endpoint);
        let flat = self.layout.point_offset(point);
        let mut current = Some(point.node);
        while let Some(node) = current {
            if node == root {
                break;
            }
            if let Some(span) = self.layout.provenance(node) {
                if self.layout.is_atomic(node) {
                    return Some(match endpoint {
                        Endpoint::Start => span.start,
                        Endpoint::End => span.end,
                    });
                }
                let text = self.layout.text_range(node);
                let inner = flat.saturating_sub(text.start).min(text.len());
                return Some(map_inner_offset(span, inner, text.len()));
            }
            current = self.layout.parent(node);
        }

        let Some(span) = self.layout.provenance(root) else {
            debug!(?root, "root carries no provenance");
            return None;
        };
        let text = self.layout.text_range(root);
        let inner = flat.saturating_sub(text.start).min(text.len());
        Some(if inner == text.len() {
            span.end
        } else {
            (span.start + inner).min(span.end)
        })
    }
}

impl RangeResolver<'_, DisplayTree> {
    /// Resolve a selection given as flat rendered-text offsets.
    pub fn resolve_text_range(&self, from: usize, to: usize) -> Option<SourceOffset> {
        let start = self.layout.point_at(from, Bias::Right)?;
        let end = self.layout.point_at(to, Bias::Left)?;
        self.resolve(start, end)
    }
}

/// Map an offset inside a node's rendered text onto its source span.
fn map_inner_offset(span: SourceOffset, inner: usize, text_len: usize) -> usize {
    if inner == 0 {
        return span.start;
    }
    span.end.saturating_sub(text_len - inner).max(span.start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{NodeKind, NodeTag, TreeBuilder};
    use crate::render::render;
    use crate::source_index::SourceIndex;

    fn leaf_with(tree: &DisplayTree, text: &str) -> NodeId {
        tree.iter()
            .find(|(_, n)| n.is_leaf() && n.text == text)
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn selection_from_inside_math_into_text_snaps_start() {
        let source = SourceIndex::new("The rate is $x^2$ today.");
        let tree = render(&source).unwrap();
        let math = leaf_with(&tree, "x^2");
        let after = leaf_with(&tree, " today.");

        let resolver = RangeResolver::new(&tree);
        let range = resolver
            .resolve(SelectionPoint::new(math, 1), SelectionPoint::new(after, 4))
            .unwrap();
        assert_eq!(range, SourceOffset { start: 12, end: 21 });
        assert_eq!(source.slice(range), "$x^2$ tod");
    }

    #[test]
    fn selection_inside_atomic_node_yields_whole_span() {
        let source = SourceIndex::new("The rate is $x^2$ today.");
        let tree = render(&source).unwrap();
        let math = leaf_with(&tree, "x^2");
        let resolver = RangeResolver::new(&tree);
        for (a, b) in [(0, 1), (1, 2), (1, 1), (0, 3)] {
            let range = resolver
                .resolve(SelectionPoint::new(math, a), SelectionPoint::new(math, b))
                .unwrap();
            assert_eq!(range, SourceOffset { start: 12, end: 17 });
        }
    }

    #[test]
    fn inline_code_snaps_to_inner_span() {
        let source = SourceIndex::new("call `foo()` now");
        let tree = render(&source).unwrap();
        let code = leaf_with(&tree, "foo()");
        let range = RangeResolver::new(&tree)
            .resolve(SelectionPoint::new(code, 2), SelectionPoint::new(code, 3))
            .unwrap();
        assert_eq!(source.slice(range), "foo()");
    }

    #[test]
    fn partial_text_run_maps_end_relative() {
        let source = SourceIndex::new("a &amp; b");
        let tree = render(&source).unwrap();
        let amp = leaf_with(&tree, "&");
        let range = RangeResolver::new(&tree)
            .resolve(SelectionPoint::new(amp, 0), SelectionPoint::new(amp, 1))
            .unwrap();
        assert_eq!(source.slice(range), "&amp;");
    }

    #[test]
    fn nested_wrappers_resolve_through_leaf() {
        let source = SourceIndex::new("> - item with *deep text* inside\n");
        let tree = render(&source).unwrap();
        let deep = leaf_with(&tree, "deep text");
        let range = RangeResolver::new(&tree)
            .resolve(SelectionPoint::new(deep, 0), SelectionPoint::new(deep, 4))
            .unwrap();
        assert_eq!(source.slice(range), "deep");
    }

    #[test]
    fn selection_outside_subtree_is_clamped_or_rejected() {
        let source = SourceIndex::new("first para\n\nsecond para\n");
        let tree = render(&source).unwrap();
        let paras = tree.children(tree.root()).to_vec();
        let first = leaf_with(&tree, "first para");
        let second = leaf_with(&tree, "second para");
        let resolver = RangeResolver::new(&tree);

        // entirely before the second paragraph
        let before = resolver.resolve_within(
            SelectionPoint::new(first, 0),
            SelectionPoint::new(first, 5),
            paras[1],
        );
        assert_eq!(before, None);

        // entirely after the first paragraph
        let after = resolver.resolve_within(
            SelectionPoint::new(second, 0),
            SelectionPoint::new(second, 6),
            paras[0],
        );
        assert_eq!(after, None);

        // dragged in from the first paragraph: start snaps to the second's start
        let snapped = resolver
            .resolve_within(
                SelectionPoint::new(first, 3),
                SelectionPoint::new(second, 6),
                paras[1],
            )
            .unwrap();
        assert_eq!(source.slice(snapped), "second");

        // dragged past the end of the first paragraph
        let past_end = resolver
            .resolve_within(
                SelectionPoint::new(first, 6),
                SelectionPoint::new(second, 3),
                paras[0],
            )
            .unwrap();
        assert_eq!(past_end.start, 6);
        assert_eq!(source.slice(past_end).trim_end(), "para");
    }

    #[test]
    fn selection_touching_only_the_boundary_is_rejected() {
        let source = SourceIndex::new("first para\n\nsecond para\n");
        let tree = render(&source).unwrap();
        let paras = tree.children(tree.root()).to_vec();
        let first = leaf_with(&tree, "first para");
        let second = leaf_with(&tree, "second para");
        let resolver = RangeResolver::new(&tree);

        // starts on the last position of the first paragraph
        let from_end = resolver.resolve_within(
            SelectionPoint::new(first, 10),
            SelectionPoint::new(second, 3),
            paras[0],
        );
        assert_eq!(from_end, None);

        // ends on the first position of the second paragraph
        let to_start = resolver.resolve_within(
            SelectionPoint::new(first, 3),
            SelectionPoint::new(second, 0),
            paras[1],
        );
        assert_eq!(to_start, None);
    }

    #[test]
    fn node_from_another_tree_is_rejected() {
        let large = render(&SourceIndex::new("a *b* c\n\n- d\n- e\n")).unwrap();
        let stale = large.iter().map(|(id, _)| id).last().unwrap();
        let tree = render(&SourceIndex::new("hi")).unwrap();
        assert!(tree.get(stale).is_none());

        let leaf = leaf_with(&tree, "hi");
        let resolver = RangeResolver::new(&tree);
        assert_eq!(
            resolver.resolve(SelectionPoint::new(leaf, 0), SelectionPoint::new(stale, 1)),
            None
        );
        assert_eq!(
            resolver.resolve(SelectionPoint::new(stale, 0), SelectionPoint::new(leaf, 2)),
            None
        );
        assert_eq!(
            resolver.resolve_within(
                SelectionPoint::new(leaf, 0),
                SelectionPoint::new(leaf, 2),
                stale
            ),
            None
        );
    }

    #[test]
    fn container_points_resolve_through_boundary_children() {
        let source = SourceIndex::new("ab *cd* ef\n");
        let tree = render(&source).unwrap();
        let para = tree.children(tree.root())[0];
        assert_eq!(tree.children(para).len(), 3);
        let resolver = RangeResolver::new(&tree);

        // between the boundaries around the emphasis
        let range = resolver
            .resolve(SelectionPoint::new(para, 1), SelectionPoint::new(para, 2))
            .unwrap();
        assert_eq!(source.slice(range), "cd");

        // the whole paragraph by child boundaries
        let range = resolver
            .resolve(SelectionPoint::new(para, 0), SelectionPoint::new(para, 3))
            .unwrap();
        assert_eq!(source.slice(range), "ab *cd* ef");
    }

    #[test]
    fn ancestors_without_provenance_are_skipped() {
        // <doc [0,12)><p [0,12)><span>hello</span> world</p></doc>
        let mut b = TreeBuilder::new(NodeTag::Document, Some(SourceOffset::at(0, 12)));
        b.open(NodeTag::Paragraph, Some(SourceOffset::at(0, 12)));
        b.open(NodeTag::Emphasis, None);
        let hello = b.leaf(NodeKind::TextRun, NodeTag::Text, "hello", None);
        b.close();
        let world = b.leaf(NodeKind::TextRun, NodeTag::Text, " world", None);
        b.close();
        let tree = b.finish(12);

        let range = RangeResolver::new(&tree)
            .resolve(SelectionPoint::new(hello, 0), SelectionPoint::new(world, 3))
            .unwrap();
        // start-anchored at zero; end is end-relative inside the paragraph,
        // whose source is one codepoint longer than its text
        assert_eq!(range, SourceOffset { start: 0, end: 9 });
    }

    #[test]
    fn flat_fallback_at_root() {
        let mut b = TreeBuilder::new(NodeTag::Document, Some(SourceOffset::at(0, 5)));
        let leaf = b.leaf(NodeKind::TextRun, NodeTag::Text, "abcde", None);
        let tree = b.finish(5);
        let resolver = RangeResolver::new(&tree);
        let range = resolver
            .resolve(SelectionPoint::new(leaf, 1), SelectionPoint::new(leaf, 5))
            .unwrap();
        assert_eq!(range, SourceOffset { start: 1, end: 5 });
        assert_eq!(
            resolver.resolve_nonempty(SelectionPoint::new(leaf, 2), SelectionPoint::new(leaf, 2)),
            None
        );
    }

    #[test]
    fn flat_text_offsets_resolve() {
        let source = SourceIndex::new("The rate is $x^2$ today.");
        let tree = render(&source).unwrap();
        // rendered: "The rate is x^2 today."
        let range = RangeResolver::new(&tree).resolve_text_range(13, 19).unwrap();
        assert_eq!(source.slice(range), "$x^2$ tod");
    }
}

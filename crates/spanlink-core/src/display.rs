//! The rendered display tree
//!
//! A [`DisplayTree`] is the single source of truth for what the user sees and
//! where each piece of it came from. Nodes live in an arena and are addressed
//! by [`NodeId`]; every node may carry the `[start, end)` source range it was
//! produced from. After construction the tree also knows its *text layout*:
//! the flat rendered-text offset and length of every node, which is what a
//! browser selection is measured against.

use crate::offset::SourceOffset;
use serde::Serialize;

/// Index of a node inside its [`DisplayTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

/// Structural role of a node for range resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Holds other nodes; its own text is the concatenation of its children
    Container,
    /// Literal text run; offsets inside it are meaningful
    TextRun,
    /// Indivisible leaf (math, inline code); any position inside it resolves
    /// to its whole span
    Atomic,
}

/// What a node renders as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tag", rename_all = "kebab-case")]
pub enum NodeTag {
    Document,
    Paragraph,
    Heading { level: u8 },
    List { ordered: bool },
    ListItem,
    BlockQuote,
    Link { dest: String },
    Emphasis,
    Strong,
    Strikethrough,
    ThematicBreak,
    CodeBlock { lang: Option<String> },
    /// Inner text wrapper of a fenced or indented code block
    CodeBlockText,
    InlineCode,
    /// Inner text of an inline code span, backticks excluded
    InlineCodeText,
    Text,
    SoftBreak,
    HardBreak,
    InlineMath,
    DisplayMath,
    /// Root of a rendered code file
    CodeFile,
    CodeLine { line: usize },
    /// Block or inline construct without a dedicated handler
    Generic { name: String },
    /// Rendering-failure placeholder
    Placeholder,
}

/// One node of the display tree.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayNode {
    #[serde(flatten)]
    pub tag: NodeTag,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Source range this node was produced from
    pub provenance: Option<SourceOffset>,
    /// Displayed text for leaves; empty for containers
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Flat rendered-text offset of the node's first character
    pub text_start: usize,
    /// Rendered text length in codepoints, descendants included
    pub text_len: usize,
}

impl DisplayNode {
    pub fn is_atomic(&self) -> bool {
        self.kind == NodeKind::Atomic
    }

    pub fn is_leaf(&self) -> bool {
        self.kind != NodeKind::Container
    }

    /// Flat rendered-text range covered by this node.
    pub fn text_range(&self) -> SourceOffset {
        SourceOffset::at(self.text_start, self.text_len)
    }
}

/// A DOM-style selection endpoint.
///
/// For a leaf, `offset` counts codepoints into the leaf's text. For a
/// container, `offset` is a child boundary index: `0` is before the first
/// child, `children.len()` after the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPoint {
    pub node: NodeId,
    pub offset: usize,
}

impl SelectionPoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Which leaf wins when a flat text offset sits on the boundary between two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Prefer the leaf that ends at the offset (selection ends)
    Left,
    /// Prefer the leaf that starts at the offset (selection starts)
    Right,
}

/// Arena-backed rendered tree.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayTree {
    nodes: Vec<DisplayNode>,
    root: NodeId,
    source_len: usize,
}

impl DisplayTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &DisplayNode {
        self.node(self.root)
    }

    /// Length in codepoints of the source this tree was rendered from.
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn node(&self, id: NodeId) -> &DisplayNode {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&DisplayNode> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// `id` followed by its ancestors up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&n| self.parent(n))
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.ancestors(node).any(|n| n == ancestor)
    }

    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count() - 1
    }

    /// All nodes under `id` (inclusive) in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    /// Every node in document order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &DisplayNode)> + '_ {
        self.descendants(self.root)
            .into_iter()
            .map(move |id| (id, self.node(id)))
    }

    /// Text-bearing leaves under `id` in document order.
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|&n| self.node(n).is_leaf())
            .collect()
    }

    /// Rendered text of a node and its descendants.
    pub fn text(&self, id: NodeId) -> String {
        self.leaves(id)
            .into_iter()
            .map(|n| self.node(n).text.as_str())
            .collect()
    }

    /// Flat rendered-text offset of a selection point.
    pub fn point_offset(&self, point: SelectionPoint) -> usize {
        let node = self.node(point.node);
        if node.is_leaf() {
            return node.text_start + point.offset.min(node.text_len);
        }
        match node.children.get(point.offset) {
            Some(&child) => self.node(child).text_start,
            None => node.text_start + node.text_len,
        }
    }

    /// Map a flat rendered-text offset back to a leaf position.
    pub fn point_at(&self, offset: usize, bias: Bias) -> Option<SelectionPoint> {
        let root = self.root_node();
        if offset > root.text_start + root.text_len {
            return None;
        }
        let leaves = self.leaves(self.root);
        let hit = |&&n: &&NodeId| {
            let leaf = self.node(n);
            let end = leaf.text_start + leaf.text_len;
            match bias {
                Bias::Right => leaf.text_start <= offset && offset < end,
                Bias::Left => leaf.text_start < offset && offset <= end,
            }
        };
        let leaf = leaves.iter().find(hit).or_else(|| match bias {
            Bias::Right => leaves.last(),
            Bias::Left => leaves.first(),
        });
        match leaf {
            Some(&n) => {
                let leaf = self.node(n);
                let inner = offset.saturating_sub(leaf.text_start).min(leaf.text_len);
                Some(SelectionPoint::new(n, inner))
            }
            None => Some(SelectionPoint::new(self.root, 0)),
        }
    }

    /// First node whose provenance violates `start <= end <= source_len`.
    pub fn find_out_of_bounds(&self) -> Option<(NodeId, SourceOffset)> {
        self.iter().find_map(|(id, node)| match node.provenance {
            Some(p) if !p.fits(self.source_len) => Some((id, p)),
            _ => None,
        })
    }
}

/// Incremental builder used by the renderers.
#[derive(Debug)]
pub(crate) struct TreeBuilder {
    nodes: Vec<DisplayNode>,
    stack: Vec<NodeId>,
}

impl TreeBuilder {
    pub(crate) fn new(tag: NodeTag, provenance: Option<SourceOffset>) -> Self {
        let root = DisplayNode {
            tag,
            kind: NodeKind::Container,
            parent: None,
            children: Vec::new(),
            provenance,
            text: String::new(),
            text_start: 0,
            text_len: 0,
        };
        Self {
            nodes: vec![root],
            stack: vec![NodeId(0)],
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(NodeId(0))
    }

    fn push(&mut self, node: DisplayNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = self.current();
        self.nodes.push(DisplayNode {
            parent: Some(parent),
            ..node
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Open a container under the current node and descend into it.
    pub(crate) fn open(&mut self, tag: NodeTag, provenance: Option<SourceOffset>) -> NodeId {
        let id = self.push(DisplayNode {
            tag,
            kind: NodeKind::Container,
            parent: None,
            children: Vec::new(),
            provenance,
            text: String::new(),
            text_start: 0,
            text_len: 0,
        });
        self.stack.push(id);
        id
    }

    /// Return to the parent of the innermost open container. The root is
    /// never popped.
    pub(crate) fn close(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub(crate) fn leaf(
        &mut self,
        kind: NodeKind,
        tag: NodeTag,
        text: impl Into<String>,
        provenance: Option<SourceOffset>,
    ) -> NodeId {
        self.push(DisplayNode {
            tag,
            kind,
            parent: None,
            children: Vec::new(),
            provenance,
            text: text.into(),
            text_start: 0,
            text_len: 0,
        })
    }

    pub(crate) fn set_provenance(&mut self, id: NodeId, provenance: SourceOffset) {
        self.nodes[id.0].provenance = Some(provenance);
    }

    pub(crate) fn provenance(&self, id: NodeId) -> Option<SourceOffset> {
        self.nodes[id.0].provenance
    }

    /// Set a container's provenance to the union of its children's spans.
    /// Leaves the provenance untouched when no child has one.
    pub(crate) fn enclose_children(&mut self, id: NodeId) {
        let union = self.nodes[id.0]
            .children
            .iter()
            .filter_map(|&child| self.nodes[child.0].provenance)
            .reduce(|a, b| SourceOffset {
                start: a.start.min(b.start),
                end: a.end.max(b.end),
            });
        if let Some(union) = union {
            self.set_provenance(id, union);
        }
    }

    /// The innermost open container.
    pub(crate) fn open_container(&self) -> NodeId {
        self.current()
    }

    /// Compute the text layout and seal the tree.
    pub(crate) fn finish(mut self, source_len: usize) -> DisplayTree {
        fn layout(nodes: &mut [DisplayNode], id: NodeId, start: usize) -> usize {
            nodes[id.0].text_start = start;
            let len = if nodes[id.0].kind == NodeKind::Container {
                let children = nodes[id.0].children.clone();
                children
                    .into_iter()
                    .fold(0, |acc, child| acc + layout(nodes, child, start + acc))
            } else {
                nodes[id.0].text.chars().count()
            };
            nodes[id.0].text_len = len;
            len
        }
        layout(&mut self.nodes, NodeId(0), 0);
        DisplayTree {
            nodes: self.nodes,
            root: NodeId(0),
            source_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DisplayTree {
        // <p>ab<em>cd</em>e</p>
        let mut b = TreeBuilder::new(NodeTag::Document, Some(SourceOffset::at(0, 9)));
        b.open(NodeTag::Paragraph, Some(SourceOffset::at(0, 9)));
        b.leaf(NodeKind::TextRun, NodeTag::Text, "ab", Some(SourceOffset::at(0, 2)));
        b.open(NodeTag::Emphasis, Some(SourceOffset::at(2, 4)));
        b.leaf(NodeKind::TextRun, NodeTag::Text, "cd", Some(SourceOffset::at(3, 2)));
        b.close();
        b.leaf(NodeKind::TextRun, NodeTag::Text, "e", Some(SourceOffset::at(6, 1)));
        b.close();
        b.finish(9)
    }

    #[test]
    fn layout_assigns_flat_text_offsets() {
        let tree = sample();
        assert_eq!(tree.root_node().text_len, 5);
        assert_eq!(tree.text(tree.root()), "abcde");
        let em = NodeId(3);
        assert_eq!(tree.node(em).text_start, 2);
        assert_eq!(tree.node(em).text_len, 2);
        assert_eq!(tree.depth(NodeId(4)), 3);
    }

    #[test]
    fn container_points_count_children() {
        let tree = sample();
        let p = NodeId(1);
        assert_eq!(tree.point_offset(SelectionPoint::new(p, 0)), 0);
        assert_eq!(tree.point_offset(SelectionPoint::new(p, 1)), 2);
        assert_eq!(tree.point_offset(SelectionPoint::new(p, 3)), 5);
    }

    #[test]
    fn point_at_respects_bias_on_boundaries() {
        let tree = sample();
        let right = tree.point_at(2, Bias::Right).unwrap();
        assert_eq!(right, SelectionPoint::new(NodeId(4), 0));
        let left = tree.point_at(2, Bias::Left).unwrap();
        assert_eq!(left, SelectionPoint::new(NodeId(2), 2));
        assert_eq!(tree.point_at(5, Bias::Right), Some(SelectionPoint::new(NodeId(5), 1)));
        assert_eq!(tree.point_at(0, Bias::Left), Some(SelectionPoint::new(NodeId(2), 0)));
        assert!(tree.point_at(6, Bias::Left).is_none());
    }

    #[test]
    fn ancestry_queries() {
        let tree = sample();
        assert!(tree.is_ancestor_or_self(NodeId(1), NodeId(4)));
        assert!(!tree.is_ancestor_or_self(NodeId(3), NodeId(2)));
        assert_eq!(
            tree.ancestors(NodeId(4)).collect::<Vec<_>>(),
            vec![NodeId(4), NodeId(3), NodeId(1), NodeId(0)]
        );
    }
}

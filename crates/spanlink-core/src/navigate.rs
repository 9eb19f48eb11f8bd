//! Reverse lookup from stored ranges to display nodes
//!
//! Used for scroll-and-highlight: a stored range is mapped back onto the
//! nodes that show it. Highlight bookkeeping and code-line grouping live here
//! too; both are presentation concerns and never touch stored ranges.

use crate::display::{DisplayTree, NodeId, NodeTag};
use crate::offset::SourceOffset;
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

/// Lookups over one rendered tree. Invalidated by a re-render.
#[derive(Debug, Clone, Copy)]
pub struct NavigationIndex<'t> {
    tree: &'t DisplayTree,
}

impl<'t> NavigationIndex<'t> {
    pub fn new(tree: &'t DisplayTree) -> Self {
        Self { tree }
    }

    /// The shallowest node whose provenance contains `range.start`, first in
    /// document order among nodes of equal depth. The root is never returned.
    pub fn locate(&self, range: SourceOffset) -> Option<NodeId> {
        let tree = self.tree;
        let mut queue: VecDeque<NodeId> = tree.children(tree.root()).iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if tree
                .node(id)
                .provenance
                .is_some_and(|p| p.contains(range.start))
            {
                return Some(id);
            }
            queue.extend(tree.children(id).iter().copied());
        }
        None
    }

    /// Every node, in document order, whose provenance starts or ends inside
    /// the closed interval `[range.start, range.end]`.
    pub fn locate_all(&self, range: SourceOffset) -> Vec<NodeId> {
        let within = |x: usize| range.start <= x && x <= range.end;
        self.tree
            .iter()
            .filter(|&(id, _)| id != self.tree.root())
            .filter(|(_, node)| {
                node.provenance
                    .is_some_and(|p| within(p.start) || within(p.end))
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// The line nodes of a code tree for 1-based inclusive `lines`, grouped
    /// into one block.
    pub fn locate_lines(&self, lines: RangeInclusive<usize>) -> Option<LineBlock> {
        let nodes: Vec<NodeId> = self
            .line_nodes()
            .filter(|(line, _)| lines.contains(line))
            .map(|(_, id)| id)
            .collect();
        LineBlock::from_nodes(self.tree, SegmentKind::Highlighted, nodes)
    }

    fn line_nodes(&self) -> impl Iterator<Item = (usize, NodeId)> + 't {
        let tree = self.tree;
        tree.children(tree.root())
            .iter()
            .filter_map(move |&id| match tree.node(id).tag {
                NodeTag::CodeLine { line } => Some((line, id)),
                _ => None,
            })
    }
}

/// How a run of code lines is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentKind {
    /// Lines of the annotation being viewed
    Highlighted,
    /// A line covered by some other annotation
    Muted,
    Plain,
}

/// A contiguous run of code lines.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LineBlock {
    pub kind: SegmentKind,
    pub first_line: usize,
    pub last_line: usize,
    pub nodes: Vec<NodeId>,
    /// Union of the lines' provenance
    pub span: SourceOffset,
}

impl LineBlock {
    fn from_nodes(tree: &DisplayTree, kind: SegmentKind, nodes: Vec<NodeId>) -> Option<Self> {
        let line_of = |id: NodeId| match tree.node(id).tag {
            NodeTag::CodeLine { line } => line,
            _ => 0,
        };
        let first = *nodes.first()?;
        let last = *nodes.last()?;
        let start = tree.node(first).provenance?.start;
        let end = tree.node(last).provenance?.end;
        Some(Self {
            kind,
            first_line: line_of(first),
            last_line: line_of(last),
            nodes,
            span: SourceOffset { start, end },
        })
    }
}

/// Partition a code tree's lines for display.
///
/// Lines inside any of `current` are highlighted, and adjacent highlighted
/// lines merge into one block. Remaining lines inside any of `others` are
/// muted, one block per line. Everything else is plain, one block per line.
pub fn coalesce_lines(
    tree: &DisplayTree,
    current: &[RangeInclusive<usize>],
    others: &[RangeInclusive<usize>],
) -> Vec<LineBlock> {
    let index = NavigationIndex::new(tree);
    let mut blocks: Vec<LineBlock> = Vec::new();
    let mut run: Vec<NodeId> = Vec::new();

    for (line, id) in index.line_nodes() {
        if current.iter().any(|r| r.contains(&line)) {
            run.push(id);
            continue;
        }
        if let Some(block) =
            LineBlock::from_nodes(tree, SegmentKind::Highlighted, std::mem::take(&mut run))
        {
            blocks.push(block);
        }
        let kind = if others.iter().any(|r| r.contains(&line)) {
            SegmentKind::Muted
        } else {
            SegmentKind::Plain
        };
        blocks.extend(LineBlock::from_nodes(tree, kind, vec![id]));
    }
    blocks.extend(LineBlock::from_nodes(tree, SegmentKind::Highlighted, run));
    blocks
}

/// A node highlighted until `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlight {
    pub node: NodeId,
    pub expires_at: Instant,
}

/// Transient highlights with a fixed lifetime.
#[derive(Debug, Clone)]
pub struct HighlightState {
    lifetime: Duration,
    active: Vec<Highlight>,
}

impl HighlightState {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            active: Vec::new(),
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Highlight `nodes` starting at `now`. Re-highlighting a node restarts
    /// its timer.
    pub fn apply(&mut self, nodes: impl IntoIterator<Item = NodeId>, now: Instant) {
        let expires_at = now + self.lifetime;
        for node in nodes {
            self.active.retain(|h| h.node != node);
            self.active.push(Highlight { node, expires_at });
        }
    }

    pub fn is_highlighted(&self, node: NodeId, now: Instant) -> bool {
        self.active
            .iter()
            .any(|h| h.node == node && now < h.expires_at)
    }

    /// Nodes still highlighted at `now`.
    pub fn active(&self, now: Instant) -> impl Iterator<Item = NodeId> + '_ {
        self.active
            .iter()
            .filter(move |h| now < h.expires_at)
            .map(|h| h.node)
    }

    /// Drop expired highlights and return the nodes they covered.
    pub fn expire(&mut self, now: Instant) -> Vec<NodeId> {
        let (expired, kept): (Vec<_>, Vec<_>) =
            self.active.drain(..).partition(|h| now >= h.expires_at);
        self.active = kept;
        expired.into_iter().map(|h| h.node).collect()
    }

    /// Forget every highlight, e.g. after a re-render.
    pub fn clear(&mut self) {
        self.active.clear();
    }
}

impl Default for HighlightState {
    fn default() -> Self {
        Self::new(Duration::from_millis(5000))
    }
}

/// Wrap-around position over an annotation's code ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeCursor {
    len: usize,
    index: usize,
}

impl RangeCursor {
    pub fn new(len: usize) -> Self {
        Self { len, index: 0 }
    }

    /// Current index, `None` when there is nothing to visit.
    pub fn current(&self) -> Option<usize> {
        (self.len > 0).then_some(self.index)
    }

    pub fn next(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        self.index = (self.index + 1) % self.len;
        Some(self.index)
    }

    pub fn prev(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        self.index = (self.index + self.len - 1) % self.len;
        Some(self.index)
    }

    /// Point the cursor at a new list of `len` ranges, back at the first.
    pub fn reset(&mut self, len: usize) {
        *self = Self::new(len);
    }
}

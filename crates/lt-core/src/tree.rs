//! Hierarchical event tree.
//!
//! Nodes live in an arena owned by the tree; parents and children refer to
//! each other by arena index. The tree is immutable once an indexing pass
//! hands it over and is replaced wholesale on the next pass.
//!
//! Presentation state (icons, selection) lives in a separate [`Presentation`]
//! map keyed by [`NodeId`], so highlighting a node never touches the tree.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, DocumentLocation};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ev_{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct EventNode {
    id: NodeId,
    label: String,
    line: Option<usize>,
    depth: u32,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Event tree for one document. Index 0 is the root.
#[derive(Debug, Clone)]
pub struct EventTree {
    document: DocumentId,
    nodes: Vec<EventNode>,
}

const ROOT: usize = 0;

impl EventTree {
    /// Creates a tree holding only a root labelled `root_label`.
    pub fn new(document: DocumentId, root_label: impl Into<String>) -> Self {
        Self {
            document,
            nodes: vec![EventNode {
                id: NodeId::next(),
                label: root_label.into(),
                line: None,
                depth: 0,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node(ROOT)
    }

    /// Total node count, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the root has no children.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Looks up a node by id.
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.nodes
            .iter()
            .position(|n| n.id == id)
            .map(|index| self.node(index))
    }

    /// All nodes in depth-first pre-order, root first.
    pub fn iter(&self) -> impl Iterator<Item = NodeRef<'_>> {
        let mut stack = vec![ROOT];
        std::iter::from_fn(move || {
            let index = stack.pop()?;
            stack.extend(self.nodes[index].children.iter().rev());
            Some(self.node(index))
        })
    }

    /// Builds a render snapshot merging in presentation state.
    pub fn snapshot(&self, presentation: &Presentation) -> NodeSnapshot {
        self.snapshot_at(ROOT, presentation)
    }

    fn snapshot_at(&self, index: usize, presentation: &Presentation) -> NodeSnapshot {
        let node = &self.nodes[index];
        NodeSnapshot {
            id: node.id,
            label: node.label.clone(),
            line: node.line,
            icon: presentation.icon(node.id).map(String::from),
            selected: presentation.selected() == Some(node.id),
            children: node
                .children
                .iter()
                .map(|&child| self.snapshot_at(child, presentation))
                .collect(),
        }
    }

    const fn node(&self, index: usize) -> NodeRef<'_> {
        NodeRef { tree: self, index }
    }

    /// Appends a child under `parent` and returns its id.
    pub(crate) fn push_child(
        &mut self,
        parent: usize,
        label: String,
        line: Option<usize>,
    ) -> (usize, NodeId) {
        let index = self.nodes.len();
        let id = NodeId::next();
        let depth = self.nodes[parent].depth + 1;
        self.nodes.push(EventNode {
            id,
            label,
            line,
            depth,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(index);
        (index, id)
    }

    /// Resolves the parent for a new node at `level` (>= 1).
    ///
    /// Walks down the chain of most recent children from the root. Where a
    /// level on the way has no node yet, a placeholder is inserted.
    pub(crate) fn parent_for_level(&mut self, level: u32) -> usize {
        let mut current = ROOT;
        for missing in 1..level {
            if self.nodes[current].children.is_empty() {
                self.push_child(current, format!("(no parent level {missing} event)"), None);
            }
            if let Some(&last) = self.nodes[current].children.last() {
                current = last;
            }
        }
        current
    }
}

/// Borrowed view of one node.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a EventTree,
    index: usize,
}

impl<'a> NodeRef<'a> {
    fn raw(&self) -> &'a EventNode {
        &self.tree.nodes[self.index]
    }

    pub fn id(&self) -> NodeId {
        self.raw().id
    }

    pub fn label(&self) -> &'a str {
        &self.raw().label
    }

    /// Source line, absent for the root and placeholders.
    pub fn line(&self) -> Option<usize> {
        self.raw().line
    }

    /// Document and line this node points at.
    pub fn location(&self) -> Option<DocumentLocation> {
        self.line().map(|line| DocumentLocation {
            document: self.tree.document.clone(),
            line,
        })
    }

    /// Distance from the root (root = 0).
    pub fn depth(&self) -> u32 {
        self.raw().depth
    }

    pub fn parent(&self) -> Option<Self> {
        self.raw().parent.map(|index| self.tree.node(index))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + use<'a> {
        let tree = self.tree;
        self.raw().children.iter().map(move |&index| tree.node(index))
    }

    pub fn child_count(&self) -> usize {
        self.raw().children.len()
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("line", &self.line())
            .finish_non_exhaustive()
    }
}

/// Render-ready copy of a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

/// UI-only state for tree nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presentation {
    icons: HashMap<NodeId, String>,
    selected: Option<NodeId>,
}

impl Presentation {
    pub fn set_icon(&mut self, node: NodeId, icon: impl Into<String>) {
        self.icons.insert(node, icon.into());
    }

    pub fn icon(&self, node: NodeId) -> Option<&str> {
        self.icons.get(&node).map(String::as_str)
    }

    /// Marks `node` as the single selected node.
    pub fn select(&mut self, node: NodeId) {
        self.selected = Some(node);
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub const fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    /// Moves the selection from `old` onto the matching node of `new`.
    ///
    /// Node ids change on every rebuild; a node is considered the same if it
    /// has the same line, depth and label.
    pub fn carry_selection(&mut self, previous: &Self, old: &EventTree, new: &EventTree) {
        let Some(selected) = previous.selected.and_then(|id| old.get(id)) else {
            return;
        };
        self.selected = new
            .iter()
            .find(|n| {
                n.line() == selected.line()
                    && n.depth() == selected.depth()
                    && n.label() == selected.label()
            })
            .map(|n| n.id());
    }
}

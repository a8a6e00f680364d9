//! The document tree
//!
//! A document is a tree of [`Node`]s. Each node has a kind (the command name
//! it was scanned from, empty for anonymous grouping nodes), a map of string
//! attributes, a source range, and an ordered list of [`Child`]ren: text runs
//! and owned child nodes.
//!
//! ## Ownership
//!
//! `Node` is a handle: cloning it gives another reference to the same node,
//! which is how passes and scripts hold on to parts of the tree while they
//! rewrite it. Ownership in the tree sense is separate from that: a node has
//! at most one parent, the parent holds it in its `children`, and the node's
//! back-link to its parent is a `Weak` reference. Every operation that moves
//! a node detaches it from its old parent first, so the back-link always
//! names the node that actually holds it.
//!
//! ## Text runs
//!
//! Two text runs are never adjacent. Appending text merges into a trailing
//! run, and splicing operations merge at their seams.
//!
//! ## Modules
//!
//! - `edit`: byte-offset operations (split, insert, search)
//! - `visit`: single-level and recursive rewriting traversals

mod edit;
mod visit;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use thiserror::Error;

use crate::texpipe::source::{CompressedSourceLocation, SourceRange};

/// Errors from tree mutation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("byte index {index} is past the end of the text (length {length})")]
    OutOfRange { index: usize, length: usize },
    #[error("byte index {0} is not on a character boundary")]
    NotCharBoundary(usize),
    #[error("a node cannot become a child of itself or of one of its descendants")]
    Cycle,
}

/// A child of a node: either a run of text or another node
#[derive(Clone)]
pub enum Child {
    Text(String),
    Node(Node),
}

impl Child {
    /// Length of the text this child contributes, in bytes
    pub fn len(&self) -> usize {
        match self {
            Child::Text(text) => text.len(),
            Child::Node(node) => node.length(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Child::Text(text) => Some(text),
            Child::Node(_) => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Child::Text(_) => None,
            Child::Node(node) => Some(node),
        }
    }

    /// Flattened text of this child
    pub fn text(&self) -> String {
        match self {
            Child::Text(text) => text.clone(),
            Child::Node(node) => node.text(),
        }
    }

    fn same_content(&self, other: &Child) -> bool {
        match (self, other) {
            (Child::Text(a), Child::Text(b)) => a == b,
            (Child::Node(a), Child::Node(b)) => a.same_content(b),
            _ => false,
        }
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

impl From<Node> for Child {
    fn from(node: Node) -> Self {
        Child::Node(node)
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Text(text) => write!(f, "{text:?}"),
            Child::Node(node) => node.fmt(f),
        }
    }
}

/// Progress of a running `visit` over a node's own children.
///
/// The children list is laid out as `[done][pending][appended]`: rewritten
/// children, children not yet handed to the transform, and anything appended
/// while the visit runs.
#[derive(Debug, Default, Clone, Copy)]
struct VisitCursor {
    done: usize,
    pending: usize,
}

#[derive(Default)]
struct NodeData {
    kind: String,
    children: Vec<Child>,
    attributes: IndexMap<String, String>,
    source_range: SourceRange,
    parent: Weak<RefCell<NodeData>>,
    cursor: Option<VisitCursor>,
}

impl NodeData {
    /// Append a child, merging text unless that would fold it into a
    /// pending run
    fn push(&mut self, child: Child) {
        let after_pending = self.cursor.is_some_and(|c| {
            c.pending > 0 && self.children.len() == c.done + c.pending
        });
        if !after_pending {
            push_merged(&mut self.children, child);
        } else if !matches!(&child, Child::Text(text) if text.is_empty()) {
            self.children.push(child);
        }
    }

    fn inserted_at(&mut self, position: usize) {
        if let Some(cursor) = &mut self.cursor {
            if position <= cursor.done {
                cursor.done += 1;
            } else if position < cursor.done + cursor.pending {
                cursor.pending += 1;
            }
        }
    }

    fn removed_at(&mut self, position: usize) {
        if let Some(cursor) = &mut self.cursor {
            if position < cursor.done {
                cursor.done -= 1;
            } else if position < cursor.done + cursor.pending {
                cursor.pending -= 1;
            }
        }
    }

    /// Take every child, restarting a running visit's cursor
    fn take_children(&mut self) -> Vec<Child> {
        if let Some(cursor) = &mut self.cursor {
            *cursor = VisitCursor::default();
        }
        std::mem::take(&mut self.children)
    }
}

/// A shared handle to a document node
#[derive(Clone)]
pub struct Node(Rc<RefCell<NodeData>>);

impl Node {
    /// Create a detached, anonymous, empty node
    pub fn new() -> Self {
        Node(Rc::new(RefCell::new(NodeData::default())))
    }

    pub fn with_kind(kind: impl Into<String>) -> Self {
        let node = Self::new();
        node.set_kind(kind);
        node
    }

    // ========================================================================
    // PLAIN ACCESSORS
    // ========================================================================

    pub fn kind(&self) -> String {
        self.0.borrow().kind.clone()
    }

    pub fn set_kind(&self, kind: impl Into<String>) {
        self.0.borrow_mut().kind = kind.into();
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.borrow().kind.is_empty()
    }

    pub fn source_range(&self) -> SourceRange {
        self.0.borrow().source_range
    }

    pub fn set_source_range(&self, range: SourceRange) {
        self.0.borrow_mut().source_range = range;
    }

    pub fn set_source_end(&self, end: CompressedSourceLocation) {
        self.0.borrow_mut().source_range.end = end;
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0.borrow().attributes.get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.borrow().attributes.contains_key(name)
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.0
            .borrow_mut()
            .attributes
            .insert(name.into(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.0.borrow_mut().attributes.shift_remove(name)
    }

    /// Attributes in insertion order
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.0
            .borrow()
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn attribute_count(&self) -> usize {
        self.0.borrow().attributes.len()
    }

    /// Snapshot of the children list
    pub fn children(&self) -> Vec<Child> {
        self.0.borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    /// True when the node has neither children nor attributes
    pub fn is_empty(&self) -> bool {
        let data = self.0.borrow();
        data.children.is_empty() && data.attributes.is_empty()
    }

    // ========================================================================
    // IDENTITY AND NAVIGATION
    // ========================================================================

    /// Whether two handles refer to the same node
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The node currently holding this one, if any
    pub fn parent(&self) -> Option<Node> {
        self.0.borrow().parent.upgrade().map(Node)
    }

    fn set_parent(&self, parent: Option<&Node>) {
        self.0.borrow_mut().parent = parent.map_or_else(Weak::new, |p| Rc::downgrade(&p.0));
    }

    /// Parents from the nearest upward
    pub fn ancestors(&self) -> impl Iterator<Item = Node> {
        std::iter::successors(self.parent(), Node::parent)
    }

    /// True if `self` is `other` or lies somewhere below it
    pub fn is_within(&self, other: &Node) -> bool {
        self.ptr_eq(other) || self.ancestors().any(|ancestor| ancestor.ptr_eq(other))
    }

    /// Structural equality: kind, attributes and children, ignoring ranges
    pub fn same_content(&self, other: &Node) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let a = self.0.borrow();
        let b = other.0.borrow();
        a.kind == b.kind
            && a.attributes == b.attributes
            && a.children.len() == b.children.len()
            && a
                .children
                .iter()
                .zip(b.children.iter())
                .all(|(x, y)| x.same_content(y))
    }

    // ========================================================================
    // CHILD MANAGEMENT
    // ========================================================================

    /// Create an empty node as the new last child and return it.
    ///
    /// Its range starts where the previous child node's range ended, so ranges
    /// stay contiguous before the new node's own content has been scanned.
    pub fn new_child(&self) -> Node {
        let start = {
            let data = self.0.borrow();
            data.children
                .iter()
                .rev()
                .find_map(|child| child.as_node().map(|n| n.source_range().effective_end()))
                .unwrap_or(data.source_range.start)
        };
        let child = Node::new();
        child.set_source_range(SourceRange::point(start));
        child.set_parent(Some(self));
        self.0.borrow_mut().children.push(Child::Node(child.clone()));
        child
    }

    /// Append text, merging into the trailing text run if there is one
    pub fn append_text(&self, text: &str) {
        self.0.borrow_mut().push(Child::Text(text.to_string()));
    }

    /// Append a child. A node that already has a parent is detached from it
    /// first.
    pub fn append_child(&self, child: impl Into<Child>) -> Result<(), TreeError> {
        match child.into() {
            Child::Text(text) => {
                self.append_text(&text);
                Ok(())
            }
            Child::Node(node) => {
                if self.is_within(&node) {
                    return Err(TreeError::Cycle);
                }
                node.detach();
                self.adopt(Child::Node(node));
                Ok(())
            }
        }
    }

    /// Remove `node` from the children of its parent, if it has one
    pub fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.remove_child(self);
        }
    }

    /// Remove a child node by identity. Returns whether it was found.
    pub fn remove_child(&self, node: &Node) -> bool {
        let removed = {
            let mut data = self.0.borrow_mut();
            let position = data
                .children
                .iter()
                .position(|child| matches!(child, Child::Node(n) if n.ptr_eq(node)));
            position.map(|index| {
                let child = data.children.remove(index);
                data.removed_at(index);
                // A running visit merges text when it finishes.
                if data.cursor.is_none() {
                    merge_text_at(&mut data.children, index);
                }
                child
            })
        };
        match removed {
            Some(_) => {
                node.set_parent(None);
                true
            }
            None => false,
        }
    }

    /// Move every child of `other` onto the end of this node, leaving `other`
    /// empty
    pub fn take_children(&self, other: &Node) -> Result<(), TreeError> {
        if self.ptr_eq(other) {
            return Ok(());
        }
        if self.is_within(other) {
            return Err(TreeError::Cycle);
        }
        let moved = other.0.borrow_mut().take_children();
        for child in moved {
            self.adopt(child);
        }
        Ok(())
    }

    /// Remove and return every child, clearing their parent links
    pub fn extract_children(&self) -> Vec<Child> {
        let children = self.0.borrow_mut().take_children();
        for child in &children {
            if let Child::Node(node) = child {
                node.set_parent(None);
            }
        }
        children
    }

    /// Drop every child
    pub fn clear(&self) {
        self.extract_children();
    }

    /// Push a child that has no other owner, merging text
    fn adopt(&self, child: Child) {
        if let Child::Node(node) = &child {
            node.set_parent(Some(self));
        }
        self.0.borrow_mut().push(child);
    }

    // ========================================================================
    // CLONING
    // ========================================================================

    /// Copy kind, attributes and source range, but no children
    pub fn shallow_clone(&self) -> Node {
        let data = self.0.borrow();
        Node(Rc::new(RefCell::new(NodeData {
            kind: data.kind.clone(),
            children: Vec::new(),
            attributes: data.attributes.clone(),
            source_range: data.source_range,
            parent: Weak::new(),
            cursor: None,
        })))
    }

    /// Copy the whole subtree with fresh node identities
    pub fn deep_clone(&self) -> Node {
        let clone = self.shallow_clone();
        for child in self.children() {
            match child {
                Child::Text(text) => clone.append_text(&text),
                Child::Node(node) => clone.adopt(Child::Node(node.deep_clone())),
            }
        }
        clone
    }

    // ========================================================================
    // TEXT CONTENT
    // ========================================================================

    /// Total length in bytes of all text in this subtree
    pub fn length(&self) -> usize {
        self.0.borrow().children.iter().map(Child::len).sum()
    }

    /// Flattened text content of this subtree
    pub fn text(&self) -> String {
        let data = self.0.borrow();
        if let [Child::Text(text)] = data.children.as_slice() {
            return text.clone();
        }
        let mut result = String::new();
        for child in &data.children {
            match child {
                Child::Text(text) => result.push_str(text),
                Child::Node(node) => result.push_str(&node.text()),
            }
        }
        result
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        let mut out = f.debug_struct("Node");
        out.field("kind", &data.kind);
        if !data.attributes.is_empty() {
            out.field("attributes", &data.attributes);
        }
        out.field("children", &data.children).finish()
    }
}

/// Push onto a children list, merging adjacent text runs and skipping empty
/// ones
fn push_merged(children: &mut Vec<Child>, child: Child) {
    match child {
        Child::Text(text) if text.is_empty() => {}
        Child::Text(text) => match children.last_mut() {
            Some(Child::Text(last)) => last.push_str(&text),
            _ => children.push(Child::Text(text)),
        },
        node @ Child::Node(_) => children.push(node),
    }
}

/// Merge the text runs either side of `index`, if both are text
fn merge_text_at(children: &mut Vec<Child>, index: usize) {
    if index == 0 || index >= children.len() {
        return;
    }
    if !matches!(
        (&children[index - 1], &children[index]),
        (Child::Text(_), Child::Text(_))
    ) {
        return;
    }
    if let Child::Text(next) = children.remove(index) {
        if let Child::Text(previous) = &mut children[index - 1] {
            previous.push_str(&next);
        }
    }
}

//! Rewriting traversals
//!
//! `visit` walks the immediate children once. Each child is taken out of the
//! node and handed to the transform, which answers with the children that
//! should stand in its place: the same child to keep it, nothing to delete
//! it, or any number of new children. Replacements are not revisited.
//!
//! The visit runs in place. Children not yet visited stay in the node, so a
//! transform that moves, detaches or removes one of them takes it out of the
//! visit as well, and a node never ends up with two owners.
//!
//! `match_kind` and `match_any` recurse: nodes whose kind matches are handed
//! to the visitor, everything else is descended into.

use std::convert::Infallible;

use super::{push_merged, Child, Node, VisitCursor};

impl Node {
    /// Rewrite the immediate children through `transform`
    pub fn visit<F>(&self, mut transform: F)
    where
        F: FnMut(Child) -> Vec<Child>,
    {
        let result = self.try_visit(|child| Ok::<_, Infallible>(transform(child)));
        if let Err(never) = result {
            match never {}
        }
    }

    /// Fallible form of [`visit`](Node::visit).
    ///
    /// When the transform fails, the child it was given is put back where it
    /// was, unless the transform has already given it another parent.
    /// Children not yet visited are left as they are.
    pub fn try_visit<E, F>(&self, mut transform: F) -> Result<(), E>
    where
        F: FnMut(Child) -> Result<Vec<Child>, E>,
    {
        let outer = {
            let mut data = self.0.borrow_mut();
            let pending = data.children.len();
            data.cursor.replace(VisitCursor { done: 0, pending })
        };

        let result = loop {
            let Some(child) = self.next_pending() else {
                break Ok(());
            };
            let current = child.clone();
            match transform(child) {
                Ok(replacements) => {
                    for replacement in replacements {
                        self.splice(replacement);
                    }
                }
                Err(err) => {
                    self.put_back(current);
                    break Err(err);
                }
            }
        };

        self.finish_visit(outer);
        result
    }

    /// Take the next unvisited child out of the node
    fn next_pending(&self) -> Option<Child> {
        let child = {
            let mut data = self.0.borrow_mut();
            let index = match &mut data.cursor {
                Some(cursor) if cursor.pending > 0 => {
                    cursor.pending -= 1;
                    cursor.done
                }
                _ => return None,
            };
            data.children.remove(index)
        };
        if let Child::Node(node) = &child {
            node.set_parent(None);
        }
        Some(child)
    }

    /// Place a replacement after the children already rewritten
    fn splice(&self, child: Child) {
        if let Child::Node(node) = &child {
            if self.is_within(node) {
                tracing::warn!(
                    kind = %node.kind(),
                    "dropping replacement that would contain its own parent"
                );
                return;
            }
            // Wherever it is, pending sibling included.
            node.detach();
        }
        let mut data = self.0.borrow_mut();
        let index = data.cursor.map_or(data.children.len(), |cursor| cursor.done);
        if let Child::Text(text) = &child {
            if text.is_empty() {
                return;
            }
            let previous = index.checked_sub(1).map(|i| &mut data.children[i]);
            if let Some(Child::Text(previous)) = previous {
                previous.push_str(text);
                return;
            }
        }
        data.children.insert(index, child.clone());
        if let Some(cursor) = &mut data.cursor {
            cursor.done += 1;
        }
        drop(data);
        if let Child::Node(node) = child {
            node.set_parent(Some(self));
        }
    }

    /// Return the child a failed transform was given
    fn put_back(&self, child: Child) {
        if let Child::Node(node) = &child {
            if node.parent().is_some() {
                return;
            }
            node.set_parent(Some(self));
        }
        let mut data = self.0.borrow_mut();
        let index = data.cursor.map_or(data.children.len(), |cursor| cursor.done);
        data.children.insert(index, child);
    }

    /// Merge the text runs the visit left side by side and hand the cursor
    /// back to an enclosing visit of the same node, which has nothing left to
    /// visit.
    fn finish_visit(&self, outer: Option<VisitCursor>) {
        let mut data = self.0.borrow_mut();
        for child in std::mem::take(&mut data.children) {
            push_merged(&mut data.children, child);
        }
        let done = data.children.len();
        data.cursor = outer.map(|_| VisitCursor { done, pending: 0 });
    }

    // ========================================================================
    // RECURSIVE MATCHING
    // ========================================================================

    /// Hand every descendant node of kind `kind` to `visitor`, replacing it
    /// with the returned children. Matched nodes are not descended into.
    pub fn match_kind<F>(&self, kind: &str, mut visitor: F)
    where
        F: FnMut(Node) -> Vec<Child>,
    {
        let result = self.try_match_by(&|k: &str| k == kind, &mut |node: Node| {
            Ok::<_, Infallible>(visitor(node))
        });
        if let Err(never) = result {
            match never {}
        }
    }

    /// Like [`match_kind`](Node::match_kind) with several kinds
    pub fn match_any<F>(&self, kinds: &[&str], mut visitor: F)
    where
        F: FnMut(Node) -> Vec<Child>,
    {
        let matches = |k: &str| kinds.iter().any(|candidate| *candidate == k);
        let result = self.try_match_by(&matches, &mut |node: Node| {
            Ok::<_, Infallible>(visitor(node))
        });
        if let Err(never) = result {
            match never {}
        }
    }

    pub fn try_match_kind<E, F>(&self, kind: &str, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(Node) -> Result<Vec<Child>, E>,
    {
        self.try_match_by(&|k: &str| k == kind, &mut visitor)
    }

    pub fn try_match_any<E, F>(&self, kinds: &[&str], mut visitor: F) -> Result<(), E>
    where
        F: FnMut(Node) -> Result<Vec<Child>, E>,
    {
        let matches = |k: &str| kinds.iter().any(|candidate| *candidate == k);
        self.try_match_by(&matches, &mut visitor)
    }

    /// Recursive match driven by a kind predicate
    pub fn try_match_by<E, P, F>(&self, matches: &P, visitor: &mut F) -> Result<(), E>
    where
        P: Fn(&str) -> bool,
        F: FnMut(Node) -> Result<Vec<Child>, E>,
    {
        self.try_visit(|child| match child {
            Child::Node(node) if matches(&node.kind()) => visitor(node),
            Child::Node(node) => {
                node.try_match_by(matches, visitor)?;
                Ok(vec![Child::Node(node)])
            }
            text @ Child::Text(_) => Ok(vec![text]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(node: &Node) -> Vec<String> {
        node.children()
            .iter()
            .map(|c| match c {
                Child::Text(t) => format!("'{t}'"),
                Child::Node(n) => n.kind(),
            })
            .collect()
    }

    fn doc() -> Node {
        let root = Node::with_kind("doc");
        root.append_text("a");
        root.new_child().set_kind("x");
        root.append_text("b");
        root.new_child().set_kind("y");
        root
    }

    #[test]
    fn identity_visit_changes_nothing() {
        let root = doc();
        let before = root.deep_clone();
        root.visit(|c| vec![c]);
        assert!(root.same_content(&before));
        for child in root.children() {
            if let Child::Node(n) = child {
                assert!(n.parent().unwrap().ptr_eq(&root));
            }
        }
    }

    #[test]
    fn deleting_a_node_merges_neighbouring_text() {
        let root = doc();
        root.visit(|c| match &c {
            Child::Node(n) if n.kind() == "x" => vec![],
            _ => vec![c],
        });
        assert_eq!(kinds(&root), vec!["'ab'", "y"]);
    }

    #[test]
    fn deleted_node_is_detached() {
        let root = doc();
        let x = root.children()[1].as_node().unwrap().clone();
        root.visit(|c| match &c {
            Child::Node(n) if n.kind() == "x" => vec![],
            _ => vec![c],
        });
        assert!(x.parent().is_none());
    }

    #[test]
    fn replacements_are_not_revisited() {
        let root = doc();
        let mut seen = 0;
        root.visit(|c| {
            seen += 1;
            match &c {
                Child::Node(n) if n.kind() == "x" => {
                    let fresh = Node::with_kind("x");
                    vec![Child::Node(fresh), c.clone(), Child::from("!")]
                }
                _ => vec![c],
            }
        });
        assert_eq!(seen, 4);
        assert_eq!(kinds(&root), vec!["'a'", "x", "x", "'!b'", "y"]);
    }

    #[test]
    fn failing_transform_restores_the_rest() {
        let root = doc();
        let result = root.try_visit(|c| match &c {
            Child::Node(n) if n.kind() == "x" => Err("boom"),
            Child::Text(_) => Ok(vec![Child::from("A")]),
            _ => Ok(vec![c]),
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(kinds(&root), vec!["'A'", "x", "'b'", "y"]);
        for child in root.children() {
            if let Child::Node(n) = child {
                assert!(n.parent().unwrap().ptr_eq(&root));
            }
        }
    }

    #[test]
    fn match_kind_recurses_into_non_matching_nodes() {
        let root = Node::with_kind("doc");
        let section = root.new_child();
        section.set_kind("section");
        let em = section.new_child();
        em.set_kind("em");
        em.append_text("hi");
        let inner = em.new_child();
        inner.set_kind("em");

        let mut hits = 0;
        root.match_kind("em", |node| {
            hits += 1;
            vec![Child::Text(node.text())]
        });
        assert_eq!(hits, 1);
        assert_eq!(kinds(&section), vec!["'hi'"]);
    }

    #[test]
    fn match_any_handles_several_kinds() {
        let root = doc();
        root.match_any(&["x", "y"], |node| {
            let wrapper = Node::with_kind(format!("{}-wrapped", node.kind()));
            wrapper.append_child(node).unwrap();
            vec![Child::Node(wrapper)]
        });
        assert_eq!(kinds(&root), vec!["'a'", "x-wrapped", "'b'", "y-wrapped"]);
    }

    #[test]
    fn try_match_kind_propagates_errors() {
        let root = doc();
        let result: Result<(), String> =
            root.try_match_kind("y", |node| Err(format!("no {}", node.kind())));
        assert_eq!(result.unwrap_err(), "no y");
        assert_eq!(kinds(&root), vec!["'a'", "x", "'b'", "y"]);
    }

    #[test]
    fn moving_a_pending_sibling_does_not_duplicate_it() {
        let root = doc();
        let y = root.children()[3].as_node().unwrap().clone();
        root.visit(|c| match &c {
            Child::Node(n) if n.kind() == "x" => vec![Child::Node(y.clone()), c.clone()],
            _ => vec![c],
        });
        assert_eq!(kinds(&root), vec!["'a'", "y", "x", "'b'"]);
    }

    fn child(node: &Node, index: usize) -> Node {
        node.children()[index].as_node().unwrap().clone()
    }

    fn assert_owned_by(parent: &Node) {
        for child in parent.children() {
            if let Child::Node(n) = child {
                assert!(n.parent().unwrap().ptr_eq(parent));
            }
        }
    }

    #[test]
    fn moving_a_pending_sibling_elsewhere_takes_it_out_of_the_visit() {
        let root = doc();
        let y = child(&root, 3);
        let other = Node::with_kind("other");
        let mut seen = Vec::new();
        root.visit(|c| {
            seen.push(format!("{c:?}"));
            if matches!(&c, Child::Node(n) if n.kind() == "x") {
                other.append_child(y.clone()).unwrap();
            }
            vec![c]
        });
        assert_eq!(seen.len(), 3);
        assert_eq!(kinds(&root), vec!["'a'", "x", "'b'"]);
        assert_eq!(kinds(&other), vec!["y"]);
        assert!(y.parent().unwrap().ptr_eq(&other));
        assert_owned_by(&root);
    }

    #[test]
    fn removing_a_pending_sibling_during_visit() {
        let root = doc();
        let y = child(&root, 3);
        let mut removed = None;
        root.visit(|c| {
            if matches!(&c, Child::Node(n) if n.kind() == "x") {
                removed = Some(root.remove_child(&y));
            }
            vec![c]
        });
        assert_eq!(removed, Some(true));
        assert_eq!(kinds(&root), vec!["'a'", "x", "'b'"]);
        assert!(y.parent().is_none());
    }

    #[test]
    fn detaching_a_pending_sibling_during_visit() {
        let root = doc();
        let y = child(&root, 3);
        root.visit(|c| {
            y.detach();
            vec![c]
        });
        assert_eq!(kinds(&root), vec!["'a'", "x", "'b'"]);
        assert!(y.parent().is_none());
    }

    #[test]
    fn moving_a_visited_sibling_into_a_later_one() {
        let root = doc();
        let x = child(&root, 1);
        root.visit(|c| {
            if let Child::Node(n) = &c {
                if n.kind() == "y" {
                    n.append_child(x.clone()).unwrap();
                }
            }
            vec![c]
        });
        assert_eq!(kinds(&root), vec!["'ab'", "y"]);
        let y = child(&root, 1);
        assert_eq!(kinds(&y), vec!["x"]);
        assert!(x.parent().unwrap().ptr_eq(&y));
        assert_owned_by(&root);
    }

    #[test]
    fn wrapping_the_visited_node_itself() {
        let outer = Node::with_kind("outer");
        let root = doc();
        outer.append_child(root.clone()).unwrap();
        let wrapper = Node::with_kind("wrapper");
        root.visit(|c| {
            if root.parent().is_some_and(|p| p.ptr_eq(&outer)) {
                wrapper.append_child(root.clone()).unwrap();
            }
            vec![c]
        });
        assert_eq!(outer.child_count(), 0);
        assert!(root.parent().unwrap().ptr_eq(&wrapper));
        assert_eq!(kinds(&root), vec!["'a'", "x", "'b'", "y"]);
        assert_owned_by(&root);
    }

    #[test]
    fn match_kind_can_gather_following_siblings() {
        let root = Node::with_kind("doc");
        root.new_child().set_kind("h");
        root.new_child().set_kind("p");
        root.new_child().set_kind("q");
        root.new_child().set_kind("p");
        root.match_kind("h", |heading| {
            for sibling in root.children() {
                heading.append_child(sibling).unwrap();
            }
            vec![Child::Node(heading)]
        });
        assert_eq!(kinds(&root), vec!["h"]);
        let heading = child(&root, 0);
        assert_eq!(kinds(&heading), vec!["p", "q", "p"]);
        assert_owned_by(&root);
        assert_owned_by(&heading);
    }
}

//! Byte-offset editing
//!
//! These operations address a node's flattened text by byte offset, the same
//! way `text()` would index it, and descend into whichever child holds that
//! offset.

use super::{Child, Node, TreeError};

enum Insertion {
    IntoRun(usize, usize),
    Before(usize),
    Descend(Node, usize),
    AtEnd,
}

impl Node {
    /// Split the node's text at byte `index` into two shallow clones of this
    /// node, moving every child into one side or the other.
    ///
    /// A child that straddles `index` is split recursively. This node is left
    /// empty. On error nothing is moved.
    pub fn split_at_byte_index(&self, index: usize) -> Result<(Node, Node), TreeError> {
        let length = self.length();
        if index > length {
            return Err(TreeError::OutOfRange { index, length });
        }
        if !self.is_char_boundary(index) {
            return Err(TreeError::NotCharBoundary(index));
        }
        Ok(self.split_unchecked(index))
    }

    fn split_unchecked(&self, mut index: usize) -> (Node, Node) {
        let left = self.shallow_clone();
        let right = self.shallow_clone();
        let children = self.0.borrow_mut().take_children();
        for child in children {
            if index == 0 {
                right.adopt(child);
                continue;
            }
            let len = child.len();
            if index >= len {
                left.adopt(child);
                index -= len;
                continue;
            }
            match child {
                Child::Text(text) => {
                    left.append_text(&text[..index]);
                    right.append_text(&text[index..]);
                }
                Child::Node(node) => {
                    let (l, r) = node.split_unchecked(index);
                    left.adopt(Child::Node(l));
                    right.adopt(Child::Node(r));
                }
            }
            index = 0;
        }
        (left, right)
    }

    /// Whether `index` falls on a UTF-8 boundary of the flattened text
    pub fn is_char_boundary(&self, mut index: usize) -> bool {
        for child in self.0.borrow().children.iter() {
            let len = child.len();
            if index < len {
                return match child {
                    Child::Text(text) => text.is_char_boundary(index),
                    Child::Node(node) => node.is_char_boundary(index),
                };
            }
            index -= len;
        }
        index == 0
    }

    /// Insert `text` at flattened byte offset `index`.
    ///
    /// Text that lands between two children is placed at this level rather
    /// than inside the following node.
    pub fn insert_text(&self, index: usize, text: &str) -> Result<(), TreeError> {
        let length = self.length();
        if index > length {
            return Err(TreeError::OutOfRange { index, length });
        }
        if text.is_empty() {
            return Ok(());
        }
        let insertion = {
            let data = self.0.borrow();
            let mut remaining = index;
            let mut found = Insertion::AtEnd;
            for (position, child) in data.children.iter().enumerate() {
                let len = child.len();
                match child {
                    Child::Text(_) if remaining <= len => {
                        found = Insertion::IntoRun(position, remaining);
                        break;
                    }
                    Child::Node(_) if remaining == 0 => {
                        found = Insertion::Before(position);
                        break;
                    }
                    Child::Node(node) if remaining < len => {
                        found = Insertion::Descend(node.clone(), remaining);
                        break;
                    }
                    _ => remaining -= len,
                }
            }
            found
        };
        match insertion {
            Insertion::IntoRun(position, offset) => {
                let mut data = self.0.borrow_mut();
                if let Child::Text(run) = &mut data.children[position] {
                    if !run.is_char_boundary(offset) {
                        return Err(TreeError::NotCharBoundary(index));
                    }
                    run.insert_str(offset, text);
                }
                Ok(())
            }
            Insertion::Before(position) => {
                let mut data = self.0.borrow_mut();
                data.children.insert(position, Child::Text(text.to_string()));
                data.inserted_at(position);
                Ok(())
            }
            Insertion::Descend(node, offset) => {
                node.insert_text(offset, text).map_err(|err| match err {
                    TreeError::NotCharBoundary(_) => TreeError::NotCharBoundary(index),
                    other => other,
                })
            }
            Insertion::AtEnd => {
                self.append_text(text);
                Ok(())
            }
        }
    }

    /// Byte offset of the first occurrence of `needle`, searching text runs
    /// and child subtrees depth first. A match must lie within one text run.
    pub fn find_string(&self, needle: &str) -> Option<usize> {
        let mut offset = 0;
        for child in self.0.borrow().children.iter() {
            let found = match child {
                Child::Text(text) => text.find(needle),
                Child::Node(node) => node.find_string(needle),
            };
            if let Some(position) = found {
                return Some(offset + position);
            }
            offset += child.len();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Node {
        let root = Node::with_kind("p");
        root.set_attribute("id", "x");
        root.append_text("ab");
        let em = root.new_child();
        em.set_kind("em");
        em.append_text("cdé");
        root.append_text("fg");
        root
    }

    #[test]
    fn split_inside_nested_node() {
        let root = sample();
        let (left, right) = root.split_at_byte_index(3).unwrap();
        assert_eq!(left.text(), "abc");
        assert_eq!(right.text(), "défg");
        assert_eq!(left.kind(), "p");
        assert_eq!(right.attribute("id").as_deref(), Some("x"));
        let right_em = right.children()[0].as_node().unwrap().clone();
        assert_eq!(right_em.kind(), "em");
        assert!(right_em.parent().unwrap().ptr_eq(&right));
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn split_at_child_boundary_moves_whole_children() {
        let root = sample();
        let (left, right) = root.split_at_byte_index(2).unwrap();
        assert_eq!(left.child_count(), 1);
        assert_eq!(left.text(), "ab");
        assert_eq!(right.text(), "cdéfg");
    }

    #[test]
    fn split_at_ends() {
        let (left, right) = sample().split_at_byte_index(0).unwrap();
        assert_eq!(left.length(), 0);
        assert_eq!(right.text(), "abcdéfg");
        let root = sample();
        let len = root.length();
        let (left, right) = root.split_at_byte_index(len).unwrap();
        assert_eq!(left.text(), "abcdéfg");
        assert_eq!(right.child_count(), 0);
    }

    #[test]
    fn split_rejects_bad_indices_without_moving() {
        let root = sample();
        assert_eq!(
            root.split_at_byte_index(100).unwrap_err(),
            TreeError::OutOfRange {
                index: 100,
                length: 8
            }
        );
        assert_eq!(
            root.split_at_byte_index(5).unwrap_err(),
            TreeError::NotCharBoundary(5)
        );
        assert_eq!(root.text(), "abcdéfg");
    }

    #[test]
    fn insert_into_text_run() {
        let root = sample();
        root.insert_text(1, "X").unwrap();
        assert_eq!(root.text(), "aXbcdéfg");
    }

    #[test]
    fn insert_descends_into_child() {
        let root = sample();
        root.insert_text(3, "X").unwrap();
        let em = root.children()[1].as_node().unwrap().clone();
        assert_eq!(em.text(), "cXdé");
    }

    #[test]
    fn insert_before_leading_node_stays_outside() {
        let root = Node::new();
        let em = root.new_child();
        em.append_text("inner");
        root.insert_text(0, "lead").unwrap();
        assert_eq!(root.children()[0].as_text(), Some("lead"));
        assert_eq!(em.text(), "inner");
    }

    #[test]
    fn insert_at_end_appends() {
        let root = sample();
        root.insert_text(root.length(), "!").unwrap();
        assert_eq!(root.text(), "abcdéfg!");
    }

    #[test]
    fn insert_rejects_bad_indices() {
        let root = sample();
        assert!(matches!(
            root.insert_text(99, "x"),
            Err(TreeError::OutOfRange { .. })
        ));
        assert_eq!(
            root.insert_text(5, "x"),
            Err(TreeError::NotCharBoundary(5))
        );
    }

    #[test]
    fn find_string_spans_children() {
        let root = sample();
        assert_eq!(root.find_string("ab"), Some(0));
        assert_eq!(root.find_string("dé"), Some(3));
        assert_eq!(root.find_string("fg"), Some(6));
        assert_eq!(root.find_string("bc"), None);
        assert_eq!(root.find_string("zz"), None);
    }

    fn build(pieces: &[(bool, String)]) -> Node {
        let root = Node::with_kind("root");
        for (nested, text) in pieces {
            if *nested {
                let child = root.new_child();
                child.set_kind("n");
                child.append_text(text);
            } else {
                root.append_text(text);
            }
        }
        root
    }

    proptest! {
        #[test]
        fn split_preserves_text(
            pieces in prop::collection::vec((any::<bool>(), "[a-zé日]{0,4}"), 0..6),
            cut in 0usize..64,
        ) {
            let root = build(&pieces);
            let original = root.text();
            let boundaries: Vec<usize> = (0..=original.len())
                .filter(|i| original.is_char_boundary(*i))
                .collect();
            let index = boundaries[cut % boundaries.len()];
            let (left, right) = root.split_at_byte_index(index).unwrap();
            prop_assert_eq!(format!("{}{}", left.text(), right.text()), original.clone());
            prop_assert_eq!(left.length() + right.length(), original.len());
            prop_assert_eq!(left.length(), index);
            prop_assert_eq!(root.child_count(), 0);
        }
    }
}

//! # Editor State
//!
//! An [`EditorState`] is an immutable snapshot of the document: the node map,
//! the root key, the selection and a monotonically increasing version.
//! Committed states are shared behind `Arc` and never mutated again; a
//! transaction works on a private copy whose untouched nodes stay shared with
//! the state it was opened from.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::errors::EditorError;
use crate::keys::KeyGenerator;
use crate::node::{Node, NodeKey, NodeKind, NodePayload, NodeType};
use crate::selection::{Point, RangeSelection, Selection};

#[derive(Debug, Clone)]
pub struct EditorState {
    pub(crate) nodes: HashMap<NodeKey, Arc<Node>>,
    pub(crate) root: NodeKey,
    pub(crate) selection: Option<Selection>,
    pub(crate) version: u64,
}

impl EditorState {
    /// A document holding one empty paragraph with the cursor inside it.
    pub fn empty(keys: &mut KeyGenerator) -> Self {
        let root_key = keys.next_key();
        let paragraph_key = keys.next_key();

        let mut root = Node::new(root_key.clone(), NodePayload::Root);
        root.children_mut().push(paragraph_key.clone());
        let mut paragraph = Node::new(paragraph_key.clone(), NodePayload::Paragraph);
        paragraph.set_parent(Some(root_key.clone()));

        let mut nodes = HashMap::new();
        nodes.insert(root_key.clone(), Arc::new(root));
        nodes.insert(paragraph_key.clone(), Arc::new(paragraph));

        Self {
            nodes,
            root: root_key,
            selection: Some(Selection::Range(RangeSelection::collapsed(Point::new(
                paragraph_key,
                0,
            )))),
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root_key(&self) -> &NodeKey {
        &self.root
    }

    pub fn root(&self) -> &Node {
        // the root is checked on every commit
        &self.nodes[&self.root]
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn node(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key).map(Arc::as_ref)
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_type(&self, key: &NodeKey) -> Option<NodeType> {
        self.node(key).map(Node::node_type)
    }

    pub fn parent_of(&self, key: &NodeKey) -> Option<&NodeKey> {
        self.node(key).and_then(Node::parent)
    }

    pub fn children_of(&self, key: &NodeKey) -> &[NodeKey] {
        self.node(key).map(Node::children).unwrap_or(&[])
    }

    /// Position of `key` among its parent's children
    pub fn index_in_parent(&self, key: &NodeKey) -> Option<usize> {
        let parent = self.parent_of(key)?;
        self.children_of(parent).iter().position(|c| c == key)
    }

    pub fn prev_sibling(&self, key: &NodeKey) -> Option<&NodeKey> {
        let parent = self.parent_of(key)?;
        let index = self.index_in_parent(key)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children_of(parent).get(i))
    }

    pub fn next_sibling(&self, key: &NodeKey) -> Option<&NodeKey> {
        let parent = self.parent_of(key)?;
        let index = self.index_in_parent(key)?;
        self.children_of(parent).get(index + 1)
    }

    /// Ancestors of `key`, nearest first, excluding `key`.
    pub fn ancestors(&self, key: &NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.parent_of(key);
        while let Some(parent) = current {
            if !seen.insert(parent.clone()) {
                break;
            }
            out.push(parent.clone());
            current = self.parent_of(parent);
        }
        out
    }

    pub fn is_ancestor(&self, ancestor: &NodeKey, key: &NodeKey) -> bool {
        self.ancestors(key).iter().any(|a| a == ancestor)
    }

    /// Nearest enclosing root: the document root or a caption subtree root.
    pub fn scope_root(&self, key: &NodeKey) -> NodeKey {
        if self.node(key).map(Node::kind) == Some(NodeKind::Root) {
            return key.clone();
        }
        self.ancestors(key)
            .into_iter()
            .find(|a| self.node(a).map(Node::kind) == Some(NodeKind::Root))
            .unwrap_or_else(|| self.root.clone())
    }

    /// Nearest ancestor-or-self that is a block: a text block, a list item
    /// or a decorator.
    pub fn block_of(&self, key: &NodeKey) -> Option<NodeKey> {
        std::iter::once(key.clone())
            .chain(self.ancestors(key))
            .find(|k| match self.node_type(k) {
                Some(t) => t.is_text_block() || t == NodeType::ListItem || t.kind() == NodeKind::Decorator,
                None => false,
            })
    }

    /// Child of the scope root that contains `key`
    pub fn top_level_of(&self, key: &NodeKey) -> Option<NodeKey> {
        let scope = self.scope_root(key);
        if &scope == key {
            return None;
        }
        std::iter::once(key.clone())
            .chain(self.ancestors(key))
            .find(|k| self.parent_of(k) == Some(&scope))
    }

    /// Nodes of the subtree rooted at `key`, in document order. Caption
    /// subtrees are isolated and never included.
    pub fn preorder(&self, key: &NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![key.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let children = self.children_of(&current);
            stack.extend(children.iter().rev().cloned());
            out.push(current);
        }
        out
    }

    pub fn first_descendant(&self, key: &NodeKey) -> NodeKey {
        let mut current = key.clone();
        while let Some(first) = self.children_of(&current).first() {
            current = first.clone();
        }
        current
    }

    pub fn last_descendant(&self, key: &NodeKey) -> NodeKey {
        let mut current = key.clone();
        while let Some(last) = self.children_of(&current).last() {
            current = last.clone();
        }
        current
    }

    /// Concatenated text of every text node under `key`
    pub fn text_content(&self, key: &NodeKey) -> String {
        self.preorder(key)
            .iter()
            .filter_map(|k| self.node(k).and_then(Node::text))
            .collect()
    }

    /// Number of list ancestors of `key`
    pub fn list_depth(&self, key: &NodeKey) -> usize {
        self.ancestors(key)
            .iter()
            .filter(|a| self.node_type(a) == Some(NodeType::List))
            .count()
    }

    /// Path of child indices from the scope root down to `key`.
    pub(crate) fn path(&self, key: &NodeKey) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = key.clone();
        while let Some(index) = self.index_in_parent(&current) {
            path.push(index);
            match self.parent_of(&current) {
                Some(parent) => current = parent.clone(),
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Structural integrity check of a committed state.
    ///
    /// A cyclic parent chain cannot be repaired in place; callers must reload
    /// the document from its last persisted snapshot.
    pub fn verify(&self) -> Result<(), EditorError> {
        for key in self.nodes.keys() {
            let mut seen = HashSet::new();
            let mut current = Some(key);
            while let Some(k) = current {
                if !seen.insert(k) {
                    return Err(EditorError::Fatal(format!(
                        "cyclic parent reference through node {key}"
                    )));
                }
                current = self.parent_of(k);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state_has_paragraph_and_cursor() {
        let mut keys = KeyGenerator::default();
        let state = EditorState::empty(&mut keys);

        assert_eq!(state.len(), 2);
        let paragraph = &state.root().children()[0];
        assert_eq!(state.node_type(paragraph), Some(NodeType::Paragraph));
        assert_eq!(state.parent_of(paragraph), Some(state.root_key()));

        match state.selection() {
            Some(Selection::Range(range)) => assert_eq!(&range.anchor.key, paragraph),
            other => panic!("unexpected selection {other:?}"),
        }
        assert!(state.verify().is_ok());
    }

    #[test]
    fn test_verify_detects_cycles() {
        let mut keys = KeyGenerator::default();
        let mut state = EditorState::empty(&mut keys);
        let root = state.root.clone();
        let paragraph = state.root().children()[0].clone();

        Arc::make_mut(state.nodes.get_mut(&root).unwrap()).set_parent(Some(paragraph));

        let err = state.verify().unwrap_err();
        assert!(err.is_fatal());
    }
}

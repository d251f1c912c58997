//! # NodeStore
//!
//! Owns the current [`EditorState`] and the transactional mutation API.
//!
//! ## Transactions
//!
//! ```text
//! begin → create/insert/remove/move/split/merge … → commit
//!                                                    ↓
//!                       validate tree → drop unreachable → new EditorState
//! ```
//!
//! - Every mutation requires an open transaction (`NoActiveTransaction`
//!   otherwise).
//! - Commit re-checks the tree invariants and the per-type schema. A failing
//!   commit discards the whole transaction and the prior state stays current.
//! - Nodes that are no longer reachable from the root after commit are
//!   dropped; there is no manual deallocation.
//! - The selection never references a missing node: removals relocate it to
//!   the nearest surviving sibling or the parent.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::errors::{EditorError, TransactionError};
use crate::keys::KeyGenerator;
use crate::node::{byte_offset, Node, NodeKey, NodePayload, NodeType};
use crate::registry::NodeTypeRegistry;
use crate::selection::{normalize_point, point_near, NodeSelection, Point, RangeSelection, Selection};
use crate::state::EditorState;

/// Result of a successful commit
#[derive(Debug, Clone)]
pub struct Commit {
    /// The state that was current before this commit
    pub previous: Arc<EditorState>,
    /// The state that is current now (same as `previous` for a no-op)
    pub state: Arc<EditorState>,
    /// Whether the document content changed
    pub content_changed: bool,
    /// Whether only the selection changed
    pub selection_changed: bool,
}

impl Commit {
    pub fn is_noop(&self) -> bool {
        !self.content_changed && !self.selection_changed
    }
}

#[derive(Debug)]
struct Draft {
    state: EditorState,
    content_changed: bool,
}

#[derive(Debug)]
pub struct NodeStore {
    current: Arc<EditorState>,
    draft: Option<Draft>,
    keys: KeyGenerator,
    registry: Arc<NodeTypeRegistry>,
}

impl NodeStore {
    /// Store holding a default empty document
    pub fn new(keys: KeyGenerator) -> Self {
        Self::with_registry(keys, Arc::new(NodeTypeRegistry::new()))
    }

    pub fn with_registry(mut keys: KeyGenerator, registry: Arc<NodeTypeRegistry>) -> Self {
        let state = EditorState::empty(&mut keys);
        Self {
            current: Arc::new(state),
            draft: None,
            keys,
            registry,
        }
    }

    /// The state reads should see: the open draft, or the committed state.
    pub fn state(&self) -> &EditorState {
        match &self.draft {
            Some(draft) => &draft.state,
            None => &self.current,
        }
    }

    /// The last committed state
    pub fn current(&self) -> &Arc<EditorState> {
        &self.current
    }

    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    pub fn in_transaction(&self) -> bool {
        self.draft.is_some()
    }

    pub(crate) fn keys_mut(&mut self) -> &mut KeyGenerator {
        &mut self.keys
    }

    pub fn begin(&mut self) -> Result<(), TransactionError> {
        if self.draft.is_some() {
            return Err(TransactionError::AlreadyInTransaction);
        }
        let mut state = EditorState::clone(&self.current);
        state.version = self.current.version + 1;
        self.draft = Some(Draft {
            state,
            content_changed: false,
        });
        Ok(())
    }

    /// Open a transaction whose content starts from `snapshot` instead of the
    /// current state.
    fn begin_from(&mut self, snapshot: &EditorState) -> Result<(), TransactionError> {
        if self.draft.is_some() {
            return Err(TransactionError::AlreadyInTransaction);
        }
        let mut state = snapshot.clone();
        state.version = self.current.version + 1;
        self.draft = Some(Draft {
            state,
            content_changed: true,
        });
        Ok(())
    }

    /// Replace the whole document with `snapshot`, validated like any other
    /// commit and stamped with a fresh version.
    pub fn load(&mut self, snapshot: &EditorState) -> Result<Commit, TransactionError> {
        self.begin_from(snapshot)?;
        self.commit()
    }

    /// Discard the open transaction, if any.
    pub fn rollback(&mut self) {
        if let Some(draft) = self.draft.take() {
            debug!(version = draft.state.version, "transaction rolled back");
        }
    }

    /// Run `f` inside a fresh transaction and commit it. Any error discards
    /// the transaction.
    pub fn update<T, F>(&mut self, f: F) -> Result<Commit, EditorError>
    where
        F: FnOnce(&mut NodeStore) -> Result<T, EditorError>,
    {
        self.begin()?;
        match f(self) {
            Ok(_) => self.commit().map_err(|e| {
                warn!(error = %e, "commit rejected");
                EditorError::from(e)
            }),
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn draft_mut(&mut self) -> Result<&mut Draft, TransactionError> {
        self.draft.as_mut().ok_or(TransactionError::NoActiveTransaction)
    }

    fn draft_node(&self, key: &NodeKey) -> Result<&Node, TransactionError> {
        let draft = self.draft.as_ref().ok_or(TransactionError::NoActiveTransaction)?;
        draft
            .state
            .node(key)
            .ok_or_else(|| TransactionError::NodeNotFound(key.clone()))
    }

    /// Mutable access to a node in the open transaction. Structural links
    /// are only reachable through the dedicated operations.
    pub fn node_mut(&mut self, key: &NodeKey) -> Result<&mut Node, TransactionError> {
        let draft = self.draft_mut()?;
        draft.content_changed = true;
        draft
            .state
            .nodes
            .get_mut(key)
            .map(Arc::make_mut)
            .ok_or_else(|| TransactionError::NodeNotFound(key.clone()))
    }

    /// Create a detached node. It is dropped on commit unless inserted.
    pub fn create_node(&mut self, payload: NodePayload) -> Result<NodeKey, TransactionError> {
        if self.draft.is_none() {
            return Err(TransactionError::NoActiveTransaction);
        }
        let key = self.keys.next_key();
        let node = Node::new(key.clone(), payload);
        let draft = self.draft_mut()?;
        draft.state.nodes.insert(key.clone(), Arc::new(node));
        draft.content_changed = true;
        Ok(key)
    }

    /// Insert `key` as child `index` of `parent` (clamped). An attached node
    /// is moved.
    pub fn insert_child(
        &mut self,
        parent: &NodeKey,
        key: &NodeKey,
        index: usize,
    ) -> Result<(), TransactionError> {
        let parent_node = self.draft_node(parent)?;
        if !parent_node.is_container() {
            return Err(TransactionError::invalid(format!(
                "{} cannot have children",
                parent_node.node_type()
            )));
        }
        let node = self.draft_node(key)?;
        if self.state().root_key() == key {
            return Err(TransactionError::invalid("the root cannot be inserted"));
        }
        if parent == key || self.state().is_ancestor(key, parent) {
            return Err(TransactionError::invalid(format!(
                "inserting {key} under {parent} would create a cycle"
            )));
        }

        if node.parent().is_some() {
            self.detach(key)?;
        }
        let draft = self.draft_mut()?;
        let parent_node = Arc::make_mut(
            draft
                .state
                .nodes
                .get_mut(parent)
                .ok_or_else(|| TransactionError::NodeNotFound(parent.clone()))?,
        );
        let index = index.min(parent_node.children().len());
        parent_node.children_mut().insert(index, key.clone());
        if let Some(child) = draft.state.nodes.get_mut(key) {
            Arc::make_mut(child).set_parent(Some(parent.clone()));
        }
        draft.content_changed = true;
        Ok(())
    }

    pub fn append_child(&mut self, parent: &NodeKey, key: &NodeKey) -> Result<(), TransactionError> {
        let len = self.draft_node(parent)?.children().len();
        self.insert_child(parent, key, len)
    }

    /// Insert `key` right after `sibling`.
    pub fn insert_after(&mut self, sibling: &NodeKey, key: &NodeKey) -> Result<(), TransactionError> {
        let (parent, index) = self.position_of(sibling)?;
        self.insert_child(&parent, key, index + 1)
    }

    /// Insert `key` right before `sibling`.
    pub fn insert_before(&mut self, sibling: &NodeKey, key: &NodeKey) -> Result<(), TransactionError> {
        let (parent, index) = self.position_of(sibling)?;
        self.insert_child(&parent, key, index)
    }

    fn position_of(&self, key: &NodeKey) -> Result<(NodeKey, usize), TransactionError> {
        let node = self.draft_node(key)?;
        let parent = node
            .parent()
            .cloned()
            .ok_or_else(|| TransactionError::invalid(format!("{key} is detached")))?;
        let index = self
            .state()
            .index_in_parent(key)
            .ok_or_else(|| TransactionError::invalid(format!("{key} is not a child of {parent}")))?;
        Ok((parent, index))
    }

    /// Unlink `key` from its parent. Returns the former parent and index.
    fn detach(&mut self, key: &NodeKey) -> Result<Option<(NodeKey, usize)>, TransactionError> {
        let parent = match self.draft_node(key)?.parent().cloned() {
            Some(parent) => parent,
            None => return Ok(None),
        };
        let draft = self.draft_mut()?;
        let mut position = None;
        if let Some(parent_arc) = draft.state.nodes.get_mut(&parent) {
            let parent_node = Arc::make_mut(parent_arc);
            if let Some(index) = parent_node.children().iter().position(|c| c == key) {
                parent_node.children_mut().remove(index);
                position = Some((parent.clone(), index));
            } else if let NodePayload::Image { caption, .. } = &mut parent_node.payload {
                if caption.as_ref() == Some(key) {
                    *caption = None;
                }
            }
        }
        if let Some(node) = draft.state.nodes.get_mut(key) {
            Arc::make_mut(node).set_parent(None);
        }
        draft.content_changed = true;
        Ok(position)
    }

    /// Remove `key` (and implicitly its subtree) from the tree.
    pub fn remove_node(&mut self, key: &NodeKey) -> Result<(), TransactionError> {
        if self.state().root_key() == key {
            return Err(TransactionError::invalid("the root cannot be removed"));
        }
        let subtree: HashSet<NodeKey> = self.state().preorder(key).into_iter().collect();
        let caption_keys: Vec<NodeKey> = subtree
            .iter()
            .filter_map(|k| self.state().node(k).and_then(Node::caption).cloned())
            .collect();
        let mut doomed = subtree;
        for caption in caption_keys {
            doomed.extend(self.state().preorder(&caption));
        }

        let position = self.detach(key)?;
        let selection_hit = self
            .state()
            .selection()
            .map(|s| s.keys().into_iter().any(|k| doomed.contains(k)))
            .unwrap_or(false);
        if !selection_hit {
            return Ok(());
        }

        let relocated = match (&self.state().selection, position) {
            (Some(Selection::Node(node)), _)
                if node.keys.iter().any(|k| !doomed.contains(k)) =>
            {
                let keys = node.keys.iter().filter(|k| !doomed.contains(*k)).cloned().collect();
                Some(Selection::Node(NodeSelection { keys }))
            }
            (_, Some((parent, index))) => {
                let point = normalize_point(self.state(), point_near(self.state(), &parent, index));
                let mut range = RangeSelection::collapsed(point);
                if let Some(node) = self.state().node(&range.anchor.key) {
                    range.format = node.format;
                }
                Some(Selection::Range(range))
            }
            (_, None) => None,
        };
        debug!(removed = %key, "selection relocated after removal");
        self.draft_mut()?.state.selection = relocated;
        Ok(())
    }

    /// Move `key` under `new_parent` at `index` (counted after removal).
    pub fn move_node(
        &mut self,
        key: &NodeKey,
        new_parent: &NodeKey,
        index: usize,
    ) -> Result<(), TransactionError> {
        self.draft_node(key)?;
        self.draft_node(new_parent)?;
        if key == new_parent || self.state().is_ancestor(key, new_parent) {
            return Err(TransactionError::invalid(format!(
                "moving {key} under its own descendant {new_parent}"
            )));
        }
        self.detach(key)?;
        self.insert_child(new_parent, key, index)
    }

    /// Split a text node at a char `offset`. Returns the new right-hand node,
    /// or `None` when the offset is at either edge.
    pub fn split_text_node(
        &mut self,
        key: &NodeKey,
        offset: usize,
    ) -> Result<Option<NodeKey>, TransactionError> {
        let node = self.draft_node(key)?;
        let text = node
            .text()
            .ok_or_else(|| TransactionError::invalid(format!("{key} is not a text node")))?
            .to_string();
        let len = text.chars().count();
        if offset == 0 || offset >= len {
            return Ok(None);
        }
        let (format, style) = (node.format, node.style.clone());
        let split_at = byte_offset(&text, offset);
        let (left, right) = text.split_at(split_at);

        let right_key = self.create_node(NodePayload::text(right))?;
        {
            let right_node = self.node_mut(&right_key)?;
            right_node.format = format;
            right_node.style = style;
        }
        self.node_mut(key)?.payload = NodePayload::text(left);
        if self.draft_node(key)?.parent().is_some() {
            self.insert_after(key, &right_key)?;
        }

        let draft = self.draft_mut()?;
        if let Some(Selection::Range(range)) = &mut draft.state.selection {
            for point in [&mut range.anchor, &mut range.focus] {
                if &point.key == key && point.offset > offset {
                    *point = Point::new(right_key.clone(), point.offset - offset);
                }
            }
        }
        Ok(Some(right_key))
    }

    /// Merge text node `b` into its immediately preceding sibling `a`.
    pub fn merge_adjacent_text(&mut self, a: &NodeKey, b: &NodeKey) -> Result<(), TransactionError> {
        let left = self.draft_node(a)?;
        let right = self.draft_node(b)?;
        let (left_text, right_text) = match (left.text(), right.text()) {
            (Some(l), Some(r)) => (l.to_string(), r.to_string()),
            _ => return Err(TransactionError::invalid("only text nodes can be merged")),
        };
        if self.state().next_sibling(a) != Some(b) {
            return Err(TransactionError::invalid(format!("{b} does not follow {a}")));
        }
        let shift = left_text.chars().count();

        self.node_mut(a)?.payload = NodePayload::text(left_text + &right_text);
        let draft = self.draft_mut()?;
        if let Some(Selection::Range(range)) = &mut draft.state.selection {
            for point in [&mut range.anchor, &mut range.focus] {
                if &point.key == b {
                    *point = Point::new(a.clone(), point.offset + shift);
                }
            }
        }
        self.detach(b)?;
        Ok(())
    }

    /// Replace the content of a text node.
    pub fn set_text(&mut self, key: &NodeKey, text: impl Into<String>) -> Result<(), TransactionError> {
        let node = self.node_mut(key)?;
        match &mut node.payload {
            NodePayload::Text { text: current } => {
                *current = text.into();
                Ok(())
            }
            _ => Err(TransactionError::invalid(format!("{key} is not a text node"))),
        }
    }

    /// Attach `caption` as the caption subtree of image `image`.
    pub(crate) fn attach_caption(&mut self, image: &NodeKey, caption: &NodeKey) -> Result<(), TransactionError> {
        self.draft_node(caption)?;
        match &mut self.node_mut(image)?.payload {
            NodePayload::Image { caption: slot, .. } => *slot = Some(caption.clone()),
            _ => return Err(TransactionError::invalid(format!("{image} cannot hold a caption"))),
        }
        let draft = self.draft_mut()?;
        if let Some(node) = draft.state.nodes.get_mut(caption) {
            Arc::make_mut(node).set_parent(Some(image.clone()));
        }
        Ok(())
    }

    pub fn set_selection(&mut self, selection: Option<Selection>) -> Result<(), TransactionError> {
        self.draft_mut()?.state.selection = selection;
        Ok(())
    }

    /// Validate the draft and make it the current state.
    #[instrument(skip(self), level = "debug")]
    pub fn commit(&mut self) -> Result<Commit, TransactionError> {
        let mut draft = self.draft.take().ok_or(TransactionError::NoActiveTransaction)?;
        let previous = Arc::clone(&self.current);

        let reachable = check_tree(&draft.state)?;
        for key in &reachable {
            if let Some(node) = draft.state.node(key) {
                self.registry
                    .validate(&draft.state, node)
                    .map_err(TransactionError::InvalidMutation)?;
            }
        }
        let before = draft.state.nodes.len();
        draft.state.nodes.retain(|key, _| reachable.contains(key));
        let dropped = before - draft.state.nodes.len();

        repair_selection(&mut draft.state);

        let selection_changed = draft.state.selection != previous.selection;
        if !draft.content_changed && !selection_changed {
            return Ok(Commit {
                state: Arc::clone(&previous),
                previous,
                content_changed: false,
                selection_changed: false,
            });
        }

        let state = Arc::new(draft.state);
        debug!(
            version = state.version,
            nodes = state.nodes.len(),
            dropped,
            content_changed = draft.content_changed,
            "transaction committed"
        );
        self.current = Arc::clone(&state);
        Ok(Commit {
            previous,
            state,
            content_changed: draft.content_changed,
            selection_changed,
        })
    }
}

/// Check the single-rooted-tree invariant and return the reachable keys.
fn check_tree(state: &EditorState) -> Result<HashSet<NodeKey>, TransactionError> {
    let root = state
        .node(&state.root)
        .ok_or_else(|| TransactionError::NodeNotFound(state.root.clone()))?;
    if root.node_type() != NodeType::Root || root.parent().is_some() {
        return Err(TransactionError::invalid("the root must be a parentless root node"));
    }

    for key in state.nodes.keys() {
        let mut seen = HashSet::new();
        let mut current = Some(key);
        while let Some(k) = current {
            if !seen.insert(k) {
                return Err(TransactionError::invalid(format!("cycle through {key}")));
            }
            current = state.parent_of(k);
        }
    }

    let mut reachable = HashSet::new();
    let mut stack = vec![state.root.clone()];
    while let Some(key) = stack.pop() {
        if !reachable.insert(key.clone()) {
            return Err(TransactionError::invalid(format!("{key} has more than one parent")));
        }
        let node = state
            .node(&key)
            .ok_or_else(|| TransactionError::NodeNotFound(key.clone()))?;
        let linked = node.children().iter().chain(node.caption());
        for child in linked {
            let child_node = state
                .node(child)
                .ok_or_else(|| TransactionError::NodeNotFound(child.clone()))?;
            if child_node.parent() != Some(&key) {
                return Err(TransactionError::invalid(format!(
                    "{child} is linked from {key} but points elsewhere"
                )));
            }
            stack.push(child.clone());
        }
    }
    Ok(reachable)
}

/// Clamp selection offsets and drop references to unreachable nodes.
fn repair_selection(state: &mut EditorState) {
    let selection = match state.selection.take() {
        Some(selection) => selection,
        None => return,
    };
    let repaired = match selection {
        Selection::Range(mut range) => {
            let valid = state.contains(&range.anchor.key) && state.contains(&range.focus.key);
            if valid {
                for point in [&mut range.anchor, &mut range.focus] {
                    let size = state.node(&point.key).map(Node::size).unwrap_or(0);
                    point.offset = point.offset.min(size);
                }
                Some(Selection::Range(range))
            } else {
                let first = state.first_descendant(&state.root.clone());
                let point = normalize_point(state, Point::new(first, 0));
                Some(Selection::Range(RangeSelection::collapsed(point)))
            }
        }
        Selection::Node(mut node) => {
            node.keys.retain(|k| state.contains(k));
            if node.keys.is_empty() {
                None
            } else {
                Some(Selection::Node(node))
            }
        }
    };
    state.selection = repaired;
}

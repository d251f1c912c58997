//! # Selection Model
//!
//! Selections are expressed in tree coordinates: a [`Point`] is a node key
//! plus an offset. For text nodes the offset counts chars; for elements it is
//! a child index (the point sits before that child).
//!
//! Platform selections arrive as [`NativeSelection`] and are reconciled into
//! one of three kinds: a range, a node selection (whole decorators), or none
//! (`Option::None` on the state).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeKey, NodeKind, Style, TextFormat};
use crate::state::EditorState;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
}

impl Point {
    pub fn new(key: NodeKey, offset: usize) -> Self {
        Self { key, offset }
    }

    /// Position vector for document-order comparison within one scope.
    fn position(&self, state: &EditorState) -> Vec<usize> {
        let mut position = state.path(&self.key);
        position.push(self.offset);
        position
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeSelection {
    pub anchor: Point,
    pub focus: Point,
    /// Format applied to the next typed character
    pub format: TextFormat,
    /// Style applied to the next typed character
    pub style: Style,
}

impl RangeSelection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self {
            anchor,
            focus,
            format: TextFormat::empty(),
            style: Style::new(),
        }
    }

    pub fn collapsed(point: Point) -> Self {
        Self::new(point.clone(), point)
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// `(start, end)` in document order
    pub fn ordered(&self, state: &EditorState) -> (Point, Point) {
        match compare_points(state, &self.anchor, &self.focus) {
            Ordering::Greater => (self.focus.clone(), self.anchor.clone()),
            _ => (self.anchor.clone(), self.focus.clone()),
        }
    }

    pub fn is_backward(&self, state: &EditorState) -> bool {
        compare_points(state, &self.anchor, &self.focus) == Ordering::Greater
    }
}

/// One or more whole nodes, used for decorators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSelection {
    pub keys: Vec<NodeKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Range(RangeSelection),
    Node(NodeSelection),
}

/// Selection kind as seen by callers, including the absent selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Range,
    Node,
    None,
}

impl Selection {
    pub fn caret(key: NodeKey, offset: usize) -> Self {
        Selection::Range(RangeSelection::collapsed(Point::new(key, offset)))
    }

    pub fn range(anchor: Point, focus: Point) -> Self {
        Selection::Range(RangeSelection::new(anchor, focus))
    }

    pub fn node(key: NodeKey) -> Self {
        Selection::Node(NodeSelection { keys: vec![key] })
    }

    pub fn kind_of(selection: Option<&Selection>) -> SelectionKind {
        match selection {
            Some(Selection::Range(_)) => SelectionKind::Range,
            Some(Selection::Node(_)) => SelectionKind::Node,
            None => SelectionKind::None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeSelection> {
        match self {
            Selection::Range(range) => Some(range),
            Selection::Node(_) => None,
        }
    }

    /// Every node key the selection refers to
    pub fn keys(&self) -> Vec<&NodeKey> {
        match self {
            Selection::Range(range) => vec![&range.anchor.key, &range.focus.key],
            Selection::Node(node) => node.keys.iter().collect(),
        }
    }

    pub fn references(&self, key: &NodeKey) -> bool {
        self.keys().into_iter().any(|k| k == key)
    }

    /// All nodes intersected by the selection, in document order.
    pub fn get_nodes(&self, state: &EditorState) -> Vec<NodeKey> {
        match self {
            Selection::Range(range) => range_nodes(state, range),
            Selection::Node(node) => {
                let mut keys: Vec<NodeKey> = node
                    .keys
                    .iter()
                    .filter(|k| state.contains(k))
                    .cloned()
                    .collect();
                keys.sort_by(|a, b| state.path(a).cmp(&state.path(b)));
                keys
            }
        }
    }

    /// Whether the entire selection carries `flag`.
    ///
    /// A collapsed range answers from its pending typing format.
    pub fn has_format(&self, state: &EditorState, flag: TextFormat) -> bool {
        let range = match self {
            Selection::Range(range) => range,
            Selection::Node(_) => return false,
        };
        if range.is_collapsed() {
            return range.format.contains(flag);
        }
        let texts: Vec<&Node> = range_nodes(state, range)
            .iter()
            .filter_map(|k| state.node(k))
            .filter(|n| n.is_text())
            .collect();
        !texts.is_empty() && texts.iter().all(|n| n.format.contains(flag))
    }

    /// Blocks touched by the selection (text blocks, list items, decorators),
    /// deduplicated, in document order.
    pub fn blocks(&self, state: &EditorState) -> Vec<NodeKey> {
        let mut blocks: Vec<NodeKey> = Vec::new();
        for key in self.get_nodes(state) {
            let block = match state.block_of(&key) {
                Some(block) => block,
                None => continue,
            };
            if !blocks.contains(&block) {
                blocks.push(block);
            }
        }
        blocks
    }
}

/// Compare two points in document order. Points in different scopes compare
/// by their scope roots' positions.
pub fn compare_points(state: &EditorState, a: &Point, b: &Point) -> Ordering {
    a.position(state).cmp(&b.position(state))
}

/// Leaf node a start point resolves to
fn resolve_start(state: &EditorState, point: &Point) -> NodeKey {
    let children = state.children_of(&point.key);
    if children.is_empty() {
        return point.key.clone();
    }
    match children.get(point.offset) {
        Some(child) => state.first_descendant(child),
        None => state.last_descendant(&point.key),
    }
}

/// Leaf node an end point resolves to
fn resolve_end(state: &EditorState, point: &Point) -> NodeKey {
    let children = state.children_of(&point.key);
    if children.is_empty() || point.offset == 0 {
        return point.key.clone();
    }
    let index = point.offset.min(children.len()) - 1;
    state.last_descendant(&children[index])
}

fn is_text_at(state: &EditorState, point: &Point) -> bool {
    state.node(&point.key).map(Node::is_text).unwrap_or(false)
}

fn range_nodes(state: &EditorState, range: &RangeSelection) -> Vec<NodeKey> {
    if !state.contains(&range.anchor.key) || !state.contains(&range.focus.key) {
        return Vec::new();
    }
    let (start, end) = range.ordered(state);
    let start_key = resolve_start(state, &start);
    if range.is_collapsed() {
        return vec![start_key];
    }
    let end_key = resolve_end(state, &end);

    let scope = state.scope_root(&start_key);
    let order = state.preorder(&scope);
    let (from, to) = match (
        order.iter().position(|k| k == &start_key),
        order.iter().position(|k| k == &end_key),
    ) {
        (Some(from), Some(to)) if from <= to => (from, to),
        _ => return vec![start_key],
    };

    let mut nodes: Vec<NodeKey> = order[from..=to].to_vec();
    if nodes.len() > 1 && is_text_at(state, &start) && start.key == nodes[0] {
        let len = state.node(&start.key).map(Node::size).unwrap_or(0);
        if start.offset >= len {
            nodes.remove(0);
        }
    }
    if nodes.len() > 1 && is_text_at(state, &end) && end.offset == 0 && end.key == nodes[nodes.len() - 1] {
        nodes.pop();
    }
    nodes
}

/// Native platform selection, already mapped onto node keys by the view layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeSelection {
    pub anchor: Point,
    pub focus: Point,
}

/// Reconcile a native selection into tree coordinates.
///
/// - Offsets are clamped to the node size.
/// - An endpoint on a decorator, or a range crossing into or out of a caption
///   subtree, collapses to a node selection on that decorator.
/// - Element points inside text blocks are moved onto adjacent text nodes.
/// - A caret that did not move keeps its pending typing format.
pub fn reconcile(
    state: &EditorState,
    native: &NativeSelection,
    previous: Option<&Selection>,
) -> Option<Selection> {
    let anchor = clamp_point(state, &native.anchor)?;
    let focus = clamp_point(state, &native.focus)?;

    for point in [&anchor, &focus] {
        if state.node(&point.key).map(Node::is_decorator).unwrap_or(false) {
            return Some(Selection::node(point.key.clone()));
        }
    }

    let anchor_scope = state.scope_root(&anchor.key);
    let focus_scope = state.scope_root(&focus.key);
    if anchor_scope != focus_scope {
        let decorator = [&anchor_scope, &focus_scope]
            .into_iter()
            .find(|scope| *scope != state.root_key())
            .and_then(|scope| state.parent_of(scope).cloned());
        return decorator.map(Selection::node);
    }

    let anchor = normalize_point(state, anchor);
    let focus = normalize_point(state, focus);
    let mut range = RangeSelection::new(anchor, focus);

    match previous {
        Some(Selection::Range(prev)) if prev.is_collapsed() && range.is_collapsed() && prev.anchor == range.anchor => {
            range.format = prev.format;
            range.style = prev.style.clone();
        }
        _ => {
            if let Some(node) = state.node(&range.anchor.key) {
                range.format = node.format;
                if node.is_text() {
                    range.style = node.style.clone();
                }
            }
        }
    }
    Some(Selection::Range(range))
}

fn clamp_point(state: &EditorState, point: &Point) -> Option<Point> {
    let node = state.node(&point.key)?;
    Some(Point::new(point.key.clone(), point.offset.min(node.size())))
}

/// Move an element point inside a text block onto a neighbouring text node.
pub(crate) fn normalize_point(state: &EditorState, point: Point) -> Point {
    let node = match state.node(&point.key) {
        Some(node) if node.kind() == NodeKind::Element => node,
        _ => return point,
    };
    let children = node.children();
    if let Some(child) = children.get(point.offset) {
        if state.node(child).map(Node::is_text).unwrap_or(false) {
            return Point::new(child.clone(), 0);
        }
    }
    if point.offset > 0 {
        if let Some(child) = children.get(point.offset - 1) {
            if let Some(text) = state.node(child).filter(|n| n.is_text()) {
                return Point::new(child.clone(), text.size());
            }
        }
    }
    point
}

/// Nearest surviving position after the child at `index` of `parent` was
/// removed: the previous sibling, else the next sibling, else the parent.
pub(crate) fn point_near(state: &EditorState, parent: &NodeKey, index: usize) -> Point {
    let children = state.children_of(parent);
    if index > 0 {
        if let Some(prev) = children.get(index - 1) {
            return edge_point(state, parent, index - 1, prev, true);
        }
    }
    if let Some(next) = children.get(index) {
        return edge_point(state, parent, index, next, false);
    }
    Point::new(parent.clone(), index.min(children.len()))
}

fn edge_point(state: &EditorState, parent: &NodeKey, index: usize, sibling: &NodeKey, at_end: bool) -> Point {
    match state.node(sibling) {
        Some(node) if node.is_text() || node.is_container() => {
            let offset = if at_end { node.size() } else { 0 };
            Point::new(sibling.clone(), offset)
        }
        _ => Point::new(parent.clone(), if at_end { index + 1 } else { index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyGenerator;
    use crate::node::NodePayload;
    use crate::store::NodeStore;

    /// root > [p1 > ["Hello", "World"(bold)], image, p2 > ["Again"]]
    fn fixture() -> (NodeStore, Vec<NodeKey>) {
        let mut store = NodeStore::new(KeyGenerator::default());
        let root = store.state().root_key().clone();
        let first = store.state().children_of(&root)[0].clone();
        let mut keys = Vec::new();
        store
            .update(|tx| {
                let hello = tx.create_node(NodePayload::text("Hello"))?;
                tx.insert_child(&first, &hello, 0)?;
                let world = tx.create_node(NodePayload::text("World"))?;
                tx.node_mut(&world)?.format = TextFormat::BOLD;
                tx.insert_child(&first, &world, 1)?;
                let image = tx.create_node(NodePayload::Image {
                    src: "data:image/png;base64,AA==".into(),
                    alt_text: String::new(),
                    width: Some(10),
                    height: Some(10),
                    max_width: 500,
                    show_caption: false,
                    caption: None,
                })?;
                tx.insert_child(&root, &image, 1)?;
                let second = tx.create_node(NodePayload::Paragraph)?;
                tx.insert_child(&root, &second, 2)?;
                let again = tx.create_node(NodePayload::text("Again"))?;
                tx.insert_child(&second, &again, 0)?;
                keys = vec![first.clone(), hello, world, image, second, again];
                Ok(())
            })
            .unwrap();
        (store, keys)
    }

    #[test]
    fn test_get_nodes_in_document_order() {
        let (store, keys) = fixture();
        let state = store.state();
        let selection = Selection::range(Point::new(keys[5].clone(), 2), Point::new(keys[1].clone(), 1));

        let nodes = selection.get_nodes(state);
        assert_eq!(nodes, vec![keys[1].clone(), keys[2].clone(), keys[3].clone(), keys[4].clone(), keys[5].clone()]);
    }

    #[test]
    fn test_get_nodes_trims_untouched_edges() {
        let (store, keys) = fixture();
        let state = store.state();
        let selection = Selection::range(Point::new(keys[1].clone(), 5), Point::new(keys[2].clone(), 3));

        assert_eq!(selection.get_nodes(state), vec![keys[2].clone()]);
    }

    #[test]
    fn test_has_format_requires_entire_range() {
        let (store, keys) = fixture();
        let state = store.state();
        let bold_only = Selection::range(Point::new(keys[2].clone(), 0), Point::new(keys[2].clone(), 5));
        let mixed = Selection::range(Point::new(keys[1].clone(), 0), Point::new(keys[2].clone(), 5));

        assert!(bold_only.has_format(state, TextFormat::BOLD));
        assert!(!mixed.has_format(state, TextFormat::BOLD));
    }

    #[test]
    fn test_reconcile_collapses_onto_decorator() {
        let (store, keys) = fixture();
        let native = NativeSelection {
            anchor: Point::new(keys[1].clone(), 0),
            focus: Point::new(keys[3].clone(), 0),
        };

        let selection = reconcile(store.state(), &native, None).unwrap();
        assert_eq!(selection, Selection::node(keys[3].clone()));
    }

    #[test]
    fn test_reconcile_clamps_and_normalizes() {
        let (store, keys) = fixture();
        let native = NativeSelection {
            anchor: Point::new(keys[0].clone(), 1),
            focus: Point::new(keys[5].clone(), 99),
        };

        let selection = reconcile(store.state(), &native, None).unwrap();
        let range = selection.as_range().unwrap();
        assert_eq!(range.anchor, Point::new(keys[2].clone(), 0));
        assert_eq!(range.focus, Point::new(keys[5].clone(), 5));
    }

    #[test]
    fn test_reconcile_missing_node_yields_none() {
        let (store, keys) = fixture();
        let native = NativeSelection {
            anchor: Point::new(NodeKey::new("missing"), 0),
            focus: Point::new(keys[1].clone(), 0),
        };
        assert!(reconcile(store.state(), &native, None).is_none());
    }
}

//! # Editing Transforms
//!
//! Tree edits shared by the built-in plugins. Every function here runs inside
//! an open transaction and leaves the selection on a live node.
//!
//! ## Blocks
//!
//! A *text holder* is a block whose children are text nodes: paragraphs,
//! headings, quotes, code blocks, and list items. A list item whose only
//! child is a nested list is a *wrapper* and holds no text.
//!
//! ```text
//!   list
//!    ├─ listitem ── "one"
//!    └─ listitem (wrapper)
//!        └─ list
//!            └─ listitem ── "one.a"
//! ```

use tracing::debug;

use crate::errors::{EditorResult, TransactionError};
use crate::node::{byte_offset, Alignment, NodeKey, NodePayload, NodeType, Style, TextFormat};
use crate::plugins::list;
use crate::selection::{normalize_point, Point, RangeSelection, Selection};
use crate::state::EditorState;
use crate::store::NodeStore;

// Queries

pub(crate) fn current_range(tx: &NodeStore) -> Option<RangeSelection> {
    match tx.state().selection() {
        Some(Selection::Range(range)) => Some(range.clone()),
        _ => None,
    }
}

/// Live decorators under a node selection
pub(crate) fn selected_decorators(tx: &NodeStore) -> Vec<NodeKey> {
    let state = tx.state();
    match state.selection() {
        Some(Selection::Node(selection)) => selection
            .keys
            .iter()
            .filter(|k| is_attached(state, k))
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

pub(crate) fn is_wrapper(state: &EditorState, key: &NodeKey) -> bool {
    state.node_type(key) == Some(NodeType::ListItem)
        && matches!(state.children_of(key), [only] if state.node_type(only) == Some(NodeType::List))
}

pub(crate) fn holds_text(state: &EditorState, key: &NodeKey) -> bool {
    match state.node_type(key) {
        Some(NodeType::ListItem) => !is_wrapper(state, key),
        Some(t) => t.is_text_block(),
        None => false,
    }
}

pub(crate) fn is_text(state: &EditorState, key: &NodeKey) -> bool {
    state.node_type(key) == Some(NodeType::Text)
}

pub(crate) fn is_decorator(state: &EditorState, key: &NodeKey) -> bool {
    state.node(key).map(|n| n.is_decorator()).unwrap_or(false)
}

pub(crate) fn in_caption(state: &EditorState, key: &NodeKey) -> bool {
    &state.scope_root(key) != state.root_key()
}

/// Whether `key` is linked into the tree (drafts keep detached nodes until
/// commit).
pub(crate) fn is_attached(state: &EditorState, key: &NodeKey) -> bool {
    state.contains(key) && (key == state.root_key() || state.ancestors(key).last() == Some(state.root_key()))
}

/// Text holders touched by the selection, in document order.
pub(crate) fn selected_text_blocks(state: &EditorState) -> Vec<NodeKey> {
    state
        .selection()
        .map(|s| s.blocks(state))
        .unwrap_or_default()
        .into_iter()
        .filter(|b| holds_text(state, b))
        .collect()
}

/// Text holders and decorators of `scope`, in document order.
fn leaf_blocks(state: &EditorState, scope: &NodeKey) -> Vec<NodeKey> {
    state
        .preorder(scope)
        .into_iter()
        .filter(|k| holds_text(state, k) || is_decorator(state, k))
        .collect()
}

fn text_len(state: &EditorState, key: &NodeKey) -> usize {
    state.node(key).map(|n| n.size()).unwrap_or(0)
}

fn is_empty_block(state: &EditorState, key: &NodeKey) -> bool {
    state.text_content(key).is_empty()
}

// Selection

/// Typing format and style a caret at `point` picks up
fn format_at(state: &EditorState, point: &Point) -> (TextFormat, Style) {
    match state.node(&point.key) {
        Some(node) if node.is_text() => (node.format, node.style.clone()),
        Some(node) => (node.format, Style::new()),
        None => (TextFormat::empty(), Style::new()),
    }
}

/// Collapse the selection at `point`, taking the format found there.
pub(crate) fn set_caret(tx: &mut NodeStore, point: Point) -> Result<(), TransactionError> {
    let point = normalize_point(tx.state(), point);
    let (format, style) = format_at(tx.state(), &point);
    set_caret_with(tx, point, format, style)
}

/// Collapse the selection at `point`, keeping a pending typing format.
pub(crate) fn set_caret_with(
    tx: &mut NodeStore,
    point: Point,
    format: TextFormat,
    style: Style,
) -> Result<(), TransactionError> {
    let point = normalize_point(tx.state(), point);
    let mut range = RangeSelection::collapsed(point);
    range.format = format;
    range.style = style;
    tx.set_selection(Some(Selection::Range(range)))
}

/// Move element points on `from` over to `to`.
pub(crate) fn remap_selection(tx: &mut NodeStore, from: &NodeKey, to: &NodeKey, shift: usize) -> Result<(), TransactionError> {
    let mut range = match current_range(tx) {
        Some(range) => range,
        None => return Ok(()),
    };
    let mut moved = false;
    for point in [&mut range.anchor, &mut range.focus] {
        if &point.key == from {
            *point = Point::new(to.clone(), point.offset + shift);
            moved = true;
        }
    }
    if moved {
        tx.set_selection(Some(Selection::Range(range)))?;
    }
    Ok(())
}

// Structure

/// Remove `key`, then any list or wrapper item left empty by the removal.
pub(crate) fn remove_pruning(tx: &mut NodeStore, key: &NodeKey) -> Result<(), TransactionError> {
    let mut target = key.clone();
    loop {
        let removed_type = tx.state().node_type(&target);
        let parent = tx.state().parent_of(&target).cloned();
        tx.remove_node(&target)?;

        let parent = match parent {
            Some(parent) if tx.state().children_of(&parent).is_empty() => parent,
            _ => return Ok(()),
        };
        let prune = match tx.state().node_type(&parent) {
            Some(NodeType::List) => true,
            Some(NodeType::ListItem) => removed_type == Some(NodeType::List),
            _ => false,
        };
        if !prune {
            return Ok(());
        }
        target = parent;
    }
}

/// Drop empty text nodes of `block` and merge neighbours that look alike.
pub(crate) fn normalize_texts(tx: &mut NodeStore, block: &NodeKey) -> Result<(), TransactionError> {
    if !holds_text(tx.state(), block) {
        return Ok(());
    }
    let empties: Vec<NodeKey> = tx
        .state()
        .children_of(block)
        .iter()
        .filter(|k| tx.state().node(k).and_then(|n| n.text()) == Some(""))
        .cloned()
        .collect();
    for key in empties {
        tx.remove_node(&key)?;
    }

    loop {
        let state = tx.state();
        let pair = state.children_of(block).windows(2).find_map(|pair| {
            let (a, b) = (state.node(&pair[0])?, state.node(&pair[1])?);
            (a.is_text() && b.is_text() && a.format == b.format && a.style == b.style)
                .then(|| (pair[0].clone(), pair[1].clone()))
        });
        match pair {
            Some((a, b)) => tx.merge_adjacent_text(&a, &b)?,
            None => return Ok(()),
        }
    }
}

/// Append the texts of `from` to `into` and drop `from`.
pub(crate) fn merge_blocks(tx: &mut NodeStore, into: &NodeKey, from: &NodeKey) -> Result<(), TransactionError> {
    let shift = tx.state().children_of(into).len();
    let children: Vec<NodeKey> = tx
        .state()
        .children_of(from)
        .iter()
        .filter(|k| is_text(tx.state(), k))
        .cloned()
        .collect();
    for child in &children {
        tx.append_child(into, child)?;
    }
    remap_selection(tx, from, into, shift)?;
    remove_pruning(tx, from)?;
    normalize_texts(tx, into)
}

/// Child index of `block` at which `point` sits, splitting a text node when
/// the point falls inside one.
pub(crate) fn split_index(tx: &mut NodeStore, block: &NodeKey, point: &Point) -> Result<usize, TransactionError> {
    let len = tx.state().children_of(block).len();
    if &point.key == block {
        return Ok(point.offset.min(len));
    }
    if tx.state().parent_of(&point.key) != Some(block) || !is_text(tx.state(), &point.key) {
        return Ok(len);
    }
    let index = tx.state().index_in_parent(&point.key).unwrap_or(len);
    if point.offset == 0 {
        return Ok(index);
    }
    if point.offset < text_len(tx.state(), &point.key) {
        tx.split_text_node(&point.key, point.offset)?;
    }
    Ok(index + 1)
}

/// Give `to` the alignment, indent, typing format and style of `from`.
pub(crate) fn copy_block_attrs(tx: &mut NodeStore, from: &NodeKey, to: &NodeKey) -> Result<(), TransactionError> {
    let (align, indent, format, style) = {
        let node = tx
            .state()
            .node(from)
            .ok_or_else(|| TransactionError::NodeNotFound(from.clone()))?;
        (node.align, node.indent, node.format, node.style.clone())
    };
    let node = tx.node_mut(to)?;
    node.align = align;
    node.indent = indent;
    node.format = format;
    node.style = style;
    Ok(())
}

/// Move the children of `block` from `index` on into a new block of
/// `payload` inserted right after it.
pub(crate) fn split_block_tail(
    tx: &mut NodeStore,
    block: &NodeKey,
    index: usize,
    payload: NodePayload,
) -> Result<NodeKey, TransactionError> {
    let created = tx.create_node(payload)?;
    copy_block_attrs(tx, block, &created)?;
    tx.insert_after(block, &created)?;
    let tail: Vec<NodeKey> = tx.state().children_of(block).iter().skip(index).cloned().collect();
    for child in &tail {
        tx.append_child(&created, child)?;
    }
    Ok(created)
}

/// Add an empty paragraph when `scope` has no blocks left.
pub(crate) fn ensure_block(tx: &mut NodeStore, scope: &NodeKey) -> Result<(), TransactionError> {
    if !tx.state().children_of(scope).is_empty() {
        return Ok(());
    }
    let paragraph = tx.create_node(NodePayload::Paragraph)?;
    tx.append_child(scope, &paragraph)?;
    set_caret(tx, Point::new(paragraph, 0))
}

/// Child of a root or collapsible that contains `key`. Caption content
/// resolves to its image.
pub(crate) fn block_host(state: &EditorState, key: &NodeKey) -> NodeKey {
    let mut current = key.clone();
    loop {
        let parent = match state.parent_of(&current) {
            Some(parent) => parent.clone(),
            None => return current,
        };
        match state.node_type(&parent) {
            Some(NodeType::Root) | Some(NodeType::Collapsible) => return current,
            Some(NodeType::Caption) => match state.parent_of(&parent) {
                Some(image) => current = image.clone(),
                None => return current,
            },
            _ => current = parent,
        }
    }
}

/// Paragraph right after the decorators of a node selection, with the caret
/// in it.
pub(crate) fn paragraph_after_decorators(tx: &mut NodeStore, decorators: &[NodeKey]) -> EditorResult<NodeKey> {
    let last = decorators
        .last()
        .ok_or_else(|| TransactionError::invalid("empty node selection"))?;
    let host = block_host(tx.state(), last);
    let paragraph = tx.create_node(NodePayload::Paragraph)?;
    tx.insert_after(&host, &paragraph)?;
    set_caret(tx, Point::new(paragraph.clone(), 0))?;
    Ok(paragraph)
}

// Text

/// Replace `remove` chars at char offset `at` of a text node with `insert`.
fn splice_text(tx: &mut NodeStore, key: &NodeKey, at: usize, remove: usize, insert: &str) -> Result<(), TransactionError> {
    let current = tx
        .state()
        .node(key)
        .and_then(|n| n.text())
        .ok_or_else(|| TransactionError::invalid(format!("{key} is not a text node")))?
        .to_string();
    let from = byte_offset(&current, at);
    let to = byte_offset(&current, at + remove);
    let mut next = String::with_capacity(current.len() + insert.len());
    next.push_str(&current[..from]);
    next.push_str(insert);
    next.push_str(&current[to..]);
    tx.set_text(key, next)
}

fn insert_text_node(tx: &mut NodeStore, parent: &NodeKey, index: usize, text: &str, range: &RangeSelection) -> EditorResult<()> {
    let key = tx.create_node(NodePayload::text(text))?;
    {
        let node = tx.node_mut(&key)?;
        node.format = range.format;
        node.style = range.style.clone();
    }
    tx.insert_child(parent, &key, index)?;
    let end = text.chars().count();
    set_caret_with(tx, Point::new(key, end), range.format, range.style.clone())?;
    Ok(())
}

/// A collapsed caret ready for input: selected content is deleted first, and
/// a node selection gets a fresh paragraph after it.
fn prepare_caret(tx: &mut NodeStore) -> EditorResult<Option<RangeSelection>> {
    let decorators = selected_decorators(tx);
    if !decorators.is_empty() {
        paragraph_after_decorators(tx, &decorators)?;
        return Ok(current_range(tx));
    }
    match current_range(tx) {
        Some(range) if !range.is_collapsed() => {
            delete_range(tx)?;
            Ok(current_range(tx))
        }
        other => Ok(other),
    }
}

/// Insert `text` at the selection, replacing selected content.
pub(crate) fn insert_text(tx: &mut NodeStore, text: &str) -> EditorResult<()> {
    if text.is_empty() {
        return Ok(());
    }
    let range = match prepare_caret(tx)? {
        Some(range) => range,
        None => return Ok(()),
    };
    let point = range.anchor.clone();
    let state = tx.state();
    let node = state
        .node(&point.key)
        .ok_or_else(|| TransactionError::NodeNotFound(point.key.clone()))?;

    if node.is_text() {
        if node.format == range.format && node.style == range.style {
            splice_text(tx, &point.key, point.offset, 0, text)?;
            let end = point.offset + text.chars().count();
            set_caret_with(tx, Point::new(point.key, end), range.format, range.style)?;
            return Ok(());
        }
        let parent = node
            .parent()
            .cloned()
            .ok_or_else(|| TransactionError::invalid(format!("{} is detached", point.key)))?;
        let index = split_index(tx, &parent, &point)?;
        return insert_text_node(tx, &parent, index, text, &range);
    }

    if holds_text(state, &point.key) {
        return insert_text_node(tx, &point.key, point.offset, text, &range);
    }

    // a caret between blocks starts a new one
    let payload = if node.node_type() == NodeType::List {
        NodePayload::ListItem { value: 1, checked: None }
    } else {
        NodePayload::Paragraph
    };
    let block = tx.create_node(payload)?;
    tx.insert_child(&point.key, &block, point.offset)?;
    insert_text_node(tx, &block, 0, text, &range)
}

/// Split the text nodes at both ends of a range selection so every selected
/// text node is covered entirely. Returns the covered nodes.
pub(crate) fn split_edges(tx: &mut NodeStore) -> EditorResult<Vec<NodeKey>> {
    let range = match current_range(tx) {
        Some(range) if !range.is_collapsed() => range,
        _ => return Ok(Vec::new()),
    };
    let (start, end) = range.ordered(tx.state());
    if is_text(tx.state(), &end.key) {
        tx.split_text_node(&end.key, end.offset)?;
    }
    if is_text(tx.state(), &start.key) {
        tx.split_text_node(&start.key, start.offset)?;
    }
    let selection = tx.state().selection().cloned();
    Ok(selection.map(|s| s.get_nodes(tx.state())).unwrap_or_default())
}

/// Delete the content of a range selection and collapse it where the range
/// began. The blocks at both ends are joined.
pub(crate) fn delete_range(tx: &mut NodeStore) -> EditorResult<()> {
    let nodes = split_edges(tx)?;
    let range = match current_range(tx) {
        Some(range) if !range.is_collapsed() => range,
        _ => return Ok(()),
    };
    let state = tx.state();
    let (start, end) = range.ordered(state);
    let start_block = state.block_of(&start.key);
    let end_block = state.block_of(&end.key);
    let scope = state.scope_root(&start.key);

    let caret = if is_text(state, &start.key) && nodes.contains(&start.key) {
        let parent = state.parent_of(&start.key).cloned().unwrap_or_else(|| scope.clone());
        Point::new(parent, state.index_in_parent(&start.key).unwrap_or(0))
    } else {
        start.clone()
    };

    let protected: Vec<NodeKey> = start_block.iter().chain(end_block.iter()).cloned().collect();
    let doomed: Vec<NodeKey> = nodes
        .iter()
        .filter(|key| {
            let leaf = is_text(state, key) || is_decorator(state, key);
            leaf || !(protected.contains(key) || protected.iter().any(|p| state.is_ancestor(key, p)))
        })
        .cloned()
        .collect();

    for key in &doomed {
        if is_attached(tx.state(), key) {
            remove_pruning(tx, key)?;
        }
    }
    if is_attached(tx.state(), &caret.key) {
        set_caret(tx, caret)?;
    }

    if let (Some(start_block), Some(end_block)) = (start_block, end_block) {
        let state = tx.state();
        if start_block != end_block
            && is_attached(state, &start_block)
            && is_attached(state, &end_block)
            && holds_text(state, &start_block)
            && holds_text(state, &end_block)
        {
            merge_blocks(tx, &start_block, &end_block)?;
        } else if is_attached(state, &start_block) {
            normalize_texts(tx, &start_block)?;
        }
    }
    ensure_block(tx, &scope)?;
    debug!(removed = doomed.len(), "range deleted");
    Ok(())
}

/// Delete one char next to the caret, or the selected content. At a block
/// edge the block is joined with its neighbour.
pub(crate) fn delete_character(tx: &mut NodeStore, backward: bool) -> EditorResult<()> {
    let range = match current_range(tx) {
        Some(range) => range,
        None => return Ok(()),
    };
    if !range.is_collapsed() {
        return delete_range(tx);
    }
    let point = range.anchor;
    let state = tx.state();
    let node = state
        .node(&point.key)
        .ok_or_else(|| TransactionError::NodeNotFound(point.key.clone()))?;

    if node.is_text() {
        let size = node.size();
        if backward && point.offset > 0 {
            return delete_char_at(tx, &point.key, point.offset - 1);
        }
        if !backward && point.offset < size {
            return delete_char_at(tx, &point.key, point.offset);
        }
        let sibling = if backward {
            state.prev_sibling(&point.key)
        } else {
            state.next_sibling(&point.key)
        };
        if let Some(sibling) = sibling.filter(|s| is_text(state, s)).cloned() {
            let at = if backward { text_len(state, &sibling).saturating_sub(1) } else { 0 };
            return delete_char_at(tx, &sibling, at);
        }
        let block = state.block_of(&point.key);
        return match block {
            Some(block) => merge_with_neighbor(tx, &block, backward),
            None => Ok(()),
        };
    }

    if holds_text(state, &point.key) {
        let children = node.children();
        let neighbor = if backward {
            point.offset.checked_sub(1).and_then(|i| children.get(i))
        } else {
            children.get(point.offset)
        };
        if let Some(child) = neighbor.filter(|c| is_text(state, c)).cloned() {
            let at = if backward { text_len(state, &child).saturating_sub(1) } else { 0 };
            return delete_char_at(tx, &child, at);
        }
        return merge_with_neighbor(tx, &point.key, backward);
    }

    // caret between blocks
    let children = node.children();
    let neighbor = if backward {
        point.offset.checked_sub(1).and_then(|i| children.get(i))
    } else {
        children.get(point.offset)
    };
    match neighbor.cloned() {
        Some(key) if is_decorator(tx.state(), &key) => {
            tx.set_selection(Some(Selection::node(key)))?;
        }
        Some(key) => {
            let leaf = if backward {
                tx.state().last_descendant(&key)
            } else {
                tx.state().first_descendant(&key)
            };
            let offset = if backward { tx.state().node(&leaf).map(|n| n.size()).unwrap_or(0) } else { 0 };
            set_caret(tx, Point::new(leaf, offset))?;
        }
        None => {}
    }
    Ok(())
}

fn delete_char_at(tx: &mut NodeStore, key: &NodeKey, at: usize) -> EditorResult<()> {
    let (format, style) = format_at(tx.state(), &Point::new(key.clone(), at));
    splice_text(tx, key, at, 1, "")?;
    set_caret_with(tx, Point::new(key.clone(), at), format, style)?;
    if text_len(tx.state(), key) == 0 {
        tx.remove_node(key)?;
    }
    Ok(())
}

/// Join `block` with the previous (or next) block of its scope.
fn merge_with_neighbor(tx: &mut NodeStore, block: &NodeKey, backward: bool) -> EditorResult<()> {
    let state = tx.state();
    if backward && state.node_type(block) == Some(NodeType::ListItem) {
        list::lift_to_paragraph(tx, block)?;
        return Ok(());
    }
    let scope = state.scope_root(block);
    let leaves = leaf_blocks(state, &scope);
    let index = match leaves.iter().position(|k| k == block) {
        Some(index) => index,
        None => return Ok(()),
    };

    if backward {
        if index == 0 {
            if state.node_type(block) != Some(NodeType::Paragraph) {
                tx.node_mut(block)?.payload = NodePayload::Paragraph;
            }
            return Ok(());
        }
        let previous = leaves[index - 1].clone();
        if is_decorator(state, &previous) {
            if is_empty_block(state, block) {
                remove_pruning(tx, block)?;
            }
            tx.set_selection(Some(Selection::node(previous)))?;
            return Ok(());
        }
        let join = match state.children_of(&previous).last() {
            Some(last) if is_text(state, last) => Point::new(last.clone(), text_len(state, last)),
            _ => Point::new(previous.clone(), state.children_of(&previous).len()),
        };
        merge_blocks(tx, &previous, block)?;
        set_caret(tx, join)?;
        return Ok(());
    }

    let next = match leaves.get(index + 1) {
        Some(next) => next.clone(),
        None => return Ok(()),
    };
    if is_decorator(state, &next) {
        if is_empty_block(state, block) {
            remove_pruning(tx, block)?;
        }
        tx.set_selection(Some(Selection::node(next)))?;
        return Ok(());
    }
    merge_blocks(tx, block, &next)?;
    Ok(())
}

/// Split the block under the caret. Headings split into a heading unless the
/// caret is at the end; everything else continues as a paragraph.
pub(crate) fn insert_paragraph(tx: &mut NodeStore) -> EditorResult<()> {
    let range = match prepare_caret(tx)? {
        Some(range) => range,
        None => return Ok(()),
    };
    let point = range.anchor.clone();
    let block = match tx.state().block_of(&point.key) {
        Some(block) if holds_text(tx.state(), &block) => block,
        _ => {
            // caret between blocks
            if tx.state().node(&point.key).map(|n| n.is_container()).unwrap_or(false) {
                let paragraph = tx.create_node(NodePayload::Paragraph)?;
                tx.insert_child(&point.key, &paragraph, point.offset)?;
                set_caret(tx, Point::new(paragraph, 0))?;
            }
            return Ok(());
        }
    };

    let index = split_index(tx, &block, &point)?;
    let at_end = index >= tx.state().children_of(&block).len();
    let payload = match tx.state().node(&block).map(|n| &n.payload) {
        Some(NodePayload::Heading { tag }) if !at_end => NodePayload::Heading { tag: *tag },
        Some(NodePayload::ListItem { checked, .. }) => NodePayload::ListItem {
            value: 1,
            checked: checked.map(|_| false),
        },
        _ => NodePayload::Paragraph,
    };
    let created = split_block_tail(tx, &block, index, payload)?;
    set_caret_with(tx, Point::new(created, 0), range.format, range.style)?;
    Ok(())
}

// Formatting

fn with_flag(format: TextFormat, flag: TextFormat, on: bool) -> TextFormat {
    let mut next = format;
    if on {
        next.insert(flag);
        if flag == TextFormat::SUBSCRIPT {
            next.remove(TextFormat::SUPERSCRIPT);
        } else if flag == TextFormat::SUPERSCRIPT {
            next.remove(TextFormat::SUBSCRIPT);
        }
    } else {
        next.remove(flag);
    }
    next
}

/// Text nodes covered by the range, after splitting its edges.
fn covered_texts(tx: &mut NodeStore) -> EditorResult<Vec<NodeKey>> {
    let nodes = split_edges(tx)?;
    Ok(nodes.into_iter().filter(|k| is_text(tx.state(), k)).collect())
}

fn normalize_parents(tx: &mut NodeStore, texts: &[NodeKey]) -> Result<(), TransactionError> {
    let mut blocks: Vec<NodeKey> = Vec::new();
    for key in texts {
        if let Some(parent) = tx.state().parent_of(key) {
            if !blocks.contains(parent) {
                blocks.push(parent.clone());
            }
        }
    }
    for block in &blocks {
        normalize_texts(tx, block)?;
    }
    Ok(())
}

/// Toggle `flag` over the selection. A collapsed caret only changes the
/// format of what is typed next.
pub(crate) fn format_text(tx: &mut NodeStore, flag: TextFormat) -> EditorResult<()> {
    let range = match current_range(tx) {
        Some(range) => range,
        None => return Ok(()),
    };
    if range.is_collapsed() {
        let mut range = range;
        range.format = range.format.toggled(flag);
        tx.set_selection(Some(Selection::Range(range)))?;
        return Ok(());
    }

    let texts = covered_texts(tx)?;
    let enable = !texts
        .iter()
        .all(|k| tx.state().node(k).map(|n| n.format.contains(flag)).unwrap_or(false));
    for key in &texts {
        let node = tx.node_mut(key)?;
        node.format = with_flag(node.format, flag, enable);
    }
    if let (Some(mut range), Some(first)) = (current_range(tx), texts.first()) {
        range.format = tx.state().node(first).map(|n| n.format).unwrap_or_default();
        tx.set_selection(Some(Selection::Range(range)))?;
    }
    normalize_parents(tx, &texts)?;
    Ok(())
}

/// Set an inline style property over the selection; an empty value clears
/// it.
pub(crate) fn format_style(tx: &mut NodeStore, property: &str, value: &str) -> EditorResult<()> {
    let range = match current_range(tx) {
        Some(range) => range,
        None => return Ok(()),
    };
    if range.is_collapsed() {
        let mut range = range;
        range.style.set(property, value);
        tx.set_selection(Some(Selection::Range(range)))?;
        return Ok(());
    }

    let texts = covered_texts(tx)?;
    for key in &texts {
        tx.node_mut(key)?.style.set(property, value);
    }
    if let Some(mut range) = current_range(tx) {
        range.style.set(property, value);
        tx.set_selection(Some(Selection::Range(range)))?;
    }
    normalize_parents(tx, &texts)?;
    Ok(())
}

/// Align every selected block, decorators included.
pub(crate) fn set_alignment(tx: &mut NodeStore, align: Alignment) -> EditorResult<bool> {
    let state = tx.state();
    let blocks: Vec<NodeKey> = match state.selection() {
        Some(selection) => selection
            .blocks(state)
            .into_iter()
            .filter(|b| !is_wrapper(state, b))
            .collect(),
        None => Vec::new(),
    };
    for block in &blocks {
        if tx.state().node(block).map(|n| n.align) != Some(align) {
            tx.node_mut(block)?.align = align;
        }
    }
    Ok(!blocks.is_empty())
}

/// Shift the indent of selected non-list blocks by one level, bounded by
/// `max`. Out-of-range steps are skipped.
pub(crate) fn shift_indent(tx: &mut NodeStore, outdent: bool, max: usize) -> EditorResult<bool> {
    let blocks: Vec<NodeKey> = selected_text_blocks(tx.state())
        .into_iter()
        .filter(|b| tx.state().node_type(b) != Some(NodeType::ListItem))
        .collect();
    for block in &blocks {
        let indent = tx.state().node(block).map(|n| n.indent).unwrap_or(0);
        let next = if outdent {
            indent.checked_sub(1)
        } else {
            Some(indent.saturating_add(1)).filter(|n| usize::from(*n) <= max)
        };
        if let Some(next) = next {
            tx.node_mut(block)?.indent = next;
        }
    }
    Ok(!blocks.is_empty())
}

/// Turn every selected text holder into a block of `payload`. List items are
/// lifted out of their lists first; captions only ever hold paragraphs.
pub(crate) fn set_block_type(tx: &mut NodeStore, payload: &NodePayload) -> EditorResult<()> {
    let blocks = selected_text_blocks(tx.state());
    for block in blocks {
        if in_caption(tx.state(), &block) && *payload != NodePayload::Paragraph {
            continue;
        }
        let block = if tx.state().node_type(&block) == Some(NodeType::ListItem) {
            list::lift_to_paragraph(tx, &block)?
        } else {
            block
        };
        if tx.state().node(&block).map(|n| &n.payload) != Some(payload) {
            tx.node_mut(&block)?.payload = payload.clone();
        }
    }
    Ok(())
}

// Decorators

/// Insert a block decorator at the selection and select it.
///
/// The decorator lands next to the block holding the caret, splitting it when
/// the caret is in the middle and replacing it when it is an empty
/// paragraph. Carets inside lists or captions place it after the enclosing
/// top-level block.
pub(crate) fn insert_block_decorator(tx: &mut NodeStore, payload: NodePayload) -> EditorResult<NodeKey> {
    let decorator = tx.create_node(payload)?;
    let decorators = selected_decorators(tx);
    if let Some(last) = decorators.last() {
        let host = block_host(tx.state(), last);
        tx.insert_after(&host, &decorator)?;
    } else {
        if current_range(tx).map(|r| !r.is_collapsed()).unwrap_or(false) {
            delete_range(tx)?;
        }
        match current_range(tx) {
            Some(range) => place_at(tx, &decorator, &range.anchor)?,
            None => {
                let root = tx.state().root_key().clone();
                tx.append_child(&root, &decorator)?;
            }
        }
    }

    if tx.state().next_sibling(&decorator).is_none() {
        let paragraph = tx.create_node(NodePayload::Paragraph)?;
        tx.insert_after(&decorator, &paragraph)?;
    }
    tx.set_selection(Some(Selection::node(decorator.clone())))?;
    Ok(decorator)
}

fn place_at(tx: &mut NodeStore, decorator: &NodeKey, point: &Point) -> EditorResult<()> {
    let state = tx.state();
    let block = match state.block_of(&point.key) {
        Some(block) => block,
        None => {
            let accepts = matches!(
                state.node_type(&point.key),
                Some(NodeType::Root) | Some(NodeType::Collapsible)
            );
            if accepts {
                tx.insert_child(&point.key, decorator, point.offset)?;
            } else {
                let host = block_host(state, &point.key);
                tx.insert_after(&host, decorator)?;
            }
            return Ok(());
        }
    };

    let host = block_host(state, &block);
    let splittable = host == block && state.node(&block).map(|n| n.node_type().is_text_block()).unwrap_or(false);
    if !splittable {
        tx.insert_after(&host, decorator)?;
        return Ok(());
    }

    if state.children_of(&block).is_empty() {
        tx.insert_before(&block, decorator)?;
        if state_is_paragraph(tx.state(), &block) {
            tx.remove_node(&block)?;
        }
        return Ok(());
    }
    let index = split_index(tx, &block, point)?;
    let len = tx.state().children_of(&block).len();
    if index == 0 {
        tx.insert_before(&block, decorator)?;
    } else if index >= len {
        tx.insert_after(&block, decorator)?;
    } else {
        let payload = tx
            .state()
            .node(&block)
            .map(|n| n.payload.clone())
            .unwrap_or(NodePayload::Paragraph);
        split_block_tail(tx, &block, index, payload)?;
        tx.insert_after(&block, decorator)?;
    }
    Ok(())
}

fn state_is_paragraph(state: &EditorState, key: &NodeKey) -> bool {
    state.node_type(key) == Some(NodeType::Paragraph)
}

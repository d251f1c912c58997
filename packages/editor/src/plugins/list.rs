//! # List Plugin
//!
//! Bullet, numbered and check lists.
//!
//! ```text
//!   INSERT_*_LIST on [p "a", p "b"]        same command again
//!
//!   list(bullet)                           p "a"
//!    ├─ listitem ── "a"          ──▶       p "b"
//!    └─ listitem ── "b"
//! ```
//!
//! ## Toggling
//!
//! - Every selected block already in a list of the requested type: the
//!   enclosing lists are unwrapped back into paragraphs
//! - Otherwise each block is wrapped. Items of a top-level list of another
//!   type are unwrapped first; nested lists just change type
//! - Adjacent top-level lists of the same type are then merged
//!
//! ## Nesting
//!
//! Indenting moves an item into a nested list held by the previous sibling
//! wrapper item. Depth is capped by `maxIndentDepth`; indenting past it does
//! nothing.

use tracing::debug;

use crate::commands::{Command, CommandKind, CommandPriority};
use crate::editor::Editor;
use crate::errors::{EditorResult, TransactionError};
use crate::history::EditKind;
use crate::node::{ListType, NodeKey, NodePayload, NodeType};
use crate::plugins::{Plugin, PluginScope};
use crate::selection::{Point, Selection};
use crate::state::EditorState;
use crate::store::NodeStore;
use crate::transforms::{
    self, copy_block_attrs, in_caption, is_attached, is_wrapper, remap_selection, remove_pruning,
    selected_text_blocks,
};

pub const NAME: &str = "list";

pub struct ListPlugin;

impl Plugin for ListPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&self, scope: &mut PluginScope<'_>) -> EditorResult<()> {
        for (kind, list_type) in [
            (CommandKind::InsertUnorderedList, ListType::Bullet),
            (CommandKind::InsertOrderedList, ListType::Number),
            (CommandKind::InsertCheckList, ListType::Check),
        ] {
            scope.register(kind, CommandPriority::Normal, move |_, editor| toggle(editor, list_type));
        }

        scope.register(CommandKind::FormatBlock, CommandPriority::Normal, |command, editor| {
            match command {
                Command::FormatBlock { block } => match block.list_type() {
                    Some(list_type) => toggle(editor, list_type),
                    None => Ok(false),
                },
                _ => Ok(false),
            }
        });
        scope.register(CommandKind::RemoveList, CommandPriority::Normal, |_, editor| remove_lists(editor));
        scope.register(CommandKind::IndentContent, CommandPriority::Normal, |_, editor| shift_items(editor, false));
        scope.register(CommandKind::OutdentContent, CommandPriority::Normal, |_, editor| shift_items(editor, true));
        scope.register(CommandKind::InsertParagraph, CommandPriority::Normal, |_, editor| split_item(editor));
        scope.register(CommandKind::ToggleChecked, CommandPriority::Normal, |command, editor| {
            match command {
                Command::ToggleChecked { key } => toggle_checked(editor, key.as_ref()),
                _ => Ok(false),
            }
        });
        Ok(())
    }
}

// Handlers

fn toggle(editor: &mut Editor, list_type: ListType) -> EditorResult<bool> {
    let mut handled = false;
    editor.update(EditKind::Structural, |tx| {
        handled = toggle_list(tx, list_type)?;
        Ok(())
    })?;
    Ok(handled)
}

fn selected_items(state: &EditorState) -> Vec<NodeKey> {
    selected_text_blocks(state)
        .into_iter()
        .filter(|b| state.node_type(b) == Some(NodeType::ListItem))
        .collect()
}

fn remove_lists(editor: &mut Editor) -> EditorResult<bool> {
    let state = editor.state();
    let mut lists: Vec<NodeKey> = Vec::new();
    for item in selected_items(state) {
        if let Some(top) = top_list(state, &item) {
            if !lists.contains(&top) {
                lists.push(top);
            }
        }
    }
    if lists.is_empty() {
        return Ok(false);
    }
    editor.update(EditKind::Structural, |tx| {
        for list in &lists {
            unwrap_list(tx, list)?;
        }
        Ok(())
    })?;
    Ok(true)
}

/// Indent or outdent the selected items. Blocks outside lists are left to
/// the rich text fallback.
fn shift_items(editor: &mut Editor, outdent: bool) -> EditorResult<bool> {
    let items = selected_items(editor.state());
    if items.is_empty() {
        return Ok(false);
    }
    let max_depth = editor.config().max_indent_depth;
    editor.update(EditKind::Structural, |tx| {
        for item in &items {
            if outdent {
                outdent_item(tx, item)?;
            } else {
                indent_item(tx, item, max_depth)?;
            }
        }
        Ok(())
    })?;
    Ok(true)
}

/// Enter inside a list item. An empty item leaves its list (or one level of
/// nesting); any other item is split.
fn split_item(editor: &mut Editor) -> EditorResult<bool> {
    let state = editor.state();
    let anchor = match state.selection() {
        Some(Selection::Range(range)) if range.is_collapsed() => range.anchor.key.clone(),
        _ => return Ok(false),
    };
    let item = match state.block_of(&anchor) {
        Some(block) if state.node_type(&block) == Some(NodeType::ListItem) => block,
        _ => return Ok(false),
    };
    let empty = state.text_content(&item).is_empty();

    editor.update(EditKind::Structural, |tx| {
        if !empty {
            transforms::insert_paragraph(tx)?;
            if let Some(top) = top_list(tx.state(), &item) {
                normalize_list(tx, &top)?;
            }
        } else if tx.state().list_depth(&item) > 1 {
            outdent_item(tx, &item)?;
        } else {
            let paragraph = item_to_paragraph(tx, &item)?;
            transforms::set_caret(tx, Point::new(paragraph, 0))?;
        }
        Ok(())
    })?;
    Ok(true)
}

fn toggle_checked(editor: &mut Editor, key: Option<&NodeKey>) -> EditorResult<bool> {
    let state = editor.state();
    let item = match key {
        Some(key) => Some(key.clone()),
        None => state
            .selection()
            .and_then(Selection::as_range)
            .and_then(|range| state.block_of(&range.anchor.key)),
    };
    let item = match item {
        Some(item) if item_list_type(state, &item) == Some(ListType::Check) => item,
        _ => return Ok(false),
    };
    editor.update(EditKind::Formatting, |tx| {
        if let NodePayload::ListItem { checked, .. } = &mut tx.node_mut(&item)?.payload {
            *checked = Some(!checked.unwrap_or(false));
        }
        Ok(())
    })?;
    Ok(true)
}

// Queries

fn list_attrs(state: &EditorState, list: &NodeKey) -> Option<(ListType, u32)> {
    match state.node(list).map(|n| &n.payload) {
        Some(NodePayload::List { list_type, start }) => Some((*list_type, *start)),
        _ => None,
    }
}

fn parent_list(state: &EditorState, item: &NodeKey) -> Option<NodeKey> {
    state
        .parent_of(item)
        .filter(|p| state.node_type(p) == Some(NodeType::List))
        .cloned()
}

/// Type of the list directly holding `item`
fn item_list_type(state: &EditorState, item: &NodeKey) -> Option<ListType> {
    if state.node_type(item) != Some(NodeType::ListItem) {
        return None;
    }
    parent_list(state, item)
        .and_then(|list| list_attrs(state, &list))
        .map(|(list_type, _)| list_type)
}

/// Outermost list containing `key` (or `key` itself)
pub(crate) fn top_list(state: &EditorState, key: &NodeKey) -> Option<NodeKey> {
    std::iter::once(key.clone())
        .chain(state.ancestors(key))
        .filter(|k| state.node_type(k) == Some(NodeType::List))
        .last()
}

// Transforms

/// Renumber the items of `list` from its start, recursively. Check list
/// items always carry a checked flag; other items never do.
pub(crate) fn normalize_list(tx: &mut NodeStore, list: &NodeKey) -> Result<(), TransactionError> {
    let (list_type, start) = match list_attrs(tx.state(), list) {
        Some(attrs) => attrs,
        None => return Ok(()),
    };
    let items = tx.state().children_of(list).to_vec();
    let mut value = start;
    for item in &items {
        let state = tx.state();
        let wrapper = is_wrapper(state, item);
        let current = state.node(item).map(|n| n.payload.clone());
        let checked = match &current {
            Some(NodePayload::ListItem { checked, .. }) if list_type == ListType::Check && !wrapper => {
                Some(checked.unwrap_or(false))
            }
            _ => None,
        };
        let expected = NodePayload::ListItem { value, checked };
        if current.as_ref() != Some(&expected) {
            tx.node_mut(item)?.payload = expected;
        }

        if wrapper {
            if let Some(nested) = tx.state().children_of(item).first().cloned() {
                normalize_list(tx, &nested)?;
            }
        } else {
            value += 1;
        }
    }
    Ok(())
}

/// Merge neighbouring lists of the same type under `container`, then
/// renumber every list there.
pub(crate) fn merge_adjacent_lists(tx: &mut NodeStore, container: &NodeKey) -> Result<(), TransactionError> {
    loop {
        let state = tx.state();
        let pair = state.children_of(container).windows(2).find_map(|pair| {
            let first = list_attrs(state, &pair[0])?;
            let second = list_attrs(state, &pair[1])?;
            (first.0 == second.0).then(|| (pair[0].clone(), pair[1].clone()))
        });
        let (first, second) = match pair {
            Some(pair) => pair,
            None => break,
        };
        let shift = tx.state().children_of(&first).len();
        let moved = tx.state().children_of(&second).to_vec();
        for item in &moved {
            tx.append_child(&first, item)?;
        }
        remap_selection(tx, &second, &first, shift)?;
        tx.remove_node(&second)?;
        debug!(into = %first, merged = moved.len(), "adjacent lists merged");
    }

    let lists: Vec<NodeKey> = tx
        .state()
        .children_of(container)
        .iter()
        .filter(|k| tx.state().node_type(k) == Some(NodeType::List))
        .cloned()
        .collect();
    for list in &lists {
        merge_nested_lists(tx, list)?;
        normalize_list(tx, list)?;
    }
    Ok(())
}

/// Nested list held by wrapper item `item`
fn nested_list(state: &EditorState, item: &NodeKey) -> Option<NodeKey> {
    if is_wrapper(state, item) {
        state.children_of(item).first().cloned()
    } else {
        None
    }
}

/// Merge neighbouring wrapper items of `list` whose nested lists share a
/// type, at every depth below `list`.
fn merge_nested_lists(tx: &mut NodeStore, list: &NodeKey) -> Result<(), TransactionError> {
    loop {
        let state = tx.state();
        let pair = state.children_of(list).windows(2).find_map(|pair| {
            let first = nested_list(state, &pair[0])?;
            let second = nested_list(state, &pair[1])?;
            let same = list_attrs(state, &first)?.0 == list_attrs(state, &second)?.0;
            same.then(|| (first, pair[1].clone(), second))
        });
        let Some((first, wrapper, second)) = pair else { break };

        let shift = tx.state().children_of(&first).len();
        let moved = tx.state().children_of(&second).to_vec();
        for item in &moved {
            tx.append_child(&first, item)?;
        }
        remap_selection(tx, &second, &first, shift)?;
        tx.remove_node(&wrapper)?;
        debug!(into = %first, merged = moved.len(), "adjacent nested lists merged");
    }

    let nested: Vec<NodeKey> = {
        let state = tx.state();
        state
            .children_of(list)
            .iter()
            .filter_map(|item| nested_list(state, item))
            .collect()
    };
    for inner in &nested {
        merge_nested_lists(tx, inner)?;
    }
    Ok(())
}

/// Replace text block `block` with a one-item list. Returns the item.
pub(crate) fn wrap_block(tx: &mut NodeStore, block: &NodeKey, list_type: ListType) -> Result<NodeKey, TransactionError> {
    let list = tx.create_node(NodePayload::List { list_type, start: 1 })?;
    tx.insert_before(block, &list)?;
    let item = tx.create_node(NodePayload::ListItem {
        value: 1,
        checked: (list_type == ListType::Check).then_some(false),
    })?;
    tx.append_child(&list, &item)?;
    copy_block_attrs(tx, block, &item)?;

    let children = tx.state().children_of(block).to_vec();
    for child in &children {
        tx.append_child(&item, child)?;
    }
    remap_selection(tx, block, &item, 0)?;
    tx.remove_node(block)?;
    Ok(item)
}

/// Replace `list` with one paragraph per text-holding item, nested items
/// included.
pub(crate) fn unwrap_list(tx: &mut NodeStore, list: &NodeKey) -> Result<(), TransactionError> {
    let items: Vec<NodeKey> = {
        let state = tx.state();
        state
            .preorder(list)
            .into_iter()
            .filter(|k| state.node_type(k) == Some(NodeType::ListItem) && !is_wrapper(state, k))
            .collect()
    };
    for item in &items {
        let paragraph = tx.create_node(NodePayload::Paragraph)?;
        copy_block_attrs(tx, item, &paragraph)?;
        tx.insert_before(list, &paragraph)?;
        let children = tx.state().children_of(item).to_vec();
        for child in &children {
            tx.append_child(&paragraph, child)?;
        }
        remap_selection(tx, item, &paragraph, 0)?;
    }
    tx.remove_node(list)?;
    debug!(list = %list, items = items.len(), "list unwrapped");
    Ok(())
}

/// Turn top-level item `item` into a paragraph after its list. Items after
/// it move into a new list following the paragraph.
pub(crate) fn item_to_paragraph(tx: &mut NodeStore, item: &NodeKey) -> Result<NodeKey, TransactionError> {
    let state = tx.state();
    let list = parent_list(state, item).ok_or_else(|| TransactionError::invalid(format!("{item} is not in a list")))?;
    let (list_type, _) = list_attrs(state, &list).ok_or_else(|| TransactionError::invalid("list without attributes"))?;
    let index = state.index_in_parent(item).unwrap_or(0);
    let tail: Vec<NodeKey> = state.children_of(&list).iter().skip(index + 1).cloned().collect();
    let texts = state.children_of(item).to_vec();

    let paragraph = tx.create_node(NodePayload::Paragraph)?;
    copy_block_attrs(tx, item, &paragraph)?;
    tx.insert_after(&list, &paragraph)?;
    for text in &texts {
        tx.append_child(&paragraph, text)?;
    }
    remap_selection(tx, item, &paragraph, 0)?;

    if !tail.is_empty() {
        let rest = tx.create_node(NodePayload::List { list_type, start: 1 })?;
        tx.insert_after(&paragraph, &rest)?;
        for key in &tail {
            tx.append_child(&rest, key)?;
        }
        normalize_list(tx, &rest)?;
    }
    remove_pruning(tx, item)?;
    if is_attached(tx.state(), &list) {
        normalize_list(tx, &list)?;
    }
    Ok(paragraph)
}

/// Outdent `item` all the way and turn it into a paragraph.
pub(crate) fn lift_to_paragraph(tx: &mut NodeStore, item: &NodeKey) -> Result<NodeKey, TransactionError> {
    while tx.state().list_depth(item) > 1 {
        if !outdent_item(tx, item)? {
            break;
        }
    }
    item_to_paragraph(tx, item)
}

/// Move `item` one nesting level up. Its following siblings stay nested
/// below it. Top-level items are left alone.
pub(crate) fn outdent_item(tx: &mut NodeStore, item: &NodeKey) -> Result<bool, TransactionError> {
    let state = tx.state();
    let list = match parent_list(state, item) {
        Some(list) => list,
        None => return Ok(false),
    };
    let wrapper = match state.parent_of(&list) {
        Some(wrapper) if state.node_type(wrapper) == Some(NodeType::ListItem) => wrapper.clone(),
        _ => return Ok(false),
    };
    let (list_type, _) = list_attrs(state, &list).ok_or_else(|| TransactionError::invalid("list without attributes"))?;
    let index = state.index_in_parent(item).unwrap_or(0);
    let tail: Vec<NodeKey> = state.children_of(&list).iter().skip(index + 1).cloned().collect();

    tx.insert_after(&wrapper, item)?;
    if !tail.is_empty() {
        let tail_wrapper = tx.create_node(NodePayload::ListItem { value: 1, checked: None })?;
        tx.insert_after(item, &tail_wrapper)?;
        let nested = tx.create_node(NodePayload::List { list_type, start: 1 })?;
        tx.append_child(&tail_wrapper, &nested)?;
        for key in &tail {
            tx.append_child(&nested, key)?;
        }
    }
    if tx.state().children_of(&list).is_empty() {
        remove_pruning(tx, &list)?;
    }
    if let Some(top) = top_list(tx.state(), item) {
        normalize_list(tx, &top)?;
    }
    Ok(true)
}

/// Nest `item` one level deeper under its previous sibling. No-op at
/// `max_depth`.
pub(crate) fn indent_item(tx: &mut NodeStore, item: &NodeKey, max_depth: usize) -> Result<bool, TransactionError> {
    let state = tx.state();
    let list = match parent_list(state, item) {
        Some(list) => list,
        None => return Ok(false),
    };
    let depth = state.list_depth(item);
    if depth >= max_depth {
        debug!(item = %item, depth, max_depth, "indent past maximum depth ignored");
        return Ok(false);
    }
    let (list_type, _) = list_attrs(state, &list).ok_or_else(|| TransactionError::invalid("list without attributes"))?;
    let previous_nested = state
        .prev_sibling(item)
        .filter(|prev| is_wrapper(state, prev))
        .and_then(|prev| state.children_of(prev).first())
        .cloned();

    let nested = match previous_nested {
        Some(nested) => nested,
        None => {
            let wrapper = tx.create_node(NodePayload::ListItem { value: 1, checked: None })?;
            tx.insert_before(item, &wrapper)?;
            let nested = tx.create_node(NodePayload::List { list_type, start: 1 })?;
            tx.append_child(&wrapper, &nested)?;
            nested
        }
    };
    tx.append_child(&nested, item)?;

    // a wrapper right after joins the nested list
    let following = tx
        .state()
        .parent_of(&nested)
        .and_then(|wrapper| tx.state().next_sibling(wrapper))
        .filter(|next| is_wrapper(tx.state(), next))
        .cloned();
    if let Some(following) = following {
        let inner = tx.state().children_of(&following).first().cloned();
        if let Some(inner) = inner {
            let moved = tx.state().children_of(&inner).to_vec();
            for key in &moved {
                tx.append_child(&nested, key)?;
            }
        }
        tx.remove_node(&following)?;
    }

    if let Some(top) = top_list(tx.state(), item) {
        normalize_list(tx, &top)?;
    }
    Ok(true)
}

/// Toggle the selected text blocks into (or out of) a list of `list_type`.
pub(crate) fn toggle_list(tx: &mut NodeStore, list_type: ListType) -> EditorResult<bool> {
    let state = tx.state();
    let blocks: Vec<NodeKey> = selected_text_blocks(state)
        .into_iter()
        .filter(|b| !in_caption(state, b))
        .collect();
    if blocks.is_empty() {
        return Ok(false);
    }

    if blocks.iter().all(|b| item_list_type(state, b) == Some(list_type)) {
        let mut lists: Vec<NodeKey> = Vec::new();
        for block in &blocks {
            if let Some(top) = top_list(state, block) {
                if !lists.contains(&top) {
                    lists.push(top);
                }
            }
        }
        for list in &lists {
            unwrap_list(tx, list)?;
        }
        debug!(?list_type, lists = lists.len(), "list toggled off");
        return Ok(true);
    }

    let mut containers: Vec<NodeKey> = Vec::new();
    for block in &blocks {
        let state = tx.state();
        if !is_attached(state, block) {
            continue;
        }
        let item = if state.node_type(block) == Some(NodeType::ListItem) {
            let list = parent_list(state, block);
            let current = item_list_type(state, block);
            match list {
                Some(_) if current == Some(list_type) => block.clone(),
                Some(list) if state.list_depth(block) > 1 => {
                    if let NodePayload::List { list_type: slot, .. } = &mut tx.node_mut(&list)?.payload {
                        *slot = list_type;
                    }
                    block.clone()
                }
                _ => {
                    let paragraph = item_to_paragraph(tx, block)?;
                    wrap_block(tx, &paragraph, list_type)?
                }
            }
        } else {
            wrap_block(tx, block, list_type)?
        };

        let container = top_list(tx.state(), &item).and_then(|top| tx.state().parent_of(&top).cloned());
        if let Some(container) = container {
            if !containers.contains(&container) {
                containers.push(container);
            }
        }
    }
    for container in &containers {
        merge_adjacent_lists(tx, container)?;
    }
    debug!(?list_type, blocks = blocks.len(), "list toggled on");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use serde_json::{json, Value};

    use crate::clock::ManualClock;
    use crate::config::EditorConfig;

    fn editor_with(children: Value, config: EditorConfig) -> Editor {
        Editor::builder()
            .config(config)
            .clock(Rc::new(ManualClock::new(0)))
            .document(json!({ "type": "root", "children": children }))
            .build()
            .unwrap()
    }

    fn editor(children: Value) -> Editor {
        editor_with(children, EditorConfig::default())
    }

    fn paragraphs(texts: &[&str]) -> Value {
        Value::Array(
            texts
                .iter()
                .map(|t| json!({ "type": "paragraph", "children": [{ "type": "text", "text": t }] }))
                .collect(),
        )
    }

    fn text_key(editor: &Editor, text: &str) -> NodeKey {
        let state = editor.state();
        state
            .preorder(state.root_key())
            .into_iter()
            .find(|k| state.node(k).and_then(|n| n.text()) == Some(text))
            .unwrap()
    }

    fn select(editor: &mut Editor, from: &str, to: &str) {
        let (anchor, focus) = (text_key(editor, from), text_key(editor, to));
        let focus_len = editor.state().node(&focus).unwrap().size();
        editor
            .update(EditKind::Selection, |tx| {
                tx.set_selection(Some(Selection::range(Point::new(anchor, 0), Point::new(focus, focus_len))))
                    .map_err(Into::into)
            })
            .unwrap();
    }

    fn caret(editor: &mut Editor, text: &str, offset: usize) {
        let key = text_key(editor, text);
        editor
            .update(EditKind::Selection, |tx| {
                tx.set_selection(Some(Selection::caret(key, offset))).map_err(Into::into)
            })
            .unwrap();
    }

    /// Type names of the top-level blocks
    fn shape(editor: &Editor) -> Vec<&'static str> {
        let state = editor.state();
        state
            .children_of(state.root_key())
            .iter()
            .filter_map(|k| state.node_type(k))
            .map(|t| t.as_str())
            .collect()
    }

    #[test]
    fn test_toggle_twice_restores_paragraphs() {
        let mut editor = editor(paragraphs(&["one", "two"]));
        let before = editor.export_json();
        select(&mut editor, "one", "two");

        assert!(editor.dispatch(Command::InsertUnorderedList).unwrap());
        assert_eq!(shape(&editor), vec!["list"]);
        let state = editor.state();
        let list = state.children_of(state.root_key())[0].clone();
        assert_eq!(state.children_of(&list).len(), 2);

        assert!(editor.dispatch(Command::InsertUnorderedList).unwrap());
        assert_eq!(editor.export_json(), before);
    }

    #[test]
    fn test_switching_list_type_rewraps() {
        let mut editor = editor(paragraphs(&["one", "two"]));
        select(&mut editor, "one", "two");
        editor.dispatch(Command::InsertOrderedList).unwrap();
        editor.dispatch(Command::InsertCheckList).unwrap();

        let state = editor.state();
        assert_eq!(shape(&editor), vec!["list"]);
        let list = state.children_of(state.root_key())[0].clone();
        assert_eq!(list_attrs(state, &list), Some((ListType::Check, 1)));
        for item in state.children_of(&list) {
            assert!(matches!(
                state.node(item).unwrap().payload,
                NodePayload::ListItem { checked: Some(false), .. }
            ));
        }
    }

    #[test]
    fn test_adjacent_lists_of_same_type_merge() {
        let mut editor = editor(json!([
            { "type": "list", "listType": "bullet", "children": [
                { "type": "listitem", "children": [{ "type": "text", "text": "a" }] }
            ]},
            { "type": "paragraph", "children": [{ "type": "text", "text": "b" }] }
        ]));
        caret(&mut editor, "b", 0);
        editor.dispatch(Command::InsertUnorderedList).unwrap();

        let state = editor.state();
        assert_eq!(shape(&editor), vec!["list"]);
        let list = state.children_of(state.root_key())[0].clone();
        let values: Vec<u32> = state
            .children_of(&list)
            .iter()
            .filter_map(|k| match state.node(k).unwrap().payload {
                NodePayload::ListItem { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_indent_and_outdent_item() {
        let mut editor = editor(paragraphs(&["a", "b", "c"]));
        select(&mut editor, "a", "c");
        editor.dispatch(Command::InsertUnorderedList).unwrap();

        caret(&mut editor, "b", 0);
        assert!(editor.dispatch(Command::IndentContent).unwrap());
        let b = text_key(&editor, "b");
        let state = editor.state();
        let item = state.parent_of(&b).unwrap().clone();
        assert_eq!(state.list_depth(&item), 2);
        editor.verify().unwrap();

        assert!(editor.dispatch(Command::OutdentContent).unwrap());
        let state = editor.state();
        let item = state.parent_of(&b).unwrap().clone();
        assert_eq!(state.list_depth(&item), 1);
        let list = state.children_of(state.root_key())[0].clone();
        assert_eq!(state.children_of(&list).len(), 3);
    }

    #[test]
    fn test_indent_is_bounded_by_max_depth() {
        let config = EditorConfig {
            max_indent_depth: 2,
            ..EditorConfig::default()
        };
        let mut editor = editor_with(paragraphs(&["a", "b", "c"]), config);
        select(&mut editor, "a", "c");
        editor.dispatch(Command::InsertUnorderedList).unwrap();

        caret(&mut editor, "c", 0);
        editor.dispatch(Command::IndentContent).unwrap();
        editor.dispatch(Command::IndentContent).unwrap();
        editor.dispatch(Command::IndentContent).unwrap();

        let c = text_key(&editor, "c");
        let state = editor.state();
        assert_eq!(state.list_depth(state.parent_of(&c).unwrap()), 2);
    }

    #[test]
    fn test_enter_on_empty_item_leaves_list() {
        let mut editor = editor(paragraphs(&["a"]));
        caret(&mut editor, "a", 1);
        editor.dispatch(Command::InsertUnorderedList).unwrap();
        editor.dispatch(Command::InsertParagraph).unwrap();

        let state = editor.state();
        let list = state.children_of(state.root_key())[0].clone();
        assert_eq!(state.children_of(&list).len(), 2);

        editor.dispatch(Command::InsertParagraph).unwrap();
        assert_eq!(shape(&editor), vec!["list", "paragraph"]);
        let state = editor.state();
        let paragraph = state.children_of(state.root_key())[1].clone();
        let range = state.selection().unwrap().as_range().unwrap();
        assert_eq!(range.anchor, Point::new(paragraph, 0));
    }

    #[test]
    fn test_toggle_checked_only_in_check_lists() {
        let mut editor = editor(paragraphs(&["task"]));
        caret(&mut editor, "task", 0);
        assert!(!editor.dispatch(Command::ToggleChecked { key: None }).unwrap());

        editor.dispatch(Command::InsertCheckList).unwrap();
        assert!(editor.dispatch(Command::ToggleChecked { key: None }).unwrap());
        let task = text_key(&editor, "task");
        let state = editor.state();
        let item = state.parent_of(&task).unwrap();
        assert!(matches!(
            state.node(item).unwrap().payload,
            NodePayload::ListItem { checked: Some(true), .. }
        ));

        editor.undo().unwrap();
        let state = editor.state();
        let item = state.parent_of(&task).unwrap();
        assert!(matches!(
            state.node(item).unwrap().payload,
            NodePayload::ListItem { checked: Some(false), .. }
        ));
    }

    #[test]
    fn test_remove_list_unwraps_nested_items() {
        let mut editor = editor(json!([
            { "type": "list", "listType": "number", "children": [
                { "type": "listitem", "children": [{ "type": "text", "text": "a" }] },
                { "type": "listitem", "children": [
                    { "type": "list", "listType": "number", "children": [
                        { "type": "listitem", "children": [{ "type": "text", "text": "b" }] }
                    ]}
                ]}
            ]}
        ]));
        caret(&mut editor, "b", 0);
        assert!(editor.dispatch(Command::RemoveList).unwrap());
        assert_eq!(shape(&editor), vec!["paragraph", "paragraph"]);
        let root = editor.state().root_key().clone();
        assert_eq!(editor.state().text_content(&root), "ab");
    }

    #[test]
    fn test_switched_nested_list_merges_with_neighbour() {
        let mut editor = editor(json!([
            { "type": "list", "listType": "bullet", "children": [
                { "type": "listitem", "children": [{ "type": "text", "text": "top" }] },
                { "type": "listitem", "children": [
                    { "type": "list", "listType": "number", "children": [
                        { "type": "listitem", "children": [{ "type": "text", "text": "first" }] }
                    ]}
                ]},
                { "type": "listitem", "children": [
                    { "type": "list", "listType": "bullet", "children": [
                        { "type": "listitem", "children": [{ "type": "text", "text": "second" }] }
                    ]}
                ]}
            ]}
        ]));
        caret(&mut editor, "second", 2);
        assert!(editor.dispatch(Command::InsertOrderedList).unwrap());

        let state = editor.state();
        assert_eq!(shape(&editor), vec!["list"]);
        let top = state.children_of(state.root_key())[0].clone();
        assert_eq!(list_attrs(state, &top), Some((ListType::Bullet, 1)));
        let items = state.children_of(&top).to_vec();
        assert_eq!(items.len(), 2);

        let nested = nested_list(state, &items[1]).unwrap();
        assert_eq!(list_attrs(state, &nested), Some((ListType::Number, 1)));
        let texts: Vec<String> = state.children_of(&nested).iter().map(|k| state.text_content(k)).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(matches!(
            state.node(&state.children_of(&nested)[1]).unwrap().payload,
            NodePayload::ListItem { value: 2, .. }
        ));

        let anchor = &state.selection().and_then(Selection::as_range).unwrap().anchor;
        assert_eq!(anchor, &Point::new(text_key(&editor, "second"), 2));
        editor.verify().unwrap();
    }
}

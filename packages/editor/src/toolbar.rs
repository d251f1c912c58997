//! # Toolbar State
//!
//! [`project`] turns a state and its selection into the read-only view model
//! the toolbar renders. It is a pure function: no UI cycle is involved, and
//! calling it twice with the same inputs gives the same answer.
//!
//! Style values the selection does not carry explicitly fall back to the
//! last value the user applied ([`StickyStyle`]), then to the defaults below.
//! Sticky values live only in memory and are never persisted.

use indexmap::IndexMap;
use serde::Serialize;

use crate::commands::BlockType;
use crate::node::{Alignment, FormatFlag, Node, NodeKey, NodePayload, NodeType};
use crate::selection::{RangeSelection, Selection};
use crate::state::EditorState;

pub const DEFAULT_FONT_FAMILY: &str = "Arial";
pub const DEFAULT_FONT_SIZE: &str = "15px";
pub const DEFAULT_FONT_COLOR: &str = "#000";
pub const DEFAULT_BACKGROUND_COLOR: &str = "#fff";

/// Last explicitly applied style values, UI-only
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StickyStyle {
    values: IndexMap<String, String>,
}

impl StickyStyle {
    pub fn record(&mut self, property: &str, value: &str) {
        if value.is_empty() {
            self.values.shift_remove(property);
        } else {
            self.values.insert(property.to_string(), value.to_string());
        }
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.values.get(property).map(String::as_str)
    }
}

/// Toolbar view model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarState {
    pub active_formats: Vec<FormatFlag>,
    pub block_type: BlockType,
    pub font_family: String,
    pub font_size: String,
    pub font_color: String,
    pub background_color: String,
    pub code_language: Option<String>,
    pub alignment: Alignment,
    pub can_undo: bool,
    pub can_redo: bool,
    /// Decorator under a node selection
    pub selected_decorator: Option<NodeKey>,
}

impl ToolbarState {
    pub fn is_active(&self, flag: FormatFlag) -> bool {
        self.active_formats.contains(&flag)
    }

    fn defaults(sticky: &StickyStyle) -> Self {
        Self {
            active_formats: Vec::new(),
            block_type: BlockType::Paragraph,
            font_family: sticky.get("font-family").unwrap_or(DEFAULT_FONT_FAMILY).to_string(),
            font_size: sticky.get("font-size").unwrap_or(DEFAULT_FONT_SIZE).to_string(),
            font_color: sticky.get("color").unwrap_or(DEFAULT_FONT_COLOR).to_string(),
            background_color: sticky
                .get("background-color")
                .unwrap_or(DEFAULT_BACKGROUND_COLOR)
                .to_string(),
            code_language: None,
            alignment: Alignment::Unset,
            can_undo: false,
            can_redo: false,
            selected_decorator: None,
        }
    }
}

/// Project the toolbar view model for `selection` over `state`.
pub fn project(state: &EditorState, selection: Option<&Selection>, sticky: &StickyStyle) -> ToolbarState {
    let mut view = ToolbarState::defaults(sticky);
    let selection = match selection {
        Some(selection) => selection,
        None => return view,
    };
    let range = match selection {
        Selection::Node(node) => {
            view.selected_decorator = node.keys.first().cloned();
            if let Some(decorator) = view.selected_decorator.as_ref().and_then(|k| state.node(k)) {
                view.alignment = decorator.align;
            }
            return view;
        }
        Selection::Range(range) => range,
    };

    view.active_formats = FormatFlag::ALL
        .into_iter()
        .filter(|flag| selection.has_format(state, flag.bits()))
        .collect();

    if let Some(block) = state.block_of(&range.anchor.key).and_then(|k| state.node(&k)) {
        view.block_type = block_type_of(state, block);
        view.alignment = block.align;
        if let NodePayload::Code { language } = &block.payload {
            view.code_language = language.clone();
        }
    }

    let texts = selected_texts(state, selection);
    for (property, slot) in [
        ("font-family", &mut view.font_family),
        ("font-size", &mut view.font_size),
        ("color", &mut view.font_color),
        ("background-color", &mut view.background_color),
    ] {
        if let Some(value) = style_value(range, &texts, property) {
            *slot = value;
        }
    }
    view
}

fn block_type_of(state: &EditorState, block: &Node) -> BlockType {
    match &block.payload {
        NodePayload::Heading { tag } => BlockType::heading(*tag),
        NodePayload::Quote => BlockType::Quote,
        NodePayload::Code { .. } => BlockType::Code,
        NodePayload::ListItem { .. } => block
            .parent()
            .and_then(|p| state.node(p))
            .and_then(|list| match &list.payload {
                NodePayload::List { list_type, .. } => Some(BlockType::list(*list_type)),
                _ => None,
            })
            .unwrap_or_default(),
        _ => BlockType::Paragraph,
    }
}

fn selected_texts<'a>(state: &'a EditorState, selection: &Selection) -> Vec<&'a Node> {
    selection
        .get_nodes(state)
        .iter()
        .filter_map(|k| state.node(k))
        .filter(|n| n.node_type() == NodeType::Text)
        .collect()
}

/// Explicit value of `property` for the selection. A collapsed caret answers
/// from its pending style; a range answers when every text agrees, and with
/// an empty string when they differ.
fn style_value(range: &RangeSelection, texts: &[&Node], property: &str) -> Option<String> {
    if range.is_collapsed() {
        return range.style.get(property).map(str::to_string);
    }
    let mut values = texts.iter().map(|n| n.style.get(property));
    let first = values.next()?;
    if values.all(|v| v == first) {
        first.map(str::to_string)
    } else {
        Some(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyGenerator;
    use crate::node::{HeadingTag, ListType, Style, TextFormat};
    use crate::selection::Point;
    use crate::store::NodeStore;

    /// root > [heading(h2) > ["Big"(bold, color red)], list(check) > item > ["todo"]]
    fn fixture() -> (NodeStore, NodeKey, NodeKey) {
        let mut store = NodeStore::new(KeyGenerator::default());
        let root = store.state().root_key().clone();
        let mut keys = (NodeKey::from("?"), NodeKey::from("?"));
        store
            .update(|tx| {
                let paragraph = tx.state().children_of(&root)[0].clone();
                tx.remove_node(&paragraph)?;
                let heading = tx.create_node(NodePayload::Heading { tag: HeadingTag::H2 })?;
                tx.append_child(&root, &heading)?;
                let big = tx.create_node(NodePayload::text("Big"))?;
                {
                    let node = tx.node_mut(&big)?;
                    node.format = TextFormat::BOLD;
                    node.style = Style::parse("color: red;");
                }
                tx.append_child(&heading, &big)?;

                let list = tx.create_node(NodePayload::List { list_type: ListType::Check, start: 1 })?;
                tx.append_child(&root, &list)?;
                let item = tx.create_node(NodePayload::ListItem { value: 1, checked: Some(false) })?;
                tx.append_child(&list, &item)?;
                let todo = tx.create_node(NodePayload::text("todo"))?;
                tx.append_child(&item, &todo)?;
                tx.set_selection(Some(Selection::caret(big.clone(), 1)))?;
                keys = (big, todo);
                Ok(())
            })
            .unwrap();
        (store, keys.0, keys.1)
    }

    #[test]
    fn test_projects_range_over_heading() {
        let (store, big, _) = fixture();
        let state = store.state();
        let selection = Selection::range(Point::new(big.clone(), 0), Point::new(big, 3));

        let view = project(state, Some(&selection), &StickyStyle::default());
        assert_eq!(view.block_type, BlockType::H2);
        assert!(view.is_active(FormatFlag::Bold));
        assert!(!view.is_active(FormatFlag::Italic));
        assert_eq!(view.font_color, "red");
        assert_eq!(view.font_family, DEFAULT_FONT_FAMILY);
    }

    #[test]
    fn test_projects_check_list_block_type() {
        let (store, _, todo) = fixture();
        let selection = Selection::caret(todo, 2);
        let view = project(store.state(), Some(&selection), &StickyStyle::default());
        assert_eq!(view.block_type, BlockType::Check);
    }

    #[test]
    fn test_sticky_value_used_without_explicit_style() {
        let (store, _, todo) = fixture();
        let mut sticky = StickyStyle::default();
        sticky.record("font-size", "20px");
        sticky.record("color", "blue");

        let view = project(store.state(), Some(&Selection::caret(todo, 0)), &sticky);
        assert_eq!(view.font_size, "20px");
        assert_eq!(view.font_color, "blue");

        sticky.record("color", "");
        let view = project(store.state(), Some(&Selection::caret(NodeKey::from("gone"), 0)), &sticky);
        assert_eq!(view.font_color, DEFAULT_FONT_COLOR);
    }

    #[test]
    fn test_mixed_values_project_as_empty() {
        let (store, big, todo) = fixture();
        let selection = Selection::range(Point::new(big, 0), Point::new(todo, 4));
        let view = project(store.state(), Some(&selection), &StickyStyle::default());
        assert_eq!(view.font_color, "");
        assert!(!view.is_active(FormatFlag::Bold));
    }

    #[test]
    fn test_no_selection_gives_defaults() {
        let (store, _, _) = fixture();
        let view = project(store.state(), None, &StickyStyle::default());
        assert_eq!(view, ToolbarState::defaults(&StickyStyle::default()));
    }
}

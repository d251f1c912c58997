//! Collapsible sections: a container of blocks with an open flag.

use crate::commands::{Command, CommandKind, CommandPriority};
use crate::editor::Editor;
use crate::errors::EditorResult;
use crate::history::EditKind;
use crate::node::{NodeKey, NodePayload, NodeType};
use crate::plugins::{Plugin, PluginScope};
use crate::selection::Selection;
use crate::state::EditorState;
use crate::transforms;

pub const NAME: &str = "collapsible";

pub struct CollapsiblePlugin;

impl Plugin for CollapsiblePlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&self, scope: &mut PluginScope<'_>) -> EditorResult<()> {
        scope.register(CommandKind::InsertCollapsible, CommandPriority::Normal, |_, editor| wrap(editor));
        scope.register(CommandKind::ToggleCollapsible, CommandPriority::Normal, |command, editor| match command {
            Command::ToggleCollapsible { key } => toggle(editor, key.as_ref()),
            _ => Ok(false),
        });
        Ok(())
    }
}

/// Blocks to wrap: the hosts of the selected blocks that share a parent
/// with the first one.
fn wrap_targets(state: &EditorState) -> Vec<NodeKey> {
    let selection = match state.selection() {
        Some(selection) => selection,
        None => return Vec::new(),
    };
    let mut hosts: Vec<NodeKey> = Vec::new();
    for block in selection.blocks(state) {
        if transforms::in_caption(state, &block) {
            continue;
        }
        let host = transforms::block_host(state, &block);
        if !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    let parent = match hosts.first().and_then(|h| state.parent_of(h)) {
        Some(parent) => parent.clone(),
        None => return Vec::new(),
    };
    hosts.retain(|h| state.parent_of(h) == Some(&parent));
    hosts.sort_by_key(|h| state.index_in_parent(h));
    hosts
}

fn wrap(editor: &mut Editor) -> EditorResult<bool> {
    let targets = wrap_targets(editor.state());
    let first = match targets.first() {
        Some(first) => first.clone(),
        None => return Ok(false),
    };
    editor.update(EditKind::Structural, |tx| {
        let section = tx.create_node(NodePayload::Collapsible { open: true })?;
        tx.insert_before(&first, &section)?;
        for (index, block) in targets.iter().enumerate() {
            tx.move_node(block, &section, index)?;
        }
        Ok(())
    })?;
    Ok(true)
}

fn enclosing_section(state: &EditorState) -> Option<NodeKey> {
    let anchor = match state.selection()? {
        Selection::Range(range) => range.anchor.key.clone(),
        Selection::Node(node) => node.keys.first()?.clone(),
    };
    std::iter::once(anchor.clone())
        .chain(state.ancestors(&anchor))
        .find(|k| state.node_type(k) == Some(NodeType::Collapsible))
}

fn toggle(editor: &mut Editor, key: Option<&NodeKey>) -> EditorResult<bool> {
    let state = editor.state();
    let section = match key {
        Some(key) if state.node_type(key) == Some(NodeType::Collapsible) => key.clone(),
        Some(_) => return Ok(false),
        None => match enclosing_section(state) {
            Some(section) => section,
            None => return Ok(false),
        },
    };
    editor.update(EditKind::Formatting, |tx| {
        if let NodePayload::Collapsible { open } = &mut tx.node_mut(&section)?.payload {
            *open = !*open;
        }
        Ok(())
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use serde_json::json;

    use crate::clock::ManualClock;
    use crate::selection::{NativeSelection, Point};

    fn editor() -> Editor {
        Editor::builder()
            .clock(Rc::new(ManualClock::new(0)))
            .document(json!({ "type": "root", "children": [
                { "type": "paragraph", "children": [{ "type": "text", "text": "one" }] },
                { "type": "paragraph", "children": [{ "type": "text", "text": "two" }] },
                { "type": "paragraph", "children": [{ "type": "text", "text": "three" }] }
            ]}))
            .build()
            .unwrap()
    }

    fn select_first_two(editor: &mut Editor) {
        let state = editor.state();
        let blocks = state.children_of(state.root_key()).to_vec();
        let one = state.children_of(&blocks[0])[0].clone();
        let two = state.children_of(&blocks[1])[0].clone();
        editor
            .select(NativeSelection {
                anchor: Point::new(one, 1),
                focus: Point::new(two, 2),
            })
            .unwrap();
    }

    #[test]
    fn test_insert_collapsible_wraps_selected_blocks() {
        let mut editor = editor();
        select_first_two(&mut editor);
        assert!(editor.dispatch(Command::InsertCollapsible).unwrap());
        editor.verify().unwrap();

        let exported = editor.export_json();
        let section = &exported["children"][0];
        assert_eq!(section["type"], json!("collapsible"));
        assert_eq!(section["open"], json!(true));
        assert_eq!(section["children"].as_array().unwrap().len(), 2);
        assert_eq!(exported["children"][1]["children"][0]["text"], json!("three"));
    }

    #[test]
    fn test_toggle_collapsible_from_inside_and_undo() {
        let mut editor = editor();
        select_first_two(&mut editor);
        editor.dispatch(Command::InsertCollapsible).unwrap();

        assert!(editor.dispatch(Command::ToggleCollapsible { key: None }).unwrap());
        assert_eq!(editor.export_json()["children"][0]["open"], json!(false));

        editor.undo().unwrap();
        assert_eq!(editor.export_json()["children"][0]["open"], json!(true));
    }

    #[test]
    fn test_toggle_outside_section_is_unhandled() {
        let mut editor = editor();
        assert!(!editor.dispatch(Command::ToggleCollapsible { key: None }).unwrap());
        let root = editor.state().root_key().clone();
        assert!(!editor
            .dispatch(Command::ToggleCollapsible { key: Some(root) })
            .unwrap());
    }
}

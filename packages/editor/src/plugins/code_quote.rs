//! Code blocks and block quotes.
//!
//! Enter inside a code block adds a line break instead of a new block. A
//! second Enter on a trailing empty line leaves the block:
//!
//! ```text
//!   code "a"     ⏎  ──▶  code "a\n"
//!   code "a\n"   ⏎  ──▶  code "a" + paragraph ""
//! ```

use tracing::debug;

use crate::commands::{BlockType, Command, CommandKind, CommandPriority};
use crate::editor::Editor;
use crate::errors::EditorResult;
use crate::history::EditKind;
use crate::node::{NodeKey, NodePayload, NodeType};
use crate::plugins::{Plugin, PluginScope};
use crate::selection::{Point, Selection};
use crate::state::EditorState;
use crate::transforms;

pub const NAME: &str = "code-quote";

pub struct CodeQuotePlugin;

impl Plugin for CodeQuotePlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&self, scope: &mut PluginScope<'_>) -> EditorResult<()> {
        let priority = CommandPriority::High;
        scope.register(CommandKind::InsertCodeBlock, priority, |command, editor| match command {
            Command::InsertCodeBlock { language } => toggle(
                editor,
                NodeType::Code,
                NodePayload::Code {
                    language: language.clone(),
                },
            ),
            _ => Ok(false),
        });
        scope.register(CommandKind::InsertQuote, priority, |_, editor| {
            toggle(editor, NodeType::Quote, NodePayload::Quote)
        });
        scope.register(CommandKind::FormatBlock, priority, |command, editor| match command {
            Command::FormatBlock { block: BlockType::Code } => {
                convert(editor, NodeType::Code, NodePayload::Code { language: None })
            }
            Command::FormatBlock { block: BlockType::Quote } => convert(editor, NodeType::Quote, NodePayload::Quote),
            _ => Ok(false),
        });
        scope.register(CommandKind::SetCodeLanguage, priority, |command, editor| match command {
            Command::SetCodeLanguage { language } => set_language(editor, language.as_deref()),
            _ => Ok(false),
        });
        scope.register(CommandKind::InsertParagraph, priority, |_, editor| code_newline(editor));
        Ok(())
    }
}

fn selected_of_type(state: &EditorState, node_type: NodeType) -> (Vec<NodeKey>, bool) {
    let blocks = transforms::selected_text_blocks(state);
    let all = !blocks.is_empty() && blocks.iter().all(|b| state.node_type(b) == Some(node_type));
    (blocks, all)
}

/// Convert the selected blocks to `payload`, or back to paragraphs when
/// they already are `node_type`.
fn toggle(editor: &mut Editor, node_type: NodeType, payload: NodePayload) -> EditorResult<bool> {
    let (blocks, all) = selected_of_type(editor.state(), node_type);
    if blocks.is_empty() {
        return Ok(false);
    }
    let target = if all { NodePayload::Paragraph } else { payload };
    debug!(blocks = blocks.len(), to = %target.node_type(), "toggling block type");
    editor.update(EditKind::Structural, |tx| transforms::set_block_type(tx, &target))?;
    Ok(true)
}

/// Like [`toggle`] without the way back; blocks already of `node_type` keep
/// their payload.
fn convert(editor: &mut Editor, node_type: NodeType, payload: NodePayload) -> EditorResult<bool> {
    let (blocks, all) = selected_of_type(editor.state(), node_type);
    if blocks.is_empty() {
        return Ok(false);
    }
    if !all {
        editor.update(EditKind::Structural, |tx| transforms::set_block_type(tx, &payload))?;
    }
    Ok(true)
}

fn set_language(editor: &mut Editor, language: Option<&str>) -> EditorResult<bool> {
    let state = editor.state();
    let blocks: Vec<NodeKey> = transforms::selected_text_blocks(state)
        .into_iter()
        .filter(|b| state.node_type(b) == Some(NodeType::Code))
        .collect();
    if blocks.is_empty() {
        return Ok(false);
    }
    let language = language.filter(|l| !l.is_empty()).map(str::to_string);
    editor.update(EditKind::Formatting, |tx| {
        for block in &blocks {
            if let NodePayload::Code { language: current } = &mut tx.node_mut(block)?.payload {
                current.clone_from(&language);
            }
        }
        Ok(())
    })?;
    Ok(true)
}

fn caret_at_end(state: &EditorState, block: &NodeKey, point: &Point) -> bool {
    if &point.key == block {
        return point.offset >= state.children_of(block).len();
    }
    let last = state.last_descendant(block);
    point.key == last && state.node(&last).map(|n| n.size()).unwrap_or(0) == point.offset
}

fn code_newline(editor: &mut Editor) -> EditorResult<bool> {
    let state = editor.state();
    let range = match state.selection() {
        Some(Selection::Range(range)) => range.clone(),
        _ => return Ok(false),
    };
    let block = match state.block_of(&range.anchor.key) {
        Some(block) if state.node_type(&block) == Some(NodeType::Code) => block,
        _ => return Ok(false),
    };
    let exits = range.is_collapsed()
        && caret_at_end(state, &block, &range.anchor)
        && state.text_content(&block).ends_with('\n');

    if exits {
        editor.update(EditKind::Structural, |tx| {
            transforms::delete_character(tx, true)?;
            let paragraph = tx.create_node(NodePayload::Paragraph)?;
            tx.insert_after(&block, &paragraph)?;
            transforms::set_caret(tx, Point::new(paragraph, 0))?;
            Ok(())
        })?;
    } else {
        editor.update(EditKind::Typing, |tx| transforms::insert_text(tx, "\n"))?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::clock::ManualClock;

    fn editor() -> Editor {
        Editor::builder()
            .clock(Rc::new(ManualClock::new(0)))
            .build()
            .unwrap()
    }

    fn blocks(editor: &Editor) -> Vec<(NodeType, String)> {
        let state = editor.state();
        state
            .children_of(state.root_key())
            .iter()
            .map(|k| (state.node_type(k).unwrap(), state.text_content(k)))
            .collect()
    }

    #[test]
    fn test_code_block_toggles_with_language() {
        let mut editor = editor();
        editor.dispatch(Command::insert_text("let x = 1;")).unwrap();
        editor
            .dispatch(Command::InsertCodeBlock {
                language: Some("rust".into()),
            })
            .unwrap();

        assert_eq!(blocks(&editor)[0].0, NodeType::Code);
        let toolbar = editor.toolbar();
        assert_eq!(toolbar.block_type, BlockType::Code);
        assert_eq!(toolbar.code_language.as_deref(), Some("rust"));

        editor.dispatch(Command::InsertCodeBlock { language: None }).unwrap();
        assert_eq!(blocks(&editor), vec![(NodeType::Paragraph, "let x = 1;".to_string())]);
    }

    #[test]
    fn test_set_code_language_only_touches_code() {
        let mut editor = editor();
        editor.dispatch(Command::insert_text("x")).unwrap();
        assert!(!editor
            .dispatch(Command::SetCodeLanguage {
                language: Some("js".into()),
            })
            .unwrap());

        editor.dispatch(Command::FormatBlock { block: BlockType::Code }).unwrap();
        editor
            .dispatch(Command::SetCodeLanguage {
                language: Some("js".into()),
            })
            .unwrap();
        assert_eq!(editor.toolbar().code_language.as_deref(), Some("js"));

        editor.dispatch(Command::SetCodeLanguage { language: None }).unwrap();
        assert_eq!(editor.toolbar().code_language, None);
    }

    #[test]
    fn test_enter_in_code_adds_line_then_exits() {
        let mut editor = editor();
        editor.dispatch(Command::insert_text("a")).unwrap();
        editor.dispatch(Command::InsertCodeBlock { language: None }).unwrap();

        editor.dispatch(Command::InsertParagraph).unwrap();
        assert_eq!(blocks(&editor), vec![(NodeType::Code, "a\n".to_string())]);

        editor.dispatch(Command::InsertParagraph).unwrap();
        assert_eq!(
            blocks(&editor),
            vec![(NodeType::Code, "a".to_string()), (NodeType::Paragraph, String::new())]
        );
        editor.dispatch(Command::insert_text("b")).unwrap();
        assert_eq!(blocks(&editor)[1], (NodeType::Paragraph, "b".to_string()));
    }

    #[test]
    fn test_quote_toggle_and_format_block() {
        let mut editor = editor();
        editor.dispatch(Command::insert_text("said")).unwrap();

        editor.dispatch(Command::InsertQuote).unwrap();
        assert_eq!(blocks(&editor)[0].0, NodeType::Quote);
        editor.dispatch(Command::InsertQuote).unwrap();
        assert_eq!(blocks(&editor)[0].0, NodeType::Paragraph);

        editor.dispatch(Command::FormatBlock { block: BlockType::Quote }).unwrap();
        editor.dispatch(Command::FormatBlock { block: BlockType::Quote }).unwrap();
        assert_eq!(blocks(&editor)[0].0, NodeType::Quote);
        editor.dispatch(Command::InsertParagraph).unwrap();
        assert_eq!(blocks(&editor).len(), 2);
    }
}

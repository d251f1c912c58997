//! Baseline editing: text input, deletion, paragraphs and inline formatting.
//!
//! Every handler here runs at [`CommandPriority::Editor`], so any other
//! plugin can take a command first and fall through to this one.

use crate::commands::{BlockType, Command, CommandKind, CommandPriority};
use crate::editor::Editor;
use crate::errors::EditorResult;
use crate::history::EditKind;
use crate::node::{Alignment, NodePayload, Style};
use crate::plugins::{Plugin, PluginScope};
use crate::selection::{reconcile, NativeSelection, Selection};
use crate::store::NodeStore;
use crate::transforms;

pub const NAME: &str = "rich-text";

pub struct RichTextPlugin;

impl Plugin for RichTextPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&self, scope: &mut PluginScope<'_>) -> EditorResult<()> {
        let priority = CommandPriority::Editor;
        scope.register(CommandKind::SelectionChange, priority, |command, editor| match command {
            Command::SelectionChange { anchor, focus } => select(
                editor,
                NativeSelection {
                    anchor: anchor.clone(),
                    focus: focus.clone(),
                },
            ),
            _ => Ok(false),
        });
        scope.register(CommandKind::InsertText, priority, |command, editor| match command {
            Command::InsertText { text } => with_range(editor, EditKind::Typing, |tx| transforms::insert_text(tx, text)),
            _ => Ok(false),
        });
        scope.register(CommandKind::DeleteCharacter, priority, |command, editor| match command {
            Command::DeleteCharacter { backward } => {
                let backward = *backward;
                with_range(editor, EditKind::Structural, |tx| transforms::delete_character(tx, backward))
            }
            _ => Ok(false),
        });
        scope.register(CommandKind::DeleteSelection, priority, |_, editor| {
            let expanded = editor
                .selection()
                .and_then(Selection::as_range)
                .map(|range| !range.is_collapsed())
                .unwrap_or(false);
            if !expanded {
                return Ok(false);
            }
            editor.update(EditKind::Structural, transforms::delete_range)?;
            Ok(true)
        });
        scope.register(CommandKind::InsertParagraph, priority, |_, editor| {
            with_range(editor, EditKind::Structural, transforms::insert_paragraph)
        });
        scope.register(CommandKind::FormatText, priority, |command, editor| match command {
            Command::FormatText { format } => {
                let flag = format.bits();
                with_range(editor, EditKind::Formatting, |tx| transforms::format_text(tx, flag))
            }
            _ => Ok(false),
        });
        scope.register(CommandKind::FormatStyle, priority, |command, editor| match command {
            Command::FormatStyle { property, value } => {
                if !value.trim().is_empty() && !Style::accepts(property, value) {
                    return Ok(false);
                }
                editor.sticky_mut().record(property, value);
                with_range(editor, EditKind::Formatting, |tx| transforms::format_style(tx, property, value))
            }
            _ => Ok(false),
        });
        scope.register(CommandKind::FormatElement, priority, |command, editor| match command {
            Command::FormatElement { align } => align_blocks(editor, *align),
            _ => Ok(false),
        });
        scope.register(CommandKind::FormatBlock, priority, |command, editor| {
            let payload = match command {
                Command::FormatBlock {
                    block: BlockType::Paragraph,
                } => NodePayload::Paragraph,
                Command::FormatBlock { block } => match block.heading_tag() {
                    Some(tag) => NodePayload::Heading { tag },
                    None => return Ok(false),
                },
                _ => return Ok(false),
            };
            with_range(editor, EditKind::Structural, |tx| transforms::set_block_type(tx, &payload))
        });
        scope.register(CommandKind::IndentContent, priority, |_, editor| indent(editor, false));
        scope.register(CommandKind::OutdentContent, priority, |_, editor| indent(editor, true));
        Ok(())
    }
}

/// Run `f` as an edit of `kind` when the selection is a range.
fn with_range<F>(editor: &mut Editor, kind: EditKind, f: F) -> EditorResult<bool>
where
    F: FnOnce(&mut NodeStore) -> EditorResult<()>,
{
    if editor.selection().is_none() {
        return Ok(false);
    }
    editor.update(kind, f)?;
    Ok(true)
}

fn select(editor: &mut Editor, native: NativeSelection) -> EditorResult<bool> {
    let selection = match reconcile(editor.state(), &native, editor.selection()) {
        Some(selection) => selection,
        None => return Ok(false),
    };
    editor.update(EditKind::Selection, |tx| tx.set_selection(Some(selection)).map_err(Into::into))?;
    Ok(true)
}

fn align_blocks(editor: &mut Editor, align: Alignment) -> EditorResult<bool> {
    let mut handled = false;
    editor.update(EditKind::Formatting, |tx| {
        handled = transforms::set_alignment(tx, align)?;
        Ok(())
    })?;
    Ok(handled)
}

fn indent(editor: &mut Editor, outdent: bool) -> EditorResult<bool> {
    let max = editor.config().max_indent_depth;
    let mut handled = false;
    editor.update(EditKind::Formatting, |tx| {
        handled = transforms::shift_indent(tx, outdent, max)?;
        Ok(())
    })?;
    Ok(handled)
}

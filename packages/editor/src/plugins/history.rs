//! Undo and redo as commands.

use crate::commands::{CommandKind, CommandPriority};
use crate::editor::Editor;
use crate::errors::EditorResult;
use crate::plugins::{Plugin, PluginScope};

pub const NAME: &str = "history";

pub struct HistoryPlugin;

impl Plugin for HistoryPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&self, scope: &mut PluginScope<'_>) -> EditorResult<()> {
        let priority = CommandPriority::Editor;
        scope.register(CommandKind::Undo, priority, |_, editor| editor.undo());
        scope.register(CommandKind::Redo, priority, |_, editor| editor.redo());
        scope.register(CommandKind::ClearHistory, priority, |_, editor| {
            editor.clear_history();
            Ok(true)
        });
        Ok(())
    }

    fn teardown(&self, editor: &mut Editor) {
        editor.clear_history();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::clock::ManualClock;
    use crate::commands::Command;

    #[test]
    fn test_undo_redo_commands() {
        let mut editor = Editor::builder()
            .clock(Rc::new(ManualClock::new(0)))
            .build()
            .unwrap();
        assert!(!editor.dispatch(Command::Undo).unwrap());

        editor.dispatch(Command::insert_text("hi")).unwrap();
        assert!(editor.dispatch(Command::Undo).unwrap());
        assert_eq!(editor.state().text_content(editor.state().root_key()), "");
        assert!(editor.dispatch(Command::Redo).unwrap());
        assert_eq!(editor.state().text_content(editor.state().root_key()), "hi");

        editor.dispatch(Command::ClearHistory).unwrap();
        assert!(!editor.toolbar().can_undo);
    }

    #[test]
    fn test_teardown_drops_history_commands() {
        let mut editor = Editor::builder()
            .clock(Rc::new(ManualClock::new(0)))
            .build()
            .unwrap();
        editor.dispatch(Command::insert_text("hi")).unwrap();
        editor.unregister_plugin(NAME).unwrap();

        assert!(!editor.history().can_undo());
        assert!(!editor.dispatch(Command::Undo).unwrap());
        assert_eq!(editor.state().text_content(editor.state().root_key()), "hi");
    }
}

//! # Plugins
//!
//! A plugin is a bundle of command handlers set up against one editor. Each
//! plugin gets its own handler scope, and tearing the plugin down drops the
//! scope with everything registered through it.
//!
//! ```text
//!   priority   plugin        handles
//!   High       code-quote    code blocks, quotes, Enter inside code
//!   Normal     list          list toggles, indent, Enter inside items
//!   Normal     embed         images, embeds, rules, node selections
//!   Normal     collapsible   collapsible sections
//!   Editor     rich-text     text input, deletion, formatting fallbacks
//!   Editor     history       undo, redo, clearing history
//! ```

pub mod code_quote;
pub mod collapsible;
pub mod embed;
pub mod history;
pub mod list;
pub mod rich_text;

use std::rc::Rc;

use crate::commands::{Command, CommandKind, CommandPriority, HandlerId, ScopeId};
use crate::editor::Editor;
use crate::errors::EditorResult;

/// Formatting extension installed into an [`Editor`]
pub trait Plugin {
    fn name(&self) -> &'static str;

    /// Register handlers through `scope`.
    fn setup(&self, scope: &mut PluginScope<'_>) -> EditorResult<()>;

    /// Called after the plugin's handlers were dropped.
    fn teardown(&self, _editor: &mut Editor) {}
}

/// Registration context handed to [`Plugin::setup`]
pub struct PluginScope<'a> {
    editor: &'a mut Editor,
    scope: ScopeId,
}

impl<'a> PluginScope<'a> {
    pub(crate) fn new(editor: &'a mut Editor, scope: ScopeId) -> Self {
        Self { editor, scope }
    }

    /// Register a handler owned by the plugin being set up.
    pub fn register<F>(&mut self, kind: CommandKind, priority: CommandPriority, handler: F) -> HandlerId
    where
        F: Fn(&Command, &mut Editor) -> EditorResult<bool> + 'static,
    {
        self.editor.register_scoped(kind, priority, self.scope, Rc::new(handler))
    }

    pub fn editor(&mut self) -> &mut Editor {
        self.editor
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }
}

/// Built-in plugin by name
pub fn builtin(name: &str) -> Option<Rc<dyn Plugin>> {
    let plugin: Rc<dyn Plugin> = match name {
        rich_text::NAME => Rc::new(rich_text::RichTextPlugin),
        list::NAME => Rc::new(list::ListPlugin),
        embed::NAME => Rc::new(embed::EmbedPlugin),
        code_quote::NAME => Rc::new(code_quote::CodeQuotePlugin),
        collapsible::NAME => Rc::new(collapsible::CollapsiblePlugin),
        history::NAME => Rc::new(history::HistoryPlugin),
        _ => return None,
    };
    Some(plugin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BUILTIN_PLUGINS;

    #[test]
    fn test_every_builtin_resolves_under_its_name() {
        for name in BUILTIN_PLUGINS {
            let plugin = builtin(name).unwrap();
            assert_eq!(plugin.name(), name);
        }
        assert!(builtin("spellcheck").is_none());
    }
}

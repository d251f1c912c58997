//! # Commands
//!
//! Commands are named editing intents. Handlers register for a
//! [`CommandKind`] with a [`CommandPriority`]; dispatch walks them from the
//! highest priority down and stops at the first handler that reports the
//! command as handled.
//!
//! ```text
//!   dispatch(FORMAT_BLOCK)
//!        │
//!        ├─ Critical ─ ...
//!        ├─ High ───── code-quote: Code | Quote ──▶ handled, stop
//!        ├─ Normal ─── list: Bullet | Number | Check
//!        └─ Editor ─── rich-text: Paragraph | H1..H6
//! ```
//!
//! Every registration belongs to a scope. Tearing a plugin down drops its
//! whole scope, so handlers never outlive the plugin that added them.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::editor::Editor;
use crate::errors::EditorResult;
use crate::node::{Alignment, EmbedKind, FormatFlag, HeadingTag, ListType, NodeKey};
use crate::selection::{NativeSelection, Point};

/// Editing intents understood by the built-in plugins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// The platform selection moved
    SelectionChange { anchor: Point, focus: Point },

    /// Insert text at the selection, replacing selected content
    InsertText { text: String },

    /// Delete one character (or the selected content)
    DeleteCharacter {
        #[serde(default = "default_true")]
        backward: bool,
    },

    DeleteSelection,

    /// Split the current block at the caret
    InsertParagraph,

    /// Toggle a text format over the selection
    FormatText { format: FormatFlag },

    /// Set an inline style property; an empty value clears it
    FormatStyle { property: String, value: String },

    /// Align the selected blocks
    FormatElement { align: Alignment },

    /// Turn the selected blocks into `block`
    FormatBlock { block: BlockType },

    InsertUnorderedList,
    InsertOrderedList,
    InsertCheckList,
    RemoveList,

    IndentContent,
    OutdentContent,

    /// Flip a check list item, or the one under the caret
    ToggleChecked {
        #[serde(default)]
        key: Option<NodeKey>,
    },

    InsertImage {
        src: String,
        #[serde(default, rename = "altText")]
        alt_text: String,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
        #[serde(default, rename = "showCaption")]
        show_caption: bool,
    },

    InsertEmbed {
        kind: EmbedKind,
        src: String,
        width: u32,
        height: u32,
    },

    /// Resize an image or embed
    ResizeEmbed { key: NodeKey, width: u32, height: u32 },

    /// Show or hide an image caption, creating it on first use
    ToggleCaption {
        #[serde(default)]
        key: Option<NodeKey>,
    },

    InsertHorizontalRule,

    /// Toggle the selected blocks into code blocks
    InsertCodeBlock {
        #[serde(default)]
        language: Option<String>,
    },

    SetCodeLanguage {
        #[serde(default)]
        language: Option<String>,
    },

    /// Toggle the selected blocks into quotes
    InsertQuote,

    /// Wrap the selected top-level blocks in a collapsible section
    InsertCollapsible,

    ToggleCollapsible {
        #[serde(default)]
        key: Option<NodeKey>,
    },

    Undo,
    Redo,
    ClearHistory,
}

fn default_true() -> bool {
    true
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::SelectionChange { .. } => CommandKind::SelectionChange,
            Command::InsertText { .. } => CommandKind::InsertText,
            Command::DeleteCharacter { .. } => CommandKind::DeleteCharacter,
            Command::DeleteSelection => CommandKind::DeleteSelection,
            Command::InsertParagraph => CommandKind::InsertParagraph,
            Command::FormatText { .. } => CommandKind::FormatText,
            Command::FormatStyle { .. } => CommandKind::FormatStyle,
            Command::FormatElement { .. } => CommandKind::FormatElement,
            Command::FormatBlock { .. } => CommandKind::FormatBlock,
            Command::InsertUnorderedList => CommandKind::InsertUnorderedList,
            Command::InsertOrderedList => CommandKind::InsertOrderedList,
            Command::InsertCheckList => CommandKind::InsertCheckList,
            Command::RemoveList => CommandKind::RemoveList,
            Command::IndentContent => CommandKind::IndentContent,
            Command::OutdentContent => CommandKind::OutdentContent,
            Command::ToggleChecked { .. } => CommandKind::ToggleChecked,
            Command::InsertImage { .. } => CommandKind::InsertImage,
            Command::InsertEmbed { .. } => CommandKind::InsertEmbed,
            Command::ResizeEmbed { .. } => CommandKind::ResizeEmbed,
            Command::ToggleCaption { .. } => CommandKind::ToggleCaption,
            Command::InsertHorizontalRule => CommandKind::InsertHorizontalRule,
            Command::InsertCodeBlock { .. } => CommandKind::InsertCodeBlock,
            Command::SetCodeLanguage { .. } => CommandKind::SetCodeLanguage,
            Command::InsertQuote => CommandKind::InsertQuote,
            Command::InsertCollapsible => CommandKind::InsertCollapsible,
            Command::ToggleCollapsible { .. } => CommandKind::ToggleCollapsible,
            Command::Undo => CommandKind::Undo,
            Command::Redo => CommandKind::Redo,
            Command::ClearHistory => CommandKind::ClearHistory,
        }
    }

    pub fn selection_change(native: NativeSelection) -> Self {
        Command::SelectionChange {
            anchor: native.anchor,
            focus: native.focus,
        }
    }

    pub fn insert_text(text: impl Into<String>) -> Self {
        Command::InsertText { text: text.into() }
    }
}

/// Command names, used as dispatch keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SelectionChange,
    InsertText,
    DeleteCharacter,
    DeleteSelection,
    InsertParagraph,
    FormatText,
    FormatStyle,
    FormatElement,
    FormatBlock,
    InsertUnorderedList,
    InsertOrderedList,
    InsertCheckList,
    RemoveList,
    IndentContent,
    OutdentContent,
    ToggleChecked,
    InsertImage,
    InsertEmbed,
    ResizeEmbed,
    ToggleCaption,
    InsertHorizontalRule,
    InsertCodeBlock,
    SetCodeLanguage,
    InsertQuote,
    InsertCollapsible,
    ToggleCollapsible,
    Undo,
    Redo,
    ClearHistory,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::SelectionChange => "SELECTION_CHANGE",
            CommandKind::InsertText => "INSERT_TEXT",
            CommandKind::DeleteCharacter => "DELETE_CHARACTER",
            CommandKind::DeleteSelection => "DELETE_SELECTION",
            CommandKind::InsertParagraph => "INSERT_PARAGRAPH",
            CommandKind::FormatText => "FORMAT_TEXT",
            CommandKind::FormatStyle => "FORMAT_STYLE",
            CommandKind::FormatElement => "FORMAT_ELEMENT",
            CommandKind::FormatBlock => "FORMAT_BLOCK",
            CommandKind::InsertUnorderedList => "INSERT_UNORDERED_LIST",
            CommandKind::InsertOrderedList => "INSERT_ORDERED_LIST",
            CommandKind::InsertCheckList => "INSERT_CHECK_LIST",
            CommandKind::RemoveList => "REMOVE_LIST",
            CommandKind::IndentContent => "INDENT_CONTENT",
            CommandKind::OutdentContent => "OUTDENT_CONTENT",
            CommandKind::ToggleChecked => "TOGGLE_CHECKED",
            CommandKind::InsertImage => "INSERT_IMAGE",
            CommandKind::InsertEmbed => "INSERT_EMBED",
            CommandKind::ResizeEmbed => "RESIZE_EMBED",
            CommandKind::ToggleCaption => "TOGGLE_CAPTION",
            CommandKind::InsertHorizontalRule => "INSERT_HORIZONTAL_RULE",
            CommandKind::InsertCodeBlock => "INSERT_CODE_BLOCK",
            CommandKind::SetCodeLanguage => "SET_CODE_LANGUAGE",
            CommandKind::InsertQuote => "INSERT_QUOTE",
            CommandKind::InsertCollapsible => "INSERT_COLLAPSIBLE",
            CommandKind::ToggleCollapsible => "TOGGLE_COLLAPSIBLE",
            CommandKind::Undo => "UNDO",
            CommandKind::Redo => "REDO",
            CommandKind::ClearHistory => "CLEAR_HISTORY",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Block shapes offered by the block-type dropdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    #[default]
    Paragraph,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Quote,
    Code,
    Bullet,
    Number,
    Check,
}

impl BlockType {
    pub fn heading(tag: HeadingTag) -> Self {
        match tag {
            HeadingTag::H1 => BlockType::H1,
            HeadingTag::H2 => BlockType::H2,
            HeadingTag::H3 => BlockType::H3,
            HeadingTag::H4 => BlockType::H4,
            HeadingTag::H5 => BlockType::H5,
            HeadingTag::H6 => BlockType::H6,
        }
    }

    pub fn heading_tag(self) -> Option<HeadingTag> {
        Some(match self {
            BlockType::H1 => HeadingTag::H1,
            BlockType::H2 => HeadingTag::H2,
            BlockType::H3 => HeadingTag::H3,
            BlockType::H4 => HeadingTag::H4,
            BlockType::H5 => HeadingTag::H5,
            BlockType::H6 => HeadingTag::H6,
            _ => return None,
        })
    }

    pub fn list(list_type: ListType) -> Self {
        match list_type {
            ListType::Bullet => BlockType::Bullet,
            ListType::Number => BlockType::Number,
            ListType::Check => BlockType::Check,
        }
    }

    pub fn list_type(self) -> Option<ListType> {
        match self {
            BlockType::Bullet => Some(ListType::Bullet),
            BlockType::Number => Some(ListType::Number),
            BlockType::Check => Some(ListType::Check),
            _ => None,
        }
    }
}

/// Dispatch order. Higher runs first; equal priorities run in registration
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandPriority {
    Editor = 0,
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

/// A command handler. Returns `Ok(true)` when the command was handled.
pub type CommandHandler = Rc<dyn Fn(&Command, &mut Editor) -> EditorResult<bool>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Lifetime group of handlers, usually one per plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    /// Handlers registered directly on the editor
    pub const EDITOR: ScopeId = ScopeId(0);
}

struct Registration {
    id: HandlerId,
    kind: CommandKind,
    priority: CommandPriority,
    scope: ScopeId,
    handler: CommandHandler,
}

/// Priority-ordered handler table
#[derive(Default)]
pub struct CommandBus {
    registrations: Vec<Registration>,
    next_id: u64,
    next_scope: u64,
}

impl fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBus")
            .field("handlers", &self.registrations.len())
            .finish()
    }
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new handler scope.
    pub fn new_scope(&mut self) -> ScopeId {
        self.next_scope += 1;
        ScopeId(self.next_scope)
    }

    pub fn register(
        &mut self,
        kind: CommandKind,
        priority: CommandPriority,
        scope: ScopeId,
        handler: CommandHandler,
    ) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.registrations.push(Registration {
            id,
            kind,
            priority,
            scope,
            handler,
        });
        debug!(command = %kind, ?priority, "handler registered");
        id
    }

    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.id != id);
        self.registrations.len() != before
    }

    /// Drop every handler of `scope`. Returns how many were removed.
    pub fn unregister_scope(&mut self, scope: ScopeId) -> usize {
        let before = self.registrations.len();
        self.registrations.retain(|r| r.scope != scope);
        before - self.registrations.len()
    }

    /// Handlers for `kind` in dispatch order.
    pub fn handlers_for(&self, kind: CommandKind) -> Vec<CommandHandler> {
        let mut matching: Vec<&Registration> = self.registrations.iter().filter(|r| r.kind == kind).collect();
        // stable sort keeps registration order among equal priorities
        matching.sort_by(|a, b| b.priority.cmp(&a.priority));
        matching.into_iter().map(|r| Rc::clone(&r.handler)).collect()
    }

    pub fn has_handlers(&self, kind: CommandKind) -> bool {
        self.registrations.iter().any(|r| r.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

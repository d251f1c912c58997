//! # Inkwell Editor
//!
//! Document editing engine for Inkwell notes.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ platform input: keys, clicks, selection     │
//! └─────────────────────────────────────────────┘
//!                     ↓ Command
//! ┌─────────────────────────────────────────────┐
//! │ command bus: handlers by priority           │
//! │  - rich text, list, embed, code/quote ...   │
//! │  - one handler scope per plugin             │
//! └─────────────────────────────────────────────┘
//!                     ↓ transaction
//! ┌─────────────────────────────────────────────┐
//! │ node store: copy-on-write EditorState       │
//! │  - schema checked on commit                 │
//! └─────────────────────────────────────────────┘
//!                     ↓ commit
//! ┌─────────────────────────────────────────────┐
//! │ history, autosave, toolbar projection       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **State is immutable once committed**: every edit builds a new version
//! 2. **Commands, not callbacks**: all input goes through the bus
//! 3. **No data loss**: the save pipeline always ends on the latest content
//! 4. **Injectable time**: debounce and coalescing read an editor-owned clock
//!
//! ## Usage
//!
//! ```rust,ignore
//! use inkwell_editor::{Command, Editor, FormatFlag};
//!
//! let mut editor = Editor::builder().note_id("note-1").build()?;
//! editor.dispatch(Command::FormatText { format: FormatFlag::Bold })?;
//! editor.dispatch(Command::insert_text("Groceries"))?;
//! editor.dispatch(Command::InsertUnorderedList)?;
//!
//! let json = editor.export_json();
//! ```

pub mod assets;
pub mod autosave;
pub mod clock;
pub mod commands;
pub mod config;
pub mod editor;
pub mod errors;
pub mod history;
pub mod keys;
pub mod node;
pub mod plugins;
pub mod preview;
pub mod registry;
pub mod selection;
pub mod serializer;
pub mod state;
pub mod store;
pub mod toolbar;
mod transforms;

pub use assets::{ImageCompressor, PassThroughCompressor};
pub use autosave::{AutosaveEvent, NavigationDecision, Persistence, SaveAck, SaveRequest, SaveStatus, SaveTicket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{BlockType, Command, CommandKind, CommandPriority, HandlerId};
pub use config::EditorConfig;
pub use editor::{Editor, EditorBuilder};
pub use errors::{AssetError, EditorError, EditorResult, PersistenceError, TransactionError, ValidationError};
pub use history::EditKind;
pub use node::{Alignment, EmbedKind, FormatFlag, HeadingTag, ListType, Node, NodeKey, NodePayload, NodeType};
pub use plugins::{Plugin, PluginScope};
pub use preview::PreviewOptions;
pub use selection::{NativeSelection, Point, Selection};
pub use state::EditorState;
pub use store::{Commit, NodeStore};
pub use toolbar::ToolbarState;

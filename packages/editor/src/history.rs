//! # History Manager
//!
//! Bounded undo/redo stacks of committed [`EditorState`] snapshots.
//!
//! ## Design
//!
//! - Each undo step stores the state *before* the step was taken
//! - Undo pops that state and pushes the current one onto the redo stack
//! - Redo is the mirror image
//! - Recording a new step clears the redo stack
//! - Exceeding capacity evicts the oldest step
//!
//! ## Coalescing
//!
//! ```text
//!   type "a"   type "b"   type "c"   toggle list   type "d"
//!   ├──────── one step ───────────┤  ├─ step ─┤   ├─ step ─┤
//!          (each within the window)
//! ```
//!
//! Only [`EditKind::Typing`] merges, and only into a directly preceding typing
//! step recorded less than the coalesce window ago. Everything else starts a
//! new step. Selection-only commits never create steps.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::EditorState;

/// What kind of edit produced a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    /// Character insertion
    Typing,
    /// Deletion, block and list changes, embeds
    Structural,
    /// Text format, style, alignment and attribute changes
    Formatting,
    /// Selection moves without content changes
    Selection,
    /// Undo or redo themselves
    Historic,
}

impl EditKind {
    /// Edits that should be persisted without waiting for the debounce.
    pub fn saves_immediately(self) -> bool {
        matches!(self, EditKind::Structural)
    }
}

#[derive(Debug)]
pub struct HistoryManager {
    /// States before each step (most recent last)
    undo_stack: Vec<Arc<EditorState>>,

    /// States undone (most recent last)
    redo_stack: Vec<Arc<EditorState>>,

    /// Maximum number of undo steps (0 = unlimited)
    capacity: usize,

    coalesce_window_ms: u64,

    /// Kind and time of the last recorded commit
    last: Option<(EditKind, u64)>,
}

impl HistoryManager {
    pub fn new(capacity: usize, coalesce_window_ms: u64) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            capacity,
            coalesce_window_ms,
            last: None,
        }
    }

    /// Record a commit that moved the document away from `previous`.
    pub fn record(&mut self, kind: EditKind, previous: &Arc<EditorState>, content_changed: bool, now_ms: u64) {
        if kind == EditKind::Historic {
            return;
        }
        if kind == EditKind::Selection || !content_changed {
            // a caret jump ends the current typing burst
            if let Some((EditKind::Typing, _)) = self.last {
                self.last = Some((EditKind::Selection, now_ms));
            }
            return;
        }

        let merges = matches!(
            self.last,
            Some((EditKind::Typing, at)) if kind == EditKind::Typing
                && now_ms.saturating_sub(at) < self.coalesce_window_ms
        );
        self.last = Some((kind, now_ms));
        if merges && !self.undo_stack.is_empty() {
            debug!(version = previous.version(), "coalesced typing into previous undo step");
            return;
        }
        self.push(previous.clone());
    }

    fn push(&mut self, state: Arc<EditorState>) {
        self.undo_stack.push(state);

        if self.capacity > 0 && self.undo_stack.len() > self.capacity {
            self.undo_stack.remove(0);
        }

        self.redo_stack.clear();
    }

    /// Step back. Returns the state to restore, or `None` when there is
    /// nothing to undo.
    pub fn undo(&mut self, current: &Arc<EditorState>) -> Option<Arc<EditorState>> {
        let target = self.undo_stack.pop()?;
        self.redo_stack.push(current.clone());
        self.last = Some((EditKind::Historic, 0));
        debug!(undo_levels = self.undo_stack.len(), "undo");
        Some(target)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: &Arc<EditorState>) -> Option<Arc<EditorState>> {
        let target = self.redo_stack.pop()?;
        self.undo_stack.push(current.clone());
        self.last = Some((EditKind::Historic, 0));
        debug!(redo_levels = self.redo_stack.len(), "redo");
        Some(target)
    }

    /// Put back a step taken by `undo`/`redo` whose restore failed.
    pub(crate) fn revert_undo(&mut self, target: Arc<EditorState>) {
        self.redo_stack.pop();
        self.undo_stack.push(target);
    }

    pub(crate) fn revert_redo(&mut self, target: Arc<EditorState>) {
        self.undo_stack.pop();
        self.redo_stack.push(target);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.last = None;
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(100, 1000)
    }
}

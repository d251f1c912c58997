//! # Autosave Pipeline
//!
//! A finite state machine driven by an injected clock. Nothing in here owns a
//! timer: the host asks [`AutosavePipeline::is_due`] (or just polls
//! [`AutosavePipeline::begin_save`]) and reports each save's outcome back.
//!
//! ```text
//!            debounce elapsed / structural edit
//!   editing ─────────────────────────────────────▶ saving
//!      ▲                                             │
//!      │◀──────────────── success ───────────────────┤
//!      │                                             │ failure
//!      └──────────────────────── error ◀─────────────┘
//! ```
//!
//! ## Supersession
//!
//! Every save carries a sequence number. A newer save may start while an
//! older one is still in flight; when the older one completes afterwards its
//! result is ignored. Saves are full-document overwrites, so the newest one
//! is the only one that matters.
//!
//! ## Failures
//!
//! A failed save leaves the document dirty and restarts the debounce, so the
//! next quiet period retries with whatever content is current by then.

use std::collections::VecDeque;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{EditorResult, PersistenceError};
use crate::preview::{self, PreviewOptions};
use crate::registry::NodeTypeRegistry;
use crate::serializer;
use crate::state::EditorState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    Editing,
    Saving,
    Error,
}

/// Queued for the host UI
#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveEvent {
    StatusChanged { from: SaveStatus, to: SaveStatus },
    /// Non-blocking message, e.g. a failed save
    Notice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    /// Unsaved or in-flight content; ask before leaving
    Confirm,
}

/// Payload handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    /// Plain-text preview
    pub body: String,
    /// Representative image URI or `""`
    pub image: String,
    /// Serialized document
    pub state: String,
    pub note_id: String,
    /// Optimistic concurrency token
    pub state_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveTicket {
    pub sequence: u64,
    /// Version of the state that was serialized
    pub version: u64,
    pub request: SaveRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAck {
    /// Replacement concurrency token
    #[serde(default)]
    pub state_id: Option<String>,
}

/// Storage backend for saves
pub trait Persistence {
    fn save(&self, request: &SaveRequest) -> impl Future<Output = Result<SaveAck, PersistenceError>>;
}

#[derive(Debug)]
pub struct AutosavePipeline {
    note_id: String,
    state_id: String,
    debounce_ms: u64,
    status: SaveStatus,

    /// Content changed since the last save began
    dirty: bool,
    last_change: Option<u64>,
    immediate: bool,

    next_sequence: u64,
    /// Sequence and state version of the latest save not yet completed
    in_flight: Option<(u64, u64)>,
    saved_version: Option<u64>,

    events: VecDeque<AutosaveEvent>,
}

impl AutosavePipeline {
    pub fn new(note_id: String, state_id: String, debounce_ms: u64) -> Self {
        Self {
            note_id,
            state_id,
            debounce_ms,
            status: SaveStatus::Editing,
            dirty: false,
            last_change: None,
            immediate: false,
            next_sequence: 1,
            in_flight: None,
            saved_version: None,
            events: VecDeque::new(),
        }
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn state_id(&self) -> &str {
        &self.state_id
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Version of the last state persisted successfully
    pub fn saved_version(&self) -> Option<u64> {
        self.saved_version
    }

    /// Record a content change. `immediate` skips the debounce.
    pub fn note_change(&mut self, now_ms: u64, immediate: bool) {
        self.dirty = true;
        self.last_change = Some(now_ms);
        self.immediate |= immediate;
    }

    /// Make a save due right away, whether or not anything changed.
    pub fn force(&mut self, now_ms: u64) {
        self.dirty = true;
        self.immediate = true;
        self.last_change = Some(now_ms);
    }

    /// When the next save becomes due
    pub fn deadline(&self) -> Option<u64> {
        if !self.dirty {
            return None;
        }
        let last = self.last_change?;
        if self.immediate {
            Some(last)
        } else {
            Some(last.saturating_add(self.debounce_ms))
        }
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.deadline().is_some_and(|deadline| now_ms >= deadline)
    }

    /// Serialize `state` into a save request when a save is due.
    pub fn begin_save(
        &mut self,
        now_ms: u64,
        state: &EditorState,
        registry: &NodeTypeRegistry,
        options: &PreviewOptions,
    ) -> EditorResult<Option<SaveTicket>> {
        if !self.is_due(now_ms) {
            return Ok(None);
        }
        let request = SaveRequest {
            body: preview::generate(state, options),
            image: preview::representative_image(state),
            state: serializer::export_string(state, registry)?,
            note_id: self.note_id.clone(),
            state_id: self.state_id.clone(),
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        if let Some((previous, _)) = self.in_flight.replace((sequence, state.version())) {
            debug!(previous, sequence, "save superseded");
        }
        self.dirty = false;
        self.immediate = false;
        self.set_status(SaveStatus::Saving);
        info!(sequence, version = state.version(), "save started");

        Ok(Some(SaveTicket {
            sequence,
            version: state.version(),
            request,
        }))
    }

    /// Report the outcome of save `sequence`. Outcomes of superseded saves
    /// are ignored.
    pub fn complete(&mut self, sequence: u64, result: Result<SaveAck, PersistenceError>, now_ms: u64) {
        let version = match self.in_flight {
            Some((latest, version)) if latest == sequence => version,
            _ => {
                debug!(sequence, latest = ?self.in_flight, "stale save completion ignored");
                return;
            }
        };
        self.in_flight = None;

        match result {
            Ok(ack) => {
                if let Some(state_id) = ack.state_id {
                    self.state_id = state_id;
                }
                self.saved_version = Some(version);
                info!(sequence, "save succeeded");
                self.set_status(SaveStatus::Editing);
            }
            Err(e) => {
                warn!(sequence, error = %e, "save failed");
                self.set_status(SaveStatus::Error);
                self.events.push_back(AutosaveEvent::Notice(format!("Couldn't save your changes: {e}")));
                self.dirty = true;
                self.last_change = Some(now_ms);
                self.set_status(SaveStatus::Editing);
            }
        }
    }

    pub fn navigation_guard(&self) -> NavigationDecision {
        if self.status == SaveStatus::Saving || self.in_flight.is_some() || self.dirty {
            NavigationDecision::Confirm
        } else {
            NavigationDecision::Allow
        }
    }

    pub fn drain_events(&mut self) -> Vec<AutosaveEvent> {
        self.events.drain(..).collect()
    }

    fn set_status(&mut self, to: SaveStatus) {
        let from = self.status;
        if from == to {
            return;
        }
        debug!(?from, ?to, "autosave status");
        self.status = to;
        self.events.push_back(AutosaveEvent::StatusChanged { from, to });
    }
}

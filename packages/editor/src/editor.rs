//! # Editor Context
//!
//! [`Editor`] owns everything one editing surface needs: the node store, the
//! command bus, history, autosave and the sticky toolbar state. There is no
//! global registry; two editors never share state.
//!
//! ```text
//!   dispatch(cmd) ──▶ handlers (by priority) ──▶ editor.update(kind, tx)
//!                                                   │
//!                                   commit ◀────────┘
//!                                      │
//!              ┌───────────────────────┼────────────────────┐
//!              ▼                       ▼                    ▼
//!         history.record       autosave.note_change    toolbar (on demand)
//! ```

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::assets::{self, ImageCompressor};
use crate::autosave::{AutosaveEvent, AutosavePipeline, NavigationDecision, Persistence, SaveAck, SaveStatus, SaveTicket};
use crate::clock::{Clock, SystemClock};
use crate::commands::{Command, CommandBus, CommandHandler, CommandKind, CommandPriority, HandlerId, ScopeId};
use crate::config::EditorConfig;
use crate::errors::{EditorError, EditorResult, PersistenceError, ValidationError};
use crate::history::{EditKind, HistoryManager};
use crate::keys::KeyGenerator;
use crate::plugins::{self, Plugin, PluginScope};
use crate::preview::PreviewOptions;
use crate::registry::NodeTypeRegistry;
use crate::selection::{NativeSelection, Selection};
use crate::serializer;
use crate::state::EditorState;
use crate::store::{Commit, NodeStore};
use crate::toolbar::{self, StickyStyle, ToolbarState};

struct InstalledPlugin {
    name: String,
    scope: ScopeId,
    plugin: Rc<dyn Plugin>,
}

/// Builder for [`Editor`]
pub struct EditorBuilder {
    config: EditorConfig,
    clock: Option<Rc<dyn Clock>>,
    note_id: Option<String>,
    state_id: String,
    document: Option<Value>,
    registry: Option<NodeTypeRegistry>,
    plugins: Vec<Rc<dyn Plugin>>,
}

impl EditorBuilder {
    pub fn config(mut self, config: EditorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Note the document belongs to. Seeds node keys and addresses saves.
    pub fn note_id(mut self, note_id: impl Into<String>) -> Self {
        self.note_id = Some(note_id.into());
        self
    }

    /// Concurrency token of the persisted snapshot being opened
    pub fn state_id(mut self, state_id: impl Into<String>) -> Self {
        self.state_id = state_id.into();
        self
    }

    /// Persisted document to open instead of an empty paragraph
    pub fn document(mut self, document: Value) -> Self {
        self.document = Some(document);
        self
    }

    pub fn registry(mut self, registry: NodeTypeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Extra plugin, set up after the built-ins
    pub fn plugin(mut self, plugin: Rc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn build(self) -> EditorResult<Editor> {
        let keys = KeyGenerator::new(self.note_id.as_deref());
        let registry = Arc::new(self.registry.unwrap_or_default());
        let mut store = NodeStore::with_registry(keys, registry);

        let mut notices = Vec::new();
        if let Some(document) = &self.document {
            let registry = Arc::clone(store.registry());
            let outcome = serializer::import_json(document, &registry, store.keys_mut())?;
            store.load(&outcome.state)?;
            notices = outcome.notices;
        }

        let config = self.config;
        let mut editor = Editor {
            store,
            bus: CommandBus::new(),
            history: HistoryManager::new(config.history_capacity, config.coalesce_window_ms),
            autosave: AutosavePipeline::new(
                self.note_id.unwrap_or_default(),
                self.state_id,
                config.autosave_debounce_ms,
            ),
            sticky: StickyStyle::default(),
            container_width: config.container_width,
            clock: self.clock.unwrap_or_else(|| Rc::new(SystemClock::new())),
            plugins: Vec::new(),
            notices,
            config,
        };

        for name in editor.config.enabled_plugins.clone() {
            let plugin = plugins::builtin(&name).ok_or_else(|| EditorError::UnknownPlugin(name.clone()))?;
            editor.register_plugin(plugin)?;
        }
        for plugin in self.plugins {
            editor.register_plugin(plugin)?;
        }
        Ok(editor)
    }
}

/// One editing surface
pub struct Editor {
    store: NodeStore,
    bus: CommandBus,
    history: HistoryManager,
    autosave: AutosavePipeline,
    sticky: StickyStyle,
    config: EditorConfig,
    container_width: u32,
    clock: Rc<dyn Clock>,
    plugins: Vec<InstalledPlugin>,
    notices: Vec<ValidationError>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("version", &self.store.current().version())
            .field("plugins", &self.plugin_names())
            .field("bus", &self.bus)
            .field("autosave", &self.autosave.status())
            .finish()
    }
}

impl Editor {
    pub fn builder() -> EditorBuilder {
        EditorBuilder {
            config: EditorConfig::default(),
            clock: None,
            note_id: None,
            state_id: String::new(),
            document: None,
            registry: None,
            plugins: Vec::new(),
        }
    }

    /// An editor over an empty document with the built-in plugins.
    pub fn new(config: EditorConfig) -> EditorResult<Self> {
        Self::builder().config(config).build()
    }

    // State access

    /// Latest committed state
    pub fn state(&self) -> &Arc<EditorState> {
        self.store.current()
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.store.current().selection()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn container_width(&self) -> u32 {
        self.container_width
    }

    /// Width of the editing surface, used to clamp decorators.
    pub fn set_container_width(&mut self, width: u32) {
        self.container_width = width;
    }

    /// Notices produced while opening the document
    pub fn import_notices(&self) -> &[ValidationError] {
        &self.notices
    }

    // Commands

    /// Dispatch `command` to its handlers, highest priority first. Returns
    /// whether any handler took it.
    pub fn dispatch(&mut self, command: Command) -> EditorResult<bool> {
        let kind = command.kind();
        let handlers = self.bus.handlers_for(kind);
        debug!(command = %kind, handlers = handlers.len(), "dispatch");
        for handler in handlers {
            if handler(&command, self)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Register a handler that lives as long as the editor.
    pub fn register_command<F>(&mut self, kind: CommandKind, priority: CommandPriority, handler: F) -> HandlerId
    where
        F: Fn(&Command, &mut Editor) -> EditorResult<bool> + 'static,
    {
        self.bus.register(kind, priority, ScopeId::EDITOR, Rc::new(handler))
    }

    pub fn unregister_command(&mut self, id: HandlerId) -> bool {
        self.bus.unregister(id)
    }

    pub(crate) fn register_scoped(
        &mut self,
        kind: CommandKind,
        priority: CommandPriority,
        scope: ScopeId,
        handler: CommandHandler,
    ) -> HandlerId {
        self.bus.register(kind, priority, scope, handler)
    }

    /// Reconcile a platform selection change.
    pub fn select(&mut self, native: NativeSelection) -> EditorResult<bool> {
        self.dispatch(Command::selection_change(native))
    }

    // Plugins

    /// Set up `plugin` in a fresh handler scope.
    pub fn register_plugin(&mut self, plugin: Rc<dyn Plugin>) -> EditorResult<()> {
        let name = plugin.name().to_string();
        if self.plugins.iter().any(|p| p.name == name) {
            warn!(plugin = %name, "plugin already registered");
            return Ok(());
        }
        let scope = self.bus.new_scope();
        let result = {
            let mut context = PluginScope::new(self, scope);
            plugin.setup(&mut context)
        };
        if let Err(e) = result {
            self.bus.unregister_scope(scope);
            return Err(e);
        }
        info!(plugin = %name, "plugin set up");
        self.plugins.push(InstalledPlugin { name, scope, plugin });
        Ok(())
    }

    /// Tear a plugin down, dropping every handler it registered.
    pub fn unregister_plugin(&mut self, name: &str) -> EditorResult<()> {
        let index = self
            .plugins
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| EditorError::UnknownPlugin(name.to_string()))?;
        let installed = self.plugins.remove(index);
        let removed = self.bus.unregister_scope(installed.scope);
        installed.plugin.teardown(self);
        info!(plugin = %name, handlers = removed, "plugin torn down");
        Ok(())
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name.as_str()).collect()
    }

    // Mutation

    /// Run `f` in a transaction and record the commit as an edit of `kind`.
    pub fn update<T, F>(&mut self, kind: EditKind, f: F) -> EditorResult<Commit>
    where
        F: FnOnce(&mut NodeStore) -> EditorResult<T>,
    {
        let commit = self.store.update(f)?;
        self.after_commit(kind, &commit);
        Ok(commit)
    }

    fn after_commit(&mut self, kind: EditKind, commit: &Commit) {
        if commit.is_noop() {
            return;
        }
        let now = self.clock.now_ms();
        self.history.record(kind, &commit.previous, commit.content_changed, now);
        if commit.content_changed && kind != EditKind::Selection {
            self.autosave.note_change(now, kind.saves_immediately());
        }
        debug!(
            version = commit.state.version(),
            ?kind,
            content_changed = commit.content_changed,
            "committed"
        );
    }

    // History

    pub fn undo(&mut self) -> EditorResult<bool> {
        let current = Arc::clone(self.store.current());
        let target = match self.history.undo(&current) {
            Some(target) => target,
            None => return Ok(false),
        };
        match self.store.load(&target) {
            Ok(commit) => {
                self.after_commit(EditKind::Historic, &commit);
                Ok(true)
            }
            Err(e) => {
                self.history.revert_undo(target);
                Err(e.into())
            }
        }
    }

    pub fn redo(&mut self) -> EditorResult<bool> {
        let current = Arc::clone(self.store.current());
        let target = match self.history.redo(&current) {
            Some(target) => target,
            None => return Ok(false),
        };
        match self.store.load(&target) {
            Ok(commit) => {
                self.after_commit(EditKind::Historic, &commit);
                Ok(true)
            }
            Err(e) => {
                self.history.revert_redo(target);
                Err(e.into())
            }
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    // Serialization

    pub fn export_json(&self) -> Value {
        serializer::export_json(self.store.current(), self.store.registry())
    }

    /// Replace the document. History and sticky state start over.
    pub fn load_json(&mut self, document: &Value) -> EditorResult<Vec<ValidationError>> {
        let registry = Arc::clone(self.store.registry());
        let outcome = serializer::import_json(document, &registry, self.store.keys_mut())?;
        self.store.load(&outcome.state)?;
        self.history.clear();
        self.sticky = StickyStyle::default();
        self.notices = outcome.notices.clone();
        Ok(outcome.notices)
    }

    /// Structural check of the current state. A fatal error means the
    /// document has to be reopened from its last persisted snapshot.
    pub fn verify(&self) -> EditorResult<()> {
        self.store.current().verify()
    }

    // Toolbar

    pub fn toolbar(&self) -> ToolbarState {
        let state = self.store.current();
        let mut projected = toolbar::project(state, state.selection(), &self.sticky);
        projected.can_undo = self.history.can_undo();
        projected.can_redo = self.history.can_redo();
        projected
    }

    pub(crate) fn sticky_mut(&mut self) -> &mut StickyStyle {
        &mut self.sticky
    }

    // Autosave

    pub fn save_status(&self) -> SaveStatus {
        self.autosave.status()
    }

    pub fn autosave(&self) -> &AutosavePipeline {
        &self.autosave
    }

    /// Whether leaving the note now needs a confirmation prompt.
    pub fn navigation_guard(&self) -> NavigationDecision {
        self.autosave.navigation_guard()
    }

    pub fn drain_autosave_events(&mut self) -> Vec<AutosaveEvent> {
        self.autosave.drain_events()
    }

    /// Save at the next poll without waiting for the debounce.
    pub fn request_save(&mut self) {
        let now = self.clock.now_ms();
        self.autosave.force(now);
    }

    /// Start a save when one is due.
    pub fn poll_autosave(&mut self) -> EditorResult<Option<SaveTicket>> {
        let now = self.clock.now_ms();
        let options = PreviewOptions::from_config(&self.config);
        self.autosave
            .begin_save(now, self.store.current(), self.store.registry(), &options)
    }

    /// Report the outcome of a save started by [`Editor::poll_autosave`].
    pub fn complete_save(&mut self, sequence: u64, result: Result<SaveAck, PersistenceError>) {
        let now = self.clock.now_ms();
        self.autosave.complete(sequence, result, now);
    }

    /// Run a due save against `persistence`, bounded by the save timeout.
    /// Returns `None` when nothing was due.
    pub async fn flush_autosave<P: Persistence>(
        &mut self,
        persistence: &P,
    ) -> EditorResult<Option<Result<(), PersistenceError>>> {
        let ticket = match self.poll_autosave()? {
            Some(ticket) => ticket,
            None => return Ok(None),
        };
        let limit = Duration::from_millis(self.config.save_timeout_ms);
        let result = match tokio::time::timeout(limit, persistence.save(&ticket.request)).await {
            Ok(result) => result,
            Err(_) => Err(PersistenceError::Timeout(limit)),
        };
        let outcome = result.as_ref().map(|_| ()).map_err(|e| e.clone());
        self.complete_save(ticket.sequence, result);
        Ok(Some(outcome))
    }

    // Assets

    /// Compress raw image bytes and insert the result at the selection.
    ///
    /// The insert runs in a fresh transaction against whatever state is
    /// current once compression finishes.
    pub async fn insert_image_file<C: ImageCompressor>(
        &mut self,
        compressor: &C,
        bytes: Vec<u8>,
        mime: &str,
        alt_text: &str,
    ) -> EditorResult<bool> {
        assets::check_mime(&self.config.asset, mime)?;
        let src = compressor.compress(bytes, mime).await?;
        assets::validate_data_uri(&self.config.asset, &src)?;
        self.dispatch(Command::InsertImage {
            src,
            alt_text: alt_text.to_string(),
            width: None,
            height: None,
            show_caption: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::future::Future;

    use crate::assets::PassThroughCompressor;
    use crate::autosave::SaveRequest;
    use crate::clock::ManualClock;
    use crate::errors::AssetError;
    use crate::node::{NodePayload, NodeType};

    fn editor() -> Editor {
        Editor::builder()
            .clock(Rc::new(ManualClock::new(0)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builtin_plugins_are_installed() {
        let editor = editor();
        assert_eq!(
            editor.plugin_names(),
            vec!["rich-text", "list", "embed", "code-quote", "collapsible", "history"]
        );
    }

    #[test]
    fn test_unknown_plugin_in_config_fails() {
        let mut config = EditorConfig::default();
        config.enabled_plugins.push("spellcheck".into());
        let err = Editor::new(config).unwrap_err();
        assert!(matches!(err, EditorError::UnknownPlugin(ref name) if name == "spellcheck"));
    }

    #[test]
    fn test_dispatch_short_circuits_on_handled() {
        let mut editor = editor();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let seen = Rc::clone(&calls);
        editor.register_command(CommandKind::ClearHistory, CommandPriority::Critical, move |_, _| {
            seen.borrow_mut().push("critical");
            Ok(false)
        });
        let seen = Rc::clone(&calls);
        editor.register_command(CommandKind::ClearHistory, CommandPriority::High, move |_, _| {
            seen.borrow_mut().push("high");
            Ok(true)
        });

        assert!(editor.dispatch(Command::ClearHistory).unwrap());
        assert_eq!(*calls.borrow(), vec!["critical", "high"]);
    }

    #[test]
    fn test_unregistering_plugin_removes_its_handlers() {
        let mut editor = editor();
        editor.unregister_plugin("history").unwrap();

        assert!(!editor.dispatch(Command::Undo).unwrap());
        assert!(matches!(
            editor.unregister_plugin("history"),
            Err(EditorError::UnknownPlugin(_))
        ));
    }

    #[test]
    fn test_failed_update_keeps_previous_state() {
        let mut editor = editor();
        let before = Arc::clone(editor.state());

        let result = editor.update(EditKind::Structural, |tx| {
            let root = tx.state().root_key().clone();
            let paragraph = tx.state().children_of(&root)[0].clone();
            let text = tx.create_node(NodePayload::text("x"))?;
            tx.append_child(&paragraph, &text)?;
            tx.insert_child(&paragraph, &root, 0)?;
            Ok(())
        });

        assert!(result.is_err());
        assert!(Arc::ptr_eq(editor.state(), &before));
        assert!(!editor.history().can_undo());
    }

    #[test]
    fn test_undo_restores_content_under_new_version() {
        let mut editor = editor();
        editor.dispatch(Command::insert_text("hi")).unwrap();
        let typed_version = editor.state().version();

        assert!(editor.undo().unwrap());
        let root = editor.state().root_key().clone();
        assert_eq!(editor.state().text_content(&root), "");
        assert!(editor.state().version() > typed_version);

        assert!(editor.redo().unwrap());
        assert_eq!(editor.state().text_content(&root), "hi");
    }
    /// Never answers.
    struct StalledPersistence;

    impl Persistence for StalledPersistence {
        fn save(&self, _request: &SaveRequest) -> impl Future<Output = Result<SaveAck, PersistenceError>> {
            std::future::pending()
        }
    }

    fn image_count(editor: &Editor) -> usize {
        let state = editor.state();
        state
            .preorder(state.root_key())
            .iter()
            .filter(|key| state.node_type(key) == Some(NodeType::Image))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_save_times_out_and_stays_dirty() {
        let mut editor = editor();
        editor.dispatch(Command::insert_text("draft")).unwrap();
        editor.request_save();

        let outcome = editor.flush_autosave(&StalledPersistence).await.unwrap();
        assert!(matches!(outcome, Some(Err(PersistenceError::Timeout(limit))) if limit == Duration::from_millis(10_000)));
        assert_eq!(editor.save_status(), SaveStatus::Editing);
        assert!(editor.autosave().is_dirty());
        assert_eq!(editor.navigation_guard(), NavigationDecision::Confirm);
    }

    #[tokio::test]
    async fn test_flush_without_changes_does_nothing() {
        let mut editor = editor();
        assert!(editor.flush_autosave(&StalledPersistence).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_image_file_inserts_compressed_image() {
        let mut editor = editor();
        editor.dispatch(Command::insert_text("x")).unwrap();

        let inserted = editor
            .insert_image_file(&PassThroughCompressor, vec![1, 2, 3, 4], "image/png", "dot")
            .await
            .unwrap();
        assert!(inserted);
        assert_eq!(image_count(&editor), 1);
    }

    #[tokio::test]
    async fn test_insert_image_file_rejects_unsupported_type() {
        let mut editor = editor();
        editor.dispatch(Command::insert_text("x")).unwrap();
        let before = Arc::clone(editor.state());

        let err = editor
            .insert_image_file(&PassThroughCompressor, b"<p>".to_vec(), "text/html", "")
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::Asset(AssetError::UnsupportedType(ref mime)) if mime == "text/html"));
        assert!(Arc::ptr_eq(editor.state(), &before));
        assert_eq!(image_count(&editor), 0);
    }
}

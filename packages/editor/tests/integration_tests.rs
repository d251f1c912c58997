//! Integration tests for the editor crate

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use inkwell_editor::{
    Command, CommandKind, CommandPriority, EditKind, Editor, EditorResult, FormatFlag, ManualClock, NavigationDecision,
    NativeSelection, PersistenceError, Persistence, Plugin, PluginScope, Point, SaveAck, SaveRequest, SaveStatus,
    Selection,
};
use serde_json::json;

fn editor_at(clock: &ManualClock) -> Editor {
    Editor::builder()
        .note_id("note-1")
        .state_id("state-1")
        .clock(Rc::new(clock.clone()))
        .build()
        .unwrap()
}

fn type_text(editor: &mut Editor, text: &str) {
    for ch in text.chars() {
        editor.dispatch(Command::insert_text(ch.to_string())).unwrap();
    }
}

#[test]
fn test_bold_then_bullet_list_export() {
    let clock = ManualClock::new(0);
    let mut editor = editor_at(&clock);

    editor.dispatch(Command::FormatText { format: FormatFlag::Bold }).unwrap();
    editor.dispatch(Command::insert_text("Milk")).unwrap();
    editor.dispatch(Command::InsertUnorderedList).unwrap();
    editor.verify().unwrap();

    let exported = editor.export_json();
    let list = &exported["children"][0];
    assert_eq!(list["type"], json!("list"));
    assert_eq!(list["listType"], json!("bullet"));
    assert_eq!(list["start"], json!(1));
    assert_eq!(list["tag"], json!("ul"));

    let item = &list["children"][0];
    assert_eq!(item["type"], json!("listitem"));
    assert_eq!(item["value"], json!(1));
    assert!(item.get("checked").is_none());

    let text = &item["children"][0];
    assert_eq!(text["type"], json!("text"));
    assert_eq!(text["text"], json!("Milk"));
    assert_eq!(text["format"], json!(1));
    assert_eq!(text["style"], json!(""));
    assert_eq!(text["version"], json!(1));
}

#[test]
fn test_list_toggle_is_idempotent() {
    let clock = ManualClock::new(0);
    let mut editor = editor_at(&clock);
    editor.dispatch(Command::insert_text("item")).unwrap();
    let before = editor.export_json();

    editor.dispatch(Command::InsertOrderedList).unwrap();
    assert_eq!(editor.export_json()["children"][0]["listType"], json!("number"));
    editor.dispatch(Command::InsertOrderedList).unwrap();
    assert_eq!(editor.export_json(), before);
}

#[test]
fn test_undo_after_typing_burst_and_structural_command() {
    let clock = ManualClock::new(0);
    let mut editor = editor_at(&clock);

    for ch in ["a", "b", "c"] {
        editor.dispatch(Command::insert_text(ch)).unwrap();
        clock.advance(100);
    }
    let typed = editor.export_json();

    editor.dispatch(Command::InsertCheckList).unwrap();
    assert!(editor.dispatch(Command::Undo).unwrap());
    assert_eq!(editor.export_json(), typed);

    assert!(editor.dispatch(Command::Undo).unwrap());
    let root = editor.state().root_key().clone();
    assert_eq!(editor.state().text_content(&root), "");
    assert!(!editor.dispatch(Command::Undo).unwrap());

    assert!(editor.toolbar().can_redo);
    editor.dispatch(Command::insert_text("x")).unwrap();
    assert!(!editor.toolbar().can_redo);
}

#[test]
fn test_inserted_image_is_clamped_to_container() {
    let clock = ManualClock::new(0);
    let mut editor = editor_at(&clock);
    assert_eq!(editor.container_width(), 800);

    editor
        .dispatch(Command::InsertImage {
            src: "https://example.com/wide.png".into(),
            alt_text: "wide".into(),
            width: Some(2000),
            height: Some(1000),
            show_caption: false,
        })
        .unwrap();

    let image = &editor.export_json()["children"][0];
    assert_eq!(image["type"], json!("image"));
    assert_eq!(image["width"], json!(800));
    assert_eq!(image["height"], json!(400));
    assert_eq!(image["maxWidth"], json!(800));
    assert!(editor.toolbar().selected_decorator.is_some());
}

#[test]
fn test_removing_anchor_node_relocates_selection() {
    let clock = ManualClock::new(0);
    let mut editor = Editor::builder()
        .clock(Rc::new(clock))
        .document(json!({ "type": "root", "children": [
            { "type": "paragraph", "children": [{ "type": "text", "text": "first" }] },
            { "type": "paragraph", "children": [{ "type": "text", "text": "second" }] }
        ]}))
        .build()
        .unwrap();
    let state = editor.state();
    let blocks = state.children_of(state.root_key()).to_vec();
    let second = state.children_of(&blocks[1])[0].clone();
    editor
        .select(NativeSelection {
            anchor: Point::new(second.clone(), 3),
            focus: Point::new(second, 3),
        })
        .unwrap();

    let doomed = blocks[1].clone();
    editor
        .update(EditKind::Structural, |tx| {
            tx.remove_node(&doomed)?;
            Ok(())
        })
        .unwrap();

    let state = editor.state();
    match state.selection() {
        Some(Selection::Range(range)) => assert!(state.contains(&range.anchor.key)),
        other => panic!("expected a range selection, got {other:?}"),
    }
    editor.verify().unwrap();
}

#[test]
fn test_typing_abc_saves_once_after_debounce() {
    let clock = ManualClock::new(0);
    let mut editor = editor_at(&clock);

    for ch in ["a", "b", "c"] {
        editor.dispatch(Command::insert_text(ch)).unwrap();
        clock.advance(100);
    }
    clock.set(2000);
    assert!(editor.poll_autosave().unwrap().is_none());
    assert_eq!(editor.navigation_guard(), NavigationDecision::Confirm);

    clock.set(2700);
    let ticket = editor.poll_autosave().unwrap().unwrap();
    assert_eq!(ticket.request.body, "abc");
    assert_eq!(ticket.request.note_id, "note-1");
    assert_eq!(ticket.request.state_id, "state-1");
    assert_eq!(editor.save_status(), SaveStatus::Saving);
    assert!(editor.poll_autosave().unwrap().is_none());

    editor.complete_save(
        ticket.sequence,
        Ok(SaveAck {
            state_id: Some("state-2".into()),
        }),
    );
    assert_eq!(editor.save_status(), SaveStatus::Editing);
    assert_eq!(editor.navigation_guard(), NavigationDecision::Allow);
    assert_eq!(editor.autosave().state_id(), "state-2");
}

/// Persistence that fails while `fail` is set and records what it saved
#[derive(Default)]
struct MockPersistence {
    fail: Cell<bool>,
    saved: RefCell<Vec<SaveRequest>>,
}

impl Persistence for MockPersistence {
    async fn save(&self, request: &SaveRequest) -> Result<SaveAck, PersistenceError> {
        if self.fail.get() {
            return Err(PersistenceError::Network("offline".into()));
        }
        self.saved.borrow_mut().push(request.clone());
        Ok(SaveAck::default())
    }
}

#[tokio::test]
async fn test_failed_save_retries_with_latest_content() {
    let clock = ManualClock::new(0);
    let mut editor = editor_at(&clock);
    let persistence = MockPersistence::default();
    persistence.fail.set(true);

    type_text(&mut editor, "ab");
    clock.advance(3000);
    let outcome = editor.flush_autosave(&persistence).await.unwrap();
    assert!(matches!(outcome, Some(Err(PersistenceError::Network(_)))));
    assert_eq!(editor.save_status(), SaveStatus::Editing);
    assert!(editor.autosave().is_dirty());

    persistence.fail.set(false);
    type_text(&mut editor, "c");
    clock.advance(3000);
    let outcome = editor.flush_autosave(&persistence).await.unwrap();
    assert_eq!(outcome, Some(Ok(())));

    let saved = persistence.saved.borrow();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].body, "abc");
    assert_eq!(editor.autosave().saved_version(), Some(editor.state().version()));
    assert_eq!(editor.navigation_guard(), NavigationDecision::Allow);
}

#[test]
fn test_export_import_round_trip() {
    let clock = ManualClock::new(0);
    let mut editor = editor_at(&clock);
    editor.dispatch(Command::insert_text("Title")).unwrap();
    editor
        .dispatch(Command::FormatBlock {
            block: inkwell_editor::BlockType::H2,
        })
        .unwrap();
    editor.dispatch(Command::InsertParagraph).unwrap();
    editor.dispatch(Command::insert_text("todo")).unwrap();
    editor.dispatch(Command::InsertCheckList).unwrap();
    editor.dispatch(Command::InsertHorizontalRule).unwrap();
    let exported = editor.export_json();

    let reopened = Editor::builder()
        .clock(Rc::new(ManualClock::new(0)))
        .document(exported.clone())
        .build()
        .unwrap();
    assert!(reopened.import_notices().is_empty());
    assert_eq!(reopened.export_json(), exported);
}

/// Swallows text input while installed
struct ReadOnlyPlugin {
    torn_down: Rc<Cell<bool>>,
}

impl Plugin for ReadOnlyPlugin {
    fn name(&self) -> &'static str {
        "read-only"
    }

    fn setup(&self, scope: &mut PluginScope<'_>) -> EditorResult<()> {
        scope.register(CommandKind::InsertText, CommandPriority::Critical, |_, _| Ok(true));
        Ok(())
    }

    fn teardown(&self, _editor: &mut Editor) {
        self.torn_down.set(true);
    }
}

#[test]
fn test_plugin_teardown_unregisters_handlers() {
    let clock = ManualClock::new(0);
    let mut editor = editor_at(&clock);
    let torn_down = Rc::new(Cell::new(false));
    editor
        .register_plugin(Rc::new(ReadOnlyPlugin {
            torn_down: Rc::clone(&torn_down),
        }))
        .unwrap();

    editor.dispatch(Command::insert_text("ignored")).unwrap();
    let root = editor.state().root_key().clone();
    assert_eq!(editor.state().text_content(&root), "");

    editor.unregister_plugin("read-only").unwrap();
    assert!(torn_down.get());
    editor.dispatch(Command::insert_text("typed")).unwrap();
    assert_eq!(editor.state().text_content(&root), "typed");
}

//! # Embed Plugin
//!
//! Images, external embeds and horizontal rules. Decorators carry data only;
//! how they render is up to the host view.
//!
//! Widths never exceed the container width. A clamped width scales the
//! height with it:
//!
//! ```text
//!   container 800, insert 1600x900  ──▶  800x450
//! ```
//!
//! Image captions live in their own subtree (`image ⇢ caption > paragraph`)
//! that outer selections and edits never reach into.

use tracing::{debug, info};

use crate::assets;
use crate::commands::{Command, CommandKind, CommandPriority};
use crate::editor::Editor;
use crate::errors::{EditorResult, TransactionError};
use crate::history::EditKind;
use crate::node::{NodeKey, NodePayload};
use crate::plugins::{Plugin, PluginScope};
use crate::selection::Selection;
use crate::store::NodeStore;
use crate::transforms::{ensure_block, insert_block_decorator, paragraph_after_decorators, remove_pruning, selected_decorators};

pub const NAME: &str = "embed";

pub struct EmbedPlugin;

impl Plugin for EmbedPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&self, scope: &mut PluginScope<'_>) -> EditorResult<()> {
        let priority = CommandPriority::Normal;
        scope.register(CommandKind::InsertImage, priority, |command, editor| match command {
            Command::InsertImage {
                src,
                alt_text,
                width,
                height,
                show_caption,
            } => insert_image(editor, src, alt_text, (*width, *height), *show_caption),
            _ => Ok(false),
        });
        scope.register(CommandKind::InsertEmbed, priority, |command, editor| match command {
            Command::InsertEmbed {
                kind,
                src,
                width,
                height,
            } => {
                let (width, height) = clamp_size(*width, *height, editor.container_width());
                let payload = NodePayload::Embed {
                    kind: *kind,
                    src: src.clone(),
                    width,
                    height,
                };
                insert(editor, payload)
            }
            _ => Ok(false),
        });
        scope.register(CommandKind::InsertHorizontalRule, priority, |_, editor| {
            insert(editor, NodePayload::HorizontalRule)
        });
        scope.register(CommandKind::ResizeEmbed, priority, |command, editor| match command {
            Command::ResizeEmbed { key, width, height } => resize(editor, key, *width, *height),
            _ => Ok(false),
        });
        scope.register(CommandKind::ToggleCaption, priority, |command, editor| match command {
            Command::ToggleCaption { key } => toggle_caption(editor, key.as_ref()),
            _ => Ok(false),
        });

        // node selections
        scope.register(CommandKind::DeleteCharacter, priority, |_, editor| delete_selected(editor));
        scope.register(CommandKind::DeleteSelection, priority, |_, editor| delete_selected(editor));
        scope.register(CommandKind::InsertParagraph, priority, |_, editor| {
            if !has_node_selection(editor) {
                return Ok(false);
            }
            editor.update(EditKind::Structural, |tx| {
                let decorators = selected_decorators(tx);
                paragraph_after_decorators(tx, &decorators).map(|_| ())
            })?;
            Ok(true)
        });
        Ok(())
    }
}

/// Fit `width` into `container`, scaling `height` by the same ratio.
pub fn clamp_size(width: u32, height: u32, container: u32) -> (u32, u32) {
    if container == 0 || width <= container {
        return (width, height);
    }
    let scaled = u64::from(height) * u64::from(container) / u64::from(width);
    (container, u32::try_from(scaled).unwrap_or(u32::MAX))
}

fn clamp_optional(width: Option<u32>, height: Option<u32>, container: u32) -> (Option<u32>, Option<u32>) {
    match (width, height) {
        (Some(w), Some(h)) => {
            let (w, h) = clamp_size(w, h, container);
            (Some(w), Some(h))
        }
        (Some(w), None) if container > 0 => (Some(w.min(container)), None),
        other => other,
    }
}

fn has_node_selection(editor: &Editor) -> bool {
    matches!(editor.selection(), Some(Selection::Node(_)))
}

fn insert(editor: &mut Editor, payload: NodePayload) -> EditorResult<bool> {
    if editor.selection().is_none() {
        return Ok(false);
    }
    editor.update(EditKind::Structural, |tx| insert_block_decorator(tx, payload).map(|_| ()))?;
    Ok(true)
}

fn insert_image(
    editor: &mut Editor,
    src: &str,
    alt_text: &str,
    (width, height): (Option<u32>, Option<u32>),
    show_caption: bool,
) -> EditorResult<bool> {
    if assets::is_data_uri(src) {
        // rejected before the tree is touched
        assets::validate_data_uri(&editor.config().asset, src)?;
    }
    if editor.selection().is_none() {
        return Ok(false);
    }
    let container = editor.container_width();
    let (width, height) = clamp_optional(width, height, container);
    let payload = NodePayload::Image {
        src: src.to_string(),
        alt_text: alt_text.to_string(),
        width,
        height,
        max_width: container,
        show_caption,
        caption: None,
    };
    editor.update(EditKind::Structural, |tx| {
        let image = insert_block_decorator(tx, payload)?;
        if show_caption {
            create_caption(tx, &image)?;
        }
        Ok(())
    })?;
    info!(?width, ?height, "image inserted");
    Ok(true)
}

fn create_caption(tx: &mut NodeStore, image: &NodeKey) -> Result<NodeKey, TransactionError> {
    let caption = tx.create_node(NodePayload::Caption)?;
    let paragraph = tx.create_node(NodePayload::Paragraph)?;
    tx.append_child(&caption, &paragraph)?;
    tx.attach_caption(image, &caption)?;
    Ok(caption)
}

fn resize(editor: &mut Editor, key: &NodeKey, width: u32, height: u32) -> EditorResult<bool> {
    let resizable = matches!(
        editor.state().node(key).map(|n| &n.payload),
        Some(NodePayload::Image { .. }) | Some(NodePayload::Embed { .. })
    );
    if !resizable {
        return Ok(false);
    }
    let (width, height) = clamp_size(width, height, editor.container_width());
    editor.update(EditKind::Formatting, |tx| {
        match &mut tx.node_mut(key)?.payload {
            NodePayload::Image {
                width: w, height: h, ..
            } => {
                *w = Some(width);
                *h = Some(height);
            }
            NodePayload::Embed {
                width: w, height: h, ..
            } => {
                *w = width;
                *h = height;
            }
            _ => {}
        }
        Ok(())
    })?;
    debug!(node = %key, width, height, "decorator resized");
    Ok(true)
}

fn toggle_caption(editor: &mut Editor, key: Option<&NodeKey>) -> EditorResult<bool> {
    let state = editor.state();
    let image = match key {
        Some(key) => Some(key.clone()),
        None => match state.selection() {
            Some(Selection::Node(selection)) => selection.keys.first().cloned(),
            _ => None,
        },
    };
    let image = match image {
        Some(image) if matches!(state.node(&image).map(|n| &n.payload), Some(NodePayload::Image { .. })) => image,
        _ => return Ok(false),
    };
    editor.update(EditKind::Structural, |tx| {
        let needs_caption = tx.state().node(&image).and_then(|n| n.caption()).is_none();
        let mut showing = false;
        if let NodePayload::Image { show_caption, .. } = &mut tx.node_mut(&image)?.payload {
            *show_caption = !*show_caption;
            showing = *show_caption;
        }
        if showing && needs_caption {
            create_caption(tx, &image)?;
        }
        Ok(())
    })?;
    Ok(true)
}

/// Delete the decorators under a node selection.
fn delete_selected(editor: &mut Editor) -> EditorResult<bool> {
    if !has_node_selection(editor) {
        return Ok(false);
    }
    editor.update(EditKind::Structural, |tx| {
        let decorators = selected_decorators(tx);
        for decorator in &decorators {
            remove_pruning(tx, decorator)?;
        }
        let root = tx.state().root_key().clone();
        ensure_block(tx, &root)?;
        Ok(())
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde_json::json;

    use crate::clock::ManualClock;
    use crate::errors::{AssetError, EditorError};
    use crate::node::{EmbedKind, NodeType};

    fn editor() -> Editor {
        Editor::builder()
            .clock(Rc::new(ManualClock::new(0)))
            .build()
            .unwrap()
    }

    fn image_command(src: &str, width: Option<u32>, height: Option<u32>) -> Command {
        Command::InsertImage {
            src: src.to_string(),
            alt_text: "alt".into(),
            width,
            height,
            show_caption: false,
        }
    }

    fn selected(editor: &Editor) -> NodeKey {
        match editor.selection() {
            Some(Selection::Node(selection)) => selection.keys[0].clone(),
            other => panic!("expected a node selection, got {other:?}"),
        }
    }

    #[test]
    fn test_clamp_size_keeps_aspect_ratio() {
        assert_eq!(clamp_size(1600, 900, 800), (800, 450));
        assert_eq!(clamp_size(400, 300, 800), (400, 300));
        assert_eq!(clamp_size(1000, 1000, 0), (1000, 1000));
    }

    #[test]
    fn test_insert_image_clamps_and_selects() {
        let mut editor = editor();
        editor.set_container_width(600);
        assert!(editor
            .dispatch(image_command("https://example.com/a.png", Some(1200), Some(800)))
            .unwrap());

        let image = selected(&editor);
        match &editor.state().node(&image).unwrap().payload {
            NodePayload::Image {
                width,
                height,
                max_width,
                ..
            } => {
                assert_eq!(*width, Some(600));
                assert_eq!(*height, Some(400));
                assert_eq!(*max_width, 600);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(editor.history().can_undo());
    }

    #[test]
    fn test_oversized_data_uri_is_rejected_before_mutation() {
        let mut config = crate::config::EditorConfig::default();
        config.asset.max_bytes = 8;
        let mut editor = Editor::builder()
            .config(config)
            .clock(Rc::new(ManualClock::new(0)))
            .build()
            .unwrap();
        let version = editor.state().version();
        let src = format!("data:image/png;base64,{}", STANDARD.encode([0u8; 64]));

        let err = editor.dispatch(image_command(&src, None, None)).unwrap_err();
        assert!(matches!(err, EditorError::Asset(AssetError::TooLarge { .. })));
        assert_eq!(editor.state().version(), version);
    }

    #[test]
    fn test_resize_clamps_to_container() {
        let mut editor = editor();
        editor
            .dispatch(Command::InsertEmbed {
                kind: EmbedKind::YouTube,
                src: "https://youtu.be/x".into(),
                width: 560,
                height: 315,
            })
            .unwrap();
        let embed = selected(&editor);

        assert!(editor
            .dispatch(Command::ResizeEmbed {
                key: embed.clone(),
                width: 1600,
                height: 900,
            })
            .unwrap());
        assert!(matches!(
            editor.state().node(&embed).unwrap().payload,
            NodePayload::Embed { width: 800, height: 450, .. }
        ));
        assert!(!editor
            .dispatch(Command::ResizeEmbed {
                key: NodeKey::from("missing"),
                width: 1,
                height: 1,
            })
            .unwrap());
    }

    #[test]
    fn test_caption_subtree_is_created_on_toggle() {
        let mut editor = editor();
        editor.dispatch(image_command("https://example.com/a.png", None, None)).unwrap();
        let image = selected(&editor);

        assert!(editor.dispatch(Command::ToggleCaption { key: None }).unwrap());
        let state = editor.state();
        let caption = state.node(&image).unwrap().caption().unwrap().clone();
        assert_eq!(state.node_type(&caption), Some(NodeType::Caption));
        assert_eq!(state.scope_root(&state.children_of(&caption)[0]), caption);
        editor.verify().unwrap();

        let exported = editor.export_json();
        assert_eq!(exported["children"][0]["showCaption"], json!(true));
        assert_eq!(exported["children"][0]["caption"]["type"], json!("caption"));
    }

    #[test]
    fn test_backspace_on_selected_decorator_removes_it() {
        let mut editor = editor();
        editor.dispatch(Command::InsertHorizontalRule).unwrap();
        let rule = selected(&editor);

        assert!(editor.dispatch(Command::DeleteCharacter { backward: true }).unwrap());
        let state = editor.state();
        assert!(!state.contains(&rule));
        assert!(matches!(state.selection(), Some(Selection::Range(_))));
        assert!(!state.children_of(state.root_key()).is_empty());
    }

    #[test]
    fn test_enter_on_selected_decorator_adds_paragraph_after() {
        let mut editor = editor();
        editor.dispatch(Command::InsertHorizontalRule).unwrap();
        let rule = selected(&editor);
        editor.dispatch(Command::InsertParagraph).unwrap();

        let state = editor.state();
        let next = state.next_sibling(&rule).unwrap();
        assert_eq!(state.node_type(next), Some(NodeType::Paragraph));
        let range = state.selection().unwrap().as_range().unwrap();
        assert_eq!(&range.anchor.key, next);
    }
}

pub mod export;
pub mod init;
pub mod preview;
pub mod run;

pub use export::{export, ExportArgs};
pub use init::{init, InitArgs};
pub use preview::{preview, PreviewArgs};
pub use run::{run, RunArgs};

use crate::config::Config;
use anyhow::{Context, Result};
use colored::Colorize;
use inkwell_editor::Editor;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Open a persisted document, reporting recovered import problems.
pub(crate) fn open_document(path: &Path, config: &Config) -> Result<Editor> {
    let source = fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let document: serde_json::Value =
        serde_json::from_str(&source).with_context(|| format!("{} is not valid JSON", path.display()))?;

    let mut builder = Editor::builder().config(config.editor.clone()).document(document);
    if let Some(note_id) = &config.note_id {
        builder = builder.note_id(note_id.clone());
    }
    let editor = builder.build()?;

    debug!(path = %path.display(), nodes = editor.state().len(), "document opened");
    for notice in editor.import_notices() {
        eprintln!("  {} {}", "⚠️".yellow(), notice);
    }
    Ok(editor)
}

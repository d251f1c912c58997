use crate::commands::open_document;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use inkwell_editor::preview::{self, PreviewOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Persisted document
    pub document: PathBuf,
}

/// Print the listing preview of a document.
pub fn preview(args: PreviewArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let editor = open_document(&cwd.join(&args.document), &config)?;
    let options = PreviewOptions::from_config(&config.editor);

    let body = preview::generate(editor.state(), &options);
    let image = preview::representative_image(editor.state());

    println!("{}", body);
    if !image.is_empty() {
        println!("{} {}", "image:".dimmed(), image);
    }
    Ok(())
}

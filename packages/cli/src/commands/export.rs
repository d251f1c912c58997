use crate::commands::open_document;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Persisted document to normalize
    pub document: PathBuf,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Re-export a document through the engine, dropping anything it could not
/// import.
pub fn export(args: ExportArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let editor = open_document(&cwd.join(&args.document), &config)?;
    let json = serde_json::to_string_pretty(&editor.export_json())?;

    match args.out {
        Some(out) => {
            fs::write(cwd.join(&out), json)?;
            eprintln!("  {} {} → {}", "✓".green(), args.document.display(), out.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

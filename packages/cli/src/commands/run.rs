use crate::commands::open_document;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use inkwell_editor::{Command, Editor};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Persisted document to start from
    pub document: PathBuf,

    /// JSON array of commands, e.g. `[{"type": "INSERT_TEXT", "text": "hi"}]`
    pub script: PathBuf,

    /// Print only the resulting document
    #[arg(short, long)]
    pub quiet: bool,
}

/// Outcome of a scripted session
#[derive(Debug)]
pub struct RunReport {
    pub handled: usize,
    pub unhandled: Vec<String>,
    pub output: Value,
}

/// Apply a command script to a document and print the resulting document,
/// toolbar state and the save request autosave would emit.
pub fn run(args: RunArgs, cwd: &Path) -> Result<()> {
    let config = Config::load(cwd)?;
    let mut editor = open_document(&cwd.join(&args.document), &config)?;

    let script_path = cwd.join(&args.script);
    let source =
        fs::read_to_string(&script_path).with_context(|| format!("Cannot read {}", script_path.display()))?;
    let commands: Vec<Command> =
        serde_json::from_str(&source).with_context(|| format!("{} is not a command list", script_path.display()))?;

    let report = apply_script(&mut editor, commands)?;
    if !args.quiet {
        for kind in &report.unhandled {
            eprintln!("  {} {} was not handled", "⚠️".yellow(), kind);
        }
        eprintln!("  {} {} commands applied", "✓".green(), report.handled);
    }

    let output = if args.quiet {
        report.output["document"].clone()
    } else {
        report.output
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn apply_script(editor: &mut Editor, commands: Vec<Command>) -> Result<RunReport> {
    let mut handled = 0;
    let mut unhandled = Vec::new();
    for command in commands {
        let kind = command.kind();
        if editor.dispatch(command)? {
            handled += 1;
        } else {
            unhandled.push(kind.to_string());
        }
    }

    editor.request_save();
    let save = editor.poll_autosave()?.map(|ticket| ticket.request);

    let output = json!({
        "document": editor.export_json(),
        "toolbar": editor.toolbar(),
        "save": save,
    });
    Ok(RunReport {
        handled,
        unhandled,
        output,
    })
}

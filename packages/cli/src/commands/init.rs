use crate::config::{Config, DEFAULT_CONFIG_NAME};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::Path;

const EXAMPLE_NOTE: &str = "welcome.json";

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Note id used to seed node keys
    #[arg(short, long)]
    pub note_id: Option<String>,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = Config::path(cwd);

    // Check if config already exists
    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    println!("{}", "📝 Initializing Inkwell notes...".bright_blue().bold());

    let example_path = cwd.join(EXAMPLE_NOTE);
    if !example_path.exists() {
        let example = serde_json::json!({
            "type": "root",
            "children": [
                { "type": "heading", "tag": "h1", "children": [{ "type": "text", "text": "Welcome" }] },
                { "type": "paragraph", "children": [
                    { "type": "text", "text": "Notes are stored as " },
                    { "type": "text", "text": "JSON", "format": 1 }
                ]},
                { "type": "list", "listType": "check", "start": 1, "children": [
                    { "type": "listitem", "value": 1, "checked": false, "children": [
                        { "type": "text", "text": "Try inkwell preview" }
                    ]}
                ]}
            ]
        });
        fs::write(&example_path, serde_json::to_string_pretty(&example)?)?;
        println!("  {} Created {}", "✓".green(), EXAMPLE_NOTE);
    }

    let config = Config {
        note_id: args.note_id,
        ..Config::default()
    };
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    println!();
    println!("{}", "✅ Notes initialized!".green().bold());
    println!();
    println!("Next steps:");
    println!("  1. Run: inkwell preview {}", EXAMPLE_NOTE);
    println!("  2. Run: inkwell run {} script.json", EXAMPLE_NOTE);

    Ok(())
}

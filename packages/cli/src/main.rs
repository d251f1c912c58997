mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{export, init, preview, run, ExportArgs, InitArgs, PreviewArgs, RunArgs};
use tracing_subscriber::EnvFilter;

/// Inkwell CLI - inspect and script rich-text notes
#[derive(Parser, Debug)]
#[command(name = "inkwell")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log engine events (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config and an example note
    Init(InitArgs),

    /// Normalize a document through the engine
    Export(ExportArgs),

    /// Print the listing preview of a document
    Preview(PreviewArgs),

    /// Apply a JSON command script to a document
    Run(RunArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "inkwell_editor=debug,inkwell=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| match cli.command {
            Command::Init(args) => init(args, &cwd),
            Command::Export(args) => export(args, &cwd),
            Command::Preview(args) => preview(args, &cwd),
            Command::Run(args) => run(args, &cwd),
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

use beads_rust::cli::commands;
use beads_rust::cli::{Cli, Commands};
use beads_rust::config;
use beads_rust::logging::init_logging;
use beads_rust::output::OutputContext;
use beads_rust::sync::auto_flush;
use beads_rust::{BeadsError, StructuredError};
use clap::Parser;
use std::io::{self, IsTerminal};
use std::path::Path;
use tracing::debug;

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = init_logging(cli.verbose, cli.quiet, None) {
        eprintln!("Failed to initialize logging: {e}");
        // Don't exit, just continue without logging or with basic stderr
    }

    let overrides = build_cli_overrides(&cli);
    let ctx = OutputContext::from_args(&cli);

    // Track if this command potentially mutates data (for auto-flush)
    let is_mutating = is_mutating_command(&cli.command);

    let result = match cli.command {
        Commands::Init {
            prefix,
            force,
            backend: _,
        } => commands::init::execute(prefix, force, None, &ctx),
        Commands::Create(args) => commands::create::execute(&args, &overrides),
        Commands::Q(args) => commands::q::execute(args, &overrides),
        Commands::List(args) => commands::list::execute(&args, cli.json),
        Commands::Show(args) => commands::show::execute(&args, cli.json, &overrides, &ctx),
        Commands::Update(args) => commands::update::execute(&args, &overrides),
        Commands::Close(args) => commands::close::execute_cli(&args, cli.json, &overrides),
        Commands::Reopen(args) => commands::reopen::execute(&args, cli.json, &overrides, &ctx),
        Commands::Delete(args) => commands::delete::execute(&args, &overrides),
        Commands::Ready(args) => commands::ready::execute(&args, cli.json, &overrides, &ctx),
        Commands::Blocked(args) => commands::blocked::execute(&args, cli.json, &overrides),
        Commands::Search(args) => commands::search::execute(&args, cli.json, &overrides, &ctx),
        Commands::Dep { command } => commands::dep::execute(&command, cli.json, &overrides, &ctx),
        Commands::Label { command } => {
            commands::label::execute(&command, cli.json, &overrides)
        }
        Commands::Epic { command } => commands::epic::execute(&command, cli.json, &overrides, &ctx),
        Commands::Comments(args) => commands::comments::execute(&args, cli.json, &overrides, &ctx),
        Commands::Stats(args) | Commands::Status(args) => {
            commands::stats::execute(&args, cli.json, &overrides)
        }
        Commands::Count(args) => commands::count::execute(&args, cli.json, &overrides, &ctx),
        Commands::Stale(args) => commands::stale::execute(&args, cli.json, &overrides, &ctx),
        Commands::Lint(args) => commands::lint::execute(&args, cli.json, &overrides),
        Commands::Defer(args) => commands::defer::execute_defer(&args, cli.json, &overrides, &ctx),
        Commands::Undefer(args) => {
            commands::defer::execute_undefer(&args, cli.json, &overrides, &ctx)
        }
        Commands::Config { command } => {
            commands::config::execute(&command, cli.json, &overrides)
        }
        Commands::Sync(args) => commands::sync::execute(&args, cli.json, &overrides, &ctx),
        Commands::Doctor => commands::doctor::execute(cli.json, &overrides),
        Commands::Info(args) => commands::info::execute(&args, &overrides, &ctx),
        Commands::Schema(_) => Err(BeadsError::Config(
            "br schema is not available in this build".to_string(),
        )),
        Commands::Where => commands::r#where::execute(&overrides, &ctx),
        Commands::Version(_args) => commands::version::execute(cli.json, &ctx),
        #[cfg(feature = "self_update")]
        Commands::Upgrade(args) => commands::upgrade::execute(&args, cli.json),
        Commands::Completions(args) => commands::completions::execute(&args),
        Commands::Audit { command } => {
            commands::audit::execute(&command, cli.json, &overrides, &ctx)
        }
        Commands::History(args) => commands::history::execute(args, &overrides, &ctx),
        Commands::Orphans(args) => commands::orphans::execute(&args, cli.json, &overrides),
        Commands::Changelog(args) => {
            commands::changelog::execute(&args, cli.json, &overrides, &ctx)
        }
        Commands::Query { command } => commands::query::execute(&command, cli.json, &overrides),
        Commands::Graph(args) => commands::graph::execute(&args, cli.json, &overrides),
        Commands::Agents(args) => commands::agents::execute(&args, &ctx),
    };

    // Handle command result
    if let Err(e) = result {
        handle_error(&e, cli.json);
    }

    // Auto-flush after successful mutating commands (unless --no-auto-flush)
    if is_mutating && !cli.no_auto_flush {
        run_auto_flush(&overrides);
    }
}

/// Determine if a command potentially mutates data.
const fn is_mutating_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Create(_)
            | Commands::Update(_)
            | Commands::Delete(_)
            | Commands::Close(_)
            | Commands::Reopen(_)
            | Commands::Q(_)
            | Commands::Dep { .. }
            | Commands::Label { .. }
            | Commands::Epic { .. }
            | Commands::Comments(_)
            | Commands::Defer(_)
            | Commands::Undefer(_)
    )
}

/// Run auto-flush after mutating commands.
///
/// This discovers the beads directory, opens a fresh storage connection,
/// and exports any dirty issues to JSONL.
fn run_auto_flush(overrides: &config::CliOverrides) {
    // Try to discover beads directory
    let beads_dir = match config::discover_beads_dir(Some(Path::new("."))) {
        Ok(dir) => dir,
        Err(e) => {
            debug!(
                ?e,
                "Auto-flush skipped: could not discover .beads directory"
            );
            return;
        }
    };

    // Open storage with fresh connection
    let (mut storage, _paths) =
        match config::open_storage(&beads_dir, overrides.db.as_ref(), overrides.lock_timeout) {
            Ok(result) => result,
            Err(e) => {
                debug!(?e, "Auto-flush skipped: could not open storage");
                return;
            }
        };

    // Run auto-flush
    match auto_flush(&mut storage, &beads_dir) {
        Ok(result) => {
            if result.flushed {
                debug!(
                    exported = result.exported_count,
                    hash = %result.content_hash,
                    "Auto-flush completed"
                );
            }
        }
        Err(e) => {
            // Log but don't fail - auto-flush errors shouldn't break the command
            debug!(?e, "Auto-flush failed (non-fatal)");
        }
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs human-readable error with optional color.
fn handle_error(err: &BeadsError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    // Determine output mode: JSON if --json flag or stdout is not a terminal
    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        // Output structured JSON to stderr
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        // Human-readable output with color if stderr is a terminal
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    config::CliOverrides {
        db: cli.db.clone(),
        actor: cli.actor.clone(),
        identity: None,
        json: Some(cli.json),
        quiet: Some(cli.quiet),
        no_db: Some(cli.no_db),
        no_daemon: Some(cli.no_daemon),
        no_auto_flush: Some(cli.no_auto_flush),
        no_auto_import: Some(cli.no_auto_import),
        lock_timeout: cli.lock_timeout,
    }
}

//! Structured logging setup.
//!
//! `br` logs to stderr via `tracing`. Verbosity is controlled by `-v`/`-vv`,
//! `--quiet`, and the `RUST_LOG` environment variable (which always wins
//! when set, so agents and CI can dial in exact module-level filters).

use std::env;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Initialize the global tracing subscriber for the `br` binary.
///
/// `verbose` is the `-v`/`-vv` repeat count; `quiet` suppresses everything
/// below `warn`. `override_filter` lets callers (tests, the daemon) pin an
/// exact `RUST_LOG`-style directive instead of deriving one from flags.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_logging(
    verbose: u8,
    quiet: bool,
    override_filter: Option<&str>,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = build_filter(verbose, quiet, override_filter);

    let json_output = env::var("BEADS_LOG_FORMAT").as_deref() == Ok("json");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_span_events(if verbose >= 2 {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    if json_output {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

/// Initialize a minimal subscriber for test binaries.
///
/// Tests run concurrently, so failures to install a global subscriber
/// (because another test already installed one) are silently ignored.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn build_filter(verbose: u8, quiet: bool, override_filter: Option<&str>) -> EnvFilter {
    if let Ok(from_env) = env::var("RUST_LOG") {
        return EnvFilter::new(from_env);
    }
    if let Some(directive) = override_filter {
        return EnvFilter::new(directive);
    }

    let default_level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "beads_rust=debug,info",
            _ => "beads_rust=trace,debug",
        }
    };
    EnvFilter::new(default_level)
}

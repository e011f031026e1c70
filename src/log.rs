//! Structured logging for debugging snowplan.
//!
//! Log levels:
//! - ERROR: a task or command failed
//! - WARN: recoverable conditions (failed iteration, cancellation)
//! - INFO: run, task and batch lifecycle
//! - DEBUG: per-task inputs, ledger mutations, checkpoint writes
//! - TRACE: unused by snowplan itself, available for dependencies
//!
//! Debug mode can be enabled with `--debug` flag or `SNOWPLAN_DEBUG=1` env var.
//! `RUST_LOG` takes precedence over both when set.
//!
//! Output goes to `~/.snowplan/snowplan.log` so stdout stays free for the
//! JSON summaries; without a home directory it goes to stderr.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::Config;

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize logging to ~/.snowplan/snowplan.log
pub fn init() -> Option<PathBuf> {
    init_with_debug(false)
}

/// Initialize logging with explicit debug mode setting.
///
/// Returns the log file path when logging to a file.
pub fn init_with_debug(debug: bool) -> Option<PathBuf> {
    let env_debug = debug_from_env(std::env::var("SNOWPLAN_DEBUG").ok().as_deref());
    let debug_enabled = debug || env_debug;
    DEBUG_ENABLED.store(debug_enabled, Ordering::SeqCst);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug_enabled)));

    match open_log_file() {
        Some((path, file)) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false)
                .try_init();
            Some(path)
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
    }
}

/// Check if debug mode is enabled.
pub fn is_debug() -> bool {
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "debug"
    } else {
        "info"
    }
}

fn debug_from_env(value: Option<&str>) -> bool {
    value
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Truncate file on startup.
fn open_log_file() -> Option<(PathBuf, File)> {
    let path = Config::log_path().ok()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).ok()?;
    }
    let file = File::create(&path).ok()?;
    Some((path, file))
}

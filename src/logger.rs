use std::fs::File;
use std::io::{Result as IoResult, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

static LOG_FILE: OnceLock<Arc<Mutex<File>>> = OnceLock::new();
static DEBUG: AtomicBool = AtomicBool::new(false);

/// Configures a log file for warnings emitted while reading or writing.
///
/// # Errors
///
/// Returns an error if the log file cannot be created.
pub fn set_log_file(path: &Path) -> IoResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    // Ignore error if already set; keep the first writer.
    let _ = LOG_FILE.set(Arc::new(Mutex::new(file)));
    Ok(())
}

/// Toggles debug tracing; mirrored from the `debug` read/write options.
pub fn set_debug(enabled: bool) {
    DEBUG.store(enabled, Ordering::Relaxed);
}

pub(crate) fn debug_enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}

/// Emits a recoverable-condition warning; parsing continues after these.
pub fn log_warn(message: &str) {
    eprintln!("warning: {message}");
    if let Some(writer) = LOG_FILE.get()
        && let Ok(mut file) = writer.lock()
    {
        let _ = writeln!(file, "warning: {message}");
    }
}

/// Emits a trace line, visible only when debug tracing is on.
pub fn log_debug(message: &str) {
    if !debug_enabled() {
        return;
    }
    eprintln!("debug: {message}");
    if let Some(writer) = LOG_FILE.get()
        && let Ok(mut file) = writer.lock()
    {
        let _ = writeln!(file, "debug: {message}");
    }
}

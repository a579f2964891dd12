//! Size-based rotation for the daemon logs and the audit log.
//!
//! `daemon.log`, `daemon-err.log` rotate at 10 MiB keeping 5 copies; the audit
//! log uses `audit_max_bytes` / `audit_max_files` from settings. Scheme:
//!   file → file.1 → file.2 → … → file.<max_files>

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gitdock_core::settings::{self, Settings};
use gitdock_core::store;

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if it has reached `max_bytes`.
///
/// Returns `true` if rotation occurred. A missing file is not an error.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;

    // Writers reopen by path, so leave an empty file behind.
    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;
    Ok(true)
}

/// Rotate the daemon logs and the audit log under `home`.
///
/// A failure on one file is logged and does not block the others.
pub fn rotate_logs(home: &Path) {
    let settings = settings::load_settings_at(home).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not read settings; using rotation defaults");
        Settings::default()
    });
    let audit_bytes = settings.u64_or(settings::AUDIT_MAX_BYTES, MAX_LOG_BYTES);
    let audit_files = settings.u64_or(settings::AUDIT_MAX_FILES, MAX_ROTATED_FILES as u64) as usize;

    let targets = [
        (crate::paths::stdout_log_path(home), MAX_LOG_BYTES, MAX_ROTATED_FILES),
        (crate::paths::stderr_log_path(home), MAX_LOG_BYTES, MAX_ROTATED_FILES),
        (store::audit_path_at(home), audit_bytes, audit_files),
    ];
    for (path, max_bytes, max_files) in targets {
        match rotate_if_needed(&path, max_bytes, max_files) {
            Ok(true) => tracing::info!(path = %path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "log rotation failed"),
        }
    }
}

/// `<base>.<n>`, e.g. `audit.jsonl.2`.
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("gitdock.log");
    base.with_file_name(format!("{name}.{n}"))
}

//! Platform quirks for launching server scripts

use std::path::{Path, PathBuf};
#[cfg(unix)]
use tracing::{debug, warn};

/// `java` becomes `java.exe` on Windows
pub fn correct_binname(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Launch scripts ship as `.bat` files on Windows
pub fn correct_script_name(script: &Path) -> PathBuf {
    if cfg!(windows) {
        script.with_extension("bat")
    } else {
        script.to_path_buf()
    }
}

/// Best effort: make sure the launch target has its exec bits set.
/// Archives do not always preserve permissions.
#[cfg(unix)]
pub fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Cannot stat {}: {}", path.display(), e);
            return;
        }
    };

    let mut permissions = metadata.permissions();
    let mode = permissions.mode();
    if mode & 0o111 == 0o111 {
        return;
    }

    permissions.set_mode(mode | 0o111);
    if let Err(e) = std::fs::set_permissions(path, permissions) {
        warn!("Could not mark {} executable: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
pub fn ensure_executable(_path: &Path) {}

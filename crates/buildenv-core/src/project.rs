use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::constants::BUILDENV_FOLDER;
use crate::sandbox::{SandboxError, SandboxHandle};

/// Folder holding buildenv-owned files of the project at `base_path`.
pub fn script_dir(base_path: &Path) -> PathBuf {
    base_path.join(BUILDENV_FOLDER)
}

/// One-time core bootstrap of a sandbox for the project at `base_path`.
///
/// Returns `false` when the sandbox was already bootstrapped.
pub fn bootstrap(base_path: &Path, sandbox: &SandboxHandle) -> Result<bool, SandboxError> {
    if sandbox.is_bootstrapped() {
        return Ok(false);
    }

    info!("customizing sandbox {}", sandbox.root.display());
    let dir = script_dir(base_path);
    fs::create_dir_all(&dir).map_err(|e| SandboxError::io(&dir, e))?;

    let marker = sandbox.bootstrap_marker();
    fs::write(&marker, b"").map_err(|e| SandboxError::io(&marker, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("venv");
        fs::create_dir_all(&root).unwrap();
        let sandbox = SandboxHandle::at(&root);

        assert!(bootstrap(dir.path(), &sandbox).unwrap());
        assert!(script_dir(dir.path()).is_dir());
        assert!(root.join("buildenvOK").is_file());
        assert!(!bootstrap(dir.path(), &sandbox).unwrap());
    }
}

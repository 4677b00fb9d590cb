//! Project sandboxes: where they live, how they are found and how they are built.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::constants::{BUILDENV_OK, VENV_OK};

pub mod build;
pub mod locate;

pub use build::{ProcessRunner, SandboxBuilder, SystemRunner};
pub use locate::{GitCli, RepoQuery, SandboxLocator};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to start command '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command failed with {status}: {command}")]
    Failed { command: String, status: String },
    #[error("filesystem error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid requirements pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

impl SandboxError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A located or freshly built sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxHandle {
    pub root: PathBuf,
    pub interpreter: PathBuf,
    pub ready: bool,
}

impl SandboxHandle {
    /// Describes the sandbox rooted at `root`, reading its ready marker.
    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            interpreter: interpreter_path(root),
            ready: root.join(VENV_OK).is_file(),
        }
    }

    pub fn bin_dir(&self) -> PathBuf {
        bin_dir(&self.root)
    }

    pub fn ready_marker(&self) -> PathBuf {
        self.root.join(VENV_OK)
    }

    pub fn bootstrap_marker(&self) -> PathBuf {
        self.root.join(BUILDENV_OK)
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrap_marker().is_file()
    }
}

/// Binary folder of a sandbox rooted at `root`.
pub fn bin_dir(root: &Path) -> PathBuf {
    if cfg!(windows) {
        root.join("Scripts")
    } else {
        root.join("bin")
    }
}

/// Interpreter executable of a sandbox rooted at `root`.
pub fn interpreter_path(root: &Path) -> PathBuf {
    if cfg!(windows) {
        bin_dir(root).join("python.exe")
    } else {
        bin_dir(root).join("python")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_reflects_ready_marker() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("venv");
        std::fs::create_dir_all(&root).unwrap();

        let handle = SandboxHandle::at(&root);
        assert!(!handle.ready);
        assert!(handle.interpreter.starts_with(&root));

        std::fs::write(handle.ready_marker(), b"").unwrap();
        assert!(SandboxHandle::at(&root).ready);
    }
}

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, instrument};

use super::SandboxHandle;

/// Answers "what is the root of the repository enclosing `dir`?".
///
/// `None` covers every negative outcome: not a repository, tool missing,
/// tool failure.
pub trait RepoQuery {
    fn toplevel(&self, dir: &Path) -> Option<PathBuf>;
}

/// [`RepoQuery`] backed by `git rev-parse --show-toplevel`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl RepoQuery for GitCli {
    fn toplevel(&self, dir: &Path) -> Option<PathBuf> {
        let output = match Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(dir)
            .output()
        {
            Ok(out) => out,
            Err(e) => {
                debug!("failed to run git in {}: {}", dir.display(), e);
                return None;
            }
        };

        if !output.status.success() {
            debug!("{} is not inside a git repository", dir.display());
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout.lines().next()?.trim();
        if line.is_empty() {
            return None;
        }
        Some(PathBuf::from(line))
    }
}

/// Finds a ready sandbox for a project, possibly shared by an ancestor repository.
pub struct SandboxLocator<'a> {
    query: &'a dyn RepoQuery,
    folder: String,
    look_up: bool,
}

impl<'a> SandboxLocator<'a> {
    pub fn new(query: &'a dyn RepoQuery, folder: impl Into<String>) -> Self {
        Self {
            query,
            folder: folder.into(),
            look_up: true,
        }
    }

    /// Disables the repository walk; only the project-local sandbox is checked.
    pub fn look_up(mut self, enabled: bool) -> Self {
        self.look_up = enabled;
        self
    }

    fn ready_at(&self, base: &Path) -> Option<SandboxHandle> {
        let handle = SandboxHandle::at(&base.join(&self.folder));
        handle.ready.then_some(handle)
    }

    /// Returns a ready sandbox visible from `start`, or `None` when a new one must be built.
    #[instrument(skip(self))]
    pub fn locate(&self, start: &Path) -> Option<SandboxHandle> {
        if self.look_up {
            let mut current = start.to_path_buf();
            let mut previous: Option<PathBuf> = None;
            while let Some(root) = self.query.toplevel(&current) {
                // Each root must sit strictly above the last one, or the walk would not end.
                if let Some(prev) = &previous {
                    if root == *prev || !prev.starts_with(&root) {
                        debug!("repository root {} does not move up, stopping", root.display());
                        break;
                    }
                }
                debug!("checking repository root {}", root.display());
                if let Some(found) = self.ready_at(&root) {
                    return Some(found);
                }
                match root.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                }
                previous = Some(root);
            }
        }

        // The project may not be under version control yet.
        self.ready_at(start)
    }
}

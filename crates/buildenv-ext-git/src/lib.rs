//! Builtin `gitfiles` extension: seeds the recommended git metadata files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use buildenv_core::constants::BUILDENV_FOLDER;
use buildenv_core::{Extension, ExtensionCatalog, ExtensionEntry, SandboxHandle};
use tracing::{debug, info};

pub const NAME: &str = "gitfiles";

const GITATTRIBUTES: &str = "*.sh text eol=lf\n*.bat text eol=crlf\n*.cmd text eol=crlf\n";

/// Files written into the project when missing, with their recommended content.
pub fn recommended_files(venv_folder: &str) -> Vec<(&'static str, String)> {
    let folder = venv_folder.trim_matches('/');
    vec![
        (".gitignore", format!("/{folder}/\n/{BUILDENV_FOLDER}/\n")),
        (".gitattributes", GITATTRIBUTES.to_string()),
    ]
}

pub fn default_capabilities() -> &'static [&'static str] {
    &["version", "init"]
}

#[derive(Debug)]
pub struct GitFilesExtension {
    project: PathBuf,
    venv_folder: String,
}

impl GitFilesExtension {
    pub fn new(project: &Path, venv_folder: &str) -> Self {
        Self {
            project: project.to_path_buf(),
            venv_folder: venv_folder.to_string(),
        }
    }
}

impl Extension for GitFilesExtension {
    fn capabilities(&self) -> HashSet<String> {
        default_capabilities().iter().map(|c| c.to_string()).collect()
    }

    fn version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    fn init(&self, _force: bool) -> Result<()> {
        // Existing files belong to the user, even when forced.
        for (name, content) in recommended_files(&self.venv_folder) {
            let path = self.project.join(name);
            if path.exists() {
                debug!("{} already present", path.display());
                continue;
            }
            fs::write(&path, content)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            info!("generated recommended {} file", name);
        }
        Ok(())
    }
}

/// Catalog exposing the extensions compiled into the binary.
#[derive(Debug, Clone)]
pub struct BuiltinCatalog {
    project: PathBuf,
    venv_folder: String,
}

impl BuiltinCatalog {
    /// `venv_folder` is the configured sandbox folder name, ignored by git.
    pub fn new(project: &Path, venv_folder: &str) -> Self {
        Self {
            project: project.to_path_buf(),
            venv_folder: venv_folder.to_string(),
        }
    }
}

impl ExtensionCatalog for BuiltinCatalog {
    fn entries(&self, _sandbox: &SandboxHandle) -> Vec<ExtensionEntry> {
        let project = self.project.clone();
        let venv_folder = self.venv_folder.clone();
        vec![ExtensionEntry::new(NAME, move || {
            Ok(Box::new(GitFilesExtension::new(&project, &venv_folder)) as Box<dyn Extension>)
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_missing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();

        GitFilesExtension::new(dir.path(), "venv").init(true).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join(".gitignore")).unwrap(),
            "target/\n"
        );
        let attrs = fs::read_to_string(dir.path().join(".gitattributes")).unwrap();
        assert!(attrs.contains("*.sh text eol=lf"));
    }

    #[test]
    fn gitignore_follows_configured_folder() {
        let dir = tempfile::tempdir().unwrap();
        GitFilesExtension::new(dir.path(), "MyVenv").init(false).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(".gitignore")).unwrap(),
            "/MyVenv/\n/.buildenv/\n"
        );
    }

    #[test]
    fn catalog_yields_loadable_entry() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxHandle::at(&dir.path().join("venv"));
        let catalog = BuiltinCatalog::new(dir.path(), "venv");

        let entries = catalog.entries(&sandbox);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name(), "gitfiles");
    }

    #[test]
    fn exposes_required_capabilities() {
        let ext = GitFilesExtension::new(Path::new("."), "venv");
        for cap in buildenv_core::extension::REQUIRED_CAPABILITIES {
            assert!(ext.capabilities().contains(*cap));
        }
    }
}

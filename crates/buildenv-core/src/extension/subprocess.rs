use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::extension::Extension;

/// What an extension binary reports for `--discover`.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub capabilities: HashSet<String>,
}

/// An extension implemented by an external binary installed in the sandbox.
#[derive(Debug)]
pub struct SubprocessExtension {
    name: String,
    binary_path: PathBuf,
    project: PathBuf,
    manifest: Manifest,
}

impl SubprocessExtension {
    /// Probes `binary_path --discover` and parses its JSON manifest.
    pub fn discover(name: &str, binary_path: &Path, project: &Path) -> Result<Self> {
        let output = Command::new(binary_path)
            .arg("--discover")
            .current_dir(project)
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| {
                format!("failed to execute extension binary '{}'", binary_path.display())
            })?;

        if !output.status.success() {
            bail!(
                "'{} --discover' failed with status {}",
                binary_path.display(),
                output.status
            );
        }

        let manifest: Manifest = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("invalid manifest from '{}'", binary_path.display()))?;
        debug!(
            "discovered subprocess extension '{}' version {} with capabilities {:?}",
            name, manifest.version, manifest.capabilities
        );

        Ok(Self {
            name: name.to_string(),
            binary_path: binary_path.to_path_buf(),
            project: project.to_path_buf(),
            manifest,
        })
    }
}

impl Extension for SubprocessExtension {
    fn capabilities(&self) -> HashSet<String> {
        self.manifest.capabilities.clone()
    }

    fn version(&self) -> String {
        self.manifest.version.clone()
    }

    fn init(&self, force: bool) -> Result<()> {
        let mut command = Command::new(&self.binary_path);
        command.arg("--init").current_dir(&self.project);
        if force {
            command.arg("--force");
        }

        let status = command
            .status()
            .with_context(|| format!("failed to spawn '{}'", self.binary_path.display()))?;
        if !status.success() {
            bail!("{} --init exited with {}", self.name, status);
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn create_mock_extension(dir: &TempDir, manifest: &str) -> PathBuf {
        let script_path = dir.path().join("buildenv-ext-mock");
        let script_content = format!(
            r#"#!/bin/sh
if [ "$1" = "--discover" ]; then
    echo '{manifest}'
    exit 0
fi
if [ "$1" = "--init" ]; then
    echo "$2" > init-called
    exit 0
fi
exit 1
"#
        );
        fs::write(&script_path, script_content).unwrap();

        let mut perms = fs::metadata(&script_path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script_path, perms).unwrap();

        script_path
    }

    #[test]
    fn discover_and_init_through_binary() {
        let dir = tempfile::tempdir().unwrap();
        let binary = create_mock_extension(
            &dir,
            r#"{"version": "1.2.3", "capabilities": ["version", "init"]}"#,
        );

        let ext = SubprocessExtension::discover("mock", &binary, dir.path())
            .expect("manifest should parse");
        assert_eq!(ext.version(), "1.2.3");
        assert!(ext.capabilities().contains("init"));

        ext.init(true).expect("init should succeed");
        let marker = fs::read_to_string(dir.path().join("init-called")).unwrap();
        assert_eq!(marker.trim(), "--force");
    }

    #[test]
    fn invalid_manifest_fails_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let binary = create_mock_extension(&dir, "not json");
        let err = SubprocessExtension::discover("mock", &binary, dir.path()).expect_err("must fail");
        assert!(err.to_string().contains("invalid manifest"));
    }

    #[test]
    fn missing_binary_fails_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("buildenv-ext-missing");
        assert!(SubprocessExtension::discover("missing", &missing, dir.path()).is_err());
    }
}

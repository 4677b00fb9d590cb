use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use buildenv_core::constants::EXTENSION_BINARY_PREFIX;
use buildenv_core::extension::subprocess::SubprocessExtension;
use buildenv_core::{Extension, ExtensionCatalog, ExtensionEntry, SandboxHandle};

/// Extensions shipped as `buildenv-ext-<name>` executables in the sandbox bin folder.
#[derive(Debug, Clone)]
pub struct SubprocessCatalog {
    project: PathBuf,
}

impl SubprocessCatalog {
    pub fn new(project: &Path) -> Self {
        Self {
            project: project.to_path_buf(),
        }
    }
}

impl ExtensionCatalog for SubprocessCatalog {
    fn entries(&self, sandbox: &SandboxHandle) -> Vec<ExtensionEntry> {
        let bin_dir = sandbox.bin_dir();
        let dir = match fs::read_dir(&bin_dir) {
            Ok(dir) => dir,
            Err(e) => {
                debug!("no extension folder at {}: {}", bin_dir.display(), e);
                return Vec::new();
            }
        };

        let mut found: Vec<(String, PathBuf)> = dir
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!("unreadable entry in {}: {}", bin_dir.display(), e);
                    None
                }
            })
            .filter(|path| is_executable(path))
            .filter_map(|path| Some((extension_name(&path)?, path)))
            .collect();
        found.sort();
        found.dedup_by(|a, b| a.0 == b.0);

        found
            .into_iter()
            .map(|(name, binary)| {
                debug!("probing for subprocess extension: {}", binary.display());
                let project = self.project.clone();
                let ext_name = name.clone();
                ExtensionEntry::new(name, move || {
                    let ext = SubprocessExtension::discover(&ext_name, &binary, &project)?;
                    Ok(Box::new(ext) as Box<dyn Extension>)
                })
            })
            .collect()
    }
}

/// Extension name carried by a `buildenv-ext-<name>` binary file name.
///
/// Names containing a dot (backups, scripts with suffixes) are not extensions.
fn extension_name(path: &Path) -> Option<String> {
    // Windows binaries carry an `.exe` suffix; elsewhere the name is taken whole.
    let base = if cfg!(windows) {
        path.file_stem()?
    } else {
        path.file_name()?
    };
    let name = base.to_str()?.strip_prefix(EXTENSION_BINARY_PREFIX)?;
    (!name.is_empty() && !name.contains('.')).then(|| name.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}

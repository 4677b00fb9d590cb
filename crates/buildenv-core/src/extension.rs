use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::constants::STAMP_SUFFIX;
use crate::sandbox::SandboxHandle;

pub mod subprocess;

/// Capabilities every extension must expose to be accepted by the registry.
pub const REQUIRED_CAPABILITIES: &[&str] = &["version", "init"];

#[derive(Debug, Error)]
pub enum ExtensionError {
    #[error("failed to load {name} extension: {reason}")]
    Load { name: String, reason: String },
    #[error("failed to execute {name} extension init")]
    Init {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to update {name} extension stamp at {}", path.display())]
    Stamp {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A contract for all extensions hooking into sandbox initialization.
pub trait Extension: std::fmt::Debug {
    /// The capabilities this implementation provides.
    fn capabilities(&self) -> HashSet<String>;
    /// Version of the extension; a change re-triggers `init`.
    fn version(&self) -> String;
    /// Performs the extension's one-time sandbox initialization.
    fn init(&self, force: bool) -> anyhow::Result<()>;
}

type Loader = Box<dyn FnOnce() -> anyhow::Result<Box<dyn Extension>>>;

/// A named, not yet loaded extension.
pub struct ExtensionEntry {
    name: String,
    loader: Loader,
}

impl ExtensionEntry {
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Box<dyn Extension>> + 'static,
    {
        Self {
            name: name.into(),
            loader: Box::new(loader),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for ExtensionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A source of extension entries for a given sandbox.
pub trait ExtensionCatalog {
    fn entries(&self, sandbox: &SandboxHandle) -> Vec<ExtensionEntry>;
}

/// Outcome of a successful registry run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub initialized: Vec<String>,
    pub skipped: Vec<String>,
}

/// Ordered set of extensions to initialize in a sandbox.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: Vec<ExtensionEntry>,
}

impl ExtensionRegistry {
    /// Collects entries from every catalog, preserving catalog order.
    pub fn discover(catalogs: &[Box<dyn ExtensionCatalog>], sandbox: &SandboxHandle) -> Self {
        let mut registry = Self::default();
        for catalog in catalogs {
            for entry in catalog.entries(sandbox) {
                registry.register(entry);
            }
        }
        debug!("discovered {} extension(s)", registry.entries.len());
        registry
    }

    pub fn register(&mut self, entry: ExtensionEntry) {
        self.entries.push(entry);
    }

    /// Loads and initializes every extension in order.
    ///
    /// # Errors
    /// The first load, capability, init or stamp failure aborts the run;
    /// remaining extensions are left untouched.
    #[instrument(skip(self))]
    pub fn run_all(self, stamp_dir: &Path, force: bool) -> Result<RunReport, ExtensionError> {
        let mut report = RunReport::default();

        for ExtensionEntry { name, loader } in self.entries {
            let extension = loader().map_err(|e| ExtensionError::Load {
                name: name.clone(),
                reason: format!("{e:#}"),
            })?;
            check_capabilities(&name, extension.as_ref())?;

            let version = extension.version();
            let stamp = stamp_path(stamp_dir, &name);
            let previous = fs::read_to_string(&stamp).ok();
            if !force && previous.as_deref().map(str::trim) == Some(version.as_str()) {
                debug!("{} extension already initialized at version {}", name, version);
                report.skipped.push(name);
                continue;
            }

            info!("initializing {} extension (version {})", name, version);
            extension
                .init(force)
                .map_err(|source| ExtensionError::Init {
                    name: name.clone(),
                    source,
                })?;

            fs::write(&stamp, &version).map_err(|source| ExtensionError::Stamp {
                name: name.clone(),
                path: stamp.clone(),
                source,
            })?;
            report.initialized.push(name);
        }

        Ok(report)
    }
}

/// Stamp file recording the last initialized version of extension `name`.
pub fn stamp_path(stamp_dir: &Path, name: &str) -> PathBuf {
    stamp_dir.join(format!("{name}{STAMP_SUFFIX}"))
}

fn check_capabilities(name: &str, extension: &dyn Extension) -> Result<(), ExtensionError> {
    let provided = extension.capabilities();
    let missing: Vec<&str> = REQUIRED_CAPABILITIES
        .iter()
        .copied()
        .filter(|cap| !provided.contains(*cap))
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    Err(ExtensionError::Load {
        name: name.to_string(),
        reason: format!(
            "{} extension does not implement the base extension capabilities (missing: {})",
            name,
            missing.join(", ")
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct MockExtension {
        version: String,
        capabilities: HashSet<String>,
        calls: Rc<Cell<u32>>,
        fail: bool,
    }

    impl Extension for MockExtension {
        fn capabilities(&self) -> HashSet<String> {
            self.capabilities.clone()
        }

        fn version(&self) -> String {
            self.version.clone()
        }

        fn init(&self, _force: bool) -> anyhow::Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                anyhow::bail!("init error");
            }
            Ok(())
        }
    }

    fn full_capabilities() -> HashSet<String> {
        REQUIRED_CAPABILITIES.iter().map(|c| c.to_string()).collect()
    }

    fn entry(name: &str, version: &str, calls: &Rc<Cell<u32>>, fail: bool) -> ExtensionEntry {
        let calls = Rc::clone(calls);
        let version = version.to_string();
        ExtensionEntry::new(name, move || {
            Ok(Box::new(MockExtension {
                version,
                capabilities: full_capabilities(),
                calls,
                fail,
            }) as Box<dyn Extension>)
        })
    }

    fn registry_with(entries: Vec<ExtensionEntry>) -> ExtensionRegistry {
        let mut registry = ExtensionRegistry::default();
        for e in entries {
            registry.register(e);
        }
        registry
    }

    #[test]
    fn stamp_gates_repeated_init() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(Cell::new(0));
        let run = |force: bool| {
            registry_with(vec![entry("foo", "1.2.3", &calls, false)])
                .run_all(dir.path(), force)
                .unwrap()
        };

        let report = run(false);
        assert_eq!(report.initialized, vec!["foo"]);
        assert_eq!(calls.get(), 1);
        let stamp = dir.path().join("fooOK");
        assert_eq!(fs::read_to_string(&stamp).unwrap(), "1.2.3");

        let report = run(false);
        assert_eq!(report.skipped, vec!["foo"]);
        assert_eq!(calls.get(), 1);

        run(true);
        assert_eq!(calls.get(), 2);

        fs::write(&stamp, "0.0.0").unwrap();
        run(false);
        assert_eq!(calls.get(), 3);
        assert_eq!(fs::read_to_string(&stamp).unwrap(), "1.2.3");
    }

    #[test]
    fn load_failure_aborts_remaining_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(Cell::new(0));
        let registry = registry_with(vec![
            ExtensionEntry::new("foo", || Err(anyhow::anyhow!("some error"))),
            entry("bar", "1.0.0", &calls, false),
        ]);

        let err = registry.run_all(dir.path(), false).expect_err("must fail");
        assert_eq!(err.to_string(), "failed to load foo extension: some error");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn missing_capability_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(Cell::new(0));
        let inner = Rc::clone(&calls);
        let registry = registry_with(vec![ExtensionEntry::new("foo", move || {
            Ok(Box::new(MockExtension {
                version: "1.0.0".to_string(),
                capabilities: HashSet::from(["version".to_string()]),
                calls: inner,
                fail: false,
            }) as Box<dyn Extension>)
        })]);

        let err = registry.run_all(dir.path(), false).expect_err("must fail");
        assert!(matches!(err, ExtensionError::Load { .. }));
        assert!(err
            .to_string()
            .contains("does not implement the base extension capabilities"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn init_failure_is_wrapped_and_not_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(Cell::new(0));
        let registry = registry_with(vec![
            entry("foo", "1.2.3", &calls, true),
            entry("bar", "1.0.0", &calls, false),
        ]);

        let err = registry.run_all(dir.path(), false).expect_err("must fail");
        assert_eq!(
            format!("{:#}", anyhow::Error::new(err)),
            "failed to execute foo extension init: init error"
        );
        assert_eq!(calls.get(), 1);
        assert!(!dir.path().join("fooOK").exists());
        assert!(!dir.path().join("barOK").exists());
    }
}

//! Per-invocation orchestration: config, sandbox, extensions, then the wrapper signal.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::channel::{check_shell_request, ChannelSignal, CommandChannel, ScriptFlavor, ShellRefusal};
use crate::config::Config;
use crate::error::Result;
use crate::extension::{ExtensionCatalog, ExtensionRegistry};
use crate::project;
use crate::runtime::Environment;
use crate::sandbox::{ProcessRunner, RepoQuery, SandboxBuilder, SandboxHandle, SandboxLocator};

/// Options of the `init` phase shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Re-run every extension even if its stamp is current.
    pub force: bool,
    /// Do not run extensions at all.
    pub skip: bool,
}

/// One buildenv invocation against a project.
pub struct Session<'a> {
    project: PathBuf,
    config: Config,
    repo: &'a dyn RepoQuery,
    runner: &'a dyn ProcessRunner,
    catalogs: Vec<Box<dyn ExtensionCatalog>>,
}

impl<'a> Session<'a> {
    pub fn new(
        project: &Path,
        env: Environment,
        repo: &'a dyn RepoQuery,
        runner: &'a dyn ProcessRunner,
    ) -> Self {
        Self {
            project: project.to_path_buf(),
            config: Config::new(project, env),
            repo,
            runner,
            catalogs: Vec::new(),
        }
    }

    /// Adds an extension source; catalogs are consulted in insertion order.
    pub fn with_catalog(mut self, catalog: Box<dyn ExtensionCatalog>) -> Self {
        self.catalogs.push(catalog);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn environment(&self) -> &Environment {
        self.config.environment()
    }

    fn builder(&self) -> Result<SandboxBuilder<'a>> {
        Ok(SandboxBuilder::new(self.runner, &self.project)
            .python(self.config.python()?)
            .pip_args(self.config.pip_args()?)
            .requirements(self.config.requirements_pattern()?)
            .base_package(self.config.base_package()?))
    }

    /// Finds a ready sandbox, building one in the project when none is visible.
    #[instrument(skip(self), fields(project = %self.project.display()))]
    pub fn sandbox(&self) -> Result<SandboxHandle> {
        let folder = self.config.venv_folder()?;
        let found = SandboxLocator::new(self.repo, folder.as_str())
            .look_up(self.config.look_up()?)
            .locate(&self.project);

        if let Some(handle) = found {
            debug!("using sandbox {}", handle.root.display());
            return Ok(handle);
        }

        let target = self.project.join(&folder);
        Ok(self.builder()?.build(&target)?)
    }

    /// Sandbox, one-time bootstrap, then pending extension initializations.
    pub fn prepare(&self, options: InitOptions) -> Result<SandboxHandle> {
        let sandbox = self.sandbox()?;
        project::bootstrap(&self.project, &sandbox)?;

        if options.skip {
            debug!("extension initialization skipped");
            return Ok(sandbox);
        }

        let registry = ExtensionRegistry::discover(&self.catalogs, &sandbox);
        let report = registry.run_all(&sandbox.root, options.force)?;
        debug!(
            "extensions initialized={:?} skipped={:?}",
            report.initialized, report.skipped
        );
        Ok(sandbox)
    }

    pub fn init(&self, options: InitOptions) -> Result<ChannelSignal> {
        self.prepare(options)?;
        info!("build environment is ready");
        Ok(ChannelSignal::Success)
    }

    /// Asks the wrapper to spawn an interactive shell in the sandbox.
    ///
    /// Refusals are decided before anything touches the sandbox.
    pub fn shell(&self, from_loader: Option<&str>) -> Result<ChannelSignal> {
        check_shell_request(from_loader, self.environment())?;
        self.prepare(InitOptions::default())?;
        info!("spawning interactive shell ({})", self.environment().shell());
        Ok(ChannelSignal::SpawnShell)
    }

    /// Hands `command` back to the wrapper through a command slot.
    pub fn run(&self, from_loader: Option<&str>, command: &[String]) -> Result<ChannelSignal> {
        let flavor = from_loader
            .map(ScriptFlavor::from_loader)
            .ok_or(ShellRefusal::NotFromLoader)?;
        self.prepare(InitOptions::default())?;

        let channel = CommandChannel::new(&project::script_dir(&self.project), flavor);
        let slot = channel.allocate(command)?;
        Ok(slot.signal())
    }

    pub fn upgrade(&self, eager: bool) -> Result<ChannelSignal> {
        let sandbox = self.sandbox()?;
        self.builder()?.upgrade(&sandbox, eager)?;
        Ok(ChannelSignal::Success)
    }
}

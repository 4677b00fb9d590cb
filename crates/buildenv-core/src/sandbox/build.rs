use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument, warn};

use super::{interpreter_path, SandboxError, SandboxHandle};
use crate::constants::{DEFAULT_BASE_PACKAGE, DEFAULT_PYTHON, DEFAULT_REQUIREMENTS};

/// Runs an external command to completion, failing on a non-zero exit.
pub trait ProcessRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<(), SandboxError>;
}

/// [`ProcessRunner`] spawning real child processes with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<(), SandboxError> {
        let command = argv.join(" ");
        let (program, args) = argv.split_first().ok_or_else(|| SandboxError::Failed {
            command: command.clone(),
            status: "empty command".to_string(),
        })?;

        debug!("running '{}' in {}", command, cwd.display());
        let status = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .status()
            .map_err(|source| SandboxError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(SandboxError::Failed {
                command,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Creates sandboxes with a host interpreter and its package installer.
pub struct SandboxBuilder<'a> {
    runner: &'a dyn ProcessRunner,
    project: PathBuf,
    python: String,
    pip_args: Vec<String>,
    requirements: String,
    base_package: String,
}

impl<'a> SandboxBuilder<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, project: &Path) -> Self {
        Self {
            runner,
            project: project.to_path_buf(),
            python: DEFAULT_PYTHON.to_string(),
            pip_args: Vec::new(),
            requirements: DEFAULT_REQUIREMENTS.to_string(),
            base_package: DEFAULT_BASE_PACKAGE.to_string(),
        }
    }

    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn pip_args(mut self, args: Vec<String>) -> Self {
        self.pip_args = args;
        self
    }

    pub fn requirements(mut self, pattern: impl Into<String>) -> Self {
        self.requirements = pattern.into();
        self
    }

    pub fn base_package(mut self, package: impl Into<String>) -> Self {
        self.base_package = package.into();
        self
    }

    /// Project files matching the requirements pattern, relative and sorted.
    pub fn requirement_files(&self) -> Result<Vec<String>, SandboxError> {
        let base = glob::Pattern::escape(&self.project.to_string_lossy());
        let pattern = format!("{}/{}", base, self.requirements);
        let entries = glob::glob(&pattern).map_err(|source| SandboxError::Pattern {
            pattern: self.requirements.clone(),
            source,
        })?;

        let mut files: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .filter_map(|path| {
                path.strip_prefix(&self.project)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            })
            .collect();
        files.sort();
        Ok(files)
    }

    fn pip(&self, interpreter: &Path, args: &[&str], extra: &[String]) -> Vec<String> {
        let mut argv = vec![
            interpreter.to_string_lossy().into_owned(),
            "-m".to_string(),
            "pip".to_string(),
            "install".to_string(),
        ];
        argv.extend(args.iter().map(|a| (*a).to_string()));
        argv.extend(extra.iter().cloned());
        argv.extend(self.pip_args.iter().cloned());
        argv
    }

    fn requirement_args(files: &[String]) -> Vec<String> {
        files
            .iter()
            .map(|file| format!("--requirement={file}"))
            .collect()
    }

    /// Builds a sandbox at `target`, replacing any partial one found there.
    ///
    /// The ready marker is only written once every step succeeded.
    #[instrument(skip(self))]
    pub fn build(&self, target: &Path) -> Result<SandboxHandle, SandboxError> {
        if target.is_dir() {
            warn!("cleaning existing (corrupted?) sandbox folder {}", target.display());
            fs::remove_dir_all(target).map_err(|e| SandboxError::io(target, e))?;
        }

        info!("creating sandbox in {}", target.display());
        let create = vec![
            self.python.clone(),
            "-m".to_string(),
            "venv".to_string(),
            target.to_string_lossy().into_owned(),
        ];
        self.runner.run(&create, &self.project)?;

        let interpreter = interpreter_path(target);
        info!("upgrading package installer");
        self.runner
            .run(&self.pip(&interpreter, &["--upgrade", "pip", "wheel"], &[]), &self.project)?;

        let requirements = self.requirement_files()?;
        if requirements.is_empty() {
            info!("installing base package {}", self.base_package);
            let install = self.pip(&interpreter, &[self.base_package.as_str()], &[]);
            self.runner.run(&install, &self.project)?;
        } else {
            info!("installing requirements: {}", requirements.join(", "));
            let install = self.pip(&interpreter, &[], &Self::requirement_args(&requirements));
            self.runner.run(&install, &self.project)?;
        }

        fs::create_dir_all(target).map_err(|e| SandboxError::io(target, e))?;
        let handle = SandboxHandle::at(target);
        let marker = handle.ready_marker();
        fs::write(&marker, b"").map_err(|e| SandboxError::io(&marker, e))?;
        info!("sandbox is ready");

        Ok(SandboxHandle {
            ready: true,
            ..handle
        })
    }

    /// Upgrades the installer, the base package and declared requirements.
    #[instrument(skip(self))]
    pub fn upgrade(&self, sandbox: &SandboxHandle, eager: bool) -> Result<(), SandboxError> {
        let mut flags = vec!["--upgrade"];
        if eager {
            flags.push("--upgrade-strategy=eager");
        }

        let mut base = flags.clone();
        base.extend(["pip", "wheel", self.base_package.as_str()]);
        info!("upgrading {} base packages", sandbox.root.display());
        self.runner
            .run(&self.pip(&sandbox.interpreter, &base, &[]), &self.project)?;

        let requirements = self.requirement_files()?;
        if !requirements.is_empty() {
            info!("upgrading requirements: {}", requirements.join(", "));
            let argv = self.pip(
                &sandbox.interpreter,
                &flags,
                &Self::requirement_args(&requirements),
            );
            self.runner.run(&argv, &self.project)?;
        }
        Ok(())
    }
}

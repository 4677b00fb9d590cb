//! Exit-code protocol between `buildenv` and the wrapper script that invoked it.
//!
//! | code      | meaning                                   |
//! |-----------|-------------------------------------------|
//! | 0         | done, nothing else to do                  |
//! | 1         | error (already reported on stderr)        |
//! | 100       | spawn an interactive shell in the sandbox |
//! | 101..=255 | run `.buildenv/command.<code>.<ext>`      |
//!
//! Core logic only deals with [`ChannelSignal`]; the numeric encoding is
//! applied at the process boundary through [`ChannelSignal::exit_code`].

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::constants::{
    FIRST_COMMAND_SLOT, LAST_COMMAND_SLOT, RC_SPAWN_SHELL, RC_SUCCESS,
};
use crate::runtime::Environment;

/// What the wrapper script should do once `buildenv` exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSignal {
    Success,
    SpawnShell,
    ReplayCommand(u8),
}

impl ChannelSignal {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Success => RC_SUCCESS,
            Self::SpawnShell => RC_SPAWN_SHELL,
            Self::ReplayCommand(id) => id,
        }
    }
}

/// Why a shell (or command replay) request was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShellRefusal {
    #[error("can't use shell command if not invoked from the loading script")]
    NotFromLoader,
    #[error("already running in build environment shell")]
    AlreadyInShell,
    #[error("can't use shell command in CI environment")]
    UnderCi,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error(transparent)]
    Refused(#[from] ShellRefusal),
    #[error(
        "no free command slot in {} (ids {}-{} all pending); remove stale command.* scripts",
        dir.display(),
        FIRST_COMMAND_SLOT,
        LAST_COMMAND_SLOT
    )]
    SlotExhaustion { dir: PathBuf },
    #[error("no command given to run")]
    EmptyCommand,
    #[error("failed to write command script {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Validates a shell request coming from a wrapper.
///
/// Causes are checked in a fixed order so exactly one is reported.
pub fn check_shell_request(from_loader: Option<&str>, env: &Environment) -> Result<(), ShellRefusal> {
    if from_loader.is_none() {
        return Err(ShellRefusal::NotFromLoader);
    }
    if env.active_sandbox().is_some() {
        return Err(ShellRefusal::AlreadyInShell);
    }
    if env.is_ci() {
        return Err(ShellRefusal::UnderCi);
    }
    Ok(())
}

/// Script dialect understood by the invoking wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFlavor {
    Sh,
    Cmd,
}

impl ScriptFlavor {
    /// Derives the flavor from the `--from-loader` value.
    pub fn from_loader(value: &str) -> Self {
        if value.eq_ignore_ascii_case("cmd") {
            Self::Cmd
        } else {
            Self::Sh
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Sh => "sh",
            Self::Cmd => "cmd",
        }
    }

    fn render(self, command: &[String]) -> String {
        match self {
            Self::Sh => format!("#!/usr/bin/env bash\n{}\n", shell_words::join(command)),
            Self::Cmd => {
                let line: Vec<String> = command.iter().map(|arg| cmd_quote(arg)).collect();
                format!("@ECHO OFF\r\n{}\r\n", line.join(" "))
            }
        }
    }
}

/// Characters cmd.exe treats as separators or syntax outside double quotes.
const CMD_SPECIAL: &[char] = &['&', '|', '<', '>', '^', '"', '%', '(', ')', ',', ';', '=', '!'];

/// Quotes one argument for a batch file line.
///
/// Inside double quotes only `"` and `%` keep a meaning; they are doubled.
fn cmd_quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || CMD_SPECIAL.contains(&c)) {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\"\"").replace('%', "%%"))
}

/// A reserved command slot, backed by a generated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSlot {
    pub id: u8,
    pub script: PathBuf,
}

impl CommandSlot {
    pub fn signal(&self) -> ChannelSignal {
        ChannelSignal::ReplayCommand(self.id)
    }
}

/// Allocates command slots in a project's `.buildenv` folder.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    dir: PathBuf,
    flavor: ScriptFlavor,
}

impl CommandChannel {
    pub fn new(dir: &Path, flavor: ScriptFlavor) -> Self {
        Self {
            dir: dir.to_path_buf(),
            flavor,
        }
    }

    pub fn script_path(&self, id: u8, flavor: ScriptFlavor) -> PathBuf {
        self.dir.join(format!("command.{}.{}", id, flavor.extension()))
    }

    fn is_free(&self, id: u8) -> bool {
        [ScriptFlavor::Sh, ScriptFlavor::Cmd]
            .into_iter()
            .all(|flavor| !self.script_path(id, flavor).exists())
    }

    /// Lowest free identifier, if any.
    pub fn next_free(&self) -> Option<u8> {
        (FIRST_COMMAND_SLOT..=LAST_COMMAND_SLOT).find(|id| self.is_free(*id))
    }

    /// Writes `command` into the first free slot's script.
    pub fn allocate(&self, command: &[String]) -> Result<CommandSlot, ChannelError> {
        if command.is_empty() {
            return Err(ChannelError::EmptyCommand);
        }

        let id = self.next_free().ok_or_else(|| ChannelError::SlotExhaustion {
            dir: self.dir.clone(),
        })?;
        let script = self.script_path(id, self.flavor);

        fs::create_dir_all(&self.dir).map_err(|source| ChannelError::Io {
            path: self.dir.clone(),
            source,
        })?;
        fs::write(&script, self.flavor.render(command)).map_err(|source| ChannelError::Io {
            path: script.clone(),
            source,
        })?;
        make_executable(&script)?;

        debug!("command slot {} -> {}", id, script.display());
        info!("command prepared for replay: {}", command.join(" "));
        Ok(CommandSlot { id, script })
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), ChannelError> {
    use std::os::unix::fs::PermissionsExt;

    let io = |source| ChannelError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut perms = fs::metadata(path).map_err(io)?.permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).map_err(io)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), ChannelError> {
    Ok(())
}

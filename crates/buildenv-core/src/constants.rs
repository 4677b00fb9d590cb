//! Constants used across the buildenv workspace.

/// The filename for buildenv's project configuration.
pub const CONFIG_FILE: &str = "buildenv.toml";

/// Project sub-folder owned by buildenv (generated command scripts live here).
pub const BUILDENV_FOLDER: &str = ".buildenv";

/// Marker written at the sandbox root once the sandbox is fully installed.
pub const VENV_OK: &str = "venvOK";

/// Marker written at the sandbox root once the core bootstrap has completed.
pub const BUILDENV_OK: &str = "buildenvOK";

/// Suffix of the per-extension stamp file (`<name>OK`).
pub const STAMP_SUFFIX: &str = "OK";

/// Prefix of extension binaries discovered in the sandbox bin folder.
pub const EXTENSION_BINARY_PREFIX: &str = "buildenv-ext-";

/// Environment variables consumed by the core.
pub const ENV_CI: &str = "CI";
pub const ENV_VIRTUAL_ENV: &str = "VIRTUAL_ENV";
pub const ENV_SHELL: &str = "SHELL";
pub const ENV_COMSPEC: &str = "COMSPEC";

/// Configuration keys and their defaults.
pub const KEY_VENV_FOLDER: &str = "venv_folder";
pub const DEFAULT_VENV_FOLDER: &str = "venv";
pub const KEY_REQUIREMENTS: &str = "requirements";
pub const DEFAULT_REQUIREMENTS: &str = "requirements*.txt";
pub const KEY_PIP_ARGS: &str = "pip_args";
pub const KEY_LOOK_UP: &str = "look_up";
pub const KEY_PYTHON: &str = "python";
pub const KEY_BASE_PACKAGE: &str = "base_package";
pub const DEFAULT_BASE_PACKAGE: &str = "setuptools";

#[cfg(windows)]
pub const DEFAULT_PYTHON: &str = "python";
#[cfg(not(windows))]
pub const DEFAULT_PYTHON: &str = "python3";

/// Exit codes shared with the wrapper scripts.
pub const RC_SUCCESS: u8 = 0;
pub const RC_ERROR: u8 = 1;
pub const RC_SPAWN_SHELL: u8 = 100;
pub const FIRST_COMMAND_SLOT: u8 = 101;
pub const LAST_COMMAND_SLOT: u8 = 255;

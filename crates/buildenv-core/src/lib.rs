//! Core logic and abstractions for buildenv.
//!
//! This crate resolves the project configuration, locates or builds the
//! project sandbox, runs extension initializers, and speaks the exit-code
//! protocol used by the wrapper scripts.

pub mod channel;
pub mod config;
pub mod constants;
pub mod error;
pub mod extension;
pub mod project;
pub mod runtime;
pub mod sandbox;
pub mod session;

pub use channel::{ChannelError, ChannelSignal, CommandChannel, CommandSlot, ScriptFlavor, ShellRefusal};
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use extension::{Extension, ExtensionCatalog, ExtensionEntry, ExtensionError, ExtensionRegistry};
pub use runtime::{Environment, Profile};
pub use sandbox::{GitCli, ProcessRunner, RepoQuery, SandboxError, SandboxHandle, SystemRunner};
pub use session::{InitOptions, Session};

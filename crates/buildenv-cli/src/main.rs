use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use buildenv_core::constants::RC_ERROR;
use buildenv_core::{ChannelSignal, Environment, GitCli, InitOptions, Session, SystemRunner};
use buildenv_ext_git::BuiltinCatalog;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod discovery;
mod styles;

use styles as s;

/// The command-line interface for buildenv.
#[derive(Debug, Parser)]
#[command(name = "buildenv")]
#[command(version)]
#[command(styles = s::get_clap_styles())]
#[command(
    help_template = "{bin} {version}\n\n{about-with-newline}{usage-heading} {usage}\n\n{all-args}{after-help}"
)]
#[command(about = "Project-local build environment manager")]
#[command(
    long_about = "buildenv bootstraps a sandboxed Python environment for the current project
(reusing one from an enclosing repository when available), runs extension
initializers, and cooperates with the buildenv.sh / buildenv.cmd wrappers to
open a shell or run commands inside it.

Without a command, `init` is run; when invoked by a wrapper, `shell` is run.
"
)]
#[command(
    after_help = "\x1b[1;32mExamples:\x1b[0m\n  \x1b[36mbuildenv init\x1b[0m             \x1b[2m# Create or refresh the sandbox\x1b[0m\n  \x1b[36mbuildenv init --force\x1b[0m     \x1b[2m# Re-run every extension initializer\x1b[0m\n  \x1b[36mbuildenv upgrade --eager\x1b[0m  \x1b[2m# Upgrade installed packages\x1b[0m\n  \x1b[36m./buildenv.sh run pytest\x1b[0m  \x1b[2m# Run a command inside the sandbox\x1b[0m"
)]
pub(crate) struct Cli {
    /// Project folder (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    project_dir: Option<PathBuf>,
    /// Set by the wrapper scripts; the value names the script flavor (`sh` or `cmd`).
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "sh",
        value_name = "FLAVOR"
    )]
    from_loader: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Commands {
    /// Create the sandbox if needed and run pending extension initializers.
    Init {
        /// Re-run extension initializers even if already up to date.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Skip extension initializers.
        #[arg(long, default_value_t = false)]
        skip: bool,
    },
    /// Ask the wrapper to open an interactive shell in the sandbox.
    Shell,
    /// Ask the wrapper to run a command in the sandbox.
    Run {
        /// Command line to run.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Upgrade the package installer, base package and requirements.
    Upgrade {
        /// Use the eager upgrade strategy (also upgrades dependencies).
        #[arg(long, default_value_t = false)]
        eager: bool,
    },
}

impl Cli {
    /// The command to run, applying the wrapper-aware default.
    fn effective_command(&self) -> Commands {
        match &self.command {
            Some(command) => command.clone(),
            None if self.from_loader.is_some() => Commands::Shell,
            None => Commands::Init {
                force: false,
                skip: false,
            },
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    debug!("parsed cli arguments: {:?}", cli);

    match run(&cli) {
        Ok(signal) => ExitCode::from(signal.exit_code()),
        Err(err) => {
            report_error(&err);
            ExitCode::from(RC_ERROR)
        }
    }
}

fn report_error(err: &anyhow::Error) {
    let refused = err
        .downcast_ref::<buildenv_core::Error>()
        .is_some_and(buildenv_core::Error::is_refusal);
    let style = if refused { s::REFUSAL } else { s::ERROR };
    eprintln!("{}error:{} {:#}", style.render(), style.render_reset(), err);
}

/// Runs the selected command and returns the signal for the wrapper.
fn run(cli: &Cli) -> Result<ChannelSignal> {
    let project = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("unable to determine current directory")?,
    };

    let repo = GitCli;
    let runner = SystemRunner;
    let session = Session::new(&project, Environment::from_process(), &repo, &runner);
    let venv_folder = session.config().venv_folder()?;
    let session = session
        .with_catalog(Box::new(BuiltinCatalog::new(&project, &venv_folder)))
        .with_catalog(Box::new(discovery::SubprocessCatalog::new(&project)));

    dispatch(cli, &session)
}

fn dispatch(cli: &Cli, session: &Session<'_>) -> Result<ChannelSignal> {
    let from_loader = cli.from_loader.as_deref();
    let signal = match cli.effective_command() {
        Commands::Init { force, skip } => session.init(InitOptions { force, skip })?,
        Commands::Shell => session.shell(from_loader)?,
        Commands::Run { command } => session.run(from_loader, &command)?,
        Commands::Upgrade { eager } => session.upgrade(eager)?,
    };
    debug!("exit signal: {:?}", signal);
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildenv_core::constants::VENV_OK;
    use buildenv_core::{ProcessRunner, RepoQuery, SandboxError};
    use std::path::Path;
    use tempfile::tempdir;

    struct NoRepo;

    impl RepoQuery for NoRepo {
        fn toplevel(&self, _dir: &Path) -> Option<PathBuf> {
            None
        }
    }

    struct AcceptAll;

    impl ProcessRunner for AcceptAll {
        fn run(&self, _argv: &[String], _cwd: &Path) -> Result<(), SandboxError> {
            Ok(())
        }
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("buildenv").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    fn dispatch_in(dir: &Path, cli: &Cli) -> Result<ChannelSignal> {
        let session = Session::new(dir, Environment::default(), &NoRepo, &AcceptAll)
            .with_catalog(Box::new(BuiltinCatalog::new(dir, "venv")));
        dispatch(cli, &session)
    }

    #[test]
    fn default_command_depends_on_loader() {
        assert!(matches!(
            parse(&[]).effective_command(),
            Commands::Init { force: false, skip: false }
        ));
        assert!(matches!(
            parse(&["--from-loader"]).effective_command(),
            Commands::Shell
        ));
    }

    #[test]
    fn run_keeps_trailing_arguments() {
        let cli = parse(&["--from-loader=cmd", "run", "pytest", "-k", "smoke"]);
        assert_eq!(cli.from_loader.as_deref(), Some("cmd"));
        match cli.effective_command() {
            Commands::Run { command } => assert_eq!(command, vec!["pytest", "-k", "smoke"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn default_without_loader_initializes() {
        let dir = tempdir().unwrap();
        let signal = dispatch_in(dir.path(), &parse(&[])).unwrap();
        assert_eq!(signal.exit_code(), 0);
        assert!(dir.path().join("venv").join(VENV_OK).is_file());
        assert!(dir.path().join("venv").join("buildenvOK").is_file());
        assert!(dir.path().join(".gitignore").is_file());
    }

    #[test]
    fn default_with_loader_requests_shell() {
        let dir = tempdir().unwrap();
        let signal = dispatch_in(dir.path(), &parse(&["--from-loader"])).unwrap();
        assert_eq!(signal.exit_code(), 100);
    }

    #[test]
    fn explicit_shell_without_loader_is_refused() {
        let dir = tempdir().unwrap();
        let err = dispatch_in(dir.path(), &parse(&["shell"])).expect_err("must be refused");
        assert!(err
            .downcast_ref::<buildenv_core::Error>()
            .is_some_and(buildenv_core::Error::is_refusal));
        assert!(!dir.path().join("venv").join("buildenvOK").exists());
    }

    #[test]
    fn run_from_loader_returns_slot_code() {
        let dir = tempdir().unwrap();
        let cli = parse(&["--from-loader", "run", "echo", "hello"]);
        let signal = dispatch_in(dir.path(), &cli).unwrap();
        assert_eq!(signal.exit_code(), 101);
    }
}

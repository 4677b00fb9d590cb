use std::collections::HashMap;

use crate::constants::{ENV_CI, ENV_COMSPEC, ENV_SHELL, ENV_VIRTUAL_ENV};

/// Configuration profile a value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Local,
    Ci,
}

/// Snapshot of the process environment, taken once per invocation.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    fn non_empty(&self, name: &str) -> Option<&str> {
        self.var(name).filter(|value| !value.is_empty())
    }

    /// True when a CI indicator is set to a non-empty value.
    pub fn is_ci(&self) -> bool {
        self.non_empty(ENV_CI).is_some()
    }

    /// Path of the sandbox activated in the calling shell, if any.
    pub fn active_sandbox(&self) -> Option<&str> {
        self.non_empty(ENV_VIRTUAL_ENV)
    }

    /// Shell the wrapper should spawn for interactive sessions.
    pub fn shell(&self) -> &str {
        if cfg!(windows) {
            self.non_empty(ENV_COMSPEC).unwrap_or("cmd")
        } else {
            self.non_empty(ENV_SHELL).unwrap_or("bash")
        }
    }

    /// Config profiles to consult, most specific first.
    pub fn profiles(&self) -> &'static [Profile] {
        if self.is_ci() {
            &[Profile::Ci, Profile::Local]
        } else {
            &[Profile::Local]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ci_variable_is_not_ci() {
        let env = Environment::from_pairs([("CI", "")]);
        assert!(!env.is_ci());
        assert_eq!(env.profiles(), &[Profile::Local]);
    }

    #[test]
    fn ci_profile_is_consulted_first() {
        let env = Environment::from_pairs([("CI", "true")]);
        assert_eq!(env.profiles(), &[Profile::Ci, Profile::Local]);
    }

    #[cfg(unix)]
    #[test]
    fn shell_defaults_to_bash() {
        assert_eq!(Environment::default().shell(), "bash");
        let env = Environment::from_pairs([("SHELL", "/bin/zsh")]);
        assert_eq!(env.shell(), "/bin/zsh");
    }
}

use std::collections::BTreeMap;
use std::env as stdenv;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: the variables used for `$NAME` expansion and handed to every launched child.
/// - `raw`: inherited variables whose name or value is not valid UTF-8. They cannot be
///   expanded but are still handed to children unchanged.
/// - `current_dir`: the working directory for command execution.
/// - `should_exit`: set by the `exit` builtin; the REPL loop stops when it sees it.
///
/// Children never see the interpreter's own process environment directly: the launcher
/// clears it and passes exactly `vars` and `raw`, so `setenv` is visible to every later
/// command.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME), ordered by key.
    pub vars: BTreeMap<String, String>,
    pub raw: BTreeMap<OsString, OsString>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// When set to true, indicates that an interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let mut env = Self::empty();
        for (key, value) in stdenv::vars_os() {
            match (key.to_str(), value.to_str()) {
                (Some(k), Some(v)) => {
                    env.vars.insert(k.to_string(), v.to_string());
                }
                _ => {
                    tracing::debug!(?key, "keeping non-UTF-8 variable for children only");
                    env.raw.insert(key, value);
                }
            }
        }
        env
    }

    /// An environment with no variables, rooted at the process's current directory.
    pub fn empty() -> Self {
        Self {
            vars: BTreeMap::new(),
            raw: BTreeMap::new(),
            current_dir: stdenv::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            should_exit: false,
        }
    }

    /// Get the value of a variable.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable. Replaces an inherited non-UTF-8 value of the same name.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        let key = key.into();
        self.raw.remove(OsStr::new(&key));
        self.vars.insert(key, val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

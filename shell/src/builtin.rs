use crate::command::ExitCode;
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use regex::Regex;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

/// Names `setenv` accepts.
const VARIABLE_NAME: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Executes the command using the shell's output stream and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

/// Object-safe face of a builtin, as seen by [`Builtins`].
pub trait Builtin {
    fn name(&self) -> &'static str;

    /// Parse `args` and run. Usage and execution errors are written to `stderr` and
    /// turned into a non-zero exit code; only failures to write come back as `Err`.
    fn run(
        &self,
        args: &[&str],
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> io::Result<ExitCode>;
}

impl<T: BuiltinCommand> Builtin for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn run(
        &self,
        args: &[&str],
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> io::Result<ExitCode> {
        match T::from_args(&[T::name()], args) {
            Ok(cmd) => match cmd.execute(stdout, env) {
                Ok(code) => Ok(code),
                Err(e) => {
                    writeln!(stderr, "{}: {:#}", T::name(), e)?;
                    Ok(1)
                }
            },
            Err(EarlyExit { output, status }) => match status {
                Ok(()) => {
                    write_usage(stdout, &output)?;
                    Ok(0)
                }
                Err(()) => {
                    write_usage(stderr, &output)?;
                    Ok(1)
                }
            },
        }
    }
}

fn write_usage(out: &mut dyn Write, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}

/// The table of builtins, consulted before anything is launched.
pub struct Builtins {
    table: Vec<Box<dyn Builtin>>,
}

impl Builtins {
    pub fn new(table: Vec<Box<dyn Builtin>>) -> Self {
        Self { table }
    }

    /// Run `argv` if its first word names a builtin.
    ///
    /// Returns `Ok(None)` when it does not, in which case nothing was written.
    pub fn dispatch(
        &self,
        argv: &[String],
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
        env: &mut Environment,
    ) -> io::Result<Option<ExitCode>> {
        let Some((name, rest)) = argv.split_first() else {
            return Ok(None);
        };
        let Some(builtin) = self.table.iter().find(|b| b.name() == name) else {
            return Ok(None);
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        let code = builtin.run(&args, stdout, stderr, env)?;
        stdout.flush()?;
        Ok(Some(code))
    }
}

impl Default for Builtins {
    /// `exit`, `pwd`, `cd`, `echo`, `env` and `setenv`.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Env>::default()),
            Box::new(Factory::<Setenv>::default()),
        ])
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.to_string_lossy())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => return Err(anyhow::anyhow!("HOME not set")),
            },
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("{}", new_dir.display()))?;

        std::env::set_current_dir(&canonical)
            .with_context(|| format!("{}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

/// Exit the shell with status 0. Arguments are ignored.
pub struct Exit {}

impl FromArgs for Exit {
    fn from_args(_command_name: &[&str], _args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Exit {})
    }
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

/// Write the arguments to standard output, separated by spaces.
///
/// Every argument is printed as-is, including ones that look like flags or `help`.
/// Only a leading `-n` is taken as an option: it drops the trailing newline.
pub struct Echo {
    pub no_newline: bool,
    pub args: Vec<String>,
}

impl FromArgs for Echo {
    fn from_args(_command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        let (no_newline, rest) = match args.split_first() {
            Some((&"-n", rest)) => (true, rest),
            _ => (false, args),
        };
        Ok(Echo {
            no_newline,
            args: rest.iter().map(|s| s.to_string()).collect(),
        })
    }
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print every environment variable as KEY=VALUE, one per line.
pub struct Env {}

impl BuiltinCommand for Env {
    fn name() -> &'static str {
        "env"
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        for (key, value) in &env.vars {
            writeln!(stdout, "{}={}", key, value)?;
        }
        for (key, value) in &env.raw {
            writeln!(stdout, "{}={}", key.to_string_lossy(), value.to_string_lossy())?;
        }
        Ok(0)
    }
}

/// Set an environment variable for this shell and every command it starts.
///
/// Takes exactly a name and a value, both literal: a value may start with `-`.
pub struct Setenv {
    pub name: String,
    pub value: String,
}

impl FromArgs for Setenv {
    fn from_args(command_name: &[&str], args: &[&str]) -> Result<Self, EarlyExit> {
        match args {
            [name, value] => Ok(Setenv {
                name: name.to_string(),
                value: value.to_string(),
            }),
            _ => Err(EarlyExit::from(format!(
                "Usage: {} NAME VALUE",
                command_name.join(" ")
            ))),
        }
    }
}

impl BuiltinCommand for Setenv {
    fn name() -> &'static str {
        "setenv"
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let valid = Regex::new(VARIABLE_NAME)?;
        if !valid.is_match(&self.name) {
            return Err(anyhow::anyhow!("invalid variable name '{}'", self.name));
        }
        env.set_var(self.name, self.value);
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::process_lock;
    use std::collections::BTreeMap;
    use std::env as stdenv;

    fn test_env() -> Environment {
        Environment {
            vars: BTreeMap::new(),
            raw: BTreeMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            should_exit: false,
        }
    }

    /// Dispatch `line` and return (exit code, stdout, stderr).
    fn run(line: &[&str], env: &mut Environment) -> (Option<ExitCode>, String, String) {
        let argv: Vec<String> = line.iter().map(|s| s.to_string()).collect();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = Builtins::default()
            .dispatch(&argv, &mut out, &mut err, env)
            .unwrap();
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let _lock = process_lock();
        let cur = stdenv::current_dir().unwrap();
        let mut env = test_env();

        let mut out = Vec::new();
        let res = Pwd {}.execute(&mut out, &mut env);

        assert!(res.is_ok());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("{}\n", cur.to_string_lossy())
        );
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let mut env = test_env();

        // With newline
        let mut out1 = Vec::new();
        let echo1 = Echo {
            no_newline: false,
            args: vec!["hello".to_string(), "world".to_string()],
        };
        assert!(echo1.execute(&mut out1, &mut env).is_ok());
        assert_eq!(String::from_utf8(out1).unwrap(), "hello world\n");

        // Without newline
        let mut out2 = Vec::new();
        let echo2 = Echo {
            no_newline: true,
            args: vec!["foo".to_string(), "bar".to_string()],
        };
        assert!(echo2.execute(&mut out2, &mut env).is_ok());
        assert_eq!(String::from_utf8(out2).unwrap(), "foo bar");
    }

    #[test]
    fn test_echo_through_dispatch() {
        let mut env = test_env();
        let (code, out, err) = run(&["echo", "/home/u"], &mut env);
        assert_eq!(code, Some(0));
        assert_eq!(out, "/home/u\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = process_lock();
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");

        // save original cwd to restore later
        let orig = stdenv::current_dir().unwrap();
        let mut env = test_env();

        let cmd = Cd {
            target: Some(canonical_temp.to_string_lossy().to_string()),
        };
        let res = cmd.execute(&mut Vec::new(), &mut env);
        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let _lock = process_lock();
        let temp = tempfile::tempdir().expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(temp.path()).expect("canonicalize failed");

        let orig = stdenv::current_dir().unwrap();
        let mut env = test_env();
        env.set_var("HOME", canonical_temp.to_string_lossy().to_string());

        let (code, _, _) = run(&["cd"], &mut env);
        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert_eq!(code, Some(0));
        assert_eq!(fs::canonicalize(new_cwd).unwrap(), canonical_temp);
        assert_eq!(env.current_dir, canonical_temp);
    }

    #[test]
    fn test_cd_without_home_reports() {
        let _lock = process_lock();
        let mut env = test_env();
        let (code, _, err) = run(&["cd"], &mut env);
        assert_eq!(code, Some(1));
        assert_eq!(err, "cd: HOME not set\n");
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = process_lock();
        let orig = stdenv::current_dir().unwrap();
        let mut env = test_env();

        let (code, _, err) = run(&["cd", "/no/such/dir"], &mut env);

        assert_eq!(code, Some(1));
        assert!(err.starts_with("cd: /no/such/dir: "), "unexpected message {err:?}");
        assert_eq!(stdenv::current_dir().unwrap(), orig);
        assert_eq!(env.current_dir, orig);
    }

    #[test]
    fn test_echo_prints_flag_like_words_literally() {
        let mut env = test_env();
        for (line, expected) in [
            (&["echo", "-x", "hi"][..], "-x hi\n"),
            (&["echo", "-5"][..], "-5\n"),
            (&["echo", "help"][..], "help\n"),
            (&["echo", "--help"][..], "--help\n"),
            (&["echo", "a", "-n"][..], "a -n\n"),
        ] {
            let (code, out, err) = run(line, &mut env);
            assert_eq!(code, Some(0), "{line:?}");
            assert_eq!(out, expected, "{line:?}");
            assert!(err.is_empty(), "{line:?}: {err}");
        }
    }

    #[test]
    fn test_echo_leading_n_drops_newline() {
        let mut env = test_env();
        let (code, out, _) = run(&["echo", "-n", "-x", "y"], &mut env);
        assert_eq!(code, Some(0));
        assert_eq!(out, "-x y");
    }

    #[test]
    fn test_exit_ignores_arguments() {
        for line in [&["exit", "help"][..], &["exit", "--help"][..], &["exit", "3"][..]] {
            let mut env = test_env();
            let (code, out, err) = run(line, &mut env);
            assert_eq!(code, Some(0), "{line:?}");
            assert!(out.is_empty() && err.is_empty(), "{line:?}");
            assert!(env.should_exit, "{line:?}");
        }
    }

    #[test]
    fn test_setenv_value_may_look_like_a_flag() {
        let mut env = test_env();
        let (code, _, err) = run(&["setenv", "CFLAGS", "-O2"], &mut env);
        assert_eq!(code, Some(0));
        assert!(err.is_empty(), "{err}");
        assert_eq!(env.get_var("CFLAGS"), Some("-O2"));

        let (code, out, _) = run(&["setenv", "X", "help"], &mut env);
        assert_eq!(code, Some(0));
        assert!(out.is_empty());
        assert_eq!(env.get_var("X"), Some("help"));
    }

    #[test]
    fn test_exit_sets_flag() {
        let mut env = test_env();
        let (code, out, _) = run(&["exit"], &mut env);
        assert_eq!(code, Some(0));
        assert!(out.is_empty());
        assert!(env.should_exit);
    }

    #[test]
    fn test_env_lists_variables_in_order() {
        let mut env = test_env();
        env.set_var("B", "2");
        env.set_var("A", "1");
        let (code, out, _) = run(&["env"], &mut env);
        assert_eq!(code, Some(0));
        assert_eq!(out, "A=1\nB=2\n");
    }

    #[test]
    fn test_setenv_sets_variable() {
        let mut env = test_env();
        let (code, _, err) = run(&["setenv", "GREETING", "hello"], &mut env);
        assert_eq!(code, Some(0));
        assert!(err.is_empty());
        assert_eq!(env.get_var("GREETING"), Some("hello"));
    }

    #[test]
    fn test_setenv_requires_exactly_two_arguments() {
        let mut env = test_env();
        for line in [&["setenv"][..], &["setenv", "A"][..], &["setenv", "A", "b", "c"][..]] {
            let (code, out, err) = run(line, &mut env);
            assert_eq!(code, Some(1), "{line:?}");
            assert!(out.is_empty());
            assert_eq!(err, "Usage: setenv NAME VALUE\n", "{line:?}");
        }
        assert!(env.vars.is_empty());
    }

    #[test]
    fn test_setenv_rejects_bad_name() {
        let mut env = test_env();
        let (code, _, err) = run(&["setenv", "1BAD", "x"], &mut env);
        assert_eq!(code, Some(1));
        assert_eq!(err, "setenv: invalid variable name '1BAD'\n");
        assert!(env.vars.is_empty());
    }

    #[test]
    fn test_help_goes_to_stdout() {
        let mut env = test_env();
        let (code, out, err) = run(&["pwd", "--help"], &mut env);
        assert_eq!(code, Some(0));
        assert!(out.contains("Usage: pwd"));
        assert!(err.is_empty());
    }

    #[test]
    fn test_unknown_command_is_not_dispatched() {
        let mut env = test_env();
        let (code, out, err) = run(&["ls", "-l"], &mut env);
        assert_eq!(code, None);
        assert!(out.is_empty() && err.is_empty());
    }
}

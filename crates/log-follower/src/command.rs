//! Commands and the placeholder templates they are expanded from

use async_process::{Command as AsyncCommand, Stdio};
use std::ffi::{OsStr, OsString};

use crate::error::{Error, Result};

/// Placeholder replaced by the number of history lines
pub const LINES_PLACEHOLDER: &str = "$lines";
/// Placeholder replaced by the followed file's path
pub const PATH_PLACEHOLDER: &str = "$path";
/// Placeholder replaced by the client supplied script
pub const SCRIPT_PLACEHOLDER: &str = "$script";

/// A command to be executed
///
/// Unlike `async_process::Command` this type is `Clone`, can be inspected,
/// and is converted with [`Command::prepare`] right before spawning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    /// Get the program name
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Program and arguments joined for log output
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Convert into an `async_process::Command` wired for line streaming.
    ///
    /// stdin is closed, stdout and stderr are piped, and the child is killed
    /// if its handle is dropped without being reaped.
    pub fn prepare(&self) -> AsyncCommand {
        let mut cmd = AsyncCommand::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}

/// Values substituted into a [`CommandTemplate`]
#[derive(Debug, Clone, Copy)]
pub struct Expansion<'a> {
    /// Number of history lines to replay
    pub lines: usize,
    /// Path of the followed file
    pub path: &'a str,
    /// Script text, empty when the view has none
    pub script: &'a str,
}

/// An argument vector with `$lines`, `$path` and `$script` placeholders.
///
/// Placeholders are matched against whole arguments only, so a path that
/// happens to contain `$path` is never substituted twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    action: Vec<String>,
}

impl CommandTemplate {
    /// Build a template from its argument vector
    pub fn new<I, S>(action: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let action: Vec<String> = action.into_iter().map(Into::into).collect();
        if action.is_empty() {
            return Err(Error::EmptyCommand);
        }
        Ok(Self { action })
    }

    /// The default tail template: `tail -n $lines -F $path`
    pub fn tail() -> Self {
        Self {
            action: ["tail", "-n", LINES_PLACEHOLDER, "-F", PATH_PLACEHOLDER]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// The raw argument vector
    pub fn action(&self) -> &[String] {
        &self.action
    }

    /// Substitute the placeholders and build a runnable command
    pub fn expand(&self, values: Expansion<'_>) -> Command {
        let mut parts = self.action.iter().map(|arg| match arg.as_str() {
            LINES_PLACEHOLDER => values.lines.to_string(),
            PATH_PLACEHOLDER => values.path.to_string(),
            SCRIPT_PLACEHOLDER => values.script.to_string(),
            other => other.to_string(),
        });

        // `new` rejects empty templates, so there is always a program.
        let mut command = Command::new(parts.next().unwrap_or_default());
        command.args(parts);
        command
    }
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self::tail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_template_expansion() {
        let cmd = CommandTemplate::tail().expand(Expansion {
            lines: 10,
            path: "/var/log/messages",
            script: "",
        });

        assert_eq!(cmd.get_program(), "tail");
        assert_eq!(cmd.get_args(), &["-n", "10", "-F", "/var/log/messages"]);
        assert_eq!(cmd.display(), "tail -n 10 -F /var/log/messages");
    }

    #[test]
    fn test_script_placeholder() {
        let template = CommandTemplate::new(["sed", "-u", "-e", "$script", "$path"]).unwrap();
        let cmd = template.expand(Expansion {
            lines: 0,
            path: "a.log",
            script: "s/a/b/",
        });

        assert_eq!(cmd.get_program(), "sed");
        assert_eq!(cmd.get_args(), &["-u", "-e", "s/a/b/", "a.log"]);
    }

    #[test]
    fn test_placeholders_only_match_whole_arguments() {
        let template = CommandTemplate::new(["echo", "prefix-$path", "$path"]).unwrap();
        let cmd = template.expand(Expansion {
            lines: 0,
            path: "$path.log",
            script: "",
        });

        assert_eq!(cmd.get_args(), &["prefix-$path", "$path.log"]);
    }

    #[test]
    fn test_empty_template_rejected() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            CommandTemplate::new(empty),
            Err(Error::EmptyCommand)
        ));
    }

    #[test]
    fn test_command_builder() {
        let mut cmd = Command::new("ls");
        cmd.arg("-la").arg("/tmp");

        assert_eq!(cmd.get_args().len(), 2);
        assert_eq!(cmd.get_args()[0], "-la");
        assert_eq!(cmd.display(), "ls -la /tmp");
    }
}

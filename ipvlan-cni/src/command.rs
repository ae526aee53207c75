use std::fmt;

use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

/// A host command kept as argv so it can be executed directly or rendered
/// into a script line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
}

impl HostCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args_list(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// None when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait CommandRunner {
    /// Runs `cmd` to completion. A non-zero exit is returned as output, only
    /// failing to spawn is an error.
    async fn run(&self, cmd: &HostCommand) -> Result<CommandOutput>;

    /// Like `run` but treats a non-zero exit as an `ApplyFailure`.
    async fn run_checked(&self, cmd: &HostCommand) -> Result<CommandOutput> {
        let out = self.run(cmd).await?;
        if out.success() {
            Ok(out)
        } else {
            Err(Error::ApplyFailure(format!(
                "`{cmd}` exited with {:?}: {}",
                out.code,
                out.stderr.trim()
            )))
        }
    }
}

impl<R: CommandRunner> CommandRunner for &R {
    async fn run(&self, cmd: &HostCommand) -> Result<CommandOutput> {
        (**self).run(cmd).await
    }
}

/// Runs commands on the local host.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, cmd: &HostCommand) -> Result<CommandOutput> {
        debug!(command = %cmd, "executing");
        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

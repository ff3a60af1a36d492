//! Host-side hooks run before any container work

use std::process::Command;

use crate::{Error, Result};

#[cfg_attr(test, mockall::automock)]
pub trait HostShell {
    /// Run `command` through the host shell, returning its exit status
    fn run(&self, command: &str) -> Result<Option<i32>>;
}

/// `sh -c` on the local machine
pub struct SystemShell;

impl HostShell for SystemShell {
    fn run(&self, command: &str) -> Result<Option<i32>> {
        let status = Command::new("sh").args(["-c", command]).status()?;
        Ok(status.code())
    }
}

/// Run each command in order, stopping at the first failure
pub fn run_hooks<H: HostShell + ?Sized>(shell: &H, commands: &[String]) -> Result<()> {
    for command in commands {
        tracing::info!(command = %command, "Running host command");
        match shell.run(command)? {
            Some(0) => {}
            code => {
                return Err(Error::HostCommand {
                    command: command.clone(),
                    code,
                })
            }
        }
    }
    Ok(())
}

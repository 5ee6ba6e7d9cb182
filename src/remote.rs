use std::path::Path;

pub trait Remote {
    // Err means the command could not be run at all. A command that ran and
    // failed is an Ok with a non-zero exit_status.
    fn run_remote_cmd(&self, cmd: &str) -> anyhow::Result<CommandResult>;
    fn upload(&self, src: &Path, dst: &str) -> anyhow::Result<()>;
    // idempotent
    fn close(&mut self);
}

/// Outcome of one remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

use std::fmt;

// Every variant is fatal for the process. Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Datastore path \"{0}\" is not in format \"[datastore] path\"")]
    MalformedDestination(String),

    #[error("Cannot SSH to {user}@{host}: {reason}")]
    Connect {
        host: String,
        user: String,
        reason: String,
    },

    #[error("Cannot copy local file \"{local}\" to temporary remote file \"{remote}\": {reason}")]
    Transfer {
        local: String,
        remote: String,
        reason: String,
    },

    // Never reached the point where the remote process could report a status
    #[error("Cannot run {step} command: {reason}")]
    Invocation { step: Step, reason: String },

    #[error("{step} command exited with status {status}: {stderr}")]
    RemoteCommandFailed {
        step: Step,
        status: i32,
        stderr: String,
    },
}

impl DeployError {
    pub fn invocation(step: Step, reason: impl fmt::Display) -> Self {
        DeployError::Invocation {
            step,
            reason: reason.to_string(),
        }
    }
}

/// Which remote command an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Convert,
    Cleanup,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Convert => "clone",
            Step::Cleanup => "delete",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_step() {
        let err = DeployError::RemoteCommandFailed {
            step: Step::Cleanup,
            status: 1,
            stderr: "No such file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "delete command exited with status 1: No such file"
        );

        let err = DeployError::invocation(Step::Convert, "channel is null");
        assert_eq!(err.to_string(), "Cannot run clone command: channel is null");
    }
}

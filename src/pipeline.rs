// Upload -> convert -> cleanup.
//
// Stages run strictly in order and the first failure ends the run:
//
//   Start -> Connected -> Uploaded -> Converted -> Cleaned -> Done
//
// Nothing is retried. A failed conversion leaves the staging file on the
// datastore, since what state the remote filesystem is in is unknown.

use std::path::PathBuf;

use crate::destination::{Destination, StagingPath};
use crate::error::{DeployError, Step};
use crate::remote::Remote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Connected,
    Uploaded,
    Converted,
    Cleaned,
    Done,
}

impl Stage {
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Start, Connected)
                | (Connected, Uploaded)
                | (Uploaded, Converted)
                | (Converted, Cleaned)
                | (Cleaned, Done)
        )
    }
}

/// Everything the run needs to know, resolved before connecting.
#[derive(Debug, Clone)]
pub struct Plan {
    pub local_file: PathBuf,
    pub destination: Destination,
    pub staging: StagingPath,
}

impl Plan {
    pub fn new(local_file: PathBuf, destination: Destination, staging: StagingPath) -> Plan {
        Plan {
            local_file,
            destination,
            staging,
        }
    }

    pub fn staging_path(&self) -> String {
        self.staging.real_path()
    }

    pub fn final_path(&self) -> String {
        self.destination.real_path()
    }

    pub fn convert_command(&self) -> String {
        format!(
            "vmkfstools -i \"{}\" -d thin \"{}\"",
            self.staging_path(),
            self.final_path()
        )
    }

    pub fn delete_command(&self) -> String {
        format!("rm \"{}\"", self.staging_path())
    }
}

pub struct Pipeline {
    plan: Plan,
    stage: Stage,
}

impl Pipeline {
    pub fn new(plan: Plan) -> Pipeline {
        Pipeline {
            plan,
            stage: Stage::Start,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "{:?} -> {:?}",
            self.stage,
            next
        );
        tracing::debug!(from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }

    /// Connect with `connect`, then upload, convert and clean up.
    ///
    /// The session is closed exactly once before returning, whichever stage
    /// failed. Connection failures return before any remote state is touched.
    pub fn run<R, C>(&mut self, connect: C) -> Result<(), DeployError>
    where
        R: Remote,
        C: FnOnce() -> Result<R, DeployError>,
    {
        let mut remote = connect()?;
        self.advance(Stage::Connected);

        let res = self.run_stages(&remote);
        remote.close();
        res?;

        self.advance(Stage::Done);
        tracing::info!("Disk uploaded successfully");
        Ok(())
    }

    fn run_stages<R: Remote>(&mut self, remote: &R) -> Result<(), DeployError> {
        let staging = self.plan.staging_path();

        tracing::info!(
            "Copying \"{}\" to \"{}\"",
            self.plan.local_file.display(),
            staging
        );
        remote
            .upload(&self.plan.local_file, &staging)
            .map_err(|err| DeployError::Transfer {
                local: self.plan.local_file.display().to_string(),
                remote: staging.clone(),
                reason: format!("{err:#}"),
            })?;
        self.advance(Stage::Uploaded);

        let convert = self.plan.convert_command();
        tracing::info!("Cloning to final destination with command: {convert}");
        run_step(remote, Step::Convert, &convert)?;
        self.advance(Stage::Converted);

        let delete = self.plan.delete_command();
        tracing::info!("Deleting temporary file with command: {delete}");
        run_step(remote, Step::Cleanup, &delete)?;
        self.advance(Stage::Cleaned);

        Ok(())
    }
}

// Ok only if the command ran and exited 0
fn run_step<R: Remote>(remote: &R, step: Step, cmd: &str) -> Result<(), DeployError> {
    let res = remote
        .run_remote_cmd(cmd)
        .map_err(|err| DeployError::invocation(step, format!("{err:#}")))?;
    if !res.stdout.is_empty() {
        tracing::debug!(%step, stdout = %res.stdout.trim_end(), "remote output");
    }
    if !res.is_success() {
        return Err(DeployError::RemoteCommandFailed {
            step,
            status: res.exit_status,
            stderr: res.stderr.trim_end().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_transitions() {
        use Stage::*;
        let order = [Start, Connected, Uploaded, Converted, Cleaned, Done];
        for pair in order.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
            assert!(!pair[1].can_transition_to(pair[0]));
        }
        assert!(!Start.can_transition_to(Uploaded));
        assert!(!Uploaded.can_transition_to(Cleaned));
        assert!(!Done.can_transition_to(Start));
    }

    #[test]
    fn test_commands() {
        let destination = Destination::parse("[datastore1]  /vms/disk.vmdk").unwrap();
        let staging = destination.staging(Some("/tmp-1700000000000.vmdk"));
        let plan = Plan::new("disk.img".into(), destination, staging);

        assert_eq!(
            plan.convert_command(),
            "vmkfstools -i \"/vmfs/volumes/datastore1/tmp-1700000000000.vmdk\" -d thin \"/vmfs/volumes/datastore1/vms/disk.vmdk\""
        );
        assert_eq!(
            plan.delete_command(),
            "rm \"/vmfs/volumes/datastore1/tmp-1700000000000.vmdk\""
        );
    }
}

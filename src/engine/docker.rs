use tracing::{debug, warn};

use crate::config::{Config, OwnershipMode};
use crate::error::{EngineError, OwnershipRepairWarning, Result};

use super::ExecutionRequest;
use super::ownership::{self, Snapshot};
use super::process;

/// Runs images through the local Docker daemon.
pub struct DockerBackend<'a> {
    bin: &'a str,
    ownership: OwnershipMode,
}

impl<'a> DockerBackend<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            bin: &config.runtime_bins.docker,
            ownership: config.docker_ownership,
        }
    }

    /// Verify that the Docker daemon is reachable.
    pub fn ensure_available(&self) -> Result<()> {
        let args = [
            "version".to_string(),
            "--format".to_string(),
            "{{.Server.Version}}".to_string(),
        ];
        let captured = process::run(self.bin, &args)?;
        if !captured.success() {
            return Err(EngineError::config(format!(
                "docker daemon is not reachable: {}",
                captured.stderr.trim()
            )));
        }
        debug!(server = captured.stdout.trim(), "docker daemon reachable");
        Ok(())
    }

    /// Run `request`, failing with a configuration error before anything is
    /// started when the daemon does not answer.
    pub fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        self.ensure_available()?;

        let snapshot = if self.should_repair() {
            match Snapshot::take(&request.volumes) {
                Ok(snapshot) => Some(snapshot),
                Err(warning) => {
                    warn!(%warning, "skipping ownership repair");
                    None
                }
            }
        } else {
            None
        };

        let args = run_args(request, &request.command);
        let output = process::run(self.bin, &args)?.into_output(&request.image, &request.command)?;

        if let Some(snapshot) = snapshot
            && let Err(warning) = self.repair(request, &snapshot)
        {
            warn!(%warning, "outputs may remain owned by the container user");
        }

        Ok(output)
    }

    fn should_repair(&self) -> bool {
        match self.ownership {
            OwnershipMode::Skip => false,
            OwnershipMode::Repair => true,
            OwnershipMode::Auto => !self.daemon_is_rootless(),
        }
    }

    fn daemon_is_rootless(&self) -> bool {
        let args = [
            "info".to_string(),
            "--format".to_string(),
            "{{json .SecurityOptions}}".to_string(),
        ];
        match process::run(self.bin, &args) {
            Ok(captured) if captured.success() => {
                let rootless = ownership::is_rootless(&captured.stdout);
                debug!(rootless, "probed docker daemon");
                rootless
            }
            _ => false,
        }
    }

    /// Chown paths created during the run back to the invoking user by running
    /// a second short-lived container from the same image.
    fn repair(
        &self,
        request: &ExecutionRequest,
        snapshot: &Snapshot,
    ) -> std::result::Result<(), OwnershipRepairWarning> {
        let paths = snapshot.new_container_paths()?;
        if paths.is_empty() {
            return Ok(());
        }

        let Some((uid, gid)) = ownership::host_ids() else {
            return Err(OwnershipRepairWarning {
                paths,
                reason: "platform does not report a process uid/gid".to_string(),
            });
        };

        debug!(count = paths.len(), uid, gid, "repairing ownership of new outputs");
        let chown = ownership::chown_command(uid, gid, &paths);
        let args = run_args(request, &chown);
        let result = process::run(self.bin, &args)
            .and_then(|captured| captured.into_output(&request.image, &chown));

        result.map(|_| ()).map_err(|e| OwnershipRepairWarning {
            paths,
            reason: e.to_string(),
        })
    }
}

/// `docker run` arguments mounting every volume read-write.
pub fn run_args(request: &ExecutionRequest, command: &[String]) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string()];
    for bind in request.volumes.bind_specs() {
        args.push("-v".into());
        args.push(format!("{bind}:rw"));
    }
    args.push("-w".into());
    args.push(request.working_dir.clone());
    for assignment in &request.environment {
        args.push("-e".into());
        args.push(assignment.clone());
    }
    args.push(request.image.clone());
    args.extend(command.iter().cloned());
    args
}

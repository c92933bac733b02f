// Containerized execution: backend dispatch and run logging. Calls block until the run ends.

pub mod docker;
pub mod dsub;
pub mod ownership;
pub mod process;
pub mod singularity;
mod types;

pub use docker::DockerBackend;
pub use dsub::DsubBackend;
pub use singularity::SingularityBackend;
pub use types::{DEFAULT_ENVIRONMENT, ExecutionRequest};

use tracing::{error, info};

use crate::config::{Config, Framework};
use crate::error::{EngineError, Result};
use crate::volume::VolumeSet;

/// Run `request` on the backend for `framework`.
pub fn execute(
    config: &Config,
    framework: Framework,
    request: &ExecutionRequest,
) -> Result<String> {
    match framework {
        Framework::Docker => DockerBackend::new(config).execute(request),
        Framework::Singularity => SingularityBackend::new(config).execute(request),
        Framework::Dsub => DsubBackend::new(config).execute(request),
    }
}

/// Parse a framework name, reporting the accepted set on failure.
pub fn parse_framework(name: &str) -> Result<Framework> {
    name.parse()
        .map_err(|e: crate::config::UnknownFramework| EngineError::config(e.to_string()))
}

/// Run a command in `registry/owner/<image_suffix>` on the named framework.
pub fn run_container(
    config: &Config,
    framework: &str,
    image_suffix: &str,
    command: &[String],
    volumes: &VolumeSet,
    working_dir: &str,
    environment: &str,
) -> Result<String> {
    let framework = parse_framework(framework)?;
    let request = ExecutionRequest::new(
        &config.container_registry,
        image_suffix,
        command.to_vec(),
        volumes.clone(),
        working_dir,
    )
    .with_environment([environment.to_string()]);
    execute(config, framework, &request)
}

/// [`run_container`] wrapped with progress and failure logging for algorithm `name`.
///
/// A failed contained process is logged with its image, command, and stderr,
/// then returned unchanged so the caller's pipeline branch stops.
#[allow(clippy::too_many_arguments)]
pub fn run_container_and_log(
    name: &str,
    config: &Config,
    framework: &str,
    image_suffix: &str,
    command: &[String],
    volumes: &VolumeSet,
    working_dir: &str,
    environment: &str,
) -> Result<String> {
    info!(
        "Running {name} on container framework \"{framework}\" on env {environment} with command: {}",
        command.join(" ")
    );

    match run_container(
        config,
        framework,
        image_suffix,
        command,
        volumes,
        working_dir,
        environment,
    ) {
        Ok(output) => {
            if !output.is_empty() {
                info!("{}", output.trim_end());
            }
            Ok(output)
        }
        Err(err) => {
            if let EngineError::ContainedProcess {
                image,
                command,
                exit_code,
                stderr,
                ..
            } = &err
            {
                error!(
                    algorithm = name,
                    image = %image,
                    exit_code = ?exit_code,
                    command = %command,
                    "An unexpected error occurred while running {name}:\n{}",
                    stderr.trim_end()
                );
            }
            Err(err)
        }
    }
}

/// Check that the runtime for `framework` is usable on this machine.
pub fn ensure_available(config: &Config, framework: Framework) -> Result<()> {
    match framework {
        Framework::Docker => DockerBackend::new(config).ensure_available(),
        Framework::Singularity => SingularityBackend::new(config).ensure_available(),
        Framework::Dsub => {
            let bins = &config.runtime_bins;
            for bin in [&bins.dsub, &bins.gsutil] {
                process::run(bin, &["--version".to_string()])?;
            }
            Ok(())
        }
    }
}

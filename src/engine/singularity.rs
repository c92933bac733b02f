use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{EngineError, Result};

use super::ExecutionRequest;
use super::process;

/// Runs images through Singularity/Apptainer with a clean environment.
pub struct SingularityBackend<'a> {
    bin: &'a str,
    unpack_dir: Option<&'a Path>,
}

impl<'a> SingularityBackend<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            bin: &config.runtime_bins.singularity,
            unpack_dir: config.unpack_singularity.then_some(config.unpack_dir.as_path()),
        }
    }

    pub fn ensure_supported() -> Result<()> {
        if cfg!(target_os = "linux") {
            Ok(())
        } else {
            Err(EngineError::config(format!(
                "Singularity is only supported on Linux, not {}",
                std::env::consts::OS
            )))
        }
    }

    /// Verify that the runtime binary answers.
    pub fn ensure_available(&self) -> Result<()> {
        Self::ensure_supported()?;
        let captured = process::run(self.bin, &["--version".to_string()])?;
        if !captured.success() {
            return Err(EngineError::config(format!(
                "`{} --version` failed: {}",
                self.bin,
                captured.stderr.trim()
            )));
        }
        Ok(())
    }

    pub fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        Self::ensure_supported()?;

        let image = match self.unpack_dir {
            Some(dir) => self.ensure_sandbox(dir, &request.image)?.display().to_string(),
            None => format!("docker://{}", request.image),
        };

        let args = exec_args(request, &image);
        process::run(self.bin, &args)?.into_output(&request.image, &request.command)
    }

    /// Return the unpacked sandbox for `image`, building it on first use.
    ///
    /// The build lands in a private temporary directory and is renamed into
    /// place, so concurrent callers never observe a partial sandbox. A caller
    /// that loses the rename discards its copy and uses the winner's.
    pub fn ensure_sandbox(&self, unpack_dir: &Path, image: &str) -> Result<PathBuf> {
        let target = unpack_dir.join(sandbox_name(image));
        if target.exists() {
            debug!(sandbox = %target.display(), "reusing unpacked image");
            return Ok(target);
        }

        fs::create_dir_all(unpack_dir).map_err(|e| {
            EngineError::io(format!("failed to create {}", unpack_dir.display()), e)
        })?;
        let staging = tempfile::Builder::new()
            .prefix(".unpack-")
            .tempdir_in(unpack_dir)
            .map_err(|e| EngineError::io("failed to create unpack staging directory", e))?;
        let build_path = staging.path().join("sandbox");

        info!(image, sandbox = %target.display(), "unpacking image");
        let args = build_args(&build_path, image);
        let build_command: Vec<String> = std::iter::once(self.bin.to_string())
            .chain(args.iter().cloned())
            .collect();
        process::run(self.bin, &args)?.into_output(image, &build_command)?;

        match fs::rename(&build_path, &target) {
            Ok(()) => Ok(target),
            Err(_) if target.exists() => {
                debug!(sandbox = %target.display(), "sandbox built concurrently; discarding ours");
                Ok(target)
            }
            Err(e) => Err(EngineError::io(
                format!("failed to move sandbox into {}", target.display()),
                e,
            )),
        }
    }
}

/// Directory name for an unpacked image: the reference's trailing segment
/// with its last extension stripped.
pub fn sandbox_name(image: &str) -> String {
    let trailing = image.rsplit('/').next().unwrap_or(image);
    Path::new(trailing)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| trailing.to_string())
}

/// Options applied to every run: clean environment, contained home, explicit
/// working directory, and environment assignments. `HOME=` cannot be passed
/// through `--env` and is routed through `--home` instead.
pub fn runtime_options(request: &ExecutionRequest) -> Vec<String> {
    let mut options = vec![
        "--cleanenv".to_string(),
        "--containall".to_string(),
        "--pwd".to_string(),
        request.working_dir.clone(),
    ];
    for assignment in &request.environment {
        if let Some(home) = assignment.strip_prefix("HOME=") {
            options.push("--home".into());
            options.push(home.to_string());
        } else {
            options.push("--env".into());
            options.push(assignment.clone());
        }
    }
    options
}

pub fn exec_args(request: &ExecutionRequest, image: &str) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    args.extend(runtime_options(request));
    for bind in request.volumes.bind_specs() {
        args.push("--bind".into());
        args.push(format!("{bind}:rw"));
    }
    args.push(image.to_string());
    args.extend(request.command.iter().cloned());
    args
}

fn build_args(sandbox: &Path, image: &str) -> Vec<String> {
    vec![
        "build".to_string(),
        "--sandbox".to_string(),
        sandbox.display().to_string(),
        format!("docker://{image}"),
    ]
}

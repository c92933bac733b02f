use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::config::{CloudConfig, Config};
use crate::error::{EngineError, Result};

use super::ExecutionRequest;
use super::process;

/// Environment variable dsub exposes for the recursive output location.
const OUTPUT_VAR: &str = "OUTPUT";

/// Where the job's VM localizes `--input-recursive` prefixes.
const LOCALIZED_INPUT_ROOT: &str = "/mnt/data/input";

/// A volume mirrored to object storage for a remote batch job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedVolume {
    pub source: String,
    pub destination: String,
    pub remote: String,
    pub variable: String,
}

/// Submits jobs with dsub, staging volumes through gsutil.
pub struct DsubBackend<'a> {
    cloud: &'a CloudConfig,
    gsutil: &'a str,
    dsub: &'a str,
}

impl<'a> DsubBackend<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            cloud: &config.cloud,
            gsutil: &config.runtime_bins.gsutil,
            dsub: &config.runtime_bins.dsub,
        }
    }

    fn bucket(&self) -> Result<&str> {
        self.cloud
            .bucket
            .as_deref()
            .map(|b| b.trim_end_matches('/'))
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                EngineError::config("dsub requires cloud.bucket or WORKSPACE_BUCKET to be set")
            })
    }

    /// Stage inputs, submit, wait for completion, then pull every volume back.
    ///
    /// The remote job is not cancelled if this process dies while waiting.
    pub fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        let bucket = self.bucket()?;
        let staged = stage_plan(bucket, request);

        for volume in &staged {
            self.upload(volume)?;
        }

        let command = remote_command(bucket, request, &staged);
        let args = submit_args(self.cloud, bucket, request, &staged, &command);
        info!(image = %request.image, "submitting dsub job and waiting for completion");
        let output = process::run(self.dsub, &args)?
            .into_output(&request.image, std::slice::from_ref(&command))?;

        for volume in &staged {
            self.download(volume)?;
        }
        Ok(output)
    }

    fn upload(&self, volume: &StagedVolume) -> Result<()> {
        let local = Path::new(&volume.source);
        fs::create_dir_all(local)
            .map_err(|e| EngineError::io(format!("failed to create {}", local.display()), e))?;

        let local_empty = fs::read_dir(local)
            .map_err(|e| EngineError::io(format!("failed to list {}", local.display()), e))?
            .next()
            .is_none();

        // Object storage has no empty directories; give the prefix a marker object.
        if local_empty && !self.remote_exists(&volume.remote)? {
            let marker = format!("{}/{}", volume.remote, self.cloud.marker_name);
            debug!(%marker, "writing empty-directory marker");
            let args = vec!["cp".to_string(), "-".to_string(), marker.clone()];
            self.gsutil_checked(&args, "-", &marker)?;
        }

        debug!(source = %volume.source, remote = %volume.remote, "syncing volume up");
        self.gsutil_checked(
            &rsync_args(&volume.source, &volume.remote, None),
            &volume.source,
            &volume.remote,
        )
    }

    fn download(&self, volume: &StagedVolume) -> Result<()> {
        debug!(remote = %volume.remote, source = %volume.source, "syncing volume down");
        self.gsutil_checked(
            &rsync_args(&volume.remote, &volume.source, Some(&self.cloud.marker_name)),
            &volume.remote,
            &volume.source,
        )
    }

    fn remote_exists(&self, remote: &str) -> Result<bool> {
        let args = vec!["-q".to_string(), "ls".to_string(), remote.to_string()];
        let captured = process::run(self.gsutil, &args)?;
        Ok(captured.success() && !captured.stdout.trim().is_empty())
    }

    fn gsutil_checked(&self, args: &[String], source: &str, destination: &str) -> Result<()> {
        let staging_error = |detail: String| EngineError::Staging {
            source_uri: source.to_string(),
            destination: destination.to_string(),
            detail,
        };
        let captured = process::run(self.gsutil, args).map_err(|e| staging_error(e.to_string()))?;
        if !captured.success() {
            return Err(staging_error(captured.stderr.trim().to_string()));
        }
        Ok(())
    }
}

/// Assign each volume a remote path under `bucket` and an input variable.
pub fn stage_plan(bucket: &str, request: &ExecutionRequest) -> Vec<StagedVolume> {
    request
        .volumes
        .iter()
        .enumerate()
        .map(|(i, volume)| StagedVolume {
            source: volume.source.clone(),
            destination: volume.destination.clone(),
            remote: format!("{bucket}{}", volume.destination),
            variable: format!("INPUT_{i}"),
        })
        .collect()
}

/// Shell command run remotely: container paths swapped for dsub's
/// localization variables, followed by a copy of the localized working
/// directory into the recursive output location.
///
/// The job exits with the contained command's status once the copy succeeds,
/// so a failing algorithm still fails the job.
///
/// Destinations are matched as literal substrings, longest first so that a
/// destination which prefixes another never shadows it. An argument whose
/// text happens to embed a destination path is rewritten too.
pub fn remote_command(
    bucket: &str,
    request: &ExecutionRequest,
    staged: &[StagedVolume],
) -> String {
    let mut by_length: Vec<&StagedVolume> = staged.iter().collect();
    by_length.sort_by(|a, b| b.destination.len().cmp(&a.destination.len()));

    let tokens: Vec<String> = request
        .command
        .iter()
        .map(|token| {
            let mut rewritten = token.clone();
            for volume in &by_length {
                let variable = format!("${{{}}}", volume.variable);
                rewritten = rewritten.replace(volume.destination.as_str(), &variable);
            }
            quote(&rewritten)
        })
        .collect();

    format!(
        "{} ; rc=$? ; cp -rf {}/. \"${{{OUTPUT_VAR}}}\" && exit $rc",
        tokens.join(" "),
        quote(&localized_path(bucket, &request.working_dir))
    )
}

/// Path on the job's VM where `bucket` + `container_path` is localized,
/// e.g. `gs://bench` + `/spras` becomes `/mnt/data/input/gs/bench/spras`.
pub fn localized_path(bucket: &str, container_path: &str) -> String {
    let remote = bucket.replacen("://", "/", 1);
    format!("{LOCALIZED_INPUT_ROOT}/{remote}{container_path}")
}

/// Double-quote a token when needed, leaving `${VAR}` references expandable.
fn quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%${}".contains(c));
    if plain {
        return token.to_string();
    }
    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    for c in token.chars() {
        if matches!(c, '"' | '\\' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// dsub arguments in the order the CLI expects: identity and region, then
/// image/environment/IO, then the command itself.
pub fn submit_args(
    cloud: &CloudConfig,
    bucket: &str,
    request: &ExecutionRequest,
    staged: &[StagedVolume],
    command: &str,
) -> Vec<String> {
    let mut args = vec!["--provider".to_string(), cloud.provider.clone()];
    let identity = [
        ("--project", &cloud.project),
        ("--regions", &cloud.regions),
        ("--service-account", &cloud.service_account),
        ("--network", &cloud.network),
        ("--subnetwork", &cloud.subnetwork),
    ];
    for (flag, value) in identity {
        if let Some(value) = value {
            args.push(flag.to_string());
            args.push(value.clone());
        }
    }
    args.push("--logging".into());
    args.push(
        cloud
            .logging
            .clone()
            .unwrap_or_else(|| format!("{bucket}/dsub/logs")),
    );

    args.push("--image".into());
    args.push(request.image.clone());
    for assignment in &request.environment {
        args.push("--env".into());
        args.push(assignment.clone());
    }
    for volume in staged {
        args.push("--input-recursive".into());
        args.push(format!("{}={}", volume.variable, volume.remote));
    }
    args.push("--output-recursive".into());
    args.push(format!("{OUTPUT_VAR}={bucket}{}", request.working_dir));

    args.push("--command".into());
    args.push(command.to_string());
    args.push("--wait".into());
    args
}

fn rsync_args(from: &str, to: &str, exclude: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        "rsync".to_string(),
        "-r".to_string(),
        "-c".to_string(),
    ];
    if let Some(name) = exclude {
        args.push("-x".into());
        args.push(format!("(^|.*/){}$", escape_regex(name)));
    }
    args.push(from.to_string());
    args.push(to.to_string());
    args
}

fn escape_regex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recon_exec::config::{self, Config};
use recon_exec::engine::{self, DEFAULT_ENVIRONMENT};
use recon_exec::fingerprint;
use recon_exec::volume::{self, VolumeSet};

#[derive(Debug, Parser)]
#[command(
    name = "recon-exec",
    version,
    about = "Run algorithm containers on Docker, Singularity, or dsub"
)]
struct Cli {
    /// Config file; defaults to `.recon-exec.yaml` in the current directory.
    #[arg(long, global = true, env = "RECON_EXEC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a command inside an algorithm image.
    Run {
        /// Algorithm name used in log output.
        #[arg(long, default_value = "container")]
        name: String,
        /// Image name and tag, appended to the configured registry prefix.
        #[arg(long)]
        image: String,
        /// Overrides `container_framework` from the config.
        #[arg(long)]
        framework: Option<String>,
        /// Host path to mount, as HOST_PATH or HOST_PATH:CONTAINER_BASE. Repeatable.
        #[arg(long = "volume", short = 'v')]
        volumes: Vec<String>,
        #[arg(long = "workdir", short = 'w', default_value = "/spras")]
        working_dir: String,
        #[arg(long = "env", short = 'e', default_value = DEFAULT_ENVIRONMENT)]
        environment: String,
        /// Command and arguments; `{0}`, `{1}`... are replaced by the container
        /// path of the matching `--volume`.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print the mount and container path for a host path.
    Virtualize {
        host_path: PathBuf,
        base_dir: String,
        #[arg(long)]
        length: Option<i64>,
    },
    /// Print the fingerprint of a JSON parameter object.
    Hash {
        params: String,
        #[arg(long)]
        length: Option<i64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            name,
            image,
            framework,
            volumes,
            working_dir,
            environment,
            command,
        } => {
            let framework = framework.unwrap_or_else(|| cfg.container_framework.to_string());
            let mut set = VolumeSet::new();
            let mut container_paths = Vec::new();
            for spec in &volumes {
                let (host, base) = split_volume_arg(spec, &working_dir);
                container_paths.push(set.add_path(host, base, cfg.hash_length)?);
            }
            let command = substitute_paths(&command, &container_paths);

            let output = engine::run_container_and_log(
                &name,
                &cfg,
                &framework,
                &image,
                &command,
                &set,
                &working_dir,
                &environment,
            )?;
            print!("{output}");
        }
        Commands::Virtualize {
            host_path,
            base_dir,
            length,
        } => {
            let (mount, container_path) =
                volume::virtualize(&host_path, &base_dir, length.unwrap_or(cfg.hash_length))?;
            println!("{}", mount.bind_spec());
            println!("{container_path}");
        }
        Commands::Hash { params, length } => {
            let value: serde_json::Value =
                serde_json::from_str(&params).context("params must be a JSON object")?;
            if !value.is_object() {
                bail!("params must be a JSON object, got: {params}");
            }
            println!("{}", fingerprint::hash_params(&value, length)?);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return config::load_file(path);
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    match Config::load(&cwd)? {
        Some(cfg) => Ok(cfg),
        None => config::parse("{}"),
    }
}

/// `HOST[:BASE]`; a Windows drive colon is never treated as the separator.
fn split_volume_arg<'a>(spec: &'a str, default_base: &'a str) -> (&'a str, &'a str) {
    match spec.rfind(':') {
        Some(i) if i > 1 && spec[i + 1..].starts_with('/') => (&spec[..i], &spec[i + 1..]),
        _ => (spec, default_base),
    }
}

fn substitute_paths(command: &[String], container_paths: &[String]) -> Vec<String> {
    command
        .iter()
        .map(|token| {
            container_paths
                .iter()
                .enumerate()
                .fold(token.clone(), |acc, (i, path)| acc.replace(&format!("{{{i}}}"), path))
        })
        .collect()
}

use std::path::Path;

use anyhow::{Context, Result};

use super::types::Config;

/// File name looked up in a project directory.
pub const CONFIG_FILE: &str = ".recon-exec.yaml";

impl Config {
    /// Load config from a `.recon-exec.yaml` file in the given directory.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        load_file(&path).map(Some)
    }
}

/// Load config from an explicit path.
pub fn load_file(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse(&contents).with_context(|| format!("invalid config {}", path.display()))
}

/// Parse YAML config text, filling the cloud bucket from `WORKSPACE_BUCKET` when unset.
pub fn parse(contents: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(contents)?;
    if config.cloud.bucket.is_none() {
        config.cloud.bucket = std::env::var("WORKSPACE_BUCKET")
            .ok()
            .filter(|b| !b.trim().is_empty());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Framework;

    #[test]
    fn load_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn load_reads_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "container_framework: dsub\nhash_length: 10\ncloud:\n  bucket: gs://bench\n",
        )
        .unwrap();
        let cfg = Config::load(dir.path()).unwrap().unwrap();
        assert_eq!(cfg.container_framework, Framework::Dsub);
        assert_eq!(cfg.hash_length, 10);
        assert_eq!(cfg.cloud.bucket.as_deref(), Some("gs://bench"));
    }

    #[test]
    fn load_file_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "hash_length: [1, 2]\n").unwrap();
        let err = load_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.yaml"));
    }
}

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Container framework used to execute an algorithm image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framework {
    Docker,
    Singularity,
    Dsub,
}

impl Framework {
    pub const ALL: [Framework; 3] = [Framework::Docker, Framework::Singularity, Framework::Dsub];

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Docker => "docker",
            Framework::Singularity => "singularity",
            Framework::Dsub => "dsub",
        }
    }

    /// Comma-separated list of accepted names, for error messages.
    pub fn accepted() -> String {
        Self::ALL
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFramework(pub String);

impl fmt::Display for UnknownFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown container framework '{}'; expected one of: {}",
            self.0,
            Framework::accepted()
        )
    }
}

impl std::error::Error for UnknownFramework {}

impl FromStr for Framework {
    type Err = UnknownFramework;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" | "desktop-engine" => Ok(Framework::Docker),
            "singularity" | "apptainer" | "hpc-runtime" => Ok(Framework::Singularity),
            "dsub" | "cloud-batch" => Ok(Framework::Dsub),
            _ => Err(UnknownFramework(s.to_string())),
        }
    }
}

impl Serialize for Framework {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Framework {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FrameworkVisitor;

        impl Visitor<'_> for FrameworkVisitor {
            type Value = Framework;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "one of: {}", Framework::accepted())
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Framework, E> {
                value.parse().map_err(|e: UnknownFramework| E::custom(e))
            }
        }

        deserializer.deserialize_str(FrameworkVisitor)
    }
}

/// How the Docker backend hands ownership of new outputs back to the host user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipMode {
    /// Probe the daemon; skip repair when it is rootless.
    Auto,
    /// Always snapshot and chown newly created paths.
    Repair,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub base_url: String,
    pub owner: String,
}

impl RegistryConfig {
    /// Fully qualified image reference for an image name/tag.
    pub fn image(&self, suffix: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.owner, suffix)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "docker.io".to_string(),
            owner: "reedcompbio".to_string(),
        }
    }
}

/// Settings for submitting jobs through dsub with gsutil staging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Object-storage location, e.g. `gs://my-workspace-bucket`.
    pub bucket: Option<String>,
    pub provider: String,
    pub project: Option<String>,
    pub regions: Option<String>,
    pub service_account: Option<String>,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
    pub logging: Option<String>,
    pub marker_name: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            provider: "google-cls-v2".to_string(),
            project: None,
            regions: None,
            service_account: None,
            network: None,
            subnetwork: None,
            logging: None,
            marker_name: ".empty".to_string(),
        }
    }
}

/// Program names for each external tool the engine shells out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeBins {
    pub docker: String,
    pub singularity: String,
    pub gsutil: String,
    pub dsub: String,
}

impl Default for RuntimeBins {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            singularity: "singularity".to_string(),
            gsutil: "gsutil".to_string(),
            dsub: "dsub".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub container_framework: Framework,
    pub container_registry: RegistryConfig,
    pub hash_length: i64,
    pub unpack_singularity: bool,
    pub unpack_dir: PathBuf,
    pub docker_ownership: OwnershipMode,
    pub cloud: CloudConfig,
    pub runtime_bins: RuntimeBins,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            container_framework: Framework::Docker,
            container_registry: RegistryConfig::default(),
            hash_length: 7,
            unpack_singularity: false,
            unpack_dir: PathBuf::from("unpacked"),
            docker_ownership: OwnershipMode::Auto,
            cloud: CloudConfig::default(),
            runtime_bins: RuntimeBins::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framework_parses_case_insensitively() {
        assert_eq!("DOCKER".parse::<Framework>().unwrap(), Framework::Docker);
        assert_eq!("Singularity".parse::<Framework>().unwrap(), Framework::Singularity);
        assert_eq!("dSub".parse::<Framework>().unwrap(), Framework::Dsub);
        assert_eq!("cloud-batch".parse::<Framework>().unwrap(), Framework::Dsub);
    }

    #[test]
    fn unknown_framework_names_accepted_set() {
        let err = "podman".parse::<Framework>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("podman"));
        assert!(msg.contains("docker, singularity, dsub"));
    }

    #[test]
    fn registry_prefix_joins_suffix() {
        let reg = RegistryConfig::default();
        assert_eq!(reg.image("pathlinker:v2"), "docker.io/reedcompbio/pathlinker:v2");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: Config = serde_yaml::from_str("container_framework: Singularity\n").unwrap();
        assert_eq!(cfg.container_framework, Framework::Singularity);
        assert_eq!(cfg.hash_length, 7);
        assert_eq!(cfg.docker_ownership, OwnershipMode::Auto);
        assert_eq!(cfg.cloud.marker_name, ".empty");
    }

    #[test]
    fn config_rejects_unknown_framework() {
        let err = serde_yaml::from_str::<Config>("container_framework: lxc\n").unwrap_err();
        assert!(err.to_string().contains("lxc"));
    }

    #[test]
    fn ownership_mode_is_lowercase() {
        let cfg: Config = serde_yaml::from_str("docker_ownership: skip\n").unwrap();
        assert_eq!(cfg.docker_ownership, OwnershipMode::Skip);
    }
}

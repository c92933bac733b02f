use crate::config::RegistryConfig;
use crate::volume::VolumeSet;

/// Environment assignment applied when the caller supplies none.
pub const DEFAULT_ENVIRONMENT: &str = "SPRAS=True";

/// Everything a backend needs for one run. Built per call and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Fully qualified image reference, e.g. `docker.io/reedcompbio/pathlinker:v2`.
    pub image: String,
    pub command: Vec<String>,
    pub volumes: VolumeSet,
    pub working_dir: String,
    /// `KEY=value` assignments, applied only inside the container.
    pub environment: Vec<String>,
}

impl ExecutionRequest {
    pub fn new(
        registry: &RegistryConfig,
        image_suffix: &str,
        command: Vec<String>,
        volumes: VolumeSet,
        working_dir: impl Into<String>,
    ) -> Self {
        Self {
            image: registry.image(image_suffix),
            command,
            volumes,
            working_dir: working_dir.into(),
            environment: vec![DEFAULT_ENVIRONMENT.to_string()],
        }
    }

    pub fn with_environment(mut self, environment: impl IntoIterator<Item = String>) -> Self {
        self.environment = environment.into_iter().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_prefixes_registry_and_defaults_env() {
        let req = ExecutionRequest::new(
            &RegistryConfig::default(),
            "omics-integrator-1:no-conda",
            vec!["python".into()],
            VolumeSet::new(),
            "/spras",
        );
        assert_eq!(req.image, "docker.io/reedcompbio/omics-integrator-1:no-conda");
        assert_eq!(req.environment, vec!["SPRAS=True"]);
    }

    #[test]
    fn environment_can_be_replaced() {
        let req = ExecutionRequest::new(
            &RegistryConfig::default(),
            "img",
            Vec::new(),
            VolumeSet::new(),
            "/",
        )
        .with_environment(["HOME=/spras".to_string(), "A=1".to_string()]);
        assert_eq!(req.environment, vec!["HOME=/spras", "A=1"]);
    }
}

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single mount: host directory (posix form) and its container destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Volume {
    pub source: String,
    pub destination: String,
}

impl Volume {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// `source:destination`, the bind syntax shared by Docker and Singularity.
    pub fn bind_spec(&self) -> String {
        format!("{}:{}", self.source, self.destination)
    }
}

/// Ordered mounts for one invocation. Duplicate sources are kept: one host
/// directory may back several destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSet {
    volumes: Vec<Volume>,
}

impl VolumeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, volume: Volume) {
        self.volumes.push(volume);
    }

    /// Virtualize `host_path` under `base_dir`, record its mount, and return
    /// the container path to pass on the command line.
    pub fn add_path(
        &mut self,
        host_path: impl AsRef<Path>,
        base_dir: &str,
        hash_length: i64,
    ) -> Result<String> {
        let (volume, container_path) = super::virtualize(host_path, base_dir, hash_length)?;
        self.push(volume);
        Ok(container_path)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Volume> {
        self.volumes.iter()
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn bind_specs(&self) -> Vec<String> {
        self.volumes.iter().map(Volume::bind_spec).collect()
    }

    /// One entry per distinct host directory (by real path), paired with the
    /// first destination it was mounted at.
    pub fn distinct_sources(&self) -> Vec<(PathBuf, String)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for volume in &self.volumes {
            let source = Path::new(&volume.source);
            let real = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
            if seen.insert(real.clone()) {
                out.push((real, volume.destination.clone()));
            }
        }
        out
    }
}

impl From<Vec<Volume>> for VolumeSet {
    fn from(volumes: Vec<Volume>) -> Self {
        Self { volumes }
    }
}

impl FromIterator<Volume> for VolumeSet {
    fn from_iter<I: IntoIterator<Item = Volume>>(iter: I) -> Self {
        Self {
            volumes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a VolumeSet {
    type Item = &'a Volume;
    type IntoIter = std::slice::Iter<'a, Volume>;

    fn into_iter(self) -> Self::IntoIter {
        self.volumes.iter()
    }
}

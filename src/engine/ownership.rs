use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::OwnershipRepairWarning;
use crate::volume::VolumeSet;

/// Immediate listing of every distinct mount source, taken before a run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone)]
struct SnapshotEntry {
    source: PathBuf,
    destination: String,
    before: BTreeSet<PathBuf>,
}

impl Snapshot {
    /// List each distinct source directory (non-recursive). A source that does
    /// not exist yet is recorded as empty.
    pub fn take(volumes: &VolumeSet) -> Result<Self, OwnershipRepairWarning> {
        let mut entries = Vec::new();
        for (source, destination) in volumes.distinct_sources() {
            let before = list_dir(&source)?;
            debug!(source = %source.display(), entries = before.len(), "snapshot");
            entries.push(SnapshotEntry {
                source,
                destination,
                before,
            });
        }
        Ok(Self { entries })
    }

    /// Container paths of entries that exist now but did not at snapshot time.
    /// Pre-existing entries are excluded even if their contents changed.
    pub fn new_container_paths(&self) -> Result<Vec<String>, OwnershipRepairWarning> {
        let mut paths = Vec::new();
        for entry in &self.entries {
            let after = list_dir(&entry.source)?;
            for created in after.difference(&entry.before) {
                let Ok(relative) = created.strip_prefix(&entry.source) else {
                    continue;
                };
                paths.push(format!(
                    "{}/{}",
                    entry.destination.trim_end_matches('/'),
                    relative.to_string_lossy().replace('\\', "/")
                ));
            }
        }
        Ok(paths)
    }
}

fn list_dir(dir: &Path) -> Result<BTreeSet<PathBuf>, OwnershipRepairWarning> {
    if !dir.is_dir() {
        return Ok(BTreeSet::new());
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .map(|entry| entry.map(|e| e.into_path()))
        .collect::<Result<_, _>>()
        .map_err(|e| OwnershipRepairWarning {
            paths: vec![dir.display().to_string()],
            reason: format!("failed to list directory: {e}"),
        })
}

/// Returns the invoking user's `(uid, gid)` on Unix, `None` elsewhere.
pub fn host_ids() -> Option<(u32, u32)> {
    #[cfg(unix)]
    {
        // SAFETY: getuid() and getgid() are simple POSIX getters that always succeed and have no side effects.
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Some((uid, gid))
    }

    #[cfg(not(unix))]
    {
        None
    }
}

/// Command run inside the same image to hand `paths` to `uid:gid`.
pub fn chown_command(uid: u32, gid: u32, paths: &[String]) -> Vec<String> {
    let mut cmd = vec![
        "chown".to_string(),
        format!("{uid}:{gid}"),
        "--recursive".to_string(),
    ];
    cmd.extend(paths.iter().cloned());
    cmd
}

/// Whether `docker info` security options report a rootless daemon, in which
/// case container root already maps to the invoking user.
pub fn is_rootless(security_options: &str) -> bool {
    security_options.contains("name=rootless")
}

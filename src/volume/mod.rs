// Host-to-container path mapping and per-invocation mount sets.

mod set;

pub use set::{Volume, VolumeSet};

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::fingerprint::hash_filename;

/// Map a host path into the container namespace under `base_dir`.
///
/// Returns the mount to add to the invocation's [`VolumeSet`] and the path the
/// contained process should use for this file. The mount point is
/// `base_dir/<fingerprint of the path string>`; for a directory the directory
/// itself is mounted one level deeper under its own name, for a file its
/// parent is mounted so sibling files resolve through the same mount.
pub fn virtualize(
    host_path: impl AsRef<Path>,
    base_dir: &str,
    hash_length: i64,
) -> Result<(Volume, String)> {
    if !base_dir.starts_with('/') {
        return Err(EngineError::config(format!(
            "container base directory must be an absolute path: {base_dir}"
        )));
    }

    let host_path = host_path.as_ref();
    let filename = host_path.to_string_lossy();
    let fingerprint = hash_filename(&filename, hash_length)
        .map_err(|e| EngineError::config(format!("cannot fingerprint {filename}: {e}")))?;
    let mut destination = join_posix(base_dir, &fingerprint);

    let resolved = resolve(host_path)?;
    let name = resolved
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let container_path = join_posix(&destination, &name);

    let source = if resolved.is_dir() {
        destination = join_posix(&destination, &name);
        resolved
    } else {
        match resolved.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && parent != Path::new(".") => {
                parent.to_path_buf()
            }
            _ => std::env::current_dir()
                .map_err(|e| EngineError::io("failed to read current directory", e))?,
        }
    };

    Ok((
        Volume::new(to_mount_source(&source.to_string_lossy()), destination),
        container_path,
    ))
}

/// Convert a host path to the posix form every backend accepts for mounts.
///
/// `D:\mydrive` becomes `//d/mydrive`; posix paths pass through unchanged.
pub fn to_mount_source(path: &str) -> String {
    let path = path.strip_prefix(r"\\?\").unwrap_or(path);
    let path = path.replace('\\', "/");
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = (bytes[0] as char).to_ascii_lowercase();
        let rest = path[2..].trim_start_matches('/');
        if rest.is_empty() {
            return format!("//{drive}");
        }
        return format!("//{drive}/{rest}");
    }
    path
}

/// Absolute form of `path`, following symlinks when it exists.
fn resolve(path: &Path) -> Result<PathBuf> {
    if let Ok(real) = path.canonicalize() {
        return Ok(real);
    }
    std::path::absolute(path)
        .map_err(|e| EngineError::io(format!("failed to resolve {}", path.display()), e))
}

fn join_posix(base: &str, segment: &str) -> String {
    if segment.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), segment)
}

// Stable SHA1/base32 fingerprints for parameter mappings and host file names.

mod canonical;

pub use canonical::canonical_json;

use data_encoding::BASE32;
use serde::Serialize;
use serde_json::json;
use sha1::{Digest, Sha1};

/// Length of an untruncated fingerprint (160-bit digest, 5 bits per character).
pub const FULL_LENGTH: usize = 32;

/// Fingerprint an arbitrary parameter mapping.
///
/// `length` of `None`, `<= 0`, or greater than [`FULL_LENGTH`] keeps the full value.
/// Collisions between distinct mappings are not detected here; callers that
/// key results by fingerprint must reject duplicates themselves.
pub fn hash_params<T: Serialize + ?Sized>(
    params: &T,
    length: Option<i64>,
) -> Result<String, serde_json::Error> {
    let text = canonical_json(params)?;
    Ok(truncate(digest_base32(text.as_bytes()), length))
}

/// Fingerprint a file name string, as used for container mount points.
pub fn hash_filename(filename: &str, length: i64) -> Result<String, serde_json::Error> {
    hash_params(&json!({ "filename": filename }), Some(length))
}

fn digest_base32(bytes: &[u8]) -> String {
    BASE32.encode(&Sha1::digest(bytes))
}

fn truncate(mut full: String, length: Option<i64>) -> String {
    if let Some(n) = length
        && n > 0
        && (n as usize) < full.len()
    {
        full.truncate(n as usize);
    }
    full
}

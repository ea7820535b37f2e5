//! Content fingerprinting.
//!
//! The fingerprint is for integrity and anchor collision-breaking, not
//! security: xxh3 over the file's bytes in bounded chunks. Hashing is the
//! only concurrent stage of the pipeline; the rayon pool is created through
//! an injectable factory so a run with fingerprinting disabled provably
//! never spins one up.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3;

use crate::error::MergeError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Sentinel recorded when a single file cannot be read; never aborts a scan.
pub const FINGERPRINT_ERROR: &str = "ERROR";

/// Build the default hashing pool, one worker per logical core.
pub fn default_pool() -> Result<ThreadPool, MergeError> {
    ThreadPoolBuilder::new()
        .thread_name(|i| format!("mergelens-hash-{i}"))
        .build()
        .map_err(|e| MergeError::HashPool(e.to_string()))
}

/// Fingerprint one file in bounded chunks. `limit_bytes` caps how much of
/// the file is hashed (`None` = whole file). Failures degrade to the
/// [`FINGERPRINT_ERROR`] sentinel.
pub fn fingerprint_file(path: &Path, limit_bytes: Option<u64>) -> String {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return FINGERPRINT_ERROR.to_string(),
    };
    let mut hasher = Xxh3::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = limit_bytes;

    loop {
        let want = match remaining {
            Some(0) => break,
            Some(r) => CHUNK_SIZE.min(r as usize),
            None => CHUNK_SIZE,
        };
        let n = match file.read(&mut buf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => return FINGERPRINT_ERROR.to_string(),
        };
        hasher.update(&buf[..n]);
        if let Some(r) = remaining.as_mut() {
            *r -= n as u64;
        }
    }

    format!("{:016x}", hasher.digest())
}

/// Fingerprint a batch on the given pool. Results come back in input order.
pub fn fingerprint_batch(
    pool: &ThreadPool,
    paths: &[(PathBuf, Option<u64>)],
) -> Vec<String> {
    pool.install(|| {
        paths
            .par_iter()
            .map(|(path, limit)| fingerprint_file(path, *limit))
            .collect()
    })
}

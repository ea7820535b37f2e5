//! Canonical error type for merge runs.
//!
//! Per-entry filesystem problems are *not* errors: the walker and hasher
//! degrade to skip-plus-diagnostic. Everything that reaches this type is
//! either a repo-level abort or a run-level fatal condition that the
//! coordinator must surface instead of reporting success.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    /// I/O error on a path the run cannot proceed without (auto-converts).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A repo root is unreadable or a path escaped its sandbox.
    #[error("sandbox violation in `{repo}`: {detail}")]
    Sandbox { repo: String, detail: String },

    /// The rendered report broke a structural invariant (section order,
    /// duplicate anchor, missing required section).
    #[error("report structure violation: {0}")]
    Structure(String),

    /// Writing or renaming a part file failed; the partial state is left on
    /// disk at the given path for cleanup.
    #[error("split failure at `{path}`: {detail}")]
    Split { path: PathBuf, detail: String },

    /// The sidecar document failed its pre-write validation. The run is
    /// considered to have produced no sidecar.
    #[error("sidecar invalid: {0}")]
    SidecarInvalid(String),

    /// JSON (de)serialization failure while building or re-checking the
    /// sidecar (auto-converts).
    #[error("sidecar JSON error: {0}")]
    SidecarJson(#[from] serde_json::Error),

    /// An advertised artifact is missing or empty after write.
    #[error("post-write verification failed: {0}")]
    PostCheck(String),

    /// The hashing worker pool could not be constructed.
    #[error("hash pool error: {0}")]
    HashPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_offending_path() {
        let err = MergeError::Split {
            path: PathBuf::from("/tmp/x-tmp-part2"),
            detail: "rename failed".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("x-tmp-part2"), "path must be visible: {msg}");
        assert!(msg.contains("rename failed"));
    }

    #[test]
    fn io_error_auto_converts() {
        fn fails() -> Result<(), MergeError> {
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(MergeError::Io(_))));
    }
}

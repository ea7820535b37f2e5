//! Deterministic identifiers: stable file IDs, slugs, and anchors.
//!
//! Stable IDs are content-addressed from `(repo_label, rel_path)` only, so
//! they survive re-runs, re-hashing, and profile changes. Inputs are NFC
//! normalized first so the same file yields the same ID on macOS (NFD
//! filesystem) and Linux.

use sha1::{Digest, Sha1};
use unicode_normalization::UnicodeNormalization;

/// Hex digits of the SHA-1 kept in a stable ID.
const STABLE_ID_HEX_LEN: usize = 12;
/// Fingerprint prefix length used to break anchor collisions.
const ANCHOR_SUFFIX_LEN: usize = 6;

pub fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// `f_` + 12 hex digits of `SHA1(NFC(repo) ":" NFC(rel_path))`.
pub fn stable_id(repo_label: &str, rel_path: &str) -> String {
    let raw = format!("{}:{}", nfc(repo_label), nfc(rel_path));
    let digest = Sha1::digest(raw.as_bytes());
    let mut hex = String::with_capacity(STABLE_ID_HEX_LEN);
    for byte in digest.iter() {
        if hex.len() >= STABLE_ID_HEX_LEN {
            break;
        }
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.truncate(STABLE_ID_HEX_LEN);
    format!("f_{hex}")
}

/// Deterministic ASCII token suitable for heading ids across renderers:
/// lowercase, `/` and `.` become `-`, non-alphanumeric runs collapse to a
/// single `-`, leading/trailing `-` trimmed.
pub fn slug(s: &str) -> String {
    let lowered = s.to_lowercase().replace(['/', '.'], "-");
    let mut out = String::with_capacity(lowered.len());
    let mut pending_dash = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out
}

/// `(anchor, anchor_alias)` for a file. The alias is the suffix-free form;
/// the fingerprint suffix (when a fingerprint exists) deterministically
/// breaks collisions in large trees.
pub fn anchor(repo_label: &str, rel_path: &str, fingerprint: Option<&str>) -> (String, String) {
    let alias = format!("file-{}-{}", slug(repo_label), slug(rel_path));
    let suffix = fingerprint
        .map(|f| f.chars().take(ANCHOR_SUFFIX_LEN).collect::<String>())
        .filter(|s| !s.is_empty());
    let anchor = match suffix {
        Some(s) => format!("{alias}-{s}"),
        None => alias.clone(),
    };
    (anchor, alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_shape_and_determinism() {
        let a = stable_id("tools", "src/main.py");
        let b = stable_id("tools", "src/main.py");
        assert_eq!(a, b);
        assert!(a.starts_with("f_"));
        assert_eq!(a.len(), 14);
        assert!(a[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn stable_id_depends_on_repo_and_path() {
        assert_ne!(stable_id("tools", "a.md"), stable_id("other", "a.md"));
        assert_ne!(stable_id("tools", "a.md"), stable_id("tools", "b.md"));
    }

    #[test]
    fn stable_id_is_nfc_invariant() {
        // "é" precomposed (NFC) vs "e" + combining acute (NFD).
        let nfc_path = "docs/caf\u{e9}.md";
        let nfd_path = "docs/cafe\u{301}.md";
        assert_eq!(stable_id("tools", nfc_path), stable_id("tools", nfd_path));
    }

    #[test]
    fn slug_collapses_and_trims() {
        assert_eq!(slug("src/merge_core.py"), "src-merge-core-py");
        assert_eq!(slug("..weird//path.."), "weird-path");
        assert_eq!(slug("README.md"), "readme-md");
        assert_eq!(slug("Ünïcode"), "n-code");
    }

    #[test]
    fn anchor_suffix_only_with_fingerprint() {
        let (a, alias) = anchor("tools", "README.md", Some("deadbeef1234"));
        assert_eq!(alias, "file-tools-readme-md");
        assert_eq!(a, "file-tools-readme-md-deadbe");

        let (a, alias) = anchor("tools", "README.md", None);
        assert_eq!(a, alias);
    }
}

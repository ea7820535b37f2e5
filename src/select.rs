//! Inclusion policy: `(file, profile)` → inclusion status.
//!
//! Pure, no I/O. The selector never yields `Truncated` — that status is
//! reserved for the splitter when a file block has to break across parts.
//! `max_file_bytes` is carried as a hint only and never cuts content here.

use crate::config::Profile;
use crate::record::{Category, InclusionStatus, ScannedFile, Tag};

/// Lockfiles above this size drop to meta-only under `dev`/`machine-lean`.
const LOCKFILE_FULL_LIMIT: u64 = 20_000;

/// Priority files are readable context a model should always see first:
/// tagged `ai-context` or `runbook`, or any `readme.md`.
pub fn is_priority(tags: &[Tag], file_name: &str) -> bool {
    tags.contains(&Tag::AiContext)
        || tags.contains(&Tag::Runbook)
        || file_name.eq_ignore_ascii_case("readme.md")
}

pub fn is_priority_file(scan: &ScannedFile) -> bool {
    is_priority(&scan.tags, scan.file_name())
}

/// Policy table. Binary files never carry content, regardless of profile.
pub fn inclusion_status(
    scan: &ScannedFile,
    profile: Profile,
    _max_file_bytes: u64,
) -> InclusionStatus {
    if !scan.is_text {
        return InclusionStatus::Omitted;
    }

    match profile {
        Profile::Overview => {
            if is_priority_file(scan) {
                InclusionStatus::Full
            } else {
                InclusionStatus::MetaOnly
            }
        }
        Profile::Summary => {
            if is_priority_file(scan) {
                return InclusionStatus::Full;
            }
            match scan.category {
                Category::Doc | Category::Config | Category::Contract => InclusionStatus::Full,
                Category::Source | Category::Test => InclusionStatus::MetaOnly,
                _ if scan.tags.contains(&Tag::Lockfile) => InclusionStatus::Full,
                _ => InclusionStatus::MetaOnly,
            }
        }
        Profile::Dev | Profile::MachineLean => {
            if scan.tags.contains(&Tag::Lockfile) {
                return if scan.size_bytes <= LOCKFILE_FULL_LIMIT {
                    InclusionStatus::Full
                } else {
                    InclusionStatus::MetaOnly
                };
            }
            match scan.category {
                Category::Source | Category::Test | Category::Config | Category::Contract => {
                    InclusionStatus::Full
                }
                Category::Doc => {
                    if is_priority_file(scan) {
                        InclusionStatus::Full
                    } else {
                        InclusionStatus::MetaOnly
                    }
                }
                Category::Other => InclusionStatus::MetaOnly,
            }
        }
        Profile::Max => InclusionStatus::Full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{InclusionReason, Lens};
    use std::path::PathBuf;

    fn scan(rel: &str, category: Category, tags: Vec<Tag>, is_text: bool, size: u64) -> ScannedFile {
        ScannedFile {
            repo_label: "repo".into(),
            rel_path: rel.into(),
            abs_path: PathBuf::from("/x").join(rel),
            size_bytes: size,
            is_text,
            fingerprint: None,
            extension: String::new(),
            category,
            tags,
            inclusion_reason: InclusionReason::Normal,
            lens: Lens::Core,
        }
    }

    #[test]
    fn binary_is_always_omitted() {
        let f = scan("logo.png", Category::Other, vec![], false, 10);
        for p in [
            Profile::Overview,
            Profile::Summary,
            Profile::Dev,
            Profile::MachineLean,
            Profile::Max,
        ] {
            assert_eq!(inclusion_status(&f, p, 0), InclusionStatus::Omitted);
        }
    }

    #[test]
    fn overview_keeps_only_priority_files() {
        let readme = scan("README.md", Category::Doc, vec![Tag::AiContext], true, 120);
        let src = scan("src/main.py", Category::Source, vec![], true, 50);
        let doc = scan("docs/manual.md", Category::Doc, vec![], true, 90);

        assert_eq!(
            inclusion_status(&readme, Profile::Overview, 0),
            InclusionStatus::Full
        );
        assert_eq!(
            inclusion_status(&src, Profile::Overview, 0),
            InclusionStatus::MetaOnly
        );
        assert_eq!(
            inclusion_status(&doc, Profile::Overview, 0),
            InclusionStatus::MetaOnly
        );
    }

    #[test]
    fn summary_includes_docs_and_configs() {
        let doc = scan("docs/manual.md", Category::Doc, vec![], true, 90);
        let cfg = scan("pyproject.toml", Category::Config, vec![], true, 40);
        let src = scan("src/main.py", Category::Source, vec![], true, 50);

        assert_eq!(inclusion_status(&doc, Profile::Summary, 0), InclusionStatus::Full);
        assert_eq!(inclusion_status(&cfg, Profile::Summary, 0), InclusionStatus::Full);
        assert_eq!(
            inclusion_status(&src, Profile::Summary, 0),
            InclusionStatus::MetaOnly
        );
    }

    #[test]
    fn dev_gates_lockfiles_by_size() {
        let small = scan("Cargo.lock", Category::Config, vec![Tag::Lockfile], true, 1_000);
        let big = scan(
            "package-lock.json",
            Category::Config,
            vec![Tag::Lockfile],
            true,
            400_000,
        );
        assert_eq!(inclusion_status(&small, Profile::Dev, 0), InclusionStatus::Full);
        assert_eq!(inclusion_status(&big, Profile::Dev, 0), InclusionStatus::MetaOnly);
    }

    #[test]
    fn dev_takes_source_fully_but_plain_docs_meta_only() {
        let src = scan("src/main.py", Category::Source, vec![], true, 50);
        let doc = scan("docs/manual.md", Category::Doc, vec![], true, 90);
        assert_eq!(inclusion_status(&src, Profile::Dev, 0), InclusionStatus::Full);
        assert_eq!(inclusion_status(&doc, Profile::Dev, 0), InclusionStatus::MetaOnly);
    }

    #[test]
    fn max_takes_all_text_and_never_truncates() {
        let big = scan("data/huge.csv", Category::Other, vec![], true, 50_000_000);
        // A non-zero max_file_bytes must not demote or truncate.
        assert_eq!(inclusion_status(&big, Profile::Max, 1_000), InclusionStatus::Full);
    }

    #[test]
    fn selector_never_returns_truncated() {
        let files = [
            scan("a.md", Category::Doc, vec![], true, 1),
            scan("b.rs", Category::Source, vec![], true, 1 << 30),
            scan("c.bin", Category::Other, vec![], false, 9),
        ];
        for f in &files {
            for p in [
                Profile::Overview,
                Profile::Summary,
                Profile::Dev,
                Profile::MachineLean,
                Profile::Max,
            ] {
                assert_ne!(inclusion_status(f, p, 64), InclusionStatus::Truncated);
            }
        }
    }
}

//! File records and the closed classification vocabulary.
//!
//! A [`ScannedFile`] is what the walker produces: path identity, size, text
//! detection, fingerprint, category, tags. [`FileRecord`] is the frozen view
//! the renderer and sidecar read: the scan plus inclusion status, roles, and
//! deterministic identifiers, all computed up front in explicit pipeline
//! steps. Nothing mutates a record after construction.

use serde::Serialize;
use std::path::PathBuf;

use crate::classify;
use crate::config::Profile;
use crate::ident;
use crate::select;

/// Closed category set. Unknown categories are unrepresentable by
/// construction; the classifier falls back to `Other` and emits a
/// diagnostic for anything it cannot map confidently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Source,
    Test,
    Doc,
    Config,
    Contract,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Source => "source",
            Category::Test => "test",
            Category::Doc => "doc",
            Category::Config => "config",
            Category::Contract => "contract",
            Category::Other => "other",
        }
    }

    /// Categories that survive a code-only render.
    pub fn is_code_like(self) -> bool {
        matches!(
            self,
            Category::Source | Category::Test | Category::Config | Category::Contract
        )
    }
}

/// Closed tag vocabulary. Tags are additive and independent of category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tag {
    AiContext,
    Runbook,
    Lockfile,
    Script,
    Ci,
    Adr,
    Feed,
    WgxProfile,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::AiContext => "ai-context",
            Tag::Runbook => "runbook",
            Tag::Lockfile => "lockfile",
            Tag::Script => "script",
            Tag::Ci => "ci",
            Tag::Adr => "adr",
            Tag::Feed => "feed",
            Tag::WgxProfile => "wgx-profile",
        }
    }
}

/// Coarse reading lens. A focus overlay for readers, never an exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lens {
    Entrypoints,
    Core,
    Interfaces,
    DataModels,
    Pipelines,
    Ui,
    Guards,
}

impl Lens {
    pub const ALL: [Lens; 7] = [
        Lens::Entrypoints,
        Lens::Core,
        Lens::Interfaces,
        Lens::DataModels,
        Lens::Pipelines,
        Lens::Ui,
        Lens::Guards,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Lens::Entrypoints => "entrypoints",
            Lens::Core => "core",
            Lens::Interfaces => "interfaces",
            Lens::DataModels => "data_models",
            Lens::Pipelines => "pipelines",
            Lens::Ui => "ui",
            Lens::Guards => "guards",
        }
    }
}

/// Why a file was admitted by the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionReason {
    Normal,
    ForceInclude,
}

impl InclusionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            InclusionReason::Normal => "normal",
            InclusionReason::ForceInclude => "force_include",
        }
    }
}

/// The per-file outcome of the selector. `Truncated` is assigned only by the
/// splitter when a file block must break across parts; the selector never
/// produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InclusionStatus {
    Full,
    Truncated,
    MetaOnly,
    Omitted,
}

impl InclusionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InclusionStatus::Full => "full",
            InclusionStatus::Truncated => "truncated",
            InclusionStatus::MetaOnly => "meta-only",
            InclusionStatus::Omitted => "omitted",
        }
    }

    /// True when the file contributes a content block to the report.
    pub fn has_content(self) -> bool {
        matches!(self, InclusionStatus::Full | InclusionStatus::Truncated)
    }
}

/// Walker output: one candidate file, classified but not yet selected.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Short name of the containing repository root.
    pub repo_label: String,
    /// Repo-relative path, forward-slash normalized, Unicode-NFC.
    pub rel_path: String,
    /// Handle for I/O only; never rendered.
    pub abs_path: PathBuf,
    pub size_bytes: u64,
    pub is_text: bool,
    /// Integrity fingerprint (hex), `None` when hashing was disabled.
    pub fingerprint: Option<String>,
    /// Lowercase suffix including the leading dot, or empty.
    pub extension: String,
    pub category: Category,
    pub tags: Vec<Tag>,
    pub inclusion_reason: InclusionReason,
    pub lens: Lens,
}

impl ScannedFile {
    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }
}

/// Frozen per-file record: scan data plus everything downstream stages need.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub repo_label: String,
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub size_bytes: u64,
    pub is_text: bool,
    pub fingerprint: Option<String>,
    pub extension: String,
    pub category: Category,
    pub tags: Vec<Tag>,
    pub inclusion_reason: InclusionReason,
    pub inclusion_status: InclusionStatus,
    /// Heuristic, non-authoritative labels. Nothing in the report contract
    /// depends on specific role strings.
    pub roles: Vec<String>,
    pub lens: Lens,
    /// `f_` + 12 hex digits, content-addressed from `(repo_label, rel_path)`.
    pub stable_id: String,
    /// `file-<repo_slug>-<path_slug>[-<fingerprint[..6]>]`.
    pub anchor: String,
    /// The suffix-free anchor, kept as a navigation alias.
    pub anchor_alias: String,
}

impl FileRecord {
    /// Final pipeline step: selector + identifier + roles, producing the
    /// immutable view every later stage reads.
    pub fn finalize(scan: ScannedFile, profile: Profile, max_file_bytes: u64) -> FileRecord {
        let inclusion_status = select::inclusion_status(&scan, profile, max_file_bytes);
        let stable_id = ident::stable_id(&scan.repo_label, &scan.rel_path);
        let (anchor, anchor_alias) =
            ident::anchor(&scan.repo_label, &scan.rel_path, scan.fingerprint.as_deref());
        let roles = classify::file_roles(&scan);

        FileRecord {
            repo_label: scan.repo_label,
            rel_path: scan.rel_path,
            abs_path: scan.abs_path,
            size_bytes: scan.size_bytes,
            is_text: scan.is_text,
            fingerprint: scan.fingerprint,
            extension: scan.extension,
            category: scan.category,
            tags: scan.tags,
            inclusion_reason: scan.inclusion_reason,
            inclusion_status,
            roles,
            lens: scan.lens,
            stable_id,
            anchor,
            anchor_alias,
        }
    }

    pub fn file_name(&self) -> &str {
        self.rel_path.rsplit('/').next().unwrap_or(&self.rel_path)
    }

    /// Anchor of the stable-id marker (`file-f_…`), used by manifest links.
    pub fn stable_anchor(&self) -> String {
        format!("file-{}", self.stable_id)
    }

    pub fn tags_joined(&self) -> String {
        if self.tags.is_empty() {
            "-".to_string()
        } else {
            self.tags
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

/// One scanned repository: label, root, and its candidate files in walker
/// order.
#[derive(Debug, Clone)]
pub struct RepoSummary {
    pub name: String,
    pub root: PathBuf,
    pub files: Vec<ScannedFile>,
}

impl RepoSummary {
    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }

    pub fn text_files(&self) -> usize {
        self.files.iter().filter(|f| f.is_text).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(rel: &str) -> ScannedFile {
        ScannedFile {
            repo_label: "tools".into(),
            rel_path: rel.into(),
            abs_path: PathBuf::from("/hub/tools").join(rel),
            size_bytes: 10,
            is_text: true,
            fingerprint: Some("abcdef012345".into()),
            extension: ".md".into(),
            category: Category::Doc,
            tags: vec![Tag::AiContext],
            inclusion_reason: InclusionReason::Normal,
            lens: Lens::Entrypoints,
        }
    }

    #[test]
    fn finalize_assigns_ids_and_anchor_suffix() {
        let rec = FileRecord::finalize(scan("README.md"), Profile::Dev, 0);
        assert!(rec.stable_id.starts_with("f_"), "id: {}", rec.stable_id);
        assert_eq!(rec.stable_id.len(), 2 + 12);
        assert_eq!(rec.anchor, format!("{}-abcdef", rec.anchor_alias));
        assert_eq!(rec.stable_anchor(), format!("file-{}", rec.stable_id));
    }

    #[test]
    fn status_strings_match_contract() {
        assert_eq!(InclusionStatus::MetaOnly.as_str(), "meta-only");
        assert_eq!(InclusionReason::ForceInclude.as_str(), "force_include");
        assert_eq!(Tag::WgxProfile.as_str(), "wgx-profile");
    }
}

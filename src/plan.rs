//! Plan pass: everything the renderer, validator, and sidecar need, computed
//! once before any block is emitted.
//!
//! This is the single source of truth for coverage and risk numbers. The
//! header, the epistemic declaration, and the sidecar all read the same
//! [`EpistemicMetrics`] value; a correctness test verifies they agree.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::MergeConfig;
use crate::record::{Category, FileRecord, InclusionStatus, RepoSummary, Tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpistemicCounts {
    pub total: usize,
    pub full: usize,
    pub snippet: usize,
    pub meta: usize,
    pub text_total: usize,
    pub text_contact: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpistemicRatios {
    pub contact_ratio: f64,
    pub meta_ratio: f64,
    pub text_coverage_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskRationale {
    pub low_if: &'static str,
    pub medium_if: &'static str,
    pub high_if: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskInputs {
    pub contact_ratio_all_files: f64,
    pub text_coverage_ratio: f64,
    pub snippet_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskBlock {
    pub level: RiskLevel,
    pub rationale: RiskRationale,
    pub inputs: RiskInputs,
    pub uncertainty_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpistemicMetrics {
    pub counts: EpistemicCounts,
    pub ratios: EpistemicRatios,
    pub risk: RiskBlock,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Compute coverage, contact, and risk in one place.
pub fn compute_metrics(records: &[FileRecord]) -> EpistemicMetrics {
    let total = records.len();
    let full = records
        .iter()
        .filter(|r| matches!(r.inclusion_status, InclusionStatus::Full))
        .count();
    let snippet = records
        .iter()
        .filter(|r| matches!(r.inclusion_status, InclusionStatus::Truncated))
        .count();
    let meta = total - full - snippet;

    let text_total = records.iter().filter(|r| r.is_text).count();
    let text_contact = records
        .iter()
        .filter(|r| r.is_text && r.inclusion_status.has_content())
        .count();

    let contact_ratio = if total > 0 {
        round2((full + snippet) as f64 / total as f64)
    } else {
        0.0
    };
    let meta_ratio = if total > 0 {
        round2(meta as f64 / total as f64)
    } else {
        0.0
    };
    let text_coverage_ratio = if text_total > 0 {
        round2(text_contact as f64 / text_total as f64)
    } else {
        0.0
    };

    // No text files at all means there is no text to have missed.
    let mut level = RiskLevel::Low;
    if text_total > 0 {
        if text_coverage_ratio < 0.10 {
            level = RiskLevel::High;
        } else if text_coverage_ratio < 0.50 {
            level = RiskLevel::Medium;
        }
    }
    if snippet > 0 && level == RiskLevel::Low {
        level = RiskLevel::Medium;
    }

    EpistemicMetrics {
        counts: EpistemicCounts {
            total,
            full,
            snippet,
            meta,
            text_total,
            text_contact,
        },
        ratios: EpistemicRatios {
            contact_ratio,
            meta_ratio,
            text_coverage_ratio,
        },
        risk: RiskBlock {
            level,
            rationale: RiskRationale {
                low_if: "text_coverage_ratio >= 0.5 and snippet_count == 0",
                medium_if: "text_coverage_ratio < 0.5 or snippet_count > 0",
                high_if: "text_coverage_ratio < 0.1",
            },
            inputs: RiskInputs {
                contact_ratio_all_files: contact_ratio,
                text_coverage_ratio,
                snippet_count: snippet,
            },
            uncertainty_score: round2(1.0 - text_coverage_ratio),
        },
    }
}

/// Compact per-repo stats shown in the plan and the manifest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoStats {
    pub total: usize,
    /// Text files in relevant categories (source/doc/config/test/contract).
    pub text_files: usize,
    pub bytes: u64,
    /// Files contributing content (`full`/`truncated`).
    pub included: usize,
}

/// One hotspot entry for quick navigation.
#[derive(Debug, Clone)]
pub struct Hotspot {
    pub rel_path: String,
    pub repo_label: String,
    pub anchor: String,
    pub category: Category,
    pub roles: Vec<String>,
    pub tags: Vec<Tag>,
}

const HOTSPOT_LIMIT: usize = 8;

fn hotspot_score(rec: &FileRecord) -> f64 {
    let mut score = 0.0;
    if rec.roles.iter().any(|r| r == "entrypoint") {
        score += 5.0;
    }
    if rec.category == Category::Contract {
        score += 3.0;
    }
    if rec.tags.contains(&Tag::AiContext) {
        score += 2.5;
    }
    if rec.tags.contains(&Tag::Ci) {
        score += 1.5;
    }
    if rec.category == Category::Config {
        score += 1.0;
    }
    // Light size bias so substantial files surface without dominating.
    score += (rec.size_bytes as f64 / 1024.0).min(50.0) / 50.0;
    score
}

/// Top included files by score; ties break by size then path.
pub fn build_hotspots(records: &[FileRecord]) -> Vec<Hotspot> {
    let mut candidates: Vec<(f64, &FileRecord)> = records
        .iter()
        .filter(|r| r.inclusion_status.has_content())
        .map(|r| (hotspot_score(r), r))
        .collect();

    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.size_bytes.cmp(&a.1.size_bytes))
            .then(a.1.rel_path.cmp(&b.1.rel_path))
    });

    candidates
        .into_iter()
        .take(HOTSPOT_LIMIT)
        .map(|(_, r)| Hotspot {
            rel_path: r.rel_path.clone(),
            repo_label: r.repo_label.clone(),
            anchor: r.anchor.clone(),
            category: r.category,
            roles: r.roles.clone(),
            tags: r.tags.clone(),
        })
        .collect()
}

/// Top-level folder buckets for the plan's highlights.
#[derive(Debug, Clone, Default)]
pub struct FolderHighlights {
    pub code: Vec<String>,
    pub docs: Vec<String>,
    pub infra: Vec<String>,
}

/// Organism counters: context-bearing organs of the merged corpus.
#[derive(Debug, Clone, Default)]
pub struct OrganismOverview {
    pub ai_context: Vec<String>,
    pub contracts: Vec<String>,
    pub pipelines: Vec<String>,
    pub wgx_profiles: Vec<String>,
}

/// The full plan the renderer consumes. Records arrive sorted in canonical
/// order and already filtered for code-only runs.
#[derive(Debug, Clone)]
pub struct MergePlan {
    pub records: Vec<FileRecord>,
    pub sources: Vec<(String, PathBuf)>,
    pub metrics: EpistemicMetrics,
    pub repo_stats: BTreeMap<String, RepoStats>,
    pub included_by_repo: BTreeMap<String, usize>,
    pub hotspots: Vec<Hotspot>,
    pub folders: FolderHighlights,
    pub organism: OrganismOverview,
    pub declared_purpose: String,
    pub scope: String,
    pub total_bytes: u64,
}

impl MergePlan {
    /// Build the plan from scanned repos. Applies canonical sorting, the
    /// code-only category filter, and computes every derived number.
    pub fn build(summaries: &[RepoSummary], cfg: &MergeConfig) -> MergePlan {
        let sources: Vec<(String, PathBuf)> = summaries
            .iter()
            .map(|s| (s.name.clone(), s.root.clone()))
            .collect();

        let mut records: Vec<FileRecord> = summaries
            .iter()
            .flat_map(|s| s.files.iter().cloned())
            .map(|scan| FileRecord::finalize(scan, cfg.profile, cfg.max_file_bytes))
            .collect();

        // Path and extension filters are hard includes: non-matching files
        // disappear from manifest and content entirely, force-include
        // notwithstanding. A filtered report must not leak context the
        // operator chose to exclude.
        if let Some(pf) = cfg
            .path_filter
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            records.retain(|r| r.rel_path.contains(pf));
        }
        if let Some(exts) = cfg.ext_filter.as_ref().filter(|e| !e.is_empty()) {
            records.retain(|r| exts.iter().any(|e| e == &r.extension));
        }

        if cfg.effective_code_only() {
            records.retain(|r| r.category.is_code_like());
        }

        // `truncated` is a splitter concept: a file whose single content
        // block cannot fit one part will be chunked across parts. That is
        // known deterministically up front, so the manifest, the metrics,
        // and the sidecar all agree on the status. Content is never cut.
        if cfg.split_size > 0 && !cfg.plan_only {
            for rec in &mut records {
                if rec.inclusion_status == InclusionStatus::Full
                    && rec.size_bytes > cfg.split_size
                {
                    rec.inclusion_status = InclusionStatus::Truncated;
                }
            }
        }

        records.sort_by(|a, b| {
            let ka = (
                cfg.repo_sort_index(&a.repo_label),
                a.repo_label.to_lowercase(),
                a.rel_path.to_lowercase(),
            );
            let kb = (
                cfg.repo_sort_index(&b.repo_label),
                b.repo_label.to_lowercase(),
                b.rel_path.to_lowercase(),
            );
            ka.cmp(&kb)
        });

        let metrics = compute_metrics(&records);

        let mut included_by_repo: BTreeMap<String, usize> = BTreeMap::new();
        for rec in records.iter().filter(|r| r.inclusion_status.has_content()) {
            *included_by_repo.entry(rec.repo_label.clone()).or_insert(0) += 1;
        }

        let mut repo_stats: BTreeMap<String, RepoStats> = BTreeMap::new();
        for rec in &records {
            let stats = repo_stats.entry(rec.repo_label.clone()).or_default();
            stats.total += 1;
            stats.bytes += rec.size_bytes;
            if rec.is_text
                && matches!(
                    rec.category,
                    Category::Source
                        | Category::Doc
                        | Category::Config
                        | Category::Test
                        | Category::Contract
                )
            {
                stats.text_files += 1;
            }
        }
        for (repo, count) in &included_by_repo {
            if let Some(stats) = repo_stats.get_mut(repo) {
                stats.included = *count;
            }
        }

        let mut folders = FolderHighlights::default();
        let mut organism = OrganismOverview::default();
        for rec in &records {
            let top = rec.rel_path.split('/').next().unwrap_or("").to_string();
            let has = |seg: &str| rec.rel_path.split('/').any(|p| p == seg);
            if has(".github") || has(".wgx") || has("contracts") {
                push_unique(&mut folders.infra, top.clone());
            }
            if has("src") || has("scripts") {
                push_unique(&mut folders.code, top.clone());
            }
            if has("docs") {
                push_unique(&mut folders.docs, "docs".to_string());
            }

            if rec.category == Category::Contract {
                organism.contracts.push(rec.rel_path.clone());
            }
            if rec.tags.contains(&Tag::AiContext) {
                organism.ai_context.push(rec.rel_path.clone());
            }
            if rec.tags.contains(&Tag::Ci) {
                organism.pipelines.push(rec.rel_path.clone());
            }
            if rec.tags.contains(&Tag::WgxProfile) {
                organism.wgx_profiles.push(rec.rel_path.clone());
            }
        }
        folders.code.sort();
        folders.docs.sort();
        folders.infra.sort();

        let declared_purpose = extract_purpose(&sources);
        let scope = describe_scope(&records);
        let total_bytes = records.iter().map(|r| r.size_bytes).sum();
        let hotspots = build_hotspots(&records);

        MergePlan {
            records,
            sources,
            metrics,
            repo_stats,
            included_by_repo,
            hotspots,
            folders,
            organism,
            declared_purpose,
            scope,
            total_bytes,
        }
    }

    /// Sorted source repo names.
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    /// Files contributing content, in canonical order.
    pub fn content_records(&self) -> impl Iterator<Item = &FileRecord> {
        self.records
            .iter()
            .filter(|r| r.inclusion_status.has_content())
    }

    pub fn included_count(&self) -> usize {
        self.metrics.counts.full + self.metrics.counts.snippet
    }

    /// Coverage percent over text files, one decimal.
    pub fn coverage_pct(&self) -> f64 {
        if self.metrics.counts.text_total == 0 {
            return 0.0;
        }
        let raw =
            self.included_count() as f64 / self.metrics.counts.text_total as f64 * 100.0;
        (raw * 10.0).round() / 10.0
    }
}

fn push_unique(v: &mut Vec<String>, item: String) {
    if !item.is_empty() && !v.contains(&item) {
        v.push(item);
    }
}

/// First paragraph of the first source's README (or docs/intro.md). No
/// guessing: absence yields `(none)`.
fn extract_purpose(sources: &[(String, PathBuf)]) -> String {
    let Some((_, root)) = sources.first() else {
        return "(none)".to_string();
    };
    for candidate in ["README.md", "README", "docs/intro.md"] {
        let p = root.join(candidate);
        let Ok(text) = std::fs::read_to_string(&p) else {
            continue;
        };
        let first = text
            .trim()
            .split("\n\n")
            .next()
            .unwrap_or("")
            .trim()
            .trim_start_matches('#')
            .trim()
            .to_string();
        if !first.is_empty() {
            return first;
        }
    }
    "(none)".to_string()
}

/// Human-readable scope line from the involved roots.
pub fn describe_scope(records: &[FileRecord]) -> String {
    let mut roots: Vec<&str> = records.iter().map(|r| r.repo_label.as_str()).collect();
    roots.sort();
    roots.dedup();

    match roots.len() {
        0 => "empty (no matching files)".to_string(),
        1 => format!("single repo `{}`", roots[0]),
        n => {
            let mut preview = roots
                .iter()
                .take(5)
                .map(|r| format!("`{r}`"))
                .collect::<Vec<_>>()
                .join(", ");
            if n > 5 {
                preview.push_str(", …");
            }
            format!("{n} repos: {preview}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::record::{InclusionReason, InclusionStatus, Lens, ScannedFile};

    fn rec(rel: &str, category: Category, is_text: bool, status: InclusionStatus) -> FileRecord {
        let scan = ScannedFile {
            repo_label: "tools".into(),
            rel_path: rel.into(),
            abs_path: PathBuf::from("/x").join(rel),
            size_bytes: 100,
            is_text,
            fingerprint: None,
            extension: String::new(),
            category,
            tags: vec![],
            inclusion_reason: InclusionReason::Normal,
            lens: Lens::Core,
        };
        let mut r = FileRecord::finalize(scan, Profile::Max, 0);
        r.inclusion_status = status;
        r
    }

    #[test]
    fn full_coverage_is_low_risk() {
        let records = vec![
            rec("a.md", Category::Doc, true, InclusionStatus::Full),
            rec("b.rs", Category::Source, true, InclusionStatus::Full),
        ];
        let m = compute_metrics(&records);
        assert_eq!(m.ratios.contact_ratio, 1.0);
        assert_eq!(m.ratios.text_coverage_ratio, 1.0);
        assert_eq!(m.risk.level, RiskLevel::Low);
        assert_eq!(m.risk.uncertainty_score, 0.0);
    }

    #[test]
    fn sparse_coverage_raises_risk() {
        let mut records = vec![rec("a.md", Category::Doc, true, InclusionStatus::Full)];
        for i in 0..19 {
            records.push(rec(
                &format!("f{i}.rs"),
                Category::Source,
                true,
                InclusionStatus::MetaOnly,
            ));
        }
        let m = compute_metrics(&records);
        assert_eq!(m.ratios.text_coverage_ratio, 0.05);
        assert_eq!(m.risk.level, RiskLevel::High);
    }

    #[test]
    fn truncation_bumps_low_to_medium() {
        let records = vec![
            rec("a.md", Category::Doc, true, InclusionStatus::Full),
            rec("b.md", Category::Doc, true, InclusionStatus::Truncated),
        ];
        let m = compute_metrics(&records);
        assert_eq!(m.risk.level, RiskLevel::Medium);
        assert_eq!(m.counts.snippet, 1);
    }

    #[test]
    fn empty_scope_has_zero_ratios_and_low_risk() {
        let m = compute_metrics(&[]);
        assert_eq!(m.counts.total, 0);
        assert_eq!(m.ratios.contact_ratio, 0.0);
        assert_eq!(m.risk.level, RiskLevel::Low);
    }

    #[test]
    fn scope_description_formats() {
        assert_eq!(describe_scope(&[]), "empty (no matching files)");
        let one = vec![rec("a.md", Category::Doc, true, InclusionStatus::Full)];
        assert_eq!(describe_scope(&one), "single repo `tools`");
    }

    #[test]
    fn hotspots_prefer_entrypoints_and_contracts() {
        let entry = rec("src/main.py", Category::Source, true, InclusionStatus::Full);
        let contract = rec(
            "contracts/feed.json",
            Category::Contract,
            true,
            InclusionStatus::Full,
        );
        let plain = rec("src/util.py", Category::Source, true, InclusionStatus::Full);
        let skipped = rec("notes.md", Category::Doc, true, InclusionStatus::MetaOnly);

        let hs = build_hotspots(&[plain, contract, entry, skipped]);
        assert_eq!(hs.len(), 3, "meta-only files never become hotspots");
        assert_eq!(hs[0].rel_path, "src/main.py", "entrypoint role scores highest");
        assert_eq!(hs[1].rel_path, "contracts/feed.json");
    }
}

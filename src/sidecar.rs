//! Machine-readable index document paired with the text report.
//!
//! The sidecar is an agent-first artifact: it names the canonical text
//! file, carries per-file entries with two equivalent content references
//! (a marker string and a structured selector), and a self-report that lets
//! agents make truthful absence claims. Coverage and risk values are taken
//! from the same plan-pass metrics the text report renders — bit-for-bit.
//!
//! A light structural validation runs before every write; a sidecar that
//! fails it is a hard error and the run counts as having produced none.

use serde::Serialize;
use serde_json::Value;

use crate::config::{
    MergeConfig, AGENT_CONTRACT_NAME, AGENT_CONTRACT_VERSION, SPEC_VERSION,
};
use crate::plan::{EpistemicMetrics, MergePlan, RiskBlock};
use crate::error::MergeError;
use crate::record::{Category, FileRecord, Lens, Tag};

#[derive(Debug, Clone, Serialize)]
pub struct RequestedFlags {
    pub plan_only: bool,
    pub code_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SidecarFilters {
    pub path_filter: String,
    pub ext_filter: String,
    /// Explicit negation sets: empty means "no restriction" / "none
    /// excluded" — agent-safe either way.
    pub included_categories: Vec<String>,
    pub excluded_categories: Vec<String>,
    pub included_globs: Vec<String>,
    pub excluded_globs: Vec<String>,
    pub binary_policy: &'static str,
    pub content_policy: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpistemicCharterMeta {
    pub applied: bool,
    pub location: &'static str,
    pub version: &'static str,
    pub claim_language_guard: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct EpistemicDeclarationMeta {
    pub charter: &'static str,
    pub claim_language_guard: &'static str,
    pub risk_level: String,
    pub contact_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageBlock {
    pub included_files: usize,
    pub text_files: usize,
    pub coverage_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SidecarMeta {
    pub contract: &'static str,
    pub contract_version: &'static str,
    pub spec_version: &'static str,
    pub run_id: String,
    pub profile: String,
    pub generated_at: String,
    pub plan_only: bool,
    pub code_only: bool,
    pub requested_flags: RequestedFlags,
    pub max_file_bytes: u64,
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub source_repos: Vec<String>,
    pub filters: SidecarFilters,
    pub coverage: CoverageBlock,
    pub risk: RiskBlock,
    pub epistemic_charter: EpistemicCharterMeta,
    pub epistemic_declaration: EpistemicDeclarationMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingPolicy {
    pub canonical_source: &'static str,
    pub md_required: bool,
    pub json_role: &'static str,
    pub md_contains_full_information: bool,
    pub lenses_applied: bool,
}

impl Default for ReadingPolicy {
    fn default() -> Self {
        ReadingPolicy {
            canonical_source: "md",
            md_required: true,
            json_role: "index_and_metadata_only",
            md_contains_full_information: true,
            lenses_applied: true,
        }
    }
}

/// Paths and basenames of the artifacts this run produced. Filled by the
/// coordinator after the final rename, then re-asserted on disk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SidecarArtifacts {
    pub index_json: Option<String>,
    pub canonical_md: Option<String>,
    pub md_parts: Vec<String>,
    pub index_json_basename: Option<String>,
    pub canonical_md_basename: Option<String>,
    pub md_parts_basenames: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentSelector {
    pub kind: &'static str,
    pub tag: &'static str,
    pub attr: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentRef {
    /// Marker search string; more robust than anchors across renderers.
    pub marker: String,
    pub selector: ContentSelector,
}

#[derive(Debug, Clone, Serialize)]
pub struct MdRef {
    pub anchor: String,
    pub fragment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SidecarFile {
    pub id: String,
    pub path: String,
    pub repo: String,
    pub size_bytes: u64,
    pub is_text: bool,
    pub category: Category,
    pub tags: Vec<Tag>,
    pub included: bool,
    pub inclusion_status: String,
    pub content_ref: ContentRef,
    pub md_ref: MdRef,
}

#[derive(Debug, Clone, Serialize)]
pub struct LensIndexEntry {
    pub path: String,
    pub lens: Lens,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingLenses {
    pub active: Vec<&'static str>,
    pub file_index: Vec<LensIndexEntry>,
    pub recommended_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactEntry {
    pub path: String,
    pub evidence_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chars_seen: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactMetrics {
    pub total_files: usize,
    pub full: usize,
    pub snippet: usize,
    pub meta: usize,
    pub contact_ratio: f64,
    pub meta_ratio: f64,
    pub text_files_total: usize,
    pub text_files_contact: usize,
    pub text_coverage_ratio: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelfReport {
    pub active_lenses: Vec<&'static str>,
    pub text_contact: Vec<ContactEntry>,
    pub contact_metrics: ContactMetrics,
    pub risk_level: String,
    pub risk_rationale: crate::plan::RiskRationale,
    pub risk_inputs: crate::plan::RiskInputs,
    pub uncertainty_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sidecar {
    pub meta: SidecarMeta,
    pub reading_policy: ReadingPolicy,
    pub artifacts: SidecarArtifacts,
    pub coverage: CoverageBlock,
    pub scope: String,
    pub reading_lenses: ReadingLenses,
    pub self_report: SelfReport,
    pub files: Vec<SidecarFile>,
    pub delta: Option<Value>,
}

fn file_entry(rec: &FileRecord) -> SidecarFile {
    SidecarFile {
        id: rec.stable_id.clone(),
        path: rec.rel_path.clone(),
        repo: rec.repo_label.clone(),
        size_bytes: rec.size_bytes,
        is_text: rec.is_text,
        category: rec.category,
        tags: rec.tags.clone(),
        included: rec.inclusion_status.has_content(),
        inclusion_status: rec.inclusion_status.as_str().to_string(),
        content_ref: ContentRef {
            marker: format!("file:id=\"{}\"", rec.stable_id),
            selector: ContentSelector {
                kind: "html_comment_attr",
                tag: "file",
                attr: "id",
                value: rec.stable_id.clone(),
            },
        },
        md_ref: MdRef {
            anchor: rec.stable_anchor(),
            fragment: format!("#{}", rec.stable_anchor()),
        },
    }
}

fn contact_metrics(metrics: &EpistemicMetrics) -> ContactMetrics {
    ContactMetrics {
        total_files: metrics.counts.total,
        full: metrics.counts.full,
        snippet: metrics.counts.snippet,
        meta: metrics.counts.meta,
        contact_ratio: metrics.ratios.contact_ratio,
        meta_ratio: metrics.ratios.meta_ratio,
        text_files_total: metrics.counts.text_total,
        text_files_contact: metrics.counts.text_contact,
        text_coverage_ratio: metrics.ratios.text_coverage_ratio,
    }
}

/// Build the sidecar from the same plan the renderer consumes. Files with
/// content are read once here to record a truthful `chars_seen`.
pub fn build_sidecar(
    plan: &MergePlan,
    cfg: &MergeConfig,
    run_id: &str,
    generated_at: &str,
) -> Sidecar {
    let metrics = &plan.metrics;

    let mut files: Vec<SidecarFile> = Vec::new();
    let mut text_contact: Vec<ContactEntry> = Vec::new();
    let mut lens_index: Vec<LensIndexEntry> = Vec::new();

    for rec in &plan.records {
        files.push(file_entry(rec));
        lens_index.push(LensIndexEntry {
            path: rec.rel_path.clone(),
            lens: rec.lens,
        });

        let evidence = match rec.inclusion_status.as_str() {
            "full" => "full",
            "truncated" => "snippet",
            _ => "meta",
        };
        let chars_seen = if rec.inclusion_status.has_content() {
            std::fs::read(&rec.abs_path)
                .map(|bytes| String::from_utf8_lossy(&bytes).chars().count())
                .ok()
        } else {
            None
        };
        text_contact.push(ContactEntry {
            path: rec.rel_path.clone(),
            evidence_type: evidence,
            chars_seen,
        });
    }

    let active: Vec<&'static str> = Lens::ALL.iter().map(|l| l.as_str()).collect();
    let coverage = CoverageBlock {
        included_files: plan.included_count(),
        text_files: metrics.counts.text_total,
        coverage_pct: plan.coverage_pct(),
    };

    Sidecar {
        meta: SidecarMeta {
            contract: AGENT_CONTRACT_NAME,
            contract_version: AGENT_CONTRACT_VERSION,
            spec_version: SPEC_VERSION,
            run_id: run_id.to_string(),
            profile: cfg.profile.as_str().to_string(),
            generated_at: generated_at.to_string(),
            plan_only: cfg.plan_only,
            code_only: cfg.effective_code_only(),
            requested_flags: RequestedFlags {
                plan_only: cfg.plan_only,
                code_only: cfg.code_only,
            },
            max_file_bytes: cfg.max_file_bytes,
            total_files: plan.records.len(),
            total_size_bytes: plan.total_bytes,
            source_repos: plan.source_names(),
            filters: SidecarFilters {
                path_filter: cfg.path_filter.clone().unwrap_or_default(),
                ext_filter: cfg
                    .ext_filter
                    .as_ref()
                    .map(|e| {
                        let mut sorted = e.clone();
                        sorted.sort();
                        sorted.join(",")
                    })
                    .unwrap_or_default(),
                included_categories: if cfg.effective_code_only() {
                    vec![
                        "config".to_string(),
                        "contract".to_string(),
                        "source".to_string(),
                        "test".to_string(),
                    ]
                } else {
                    Vec::new()
                },
                excluded_categories: Vec::new(),
                included_globs: Vec::new(),
                excluded_globs: Vec::new(),
                binary_policy: "ignore",
                content_policy: cfg.render_mode().as_str().to_string(),
            },
            coverage: coverage.clone(),
            risk: metrics.risk.clone(),
            epistemic_charter: EpistemicCharterMeta {
                applied: true,
                location: "document_header",
                version: "1.0",
                claim_language_guard: "active",
            },
            epistemic_declaration: EpistemicDeclarationMeta {
                charter: "epistemic_reading_charter v1",
                claim_language_guard: "active",
                risk_level: metrics.risk.level.as_str().to_string(),
                contact_ratio: metrics.ratios.contact_ratio,
            },
        },
        reading_policy: ReadingPolicy::default(),
        artifacts: SidecarArtifacts::default(),
        coverage,
        scope: plan.scope.clone(),
        reading_lenses: ReadingLenses {
            active: active.clone(),
            file_index: lens_index,
            recommended_files: Vec::new(),
        },
        self_report: SelfReport {
            active_lenses: active,
            text_contact,
            contact_metrics: contact_metrics(metrics),
            risk_level: metrics.risk.level.as_str().to_string(),
            risk_rationale: metrics.risk.rationale.clone(),
            risk_inputs: metrics.risk.inputs.clone(),
            uncertainty_score: metrics.risk.uncertainty_score,
        },
        files,
        delta: cfg.delta_meta.clone(),
    }
}

/// Minimal structural validation. Purpose: prevent "success but nothing
/// usable". Writing a sidecar that fails this is a hard error.
pub fn validate_value(value: &Value, allow_empty_primary: bool) -> Result<(), MergeError> {
    let obj = value
        .as_object()
        .ok_or_else(|| MergeError::SidecarInvalid("top-level is not an object".into()))?;

    let meta = obj
        .get("meta")
        .and_then(Value::as_object)
        .ok_or_else(|| MergeError::SidecarInvalid("meta missing or not an object".into()))?;
    match meta.get("contract").and_then(Value::as_str) {
        Some(c) if c == AGENT_CONTRACT_NAME => {}
        other => {
            return Err(MergeError::SidecarInvalid(format!(
                "meta.contract must be `{AGENT_CONTRACT_NAME}`, got {other:?}"
            )))
        }
    }
    match meta.get("contract_version").and_then(Value::as_str) {
        Some(v) if v == AGENT_CONTRACT_VERSION => {}
        other => {
            return Err(MergeError::SidecarInvalid(format!(
                "meta.contract_version must be `{AGENT_CONTRACT_VERSION}`, got {other:?}"
            )))
        }
    }

    let artifacts = obj
        .get("artifacts")
        .and_then(Value::as_object)
        .ok_or_else(|| MergeError::SidecarInvalid("artifacts missing".into()))?;
    if !allow_empty_primary {
        match artifacts.get("index_json").and_then(Value::as_str) {
            Some(p) if !p.is_empty() => {}
            _ => {
                return Err(MergeError::SidecarInvalid(
                    "artifacts.index_json missing or empty".into(),
                ))
            }
        }
    }

    if !obj.get("files").map(Value::is_array).unwrap_or(false) {
        return Err(MergeError::SidecarInvalid("files[] missing".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeConfig;
    use crate::walk::{scan_repo, ScanOptions};
    use tempfile::TempDir;

    fn build_fixture(cfg: &MergeConfig) -> (TempDir, MergePlan) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tools");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("README.md"), "# tools\n").unwrap();
        std::fs::write(root.join("src/main.py"), "print('hi')\n").unwrap();
        let summary = scan_repo(&root, &ScanOptions::default()).unwrap();
        let plan = MergePlan::build(&[summary], cfg);
        (tmp, plan)
    }

    #[test]
    fn sidecar_has_entry_per_record_with_refs() {
        let cfg = MergeConfig::default();
        let (_tmp, plan) = build_fixture(&cfg);
        let sc = build_sidecar(&plan, &cfg, "run-1", "2026-08-01T12:00:00Z");

        assert_eq!(sc.files.len(), plan.records.len());
        for f in &sc.files {
            assert!(f.id.starts_with("f_"));
            assert_eq!(f.content_ref.marker, format!("file:id=\"{}\"", f.id));
            assert_eq!(f.content_ref.selector.value, f.id);
            assert_eq!(f.md_ref.fragment, format!("#{}", f.md_ref.anchor));
        }
    }

    #[test]
    fn chars_seen_reported_only_for_content_files() {
        let cfg = MergeConfig::default();
        let (_tmp, plan) = build_fixture(&cfg);
        let sc = build_sidecar(&plan, &cfg, "run-1", "2026-08-01T12:00:00Z");

        let readme = sc
            .self_report
            .text_contact
            .iter()
            .find(|c| c.path == "README.md")
            .unwrap();
        assert_eq!(readme.evidence_type, "full");
        assert_eq!(readme.chars_seen, Some("# tools\n".chars().count()));
    }

    #[test]
    fn meta_risk_mirrors_plan_metrics() {
        let cfg = MergeConfig::default();
        let (_tmp, plan) = build_fixture(&cfg);
        let sc = build_sidecar(&plan, &cfg, "run-1", "2026-08-01T12:00:00Z");

        assert_eq!(
            sc.meta.risk.uncertainty_score,
            plan.metrics.risk.uncertainty_score
        );
        assert_eq!(
            sc.self_report.contact_metrics.text_coverage_ratio,
            plan.metrics.ratios.text_coverage_ratio
        );
        assert_eq!(sc.coverage.coverage_pct, plan.coverage_pct());
    }

    #[test]
    fn validation_rejects_missing_primary() {
        let cfg = MergeConfig::default();
        let (_tmp, plan) = build_fixture(&cfg);
        let sc = build_sidecar(&plan, &cfg, "run-1", "2026-08-01T12:00:00Z");
        let value = serde_json::to_value(&sc).unwrap();

        // Before the coordinator fills artifacts, the primary is absent.
        validate_value(&value, true).unwrap();
        let err = validate_value(&value, false).unwrap_err();
        assert!(matches!(err, MergeError::SidecarInvalid(_)));
    }

    #[test]
    fn validation_rejects_wrong_contract() {
        let bad = serde_json::json!({
            "meta": {"contract": "other", "contract_version": "v2"},
            "artifacts": {},
            "files": []
        });
        let err = validate_value(&bad, true).unwrap_err();
        assert!(format!("{err}").contains("contract"));
    }

    #[test]
    fn tags_serialize_in_kebab_case() {
        let cfg = MergeConfig::default();
        let (_tmp, plan) = build_fixture(&cfg);
        let sc = build_sidecar(&plan, &cfg, "run-1", "2026-08-01T12:00:00Z");
        let value = serde_json::to_value(&sc).unwrap();
        let readme = value["files"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["path"] == "README.md")
            .unwrap();
        assert_eq!(readme["tags"][0], "ai-context");
        assert_eq!(readme["category"], "doc");
    }
}

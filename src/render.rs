//! Report renderer: an ordered, lazy block sequence.
//!
//! The concatenation of all yielded blocks is the canonical full report. All
//! numbers shown here come from the plan pass — the renderer never computes
//! coverage on its own, which keeps the header, the epistemic declaration,
//! and the sidecar trivially consistent.
//!
//! Per-file block order is fixed: rule, stable-ID comment, anchors, heading,
//! metadata, fence-open, content, fence-close, backlinks. Only the content
//! of a single file is ever materialized at a time.

use chrono::{DateTime, Utc};
use serde_yaml::{Mapping, Value as Yaml};

use crate::config::{
    MergeConfig, MetaDensity, Profile, RenderMode, AGENT_CONTRACT_NAME, AGENT_CONTRACT_VERSION,
    REPORT_CONTRACT_NAME, REPORT_CONTRACT_VERSION, REPORT_TITLE, SPEC_VERSION,
};
use crate::classify;
use crate::delta;
use crate::extras;
use crate::ident;
use crate::plan::MergePlan;
use crate::record::{Category, FileRecord, Lens, Tag};
use crate::select;
use crate::tree;

/// Sentinel emitted exactly once, immediately before the Content section.
pub const START_OF_CONTENT: &str = "<!-- START_OF_CONTENT -->";

/// Basenames of sibling artifacts, advertised in the header for portable
/// linking. Filled in by the coordinator before rendering starts.
#[derive(Debug, Clone, Default)]
pub struct ArtifactRefs {
    pub index_json_basename: Option<String>,
    pub augment_sidecar_basename: Option<String>,
}

pub fn human_size(n: u64) -> String {
    let mut size = n as f64;
    for unit in ["B", "KB", "MB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} GB")
}

/// Heading with a stable HTML anchor. Some renderers generate heading ids,
/// some allow raw HTML; emitting both keeps `#manifest`-style links working
/// either way.
fn heading_block(level: usize, token: &str, title: Option<&str>) -> Vec<String> {
    vec![
        format!("<a id=\"{token}\"></a>"),
        format!("{} {}", "#".repeat(level), title.unwrap_or(token)),
        String::new(),
    ]
}

/// Opening-fence length for embedded content: one longer than the longest
/// backtick run, floor 3. Guarantees nesting of embedded fenced blocks.
pub fn fence_len_for(content: &str) -> usize {
    let mut longest = 0usize;
    let mut run = 0usize;
    for ch in content.chars() {
        if ch == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    (longest + 1).max(3)
}

fn ystr(s: &str) -> Yaml {
    Yaml::String(s.to_string())
}

fn ins(map: &mut Mapping, key: &str, value: Yaml) {
    map.insert(ystr(key), value);
}

/// The fenced YAML machine-meta block. Mandatory in every mode, including
/// plan-only.
fn machine_meta_block(
    plan: &MergePlan,
    cfg: &MergeConfig,
    generated_at: DateTime<Utc>,
) -> Vec<String> {
    let render_mode = cfg.render_mode();
    let density = cfg.resolved_density();
    let has_roles = plan.records.iter().any(|r| !r.roles.is_empty());

    let mut merge = Mapping::new();
    ins(&mut merge, "spec_version", ystr(SPEC_VERSION));
    ins(&mut merge, "profile", ystr(cfg.profile.as_str()));
    ins(&mut merge, "contract", ystr(REPORT_CONTRACT_NAME));
    ins(&mut merge, "contract_version", ystr(REPORT_CONTRACT_VERSION));
    if has_roles {
        ins(&mut merge, "role_semantics", ystr("heuristic"));
    }
    ins(&mut merge, "plan_only", Yaml::Bool(cfg.plan_only));
    ins(&mut merge, "code_only", Yaml::Bool(cfg.effective_code_only()));
    ins(&mut merge, "render_mode", ystr(render_mode.as_str()));
    ins(&mut merge, "max_file_bytes", Yaml::Number(cfg.max_file_bytes.into()));
    ins(&mut merge, "scope", ystr(&plan.scope));
    ins(
        &mut merge,
        "source_repos",
        Yaml::Sequence(plan.source_names().iter().map(|n| ystr(n)).collect()),
    );
    ins(
        &mut merge,
        "path_filter",
        cfg.path_filter.as_deref().map(ystr).unwrap_or(Yaml::Null),
    );
    ins(
        &mut merge,
        "ext_filter",
        match cfg.ext_filter.as_ref() {
            Some(exts) => {
                let mut sorted = exts.clone();
                sorted.sort();
                Yaml::Sequence(sorted.iter().map(|e| ystr(e)).collect())
            }
            None => Yaml::Null,
        },
    );
    ins(&mut merge, "meta_density", ystr(density.as_str()));
    ins(
        &mut merge,
        "generated_at",
        ystr(&generated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
    );
    ins(
        &mut merge,
        "total_files",
        Yaml::Number((plan.records.len() as u64).into()),
    );
    ins(&mut merge, "total_size_bytes", Yaml::Number(plan.total_bytes.into()));
    ins(&mut merge, "content_present", Yaml::Bool(!cfg.plan_only));
    ins(&mut merge, "manifest_present", Yaml::Bool(!cfg.plan_only));
    ins(
        &mut merge,
        "structure_present",
        Yaml::Bool(!cfg.plan_only && cfg.profile != Profile::MachineLean),
    );

    let mut coverage = Mapping::new();
    ins(
        &mut coverage,
        "included_files",
        Yaml::Number((plan.included_count() as u64).into()),
    );
    ins(
        &mut coverage,
        "text_files",
        Yaml::Number((plan.metrics.counts.text_total as u64).into()),
    );
    ins(&mut coverage, "coverage_pct", Yaml::Number(plan.coverage_pct().into()));
    ins(&mut merge, "coverage", Yaml::Mapping(coverage));

    let extras_meta = extras::build_extras_meta(&cfg.extras, plan.sources.len());
    if !extras_meta.is_empty() {
        let mut m = Mapping::new();
        for (k, v) in extras_meta {
            ins(&mut m, &k, Yaml::Bool(v));
        }
        ins(&mut merge, "extras", Yaml::Mapping(m));
    }

    if cfg.extras.health {
        let healths = extras::analyze_all(plan);
        let (status, missing) = extras::health_meta(&healths);
        let mut m = Mapping::new();
        ins(&mut m, "status", ystr(&status));
        ins(
            &mut m,
            "missing",
            Yaml::Sequence(missing.iter().map(|s| ystr(s)).collect()),
        );
        ins(&mut merge, "health", Yaml::Mapping(m));
    }

    if cfg.extras.delta_reports {
        match cfg.delta_meta.as_ref() {
            Some(dm) => {
                if let Ok(y) = serde_yaml::to_value(dm) {
                    ins(&mut merge, "delta", y);
                }
            }
            None => {
                let mut m = Mapping::new();
                ins(&mut m, "enabled", Yaml::Bool(true));
                ins(&mut merge, "delta", Yaml::Mapping(m));
            }
        }
    }

    if cfg.extras.augment_sidecar {
        if let Some(name) = extras::augment_meta(&plan.sources) {
            let mut m = Mapping::new();
            ins(&mut m, "sidecar", ystr(&name));
            ins(&mut merge, "augment", Yaml::Mapping(m));
        }
    }

    let mut root = Mapping::new();
    ins(&mut root, "merge", Yaml::Mapping(merge));
    let yaml_text = serde_yaml::to_string(&Yaml::Mapping(root)).unwrap_or_default();

    let mut lines: Vec<String> = Vec::new();
    lines.push("<!-- zone:begin type=meta id=meta -->".to_string());
    lines.push("<!-- @meta:start -->".to_string());
    lines.push("```yaml".to_string());
    for line in yaml_text.trim_end().lines() {
        lines.push(line.to_string());
    }
    lines.push("```".to_string());
    lines.push("<!-- @meta:end -->".to_string());
    lines.push("<!-- zone:end type=meta -->".to_string());
    lines.push(String::new());
    lines
}

fn charter_lines() -> Vec<String> {
    vec![
        "## Epistemic Reading Charter (Condensed)".to_string(),
        "**Status:** Normative | **Applied:** true | **Scope:** report_header".to_string(),
        String::new(),
        "1. **Facts:** `full`/`snippet` = read. `meta` = unread, structure only.".to_string(),
        "2. **Constraint:** Strong claims only with `full` contact; `meta` requires hypothetical language.".to_string(),
        "3. **Duty:** If `risk_level != low`, flag uncertainty explicitly.".to_string(),
        "4. **Guard:** Do not simulate knowledge you don't have.".to_string(),
        String::new(),
    ]
}

fn profile_description_lines(profile: Profile) -> Vec<String> {
    let mut lines = vec!["## Profile Description".to_string()];
    match profile {
        Profile::Overview => {
            lines.push("`overview`".to_string());
            lines.push("- Only README, runbooks, and ai-context files carry content".to_string());
            lines.push("- Everything else: Included = meta-only".to_string());
        }
        Profile::Summary => {
            lines.push("`summary`".to_string());
            lines.push("- Full: docs, configs, contracts, lockfiles, priority files".to_string());
            lines.push("- Code & tests: manifest and structure only, unless priority".to_string());
        }
        Profile::Dev => {
            lines.push("`dev`".to_string());
            lines.push("- Code, tests, config, CI, contracts: full".to_string());
            lines.push("- Docs full only for priority files (README, runbooks, ai-context)".to_string());
            lines.push("- Lockfiles above 20 kB drop to meta-only".to_string());
        }
        Profile::MachineLean => {
            lines.push("`machine-lean`".to_string());
            lines.push("- Lean snapshot: full contents, reduced tree and decorations".to_string());
            lines.push("- Manifest + index + content, optimized for machine parsing".to_string());
        }
        Profile::Max => {
            lines.push("`max`".to_string());
            lines.push("- All text files: full".to_string());
            lines.push("- No truncation (large files split across parts instead)".to_string());
        }
    }
    lines.push(String::new());
    lines
}

fn reading_plan_lines(cfg: &MergeConfig) -> Vec<String> {
    let mut lines = vec!["## Reading Plan".to_string(), String::new()];
    if cfg.plan_only {
        lines.push("1. Note: this merge was generated in **PLAN-ONLY** mode.".to_string());
        lines.push("   - Contains only: profile description, plan, and meta (`@meta`).".to_string());
        lines.push("   - Does **not** contain `Structure`, `Manifest`, or `Content` blocks.".to_string());
        lines.push(String::new());
        lines.push("2. Use it to decide whether a full merge is worth the tokens,".to_string());
        lines.push("   without spending any on file contents.".to_string());
    } else {
        lines.push("1. Read first: `README.md`, `docs/runbook*.md`, `*.ai-context.yml`".to_string());
        if cfg.profile == Profile::MachineLean {
            lines.push("2. Then: `Manifest` -> `Content`".to_string());
        } else {
            lines.push("2. Then: `Structure` -> `Manifest` -> `Content`".to_string());
        }
        lines.push("3. Multi-repo merges: each repo has its own 📦 block".to_string());
    }
    lines.push(String::new());
    lines
}

fn is_priority(rec: &FileRecord) -> bool {
    select::is_priority(&rec.tags, rec.file_name())
}

fn reading_lenses_lines(plan: &MergePlan, density: MetaDensity) -> Vec<String> {
    if density == MetaDensity::Min {
        return Vec::new();
    }
    let limit = if density == MetaDensity::Standard { 3 } else { 8 };

    let mut lines: Vec<String> = Vec::new();
    lines.push("## Reading Lenses".to_string());
    lines.push(String::new());
    lines.push(format!(
        "Active lenses: {}",
        Lens::ALL
            .iter()
            .map(|l| format!("`{}`", l.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    lines.push(String::new());
    lines.push("### Recommended subset (focus, not exclusion)".to_string());
    lines.push(String::new());

    let mut displayed_any = false;
    for lens in Lens::ALL {
        // Only files with a content block are recommended; links must resolve.
        let mut candidates: Vec<&FileRecord> = plan
            .content_records()
            .filter(|r| r.lens == lens)
            .collect();
        if candidates.is_empty() {
            continue;
        }
        candidates.sort_by_key(|r| {
            let mut score: i64 = -(r.rel_path.split('/').count() as i64);
            if is_priority(r) {
                score += 5;
            }
            if r.inclusion_reason.as_str() == "force_include" {
                score += 3;
            }
            std::cmp::Reverse(score)
        });

        lines.push(format!("**({})**", lens.as_str()));
        for rec in candidates.into_iter().take(limit) {
            lines.push(format!("- [`{}`](#{})", rec.rel_path, rec.anchor));
        }
        lines.push(String::new());
        displayed_any = true;
    }

    if !displayed_any {
        lines.push("_No specific recommendations found._".to_string());
        lines.push(String::new());
    }
    lines.push("> All files are included below. This subset is a focus suggestion, not a filter.".to_string());
    lines.push(String::new());
    lines
}

fn epistemic_status_lines(plan: &MergePlan) -> Vec<String> {
    let counts = &plan.metrics.counts;
    let ratios = &plan.metrics.ratios;
    let risk = &plan.metrics.risk;

    let mut lines: Vec<String> = Vec::new();
    lines.push("## Epistemic Status".to_string());
    lines.push(String::new());
    lines.push(format!(
        "- **Active Lenses:** {}",
        Lens::ALL
            .iter()
            .map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    lines.push("- **Text Contact Breakdown:**".to_string());
    lines.push(format!("  - full: {}", counts.full));
    lines.push(format!("  - snippet: {}", counts.snippet));
    lines.push(format!("  - meta: {}", counts.meta));
    lines.push(format!(
        "- **Contact Ratio (all files):** {}%",
        (ratios.contact_ratio * 100.0) as i64
    ));
    lines.push(format!(
        "- **Text Coverage (text files):** {}%",
        (ratios.text_coverage_ratio * 100.0) as i64
    ));
    lines.push(format!("- **Truncated Files:** {}", counts.snippet));
    lines.push(format!("- **Risk Level:** `{}`", risk.level.as_str()));
    match risk.level.as_str() {
        "high" => lines.push(
            "  - ⚠️ **High Risk:** Low text coverage. Relying heavily on metadata/structure."
                .to_string(),
        ),
        "medium" => {
            if counts.snippet > 0 {
                lines.push(
                    "  - ⚠️ **Medium Risk:** Truncation occurred. Some files are incomplete."
                        .to_string(),
                );
            } else {
                lines.push(
                    "  - ⚠️ **Medium Risk:** Partial text coverage. Some context might be missing."
                        .to_string(),
                );
            }
        }
        _ => {}
    }
    lines.push(String::new());
    lines
}

/// Header + Source & Profile + meta block + charter + declaration + lenses +
/// status + profile description + reading plan, yielded as one block.
fn head_block(
    plan: &MergePlan,
    cfg: &MergeConfig,
    refs: &ArtifactRefs,
    generated_at: DateTime<Utc>,
) -> String {
    let density = cfg.resolved_density();
    let render_mode = cfg.render_mode();
    let mut h: Vec<String> = Vec::new();

    // The first line is the title with the part-marker placeholder; the
    // splitter rewrites it to `(Part i/N)` unconditionally.
    h.push(format!("# {REPORT_TITLE}"));
    h.push(String::new());
    h.push("**READING POLICY (binding):**".to_string());
    h.push("- This markdown is the canonical source and must be read in full.".to_string());
    h.push(
        "- The JSON sidecar is index, metadata, and entry point only; it does NOT carry the full information."
            .to_string(),
    );
    h.push(String::new());
    h.push("> **Canonical note**".to_string());
    h.push(">".to_string());
    h.push("> This markdown document is the complete and authoritative rendering of the merge.".to_string());
    h.push("> Accompanying JSON artifacts serve machine navigation, filtering, and metadata only.".to_string());
    h.push("> **No content-bearing aspect lives exclusively in the JSON.**".to_string());
    h.push(String::new());
    h.push(format!(
        "**Human Contract:** `{REPORT_CONTRACT_NAME}` (v{REPORT_CONTRACT_VERSION})"
    ));
    h.push(format!(
        "**Primary Contract (Agent):** `{AGENT_CONTRACT_NAME}` ({AGENT_CONTRACT_VERSION}) — see `artifacts.index_json`"
    ));
    h.push(String::new());

    if density != MetaDensity::Full {
        h.push(format!("**Meta-Density:** `{}` (reduced overhead)", density.as_str()));
        if cfg.meta_density == MetaDensity::Auto && density == MetaDensity::Standard {
            h.push("⚠️ **Auto-throttling:** meta overhead reduced because filters are active.".to_string());
        }
        h.push(String::new());
    }

    if cfg.effective_code_only() {
        h.push("**Profile: CODE-ONLY — this merge deliberately carries only source, tests, technical configs, and contracts.**".to_string());
        h.push("**No descriptive docs; use Manifest, Roles, and Hotspots as entry points.**".to_string());
        h.push(String::new());
    }
    if cfg.plan_only {
        h.push("**Profile: PLAN-ONLY — this merge carries only plan/structure context (no code, no tests).**".to_string());
        h.push("**Use it as a token-saving pre-scan; missing code is intent (mode), not an omission.**".to_string());
        h.push(String::new());
    }

    // --- Source & Profile ---
    h.push("## Source & Profile".to_string());
    h.push(format!("- **Source:** {}", plan.source_names().join(", ")));
    h.push(format!("- **Profile:** `{}`", cfg.profile.as_str()));
    h.push(format!(
        "- **Generated At:** {} (UTC)",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if cfg.max_file_bytes > 0 {
        h.push(format!("- **Max File Bytes:** {}", human_size(cfg.max_file_bytes)));
    } else {
        h.push("- **Max File Bytes:** unlimited".to_string());
    }
    h.push(format!("- **Spec-Version:** {SPEC_VERSION}"));
    h.push(format!("- **Contract:** {REPORT_CONTRACT_NAME}"));
    h.push(format!("- **Contract-Version:** {REPORT_CONTRACT_VERSION}"));
    h.push(format!("- **Plan Only:** {}", cfg.plan_only));
    h.push(format!("- **Code Only:** {}", cfg.effective_code_only()));
    h.push(format!("- **Render Mode:** `{}`", render_mode.as_str()));

    if refs.index_json_basename.is_some() || refs.augment_sidecar_basename.is_some() {
        h.push("## 📦 Artifacts".to_string());
        if let Some(bn) = refs.index_json_basename.as_deref() {
            h.push(format!("<!-- artifact:index_json basename=\"{bn}\" -->"));
            h.push(format!("- Index JSON: [{bn}]({bn})"));
        }
        if let Some(bn) = refs.augment_sidecar_basename.as_deref() {
            h.push(format!("<!-- artifact:augment_sidecar basename=\"{bn}\" -->"));
            h.push(format!("- Augment Sidecar: [{bn}]({bn})"));
        }
        h.push(String::new());
    }

    h.push("### Navigation".to_string());
    if cfg.plan_only {
        h.push("- Plan-only merge: no manifest or content anchors in this artifact.".to_string());
    } else {
        h.push("- **Index:** [#index](#index) · **Manifest:** [#manifest](#manifest)".to_string());
        h.push("- If your viewer cannot jump, search for `manifest`, `index`, or `file-...`.".to_string());
    }
    h.push(String::new());

    // Profiles other than max, or any active filter, cannot prove absence.
    let allows_negative_claims =
        cfg.profile == Profile::Max && !cfg.filters_active() && render_mode == RenderMode::Full;
    if !allows_negative_claims {
        h.push("⚠️ **Note:** This profile/filter permits no claims about the absence of files in the repository. Missing entries only mean \"not part of this slice\".".to_string());
        h.push(String::new());
    }

    h.push(format!("- **Profile Use-Case:** {}", cfg.profile.use_case()));
    h.push(format!("- **Declared Purpose:** {}", plan.declared_purpose));
    h.push(format!("- **Scope:** {}", plan.scope));
    match cfg.path_filter.as_deref() {
        Some(pf) if !pf.is_empty() => h.push(format!("- **Path Filter:** `{pf}`")),
        _ => h.push("- **Path Filter:** `none (full tree)`".to_string()),
    }
    match cfg.ext_filter.as_ref() {
        Some(exts) if !exts.is_empty() => {
            let mut sorted = exts.clone();
            sorted.sort();
            h.push(format!(
                "- **Extension Filter:** {}",
                sorted
                    .iter()
                    .map(|e| format!("`{e}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        _ => h.push("- **Extension Filter:** `none (all text types)`".to_string()),
    }
    if plan.metrics.counts.text_total > 0 {
        let pct = (plan.included_count() as f64 / plan.metrics.counts.text_total as f64 * 100.0)
            as i64;
        h.push(format!(
            "- **Coverage:** {pct}% ({}/{} files with full content)",
            plan.included_count(),
            plan.metrics.counts.text_total
        ));
    }
    h.push(String::new());

    h.extend(machine_meta_block(plan, cfg, generated_at));
    h.extend(charter_lines());

    h.push("## Epistemic Declaration".to_string());
    h.push(String::new());
    h.push("- **Charter:** epistemic_reading_charter v1".to_string());
    h.push("- **Claim Language Guard:** active".to_string());
    h.push(format!("- **Risk Level:** {}", plan.metrics.risk.level.as_str()));
    h.push(format!(
        "- **Contact Ratio:** {}%",
        (plan.metrics.ratios.contact_ratio * 100.0) as i64
    ));
    h.push(String::new());

    if !cfg.plan_only {
        h.extend(reading_lenses_lines(plan, density));
        h.extend(epistemic_status_lines(plan));
    }

    h.extend(profile_description_lines(cfg.profile));
    h.extend(reading_plan_lines(cfg));

    h.join("\n") + "\n"
}

fn plan_block(plan: &MergePlan, cfg: &MergeConfig) -> String {
    let density = cfg.resolved_density();
    let mut p: Vec<String> = Vec::new();
    p.push("## Plan".to_string());
    p.push(String::new());
    p.push(format!(
        "- **Total Files:** {} (Text: {})",
        plan.records.len(),
        plan.metrics.counts.text_total
    ));
    p.push(format!("- **Total Size:** {}", human_size(plan.total_bytes)));
    p.push(format!(
        "- **Included Content:** {} files (full)",
        plan.included_count()
    ));
    if plan.metrics.counts.text_total > 0 {
        p.push(format!(
            "- **Coverage:** {}/{} text files with content (`full`/`truncated`)",
            plan.included_count(),
            plan.metrics.counts.text_total
        ));
    }
    p.push(String::new());

    if cfg.extras.delta_reports {
        if let Some(summary) = cfg
            .delta_meta
            .as_ref()
            .and_then(|d| d.get("summary"))
            .and_then(|s| s.as_object())
        {
            p.push("### Delta Summary".to_string());
            p.push(String::new());
            for (label, key) in [
                ("Files added", "files_added"),
                ("Files removed", "files_removed"),
                ("Files changed", "files_changed"),
            ] {
                let n = summary.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
                p.push(format!("- {label}: {n}"));
            }
            p.push(String::new());
        }
    }

    if !plan.repo_stats.is_empty() {
        p.push("### Repo Snapshots".to_string());
        p.push(String::new());
        for (repo, stats) in &plan.repo_stats {
            p.push(format!(
                "- `{repo}` → {} files ({} relevant text, {}, {} with content)",
                stats.total,
                stats.text_files,
                human_size(stats.bytes),
                stats.included
            ));
        }
        p.push(String::new());
    }

    if density != MetaDensity::Min && !plan.hotspots.is_empty() {
        p.push("### Hotspots (entry points)".to_string());
        for h in &plan.hotspots {
            let roles = if h.roles.is_empty() {
                "roles: -".to_string()
            } else {
                format!("roles: {}", h.roles.join(", "))
            };
            let tags = if h.tags.is_empty() {
                "tags: -".to_string()
            } else {
                format!(
                    "tags: {}",
                    h.tags.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")
                )
            };
            // Plan-only reports emit no file blocks, so hotspot entries
            // must not link to anchors that never materialize.
            let link = if cfg.plan_only {
                format!("`{}`", h.rel_path)
            } else {
                format!("[`{}`](#{})", h.rel_path, h.anchor)
            };
            p.push(format!(
                "- {link} — repo `{}`, {}; {roles}, {tags}",
                h.repo_label,
                h.category.as_str()
            ));
        }
        p.push(String::new());
    }

    p.push("**Folder Highlights:**".to_string());
    if !plan.folders.code.is_empty() {
        p.push(format!("- Code: `{}`", plan.folders.code.join(", ")));
    }
    if !plan.folders.docs.is_empty() {
        p.push(format!("- Docs: `{}`", plan.folders.docs.join(", ")));
    }
    if !plan.folders.infra.is_empty() {
        p.push(format!("- Infra: `{}`", plan.folders.infra.join(", ")));
    }
    p.push(String::new());

    p.push("### Organism Overview".to_string());
    p.push(String::new());
    p.push(format!(
        "- AI context organs: {} file(s) (`ai-context`)",
        plan.organism.ai_context.len()
    ));
    p.push(format!(
        "- Contracts: {} file(s) (category = `contract`)",
        plan.organism.contracts.len()
    ));
    p.push(format!(
        "- Pipelines (CI/CD): {} file(s) (tag `ci`)",
        plan.organism.pipelines.len()
    ));
    p.push(format!(
        "- Fleet profiles: {} file(s) (tag `wgx-profile`)",
        plan.organism.wgx_profiles.len()
    ));
    p.push(String::new());

    p.join("\n") + "\n"
}

fn index_block(plan: &MergePlan, density: MetaDensity) -> String {
    let mut b: Vec<String> = Vec::new();
    b.extend(heading_block(2, "index", Some("🧭 Index")));

    if density == MetaDensity::Min {
        b.push("_Index reduced (meta=min)_".to_string());
        b.push(String::new());
        return b.join("\n") + "\n";
    }

    let cats = [
        Category::Source,
        Category::Doc,
        Category::Config,
        Category::Contract,
        Category::Test,
    ];
    let non_empty: Vec<Category> = cats
        .into_iter()
        .filter(|c| plan.records.iter().any(|r| r.category == *c))
        .collect();
    let ci_files: Vec<&FileRecord> = plan
        .records
        .iter()
        .filter(|r| r.tags.contains(&Tag::Ci))
        .collect();
    let wgx_files: Vec<&FileRecord> = plan
        .records
        .iter()
        .filter(|r| r.tags.contains(&Tag::WgxProfile))
        .collect();

    for c in &non_empty {
        let mut title: String = c.as_str().to_string();
        if let Some(first) = title.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        b.push(format!("- [{title}](#cat-{})", ident::slug(c.as_str())));
    }
    if !ci_files.is_empty() {
        b.push("- [CI Pipelines](#tag-ci)".to_string());
    }
    if !wgx_files.is_empty() {
        b.push("- [WGX Profiles](#tag-wgx-profile)".to_string());
    }
    b.push(String::new());

    for c in &non_empty {
        let cat_title = format!("Category: {}", c.as_str());
        b.extend(heading_block(
            2,
            &format!("cat-{}", ident::slug(c.as_str())),
            Some(cat_title.as_str()),
        ));
        for rec in plan.records.iter().filter(|r| r.category == *c) {
            b.push(index_entry(rec));
        }
        b.push(String::new());
    }
    if !ci_files.is_empty() {
        b.extend(heading_block(2, "tag-ci", Some("Tag: ci")));
        for rec in &ci_files {
            b.push(index_entry(rec));
        }
        b.push(String::new());
    }
    if !wgx_files.is_empty() {
        b.extend(heading_block(2, "tag-wgx-profile", Some("Tag: wgx-profile")));
        for rec in &wgx_files {
            b.push(index_entry(rec));
        }
        b.push(String::new());
    }

    b.join("\n") + "\n"
}

/// Index entries link only when the target file block exists.
fn index_entry(rec: &FileRecord) -> String {
    if rec.inclusion_status.has_content() {
        format!("- [`{}`](#{})", rec.rel_path, rec.anchor)
    } else {
        format!("- `{}`", rec.rel_path)
    }
}

fn manifest_block(plan: &MergePlan, cfg: &MergeConfig, density: MetaDensity) -> String {
    let mut m: Vec<String> = Vec::new();
    m.push("<!-- zone:begin type=manifest id=manifest -->".to_string());
    let title = if cfg.effective_code_only() {
        "🧾 Manifest (Code-Only)"
    } else {
        "🧾 Manifest"
    };
    m.extend(heading_block(2, "manifest", Some(title)));

    let repos: Vec<&String> = plan.repo_stats.keys().collect();
    if repos.is_empty() {
        m.push("_No files in the manifest._".to_string());
        m.push(String::new());
        m.push("<!-- zone:end type=manifest -->".to_string());
        return m.join("\n") + "\n";
    }

    let nav = repos
        .iter()
        .map(|r| format!("[{r}](#manifest-{})", ident::slug(r)))
        .collect::<Vec<_>>()
        .join(" · ");
    m.push(format!("**Repos in merge:** {nav}"));
    m.push(String::new());

    if cfg.effective_code_only() {
        m.push("_Profile: CODE-ONLY — only source/tests/config/contracts. Role shortcut: `entrypoint`=CLIs/starts, `config`=central, `ci`=workflows, `test`=tests._".to_string());
        m.push(String::new());
    }

    for repo in repos {
        let records: Vec<&FileRecord> = plan
            .records
            .iter()
            .filter(|r| &r.repo_label == repo)
            .collect();
        let role = extras::infer_repo_role(repo, &records);
        let stats = &plan.repo_stats[repo];

        let repo_title = format!("Repo `{repo}`");
        m.extend(heading_block(
            3,
            &format!("manifest-{}", ident::slug(repo)),
            Some(repo_title.as_str()),
        ));
        m.push(format!("- Role: {role}"));
        m.push(format!(
            "- Extent: {} files ({} text), {}; content: {} included",
            stats.total,
            stats.text_files,
            human_size(stats.bytes),
            stats.included
        ));
        m.push(String::new());
        m.push("| Path | Category | Tags | Roles | Size | Included | Fingerprint |".to_string());
        m.push("| --- | --- | --- | --- | ---: | --- | --- |".to_string());

        for rec in records {
            let roles = if rec.roles.is_empty() {
                "-".to_string()
            } else {
                rec.roles.join(", ")
            };
            let mut included = rec.inclusion_status.as_str().to_string();
            if classify::is_noise_file(&rec.rel_path, rec.file_name()) {
                included.push_str(" (noise)");
            }
            // Path cells link only to anchors that will actually be emitted.
            let path_cell = if rec.inclusion_status.has_content() {
                format!("[`{}`](#{})", rec.rel_path, rec.stable_anchor())
            } else {
                format!("`{}`", rec.rel_path)
            };
            let fingerprint = match (density, rec.fingerprint.as_deref()) {
                (_, None) => "-".to_string(),
                (MetaDensity::Min, _) => "-".to_string(),
                (_, Some(fp)) => format!("`{fp}`"),
            };
            m.push(format!(
                "| {path_cell} | `{}` | {} | {roles} | {} | `{included}` | {fingerprint} |",
                rec.category.as_str(),
                rec.tags_joined(),
                human_size(rec.size_bytes),
            ));
        }
        m.push(String::new());
    }

    m.push("<!-- zone:end type=manifest -->".to_string());
    m.join("\n") + "\n"
}

/// Fleet consistency warnings: repos that merged without a fleet profile.
/// When a canonical repo order is configured, only repos on that list are
/// held to the check; otherwise every merged repo is.
fn fleet_consistency_block(plan: &MergePlan, cfg: &MergeConfig) -> Option<String> {
    let mut warnings: Vec<String> = Vec::new();
    for (repo, _) in &plan.sources {
        if !cfg.repo_order.is_empty() && !cfg.repo_order.contains(repo) {
            continue;
        }
        let has_profile = plan
            .records
            .iter()
            .any(|r| &r.repo_label == repo && r.tags.contains(&Tag::WgxProfile));
        if !has_profile {
            warnings.push(format!("- {repo}: missing .wgx/profile.yml"));
        }
    }
    if warnings.is_empty() {
        return None;
    }
    let mut lines = vec!["## Fleet Consistency".to_string(), String::new()];
    lines.extend(warnings);
    lines.push(String::new());
    Some(lines.join("\n") + "\n")
}

/// Read a file for embedding. I/O errors degrade to a readable placeholder
/// inside the block, never an abort.
fn read_content(rec: &FileRecord) -> String {
    match std::fs::read(&rec.abs_path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("_Error reading file: {e}_"),
    }
}

/// Split content at line boundaries into chunks of at most roughly
/// `target` bytes. A single line longer than the target stays whole.
fn chunk_content(content: &str, target: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in content.split_inclusive('\n') {
        if !current.is_empty() && current.len() + line.len() > target {
            chunks.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

/// Render one file as its block sequence. Normally a single block; files
/// marked `truncated` stream their content in part-sized chunks so the
/// splitter can place boundaries between them (the fence stays open across
/// chunk blocks, content is never dropped).
fn render_file_blocks(rec: &FileRecord, density: MetaDensity, chunk_hint: u64) -> Vec<String> {
    let mut head: Vec<String> = Vec::new();
    head.push("---".to_string());
    head.push(format!(
        "<!-- file:id=\"{}\" path=\"{}\" -->",
        rec.stable_id, rec.rel_path
    ));
    head.push(format!("<a id=\"{}\"></a>", rec.stable_anchor()));
    if rec.anchor_alias != rec.anchor {
        head.push(format!("<a id=\"{}\"></a>", rec.anchor_alias));
        head.push(String::new());
    }
    head.extend(heading_block(4, &rec.anchor, None));
    head.push(format!("**Path:** `{}`", rec.rel_path));

    if density != MetaDensity::Min {
        head.push(format!("- Category: {}", rec.category.as_str()));
        head.push(format!("- Tags: {}", rec.tags_joined()));
        head.push(format!("- Size: {}", human_size(rec.size_bytes)));
        head.push(format!("- Included: {}", rec.inclusion_status.as_str()));
        if density == MetaDensity::Full {
            if let Some(fp) = rec.fingerprint.as_deref() {
                head.push(format!("- Fingerprint: {fp}"));
            }
        }
    }

    let content = read_content(rec);
    let status = rec.inclusion_status.as_str();

    // File-meta comment: full density always; standard only for non-full
    // files; non-full files always keep a minimal provenance trace.
    let show_file_meta = match density {
        MetaDensity::Full => true,
        MetaDensity::Standard => status != "full",
        _ => status != "full",
    };
    if show_file_meta {
        head.push("<!--".to_string());
        head.push("file_meta:".to_string());
        head.push(format!("  repo: {}", rec.repo_label));
        head.push(format!("  path: {}", rec.rel_path));
        head.push(format!("  lines: {}", content.lines().count()));
        head.push(format!("  included: {status}"));
        if rec.inclusion_reason.as_str() != "normal" {
            head.push(format!("  inclusion_reason: {}", rec.inclusion_reason.as_str()));
        }
        head.push("-->".to_string());
    }

    let fence = "`".repeat(fence_len_for(&content));
    let lang = classify::lang_for(&rec.extension);
    head.push(format!(
        "<!-- zone:begin type=code lang=\"{lang}\" id={} -->",
        rec.stable_id
    ));
    head.push(String::new());
    head.push(format!("{fence}{lang}"));

    let tail = format!("{fence}\n\n<!-- zone:end type=code -->\n[↑ Manifest](#manifest) · [↑ Index](#index)\n\n");

    if rec.inclusion_status == crate::record::InclusionStatus::Truncated && chunk_hint > 0 {
        let chunks = chunk_content(&content, chunk_hint as usize);
        let mut blocks: Vec<String> = Vec::new();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut block = if i == 0 {
                head.join("\n") + "\n" + &chunk
            } else {
                chunk
            };
            if i == last {
                if !block.ends_with('\n') {
                    block.push('\n');
                }
                block.push_str(&tail);
            }
            blocks.push(block);
        }
        blocks
    } else {
        let mut block = head.join("\n") + "\n" + &content;
        if !block.ends_with('\n') {
            block.push('\n');
        }
        block.push_str(&tail);
        vec![block]
    }
}

enum ContentItem {
    Ready(String),
    File(usize),
}

/// Produce the full report as an ordered block iterator. Head sections are
/// assembled eagerly (they are metadata-sized); file content blocks are
/// rendered lazily, one file at a time.
pub fn render_blocks<'a>(
    plan: &'a MergePlan,
    cfg: &'a MergeConfig,
    refs: &ArtifactRefs,
    generated_at: DateTime<Utc>,
) -> impl Iterator<Item = String> + 'a {
    let density = cfg.resolved_density();
    let mut head: Vec<String> = Vec::new();

    head.push(head_block(plan, cfg, refs, generated_at));
    head.push(plan_block(plan, cfg));

    // Optional extras, fixed order.
    if cfg.extras.health {
        let healths = extras::analyze_all(plan);
        if let Some(block) = extras::render_health(&healths) {
            head.push(block);
        }
    }
    if cfg.extras.delta_reports {
        if let Some(dm) = cfg.delta_meta.as_ref() {
            head.push(delta::render_delta_block(dm));
        }
    }
    if cfg.extras.fleet_panorama {
        if let Some(block) = extras::render_fleet_panorama(plan) {
            head.push(block);
        }
    }
    if cfg.extras.organism_index {
        if let Some(block) = extras::render_organism_index(plan) {
            head.push(block);
        }
    }
    if cfg.extras.heatmap {
        if let Some(block) = extras::render_heatmap(&plan.records) {
            head.push(block);
        }
    }
    if cfg.extras.augment_sidecar {
        if let Some(block) = extras::render_augment_block(&plan.sources) {
            head.push(block);
        }
    }

    let mut items: Vec<ContentItem> = Vec::new();
    if !cfg.plan_only {
        if cfg.profile != Profile::MachineLean {
            let mut s: Vec<String> = Vec::new();
            s.push("<!-- zone:begin type=structure id=structure -->".to_string());
            s.push("## 📁 Structure".to_string());
            s.push(String::new());
            s.push(tree::build_tree(&plan.records));
            s.push(String::new());
            s.push("<!-- zone:end type=structure -->".to_string());
            head.push(s.join("\n") + "\n");
        }

        head.push(index_block(plan, density));
        head.push(manifest_block(plan, cfg, density));
        if cfg.extras.fleet_consistency {
            if let Some(block) = fleet_consistency_block(plan, cfg) {
                head.push(block);
            }
        }

        // Content: marker, section header, then per-repo groups.
        items.push(ContentItem::Ready(format!("{START_OF_CONTENT}\n")));

        let mut content_header: Vec<String> = vec!["## 📄 Content".to_string(), String::new()];
        let mut visible_repos: Vec<&str> = plan
            .content_records()
            .map(|r| r.repo_label.as_str())
            .collect();
        visible_repos.sort();
        visible_repos.dedup();
        if !visible_repos.is_empty() {
            let nav = visible_repos
                .iter()
                .map(|r| format!("[{r}](#repo-{})", ident::slug(r)))
                .collect::<Vec<_>>()
                .join(" · ");
            content_header.push(format!("**Repos in merge:** {nav}"));
            content_header.push(String::new());
        }
        items.push(ContentItem::Ready(content_header.join("\n")));

        let mut current_repo: Option<&str> = None;
        for (idx, rec) in plan.records.iter().enumerate() {
            if !rec.inclusion_status.has_content() {
                continue;
            }
            if current_repo != Some(rec.repo_label.as_str()) {
                let block = heading_block(
                    3,
                    &format!("repo-{}", ident::slug(&rec.repo_label)),
                    Some(rec.repo_label.as_str()),
                )
                .join("\n")
                    + "\n";
                items.push(ContentItem::Ready(block));
                current_repo = Some(rec.repo_label.as_str());
            }
            items.push(ContentItem::File(idx));
        }
    }

    let mut head_iter = head.into_iter();
    let mut item_iter = items.into_iter();
    let mut pending: std::collections::VecDeque<String> = std::collections::VecDeque::new();
    let split_size = cfg.split_size;
    std::iter::from_fn(move || {
        if let Some(block) = head_iter.next() {
            return Some(block);
        }
        if let Some(block) = pending.pop_front() {
            return Some(block);
        }
        match item_iter.next()? {
            ContentItem::Ready(block) => Some(block),
            ContentItem::File(idx) => {
                let mut blocks =
                    render_file_blocks(&plan.records[idx], density, split_size).into_iter();
                let first = blocks.next();
                pending.extend(blocks);
                first
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtrasConfig, MergeConfig};
    use crate::record::RepoSummary;
    use crate::walk::{scan_repo, ScanOptions};
    use std::path::Path;
    use tempfile::TempDir;

    fn fixture_repo() -> (TempDir, RepoSummary) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tools");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("README.md"), "# tools\n\nMerges repos.\n").unwrap();
        std::fs::write(root.join("src/main.py"), "print('hi')\n").unwrap();
        std::fs::write(root.join("docs/manual.md"), "manual text\n").unwrap();
        let summary = scan_repo(&root, &ScanOptions::default()).unwrap();
        (tmp, summary)
    }

    fn render_full(cfg: &MergeConfig, summary: &RepoSummary) -> String {
        let plan = MergePlan::build(std::slice::from_ref(summary), cfg);
        render_blocks(&plan, cfg, &ArtifactRefs::default(), Utc::now()).collect()
    }

    #[test]
    fn fence_grows_past_embedded_fences() {
        assert_eq!(fence_len_for("plain text"), 3);
        assert_eq!(fence_len_for("uses `code` spans"), 3);
        assert_eq!(fence_len_for("```python\nx\n```"), 4);
        assert_eq!(fence_len_for("````\nnested\n````"), 5);
    }

    #[test]
    fn report_starts_with_title_line() {
        let (_tmp, summary) = fixture_repo();
        let report = render_full(&MergeConfig::default(), &summary);
        assert!(report.starts_with("# Merge Report\n"), "title first: {}", &report[..40]);
    }

    #[test]
    fn content_marker_once_and_before_content() {
        let (_tmp, summary) = fixture_repo();
        let report = render_full(&MergeConfig::default(), &summary);
        assert_eq!(report.matches(START_OF_CONTENT).count(), 1);
        let marker = report.find(START_OF_CONTENT).unwrap();
        let content = report.find("## 📄 Content").unwrap();
        let manifest = report.find("## 🧾 Manifest").unwrap();
        assert!(manifest < marker && marker < content);
    }

    #[test]
    fn dev_profile_embeds_expected_blocks() {
        let (_tmp, summary) = fixture_repo();
        let report = render_full(&MergeConfig::default(), &summary);
        // README + src/main.py full under dev; docs/manual.md meta-only.
        assert_eq!(report.matches("<!-- file:id=\"f_").count(), 2);
        assert!(report.contains("`docs/manual.md`"));
        assert!(!report.contains("manual text"));
    }

    #[test]
    fn plan_only_has_meta_but_no_content() {
        let (_tmp, summary) = fixture_repo();
        let cfg = MergeConfig {
            plan_only: true,
            ..MergeConfig::default()
        };
        let report = render_full(&cfg, &summary);
        assert!(report.contains("<!-- @meta:start -->"));
        assert!(report.contains("plan_only: true"));
        assert!(!report.contains(START_OF_CONTENT));
        assert!(!report.contains("## 📄 Content"));
        assert!(!report.contains("## 🧾 Manifest"));
    }

    #[test]
    fn machine_lean_skips_structure() {
        let (_tmp, summary) = fixture_repo();
        let cfg = MergeConfig {
            profile: crate::config::Profile::MachineLean,
            ..MergeConfig::default()
        };
        let report = render_full(&cfg, &summary);
        assert!(!report.contains("## 📁 Structure"));
        assert!(report.contains("## 🧾 Manifest"));
    }

    #[test]
    fn manifest_has_one_row_per_record() {
        let (_tmp, summary) = fixture_repo();
        let cfg = MergeConfig::default();
        let plan = MergePlan::build(std::slice::from_ref(&summary), &cfg);
        let report: String =
            render_blocks(&plan, &cfg, &ArtifactRefs::default(), Utc::now()).collect();
        let manifest_rows = report
            .lines()
            .filter(|l| l.starts_with("| ") && l.contains("| `"))
            .filter(|l| !l.starts_with("| Path |") && !l.starts_with("| --- |"))
            .count();
        assert_eq!(manifest_rows, plan.records.len());
    }

    #[test]
    fn embedded_backticks_are_escaped_by_longer_fence() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("r");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("README.md"),
            "# readme\n\n```python\nprint('x')\n```\n",
        )
        .unwrap();
        let summary = scan_repo(&root, &ScanOptions::default()).unwrap();
        let report = render_full(&MergeConfig::default(), &summary);
        assert!(report.contains("\n````markdown\n"), "needs a 4-tick fence");
    }

    #[test]
    fn file_block_order_is_stable() {
        let (_tmp, summary) = fixture_repo();
        let report = render_full(&MergeConfig::default(), &summary);
        let id_pos = report.find("<!-- file:id=").unwrap();
        let after = &report[id_pos..];
        let anchor_pos = after.find("<a id=\"file-f_").unwrap();
        let heading_pos = after.find("\n#### ").unwrap();
        let fence_pos = after.find("\n```").unwrap();
        assert!(anchor_pos < heading_pos && heading_pos < fence_pos);
    }

    #[test]
    fn artifact_refs_are_advertised() {
        let (_tmp, summary) = fixture_repo();
        let cfg = MergeConfig::default();
        let plan = MergePlan::build(std::slice::from_ref(&summary), &cfg);
        let refs = ArtifactRefs {
            index_json_basename: Some("tools-full-dev-250801-1200_merge.json".into()),
            augment_sidecar_basename: None,
        };
        let report: String = render_blocks(&plan, &cfg, &refs, Utc::now()).collect();
        assert!(report
            .contains("<!-- artifact:index_json basename=\"tools-full-dev-250801-1200_merge.json\" -->"));
    }

    #[test]
    fn zero_files_still_render_well_formed_head() {
        let summary = RepoSummary {
            name: "empty".into(),
            root: Path::new("/nonexistent").to_path_buf(),
            files: vec![],
        };
        let cfg = MergeConfig {
            extras: ExtrasConfig::none(),
            ..MergeConfig::default()
        };
        let report = render_full(&cfg, &summary);
        assert!(report.contains("- **Total Files:** 0 (Text: 0)"));
        assert!(report.contains("_No files in the manifest._"));
    }

    #[test]
    fn truncated_files_stream_in_chunks_but_keep_one_id_block() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("r");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("README.md"), "# r\n").unwrap();
        let body = "line of python code here\n".repeat(200); // ~5 kB
        std::fs::write(root.join("src/big.py"), &body).unwrap();
        let summary = scan_repo(&root, &ScanOptions::default()).unwrap();

        let cfg = MergeConfig {
            profile: crate::config::Profile::Max,
            split_size: 1024,
            ..MergeConfig::default()
        };
        let plan = MergePlan::build(std::slice::from_ref(&summary), &cfg);
        let big = plan
            .records
            .iter()
            .find(|r| r.rel_path == "src/big.py")
            .unwrap();
        assert_eq!(
            big.inclusion_status,
            crate::record::InclusionStatus::Truncated,
            "oversized file must be marked for cross-part emission"
        );

        let blocks: Vec<String> =
            render_blocks(&plan, &cfg, &ArtifactRefs::default(), Utc::now()).collect();
        let id_blocks = blocks
            .iter()
            .filter(|b| b.contains(&format!("file:id=\"{}\"", big.stable_id)))
            .count();
        assert_eq!(id_blocks, 1, "exactly one block carries the stable-ID comment");

        // Content survives chunking byte-for-byte.
        let report: String = blocks.concat();
        assert!(report.contains(&body));
        assert!(report.contains("- Included: truncated"));
        assert!(blocks.iter().all(|b| b.len() <= 2 * 1024 || !b.contains("line of python")));
    }

    #[test]
    fn fleet_consistency_warns_between_manifest_and_content_marker() {
        let (_tmp, summary) = fixture_repo();
        let cfg = MergeConfig {
            repo_order: vec!["tools".into()],
            extras: ExtrasConfig {
                fleet_consistency: true,
                ..ExtrasConfig::none()
            },
            ..MergeConfig::default()
        };
        let report = render_full(&cfg, &summary);

        assert!(report.contains("## Fleet Consistency"));
        assert!(report.contains("- tools: missing .wgx/profile.yml"));
        let manifest = report.find("## 🧾 Manifest").unwrap();
        let fleet = report.find("## Fleet Consistency").unwrap();
        let marker = report.find(START_OF_CONTENT).unwrap();
        assert!(manifest < fleet && fleet < marker, "block sits between Manifest and the content marker");
    }

    #[test]
    fn fleet_consistency_is_silent_when_profile_exists_or_extra_is_off() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tools");
        std::fs::create_dir_all(root.join(".wgx")).unwrap();
        std::fs::write(root.join("README.md"), "# tools\n").unwrap();
        std::fs::write(root.join(".wgx/profile.yml"), "fleet: x\n").unwrap();
        let summary = scan_repo(&root, &ScanOptions::default()).unwrap();

        let cfg = MergeConfig {
            repo_order: vec!["tools".into()],
            extras: ExtrasConfig {
                fleet_consistency: true,
                ..ExtrasConfig::none()
            },
            ..MergeConfig::default()
        };
        let report = render_full(&cfg, &summary);
        assert!(!report.contains("## Fleet Consistency"), "profiled repo draws no warning");

        // Extra off: no block even when the profile is missing.
        let (_tmp2, bare) = fixture_repo();
        let off = MergeConfig {
            repo_order: vec!["tools".into()],
            ..MergeConfig::default()
        };
        let report = render_full(&off, &bare);
        assert!(!report.contains("## Fleet Consistency"));
    }

    #[test]
    fn min_density_drops_per_file_metadata_and_hotspots() {
        let (_tmp, summary) = fixture_repo();
        let cfg = MergeConfig {
            meta_density: MetaDensity::Min,
            ..MergeConfig::default()
        };
        let report = render_full(&cfg, &summary);
        assert!(!report.contains("### Hotspots"));
        assert!(!report.contains("- Fingerprint:"));
        assert!(!report.contains("## Reading Lenses"));
    }
}

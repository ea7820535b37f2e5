//! Optional report extras: health, fleet panorama, organism index, heatmap,
//! and the augment sidecar.
//!
//! Extras never affect selection or structure invariants; each renders to an
//! optional self-contained block in a fixed position between Plan and the
//! content marker. Malformed external inputs (augment sidecar) are logged
//! and ignored, never fatal.

use serde_yaml::Value as Yaml;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use crate::config::ExtrasConfig;
use crate::plan::MergePlan;
use crate::record::{Category, FileRecord, Tag};
use crate::render::human_size;

/// Per-repo structural health snapshot.
#[derive(Debug, Clone)]
pub struct RepoHealth {
    pub repo: String,
    pub status: &'static str,
    pub has_readme: bool,
    pub has_ai_context: bool,
    pub has_ci_workflows: bool,
    pub has_wgx_profile: bool,
    pub has_contracts: bool,
    pub recommendations: Vec<String>,
}

pub fn analyze_repo(repo: &str, records: &[&FileRecord]) -> RepoHealth {
    let has_readme = records
        .iter()
        .any(|r| r.file_name().eq_ignore_ascii_case("readme.md"));
    let has_ai_context = records.iter().any(|r| r.tags.contains(&Tag::AiContext));
    let has_ci_workflows = records.iter().any(|r| r.tags.contains(&Tag::Ci));
    let has_wgx_profile = records.iter().any(|r| r.tags.contains(&Tag::WgxProfile));
    let has_contracts = records.iter().any(|r| r.category == Category::Contract);

    let mut recommendations = Vec::new();
    if !has_readme {
        recommendations.push("add a README.md so the repo can declare its purpose".to_string());
    }
    if !has_ci_workflows {
        recommendations.push("no CI workflows found under .github/workflows/".to_string());
    }
    if !has_wgx_profile {
        recommendations.push("no .wgx/profile.yml fleet profile found".to_string());
    }

    let status = if !has_readme {
        "critical"
    } else if !has_ci_workflows || !has_wgx_profile {
        "warn"
    } else {
        "ok"
    };

    RepoHealth {
        repo: repo.to_string(),
        status,
        has_readme,
        has_ai_context,
        has_ci_workflows,
        has_wgx_profile,
        has_contracts,
        recommendations,
    }
}

pub fn analyze_all(plan: &MergePlan) -> Vec<RepoHealth> {
    let mut by_repo: BTreeMap<&str, Vec<&FileRecord>> = BTreeMap::new();
    for rec in &plan.records {
        by_repo.entry(rec.repo_label.as_str()).or_default().push(rec);
    }
    by_repo
        .into_iter()
        .map(|(repo, records)| analyze_repo(repo, &records))
        .collect()
}

/// Overall status plus the union of missing organs, for the meta block.
pub fn health_meta(healths: &[RepoHealth]) -> (String, Vec<String>) {
    let overall = if healths.iter().any(|h| h.status == "critical") {
        "critical"
    } else if healths.iter().any(|h| h.status == "warn") {
        "warning"
    } else {
        "ok"
    };

    let mut missing: Vec<String> = Vec::new();
    for h in healths {
        if !h.has_contracts {
            missing.push("contracts".to_string());
        }
        if !h.has_ci_workflows {
            missing.push("ci".to_string());
        }
        if !h.has_wgx_profile {
            missing.push("wgx-profile".to_string());
        }
    }
    missing.sort();
    missing.dedup();
    (overall.to_string(), missing)
}

pub fn render_health(healths: &[RepoHealth]) -> Option<String> {
    if healths.is_empty() {
        return None;
    }
    let mut lines: Vec<String> = Vec::new();
    lines.push("<!-- @health:start -->".to_string());
    lines.push("## 🩺 Repo Health".to_string());
    lines.push(String::new());
    for h in healths {
        lines.push(format!("### `{}` — {}", h.repo, h.status));
        lines.push(format!(
            "- README: {} · AI context: {} · CI: {} · WGX profile: {} · Contracts: {}",
            yes_no(h.has_readme),
            yes_no(h.has_ai_context),
            yes_no(h.has_ci_workflows),
            yes_no(h.has_wgx_profile),
            yes_no(h.has_contracts),
        ));
        for r in &h.recommendations {
            lines.push(format!("- ⚠ {r}"));
        }
        lines.push(String::new());
    }
    lines.push("<!-- @health:end -->".to_string());
    lines.push(String::new());
    Some(lines.join("\n"))
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// Multi-repo fleet summary. Only rendered when at least two repos merge.
pub fn render_fleet_panorama(plan: &MergePlan) -> Option<String> {
    if plan.sources.len() < 2 {
        return None;
    }
    let mut grouped: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for rec in &plan.records {
        let entry = grouped.entry(rec.repo_label.as_str()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += rec.size_bytes;
    }

    let total_files: usize = grouped.values().map(|(n, _)| n).sum();
    let total_bytes: u64 = grouped.values().map(|(_, b)| b).sum();

    let mut lines: Vec<String> = Vec::new();
    lines.push("<!-- @fleet-panorama:start -->".to_string());
    lines.push("## 🛰 Fleet Panorama".to_string());
    lines.push(String::new());
    lines.push(format!(
        "**Summary:** {} repos, {} bytes, {} files",
        grouped.len(),
        total_bytes,
        total_files
    ));
    lines.push(String::new());
    for (repo, (files, bytes)) in &grouped {
        lines.push(format!("### `{repo}`"));
        lines.push(format!("- Files: {files}"));
        lines.push(format!("- Size: {bytes} bytes"));
        lines.push(String::new());
    }
    lines.push("<!-- @fleet-panorama:end -->".to_string());
    Some(lines.join("\n") + "\n")
}

/// Infer the high-level role of a repository from its name and contents.
pub fn infer_repo_role(repo: &str, records: &[&FileRecord]) -> String {
    let mut roles: Vec<&str> = Vec::new();
    let name = repo.to_lowercase();

    if name.contains("tool") || name.contains("merger") {
        roles.push("tooling");
    }
    if name.contains("contract") || name.contains("schema") {
        roles.push("contracts");
    }
    if name.contains("meta") {
        roles.push("governance");
    }
    if name.contains("ui") || name.contains("app") {
        roles.push("ui");
    }

    let has_contracts = records.iter().any(|r| r.category == Category::Contract);
    if has_contracts && !roles.contains(&"contracts") {
        roles.push("contracts");
    }
    if roles.is_empty() {
        roles.push("service");
    }
    roles.join(" / ")
}

fn push_path_section(lines: &mut Vec<String>, title: &str, paths: &[String], empty_note: &str) {
    lines.push(format!("### {title}"));
    if paths.is_empty() {
        lines.push(format!("_{empty_note}_"));
    } else {
        for p in paths {
            lines.push(format!("- `{p}`"));
        }
    }
    lines.push(String::new());
}

/// Single-repo organism index: role plus organ status.
pub fn render_organism_index(plan: &MergePlan) -> Option<String> {
    let mut repos: Vec<&str> = plan.records.iter().map(|r| r.repo_label.as_str()).collect();
    repos.sort();
    repos.dedup();
    if repos.len() != 1 {
        return None;
    }
    let repo = repos[0];
    let records: Vec<&FileRecord> = plan.records.iter().collect();
    let role = infer_repo_role(repo, &records);

    let mut lines: Vec<String> = Vec::new();
    lines.push("<!-- @organism-index:start -->".to_string());
    lines.push("## 🧬 Organism Index".to_string());
    lines.push(String::new());
    lines.push(format!("**Repo:** `{repo}`"));
    lines.push(format!("**Role:** {role}"));
    lines.push(String::new());
    lines.push("**Organ status:**".to_string());
    lines.push(format!("- AI context: {} file(s)", plan.organism.ai_context.len()));
    lines.push(format!("- Contracts: {} file(s)", plan.organism.contracts.len()));
    lines.push(format!("- Pipelines (CI/CD): {} workflow(s)", plan.organism.pipelines.len()));
    lines.push(format!("- Fleet profiles: {} profile(s)", plan.organism.wgx_profiles.len()));
    lines.push(String::new());

    push_path_section(
        &mut lines,
        "AI Context",
        &plan.organism.ai_context,
        "No AI context files found.",
    );
    push_path_section(
        &mut lines,
        "Contracts",
        &plan.organism.contracts,
        "No contract files found.",
    );
    push_path_section(
        &mut lines,
        "Pipelines (CI/CD)",
        &plan.organism.pipelines,
        "No CI/CD workflows found.",
    );
    push_path_section(
        &mut lines,
        "Fleet Profiles",
        &plan.organism.wgx_profiles,
        "No fleet profile found.",
    );

    lines.push("<!-- @organism-index:end -->".to_string());
    lines.push(String::new());
    Some(lines.join("\n"))
}

/// Size-driven hotspot heatmap: top files and folders.
pub fn render_heatmap(records: &[FileRecord]) -> Option<String> {
    if records.is_empty() {
        return None;
    }

    let mut relevant: Vec<&FileRecord> = records
        .iter()
        .filter(|r| {
            matches!(
                r.category,
                Category::Source | Category::Config | Category::Contract | Category::Test
            )
        })
        .collect();
    relevant.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then(a.rel_path.cmp(&b.rel_path)));

    let mut lines: Vec<String> = Vec::new();
    lines.push("<!-- @heatmap:start -->".to_string());
    lines.push("## 🔥 Heatmap – Code Hotspots".to_string());
    lines.push(String::new());
    lines.push("### Top Files by Size".to_string());
    for (i, rec) in relevant.iter().take(5).enumerate() {
        lines.push(format!("{}. `{}`", i + 1, rec.rel_path));
        lines.push(format!("   - Size: {}", human_size(rec.size_bytes)));
        lines.push(format!("   - Category: {}", rec.category.as_str()));
        if !rec.tags.is_empty() {
            lines.push(format!("   - Tags: {}", rec.tags_joined()));
        }
        lines.push(String::new());
    }

    let mut folders: BTreeMap<String, (usize, u64)> = BTreeMap::new();
    for rec in records {
        let Some((parent, _)) = rec.rel_path.rsplit_once('/') else {
            continue;
        };
        let entry = folders.entry(parent.to_string()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += rec.size_bytes;
    }
    let mut sorted: Vec<(String, (usize, u64))> = folders.into_iter().collect();
    sorted.sort_by(|a, b| b.1 .1.cmp(&a.1 .1).then(a.0.cmp(&b.0)));

    lines.push("### Top Folder Hotspots".to_string());
    for (path, (count, size)) in sorted.into_iter().take(5) {
        lines.push(format!("- `{path}/` → {count} files, {}", human_size(size)));
    }
    lines.push(String::new());
    lines.push("<!-- @heatmap:end -->".to_string());
    lines.push(String::new());
    Some(lines.join("\n"))
}

/// Locate the augment sidecar for the merged sources. Convention:
/// `<repo>_augment.yml` inside the repo root or next to it.
pub fn find_augment_file(sources: &[(String, PathBuf)]) -> Option<PathBuf> {
    for (name, root) in sources {
        let inside = root.join(format!("{name}_augment.yml"));
        if inside.is_file() {
            return Some(inside);
        }
        if let Some(parent) = root.parent() {
            let beside = parent.join(format!("{name}_augment.yml"));
            if beside.is_file() {
                return Some(beside);
            }
        }
    }
    None
}

fn yaml_str_list(value: Option<&Yaml>) -> Vec<String> {
    let Some(Yaml::Sequence(seq)) = value else {
        return Vec::new();
    };
    seq.iter()
        .filter_map(|v| match v {
            Yaml::String(s) => Some(s.clone()),
            other => serde_yaml::to_string(other)
                .ok()
                .map(|s| s.trim().to_string()),
        })
        .collect()
}

/// Render the Augment Intelligence block from the sidecar, if present and
/// parseable. Read-only context: any failure degrades to `None`.
pub fn render_augment_block(sources: &[(String, PathBuf)]) -> Option<String> {
    let path = find_augment_file(sources)?;
    let text = match std::fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) => {
            warn!("augment sidecar unreadable at {}: {e}", path.display());
            return None;
        }
    };
    let doc: Yaml = match serde_yaml::from_str(&text) {
        Ok(d) => d,
        Err(e) => {
            warn!("augment sidecar malformed at {}: {e}", path.display());
            return None;
        }
    };
    let augment = doc.get("augment").unwrap_or(&doc);

    let mut lines: Vec<String> = Vec::new();
    lines.push("<!-- @augment:start -->".to_string());
    lines.push("## 🧠 Augment Intelligence".to_string());
    lines.push(String::new());
    lines.push(format!(
        "Sidecar: `{}`",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ));
    lines.push(String::new());

    for (key, title) in [
        ("hotspots", "Hotspots"),
        ("suggestions", "Suggestions"),
        ("risks", "Risks"),
        ("priorities", "Priorities"),
    ] {
        let items = yaml_str_list(augment.get(key));
        if items.is_empty() {
            continue;
        }
        lines.push(format!("### {title}"));
        for item in items {
            lines.push(format!("- {item}"));
        }
        lines.push(String::new());
    }

    lines.push("<!-- @augment:end -->".to_string());
    lines.push(String::new());
    Some(lines.join("\n"))
}

/// Augment pointer for the machine-meta block.
pub fn augment_meta(sources: &[(String, PathBuf)]) -> Option<String> {
    find_augment_file(sources).and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
}

/// Extras flags for the machine-meta block; only active flags appear.
pub fn build_extras_meta(extras: &ExtrasConfig, num_repos: usize) -> BTreeMap<String, bool> {
    let mut meta = BTreeMap::new();
    if extras.health {
        meta.insert("health".to_string(), true);
    }
    if extras.organism_index {
        meta.insert("organism_index".to_string(), true);
    }
    if extras.fleet_panorama && num_repos > 1 {
        meta.insert("fleet_panorama".to_string(), true);
    }
    if extras.augment_sidecar {
        meta.insert("augment_sidecar".to_string(), true);
    }
    if extras.delta_reports {
        meta.insert("delta_reports".to_string(), true);
    }
    if extras.json_sidecar {
        meta.insert("json_sidecar".to_string(), true);
    }
    if extras.heatmap {
        meta.insert("heatmap".to_string(), true);
    }
    if extras.fleet_consistency {
        meta.insert("fleet_consistency".to_string(), true);
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeConfig;
    use crate::record::{InclusionReason, Lens, RepoSummary, ScannedFile};
    use tempfile::TempDir;

    fn scan(repo: &str, rel: &str, category: Category, tags: Vec<Tag>) -> ScannedFile {
        ScannedFile {
            repo_label: repo.into(),
            rel_path: rel.into(),
            abs_path: PathBuf::from("/x").join(rel),
            size_bytes: 64,
            is_text: true,
            fingerprint: None,
            extension: String::new(),
            category,
            tags,
            inclusion_reason: InclusionReason::Normal,
            lens: Lens::Core,
        }
    }

    fn plan_for(summaries: Vec<RepoSummary>) -> MergePlan {
        MergePlan::build(&summaries, &MergeConfig::default())
    }

    #[test]
    fn health_flags_missing_ci() {
        let summary = RepoSummary {
            name: "tools".into(),
            root: PathBuf::from("/hub/tools"),
            files: vec![scan("tools", "README.md", Category::Doc, vec![Tag::AiContext])],
        };
        let plan = plan_for(vec![summary]);
        let healths = analyze_all(&plan);
        assert_eq!(healths.len(), 1);
        assert_eq!(healths[0].status, "warn");
        let (overall, missing) = health_meta(&healths);
        assert_eq!(overall, "warning");
        assert!(missing.contains(&"ci".to_string()));
    }

    #[test]
    fn fleet_panorama_needs_two_repos() {
        let one = RepoSummary {
            name: "a".into(),
            root: PathBuf::from("/hub/a"),
            files: vec![scan("a", "x.md", Category::Doc, vec![])],
        };
        assert!(render_fleet_panorama(&plan_for(vec![one.clone()])).is_none());

        let two = RepoSummary {
            name: "b".into(),
            root: PathBuf::from("/hub/b"),
            files: vec![scan("b", "y.md", Category::Doc, vec![])],
        };
        let block = render_fleet_panorama(&plan_for(vec![one, two])).unwrap();
        assert!(block.contains("2 repos"));
    }

    #[test]
    fn organism_index_only_for_single_repo() {
        let summary = RepoSummary {
            name: "tools".into(),
            root: PathBuf::from("/hub/tools"),
            files: vec![
                scan("tools", "contracts/feed.json", Category::Contract, vec![]),
                scan("tools", "README.md", Category::Doc, vec![Tag::AiContext]),
            ],
        };
        let block = render_organism_index(&plan_for(vec![summary])).unwrap();
        assert!(block.contains("**Repo:** `tools`"));
        assert!(block.contains("- `contracts/feed.json`"));
        assert!(block.contains("contracts"), "content-based role: {block}");
    }

    #[test]
    fn augment_block_reads_yaml_and_tolerates_garbage() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tools");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(
            root.join("tools_augment.yml"),
            "augment:\n  hotspots:\n    - src/merge.rs\n  risks:\n    - splitter rename path\n",
        )
        .unwrap();

        let sources = vec![("tools".to_string(), root.clone())];
        let block = render_augment_block(&sources).unwrap();
        assert!(block.contains("- src/merge.rs"));
        assert!(block.contains("### Risks"));

        std::fs::write(root.join("tools_augment.yml"), ":\n  - not yaml: [").unwrap();
        assert!(render_augment_block(&sources).is_none());
    }

    #[test]
    fn extras_meta_only_lists_active_flags() {
        let extras = ExtrasConfig {
            json_sidecar: true,
            fleet_panorama: true,
            ..ExtrasConfig::none()
        };
        let meta = build_extras_meta(&extras, 1);
        assert_eq!(meta.get("json_sidecar"), Some(&true));
        // Panorama is multi-repo only.
        assert!(!meta.contains_key("fleet_panorama"));
        assert!(!meta.contains_key("health"));
    }
}

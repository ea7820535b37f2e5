//! End-to-end orchestration: plan, render, split, validate, sidecar,
//! post-write verification.
//!
//! The coordinator is the single point that distinguishes recoverable
//! per-file diagnostics from fatal run failures. Everything below it
//! propagates with `?`; nothing here swallows an error into a false
//! success.

use chrono::{DateTime, Local, Utc};
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::MergeConfig;
use crate::error::MergeError;
use crate::extras;
use crate::plan::MergePlan;
use crate::record::RepoSummary;
use crate::render::{self, ArtifactRefs};
use crate::sidecar;
use crate::split;
use crate::validate::ReportValidator;

/// One report over the union of all repos, or one report per repo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    Combined,
    PerRepo,
}

/// Everything a run wrote, verified to exist on disk.
#[derive(Debug, Clone, Default)]
pub struct MergeArtifacts {
    /// Ordered text parts, across all groups.
    pub md_parts: Vec<PathBuf>,
    /// Sidecars, one per group when the extra is active.
    pub sidecars: Vec<PathBuf>,
}

impl MergeArtifacts {
    /// First text part: the canonical document for humans.
    pub fn canonical_md(&self) -> Option<&PathBuf> {
        self.md_parts.first()
    }

    /// Primary machine artifact when the sidecar extra is active.
    pub fn primary_sidecar(&self) -> Option<&PathBuf> {
        self.sidecars.first()
    }

    pub fn all_paths(&self) -> Vec<&PathBuf> {
        self.sidecars.iter().chain(self.md_parts.iter()).collect()
    }
}

fn slug_for_filename(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() || trimmed == "root" {
        return None;
    }
    Some(trimmed.replace('/', "-"))
}

fn ext_block(cfg: &MergeConfig) -> Option<String> {
    let exts = cfg.ext_filter.as_ref()?;
    let mut sorted = exts.clone();
    sorted.sort();
    let cleaned = sorted
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_string())
        .filter(|e| !e.is_empty())
        .collect::<Vec<_>>()
        .join("+");
    if cleaned.is_empty() {
        None
    } else {
        Some(format!("ext-{cleaned}"))
    }
}

fn repo_block(repo_names: &[String]) -> String {
    match repo_names {
        [] => "no-repo".to_string(),
        [single] => single.replace('/', "-"),
        _ => "multi".to_string(),
    }
}

/// Deterministic run id: `(sorted repo names, profile, filters, mode,
/// timestamp)`. Multi-repo sets collapse to a short content hash so the id
/// stays filename-sized.
pub fn generate_run_id(repo_names: &[String], cfg: &MergeConfig, timestamp: &str) -> String {
    let mut components: Vec<String> = Vec::new();

    if let Some(path_slug) = cfg.path_filter.as_deref().and_then(slug_for_filename) {
        components.push(path_slug);
    }

    match repo_names {
        [] => components.push("no-repo".to_string()),
        [single] => components.push(single.replace('/', "-")),
        _ => {
            let mut sorted: Vec<&String> = repo_names.iter().collect();
            sorted.sort();
            let joined = sorted
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("-");
            let digest = Sha1::digest(joined.as_bytes());
            components.push(format!(
                "multi-{:02x}{:02x}{:02x}",
                digest[0], digest[1], digest[2]
            ));
        }
    }

    components.push(cfg.render_mode().as_str().to_string());
    components.push(cfg.profile.as_str().to_string());
    if let Some(block) = ext_block(cfg) {
        components.push(block);
    }
    components.push(timestamp.to_string());
    components.join("-")
}

/// Assemble the output filename:
/// `<path?>-<repo>-<mode>-<detail>(-ext-…)?(-part<i>of<N>)?-<ts>_merge.md`.
pub fn output_filename(
    merges_dir: &Path,
    repo_names: &[String],
    cfg: &MergeConfig,
    part_suffix: &str,
    timestamp: &str,
) -> PathBuf {
    let mut parts: Vec<String> = Vec::new();

    if let Some(path_slug) = cfg.path_filter.as_deref().and_then(slug_for_filename) {
        parts.push(path_slug);
    }
    parts.push(repo_block(repo_names));
    parts.push(cfg.render_mode().as_str().to_string());
    parts.push(cfg.profile.as_str().to_string());
    if let Some(block) = ext_block(cfg) {
        parts.push(block);
    }
    let part_block = part_suffix.trim_start_matches('-');
    if !part_block.is_empty() {
        parts.push(part_block.to_string());
    }
    parts.push(timestamp.to_string());

    merges_dir.join(format!("{}_merge.md", parts.join("-")))
}

fn verify_text_parts(parts: &[PathBuf]) -> Result<(), MergeError> {
    for p in parts {
        let meta = std::fs::metadata(p).map_err(|_| {
            MergeError::PostCheck(format!("advertised text part missing: {}", p.display()))
        })?;
        if meta.len() == 0 {
            return Err(MergeError::PostCheck(format!(
                "advertised text part is empty: {}",
                p.display()
            )));
        }
    }
    Ok(())
}

fn verify_sidecar(path: &Path) -> Result<(), MergeError> {
    let text = std::fs::read_to_string(path).map_err(|_| {
        MergeError::PostCheck(format!("sidecar missing after write: {}", path.display()))
    })?;
    if text.is_empty() {
        return Err(MergeError::PostCheck(format!(
            "sidecar is empty: {}",
            path.display()
        )));
    }
    let value: serde_json::Value = serde_json::from_str(&text)?;
    sidecar::validate_value(&value, false)
}

struct GroupOutcome {
    md_parts: Vec<PathBuf>,
    sidecar: Option<PathBuf>,
}

fn write_group(
    merges_dir: &Path,
    group: &[RepoSummary],
    cfg: &MergeConfig,
    timestamp: &str,
    generated_at: DateTime<Utc>,
) -> Result<GroupOutcome, MergeError> {
    let repo_names: Vec<String> = group.iter().map(|s| s.name.clone()).collect();
    let run_id = generate_run_id(&repo_names, cfg, timestamp);
    info!(run_id = %run_id, repos = repo_names.len(), "merge group start");

    let plan = MergePlan::build(group, cfg);

    // Predicted sidecar name; the sidecar always carries the suffix-free
    // stem so the basename advertised in the text header stays valid no
    // matter how many parts the splitter produces.
    let base_path = output_filename(merges_dir, &repo_names, cfg, "", timestamp);
    let sidecar_path = base_path.with_extension("json");

    let refs = ArtifactRefs {
        index_json_basename: if cfg.extras.json_sidecar {
            sidecar_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
        } else {
            None
        },
        augment_sidecar_basename: if cfg.extras.augment_sidecar {
            extras::augment_meta(&plan.sources)
        } else {
            None
        },
    };

    let mut validator = ReportValidator::new(cfg.plan_only);
    let blocks = render::render_blocks(&plan, cfg, &refs, generated_at);
    let name_for =
        |suffix: &str| output_filename(merges_dir, &repo_names, cfg, suffix, timestamp);
    let md_parts = split::write_parts(blocks, cfg.split_size, &mut validator, name_for)?;
    validator.finish()?;
    verify_text_parts(&md_parts)?;

    let sidecar_written = if cfg.extras.json_sidecar {
        let mut sc = sidecar::build_sidecar(
            &plan,
            cfg,
            &run_id,
            &generated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        // Re-assert artifact paths after the final rename.
        sc.artifacts.index_json = Some(sidecar_path.display().to_string());
        sc.artifacts.index_json_basename = sidecar_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string());
        sc.artifacts.md_parts = md_parts.iter().map(|p| p.display().to_string()).collect();
        sc.artifacts.md_parts_basenames = md_parts
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        sc.artifacts.canonical_md = md_parts.first().map(|p| p.display().to_string());
        sc.artifacts.canonical_md_basename = md_parts
            .first()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()));

        let value = serde_json::to_value(&sc)?;
        sidecar::validate_value(&value, false)?;
        std::fs::write(&sidecar_path, serde_json::to_string_pretty(&value)?)?;
        verify_sidecar(&sidecar_path)?;
        Some(sidecar_path)
    } else {
        None
    };

    debug!(parts = md_parts.len(), "merge group complete");
    Ok(GroupOutcome {
        md_parts,
        sidecar: sidecar_written,
    })
}

/// Run the full merge and write every artifact under `merges_dir`.
pub fn write_reports(
    merges_dir: &Path,
    summaries: &[RepoSummary],
    cfg: &MergeConfig,
    mode: MergeMode,
) -> Result<MergeArtifacts, MergeError> {
    let timestamp = Local::now().format("%y%m%d-%H%M").to_string();
    write_reports_at(merges_dir, summaries, cfg, mode, &timestamp, Utc::now())
}

/// As [`write_reports`], with an explicit timestamp pair. The filename
/// stamp and `generated_at` are the only non-deterministic inputs of a run.
pub fn write_reports_at(
    merges_dir: &Path,
    summaries: &[RepoSummary],
    cfg: &MergeConfig,
    mode: MergeMode,
    timestamp: &str,
    generated_at: DateTime<Utc>,
) -> Result<MergeArtifacts, MergeError> {
    std::fs::create_dir_all(merges_dir)?;

    let mut artifacts = MergeArtifacts::default();
    match mode {
        MergeMode::Combined => {
            let outcome = write_group(merges_dir, summaries, cfg, timestamp, generated_at)?;
            artifacts.md_parts.extend(outcome.md_parts);
            artifacts.sidecars.extend(outcome.sidecar);
        }
        MergeMode::PerRepo => {
            for summary in summaries {
                let group = std::slice::from_ref(summary);
                let outcome = write_group(merges_dir, group, cfg, timestamp, generated_at)?;
                artifacts.md_parts.extend(outcome.md_parts);
                artifacts.sidecars.extend(outcome.sidecar);
            }
        }
    }

    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtrasConfig, MergeConfig, Profile};
    use crate::walk::{scan_repo, ScanOptions};
    use tempfile::TempDir;

    fn fixture_hub() -> (TempDir, Vec<RepoSummary>) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("tools");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("README.md"), "# tools\n\nSmall fixture.\n").unwrap();
        std::fs::write(root.join("src/main.py"), "print('hi')\n").unwrap();
        std::fs::write(root.join("docs/manual.md"), "manual\n").unwrap();
        let summary = scan_repo(&root, &ScanOptions::default()).unwrap();
        (tmp, vec![summary])
    }

    #[test]
    fn run_id_is_deterministic_and_filter_sensitive() {
        let cfg = MergeConfig::default();
        let names = vec!["tools".to_string()];
        let a = generate_run_id(&names, &cfg, "250801-1200");
        let b = generate_run_id(&names, &cfg, "250801-1200");
        assert_eq!(a, b);
        assert_eq!(a, "tools-full-dev-250801-1200");

        let filtered = MergeConfig {
            ext_filter: Some(vec![".py".into()]),
            ..MergeConfig::default()
        };
        assert_ne!(a, generate_run_id(&names, &filtered, "250801-1200"));
    }

    #[test]
    fn multi_repo_run_id_hashes_the_name_set() {
        let cfg = MergeConfig::default();
        let ab = generate_run_id(&["a".to_string(), "b".to_string()], &cfg, "t");
        let ba = generate_run_id(&["b".to_string(), "a".to_string()], &cfg, "t");
        assert_eq!(ab, ba, "order of repo names must not matter");
        assert!(ab.starts_with("multi-"));
    }

    #[test]
    fn filename_grammar_matches_contract() {
        let cfg = MergeConfig {
            path_filter: Some("docs/".into()),
            ext_filter: Some(vec![".py".into(), ".md".into()]),
            ..MergeConfig::default()
        };
        let p = output_filename(
            Path::new("/m"),
            &["tools".to_string()],
            &cfg,
            "-part1of2",
            "250801-1200",
        );
        assert_eq!(
            p,
            Path::new("/m/docs-tools-full-dev-ext-md+py-part1of2-250801-1200_merge.md")
        );
    }

    #[test]
    fn combined_run_writes_md_and_sidecar_pair() {
        let (_hub, summaries) = fixture_hub();
        let out = TempDir::new().unwrap();
        let cfg = MergeConfig::default();

        let artifacts = write_reports_at(
            out.path(),
            &summaries,
            &cfg,
            MergeMode::Combined,
            "250801-1200",
            Utc::now(),
        )
        .unwrap();

        assert_eq!(artifacts.md_parts.len(), 1);
        assert_eq!(artifacts.sidecars.len(), 1);

        let md = std::fs::read_to_string(artifacts.canonical_md().unwrap()).unwrap();
        assert!(md.starts_with("# Merge Report (Part 1/1)\n"));

        let sidecar_name = artifacts.primary_sidecar().unwrap().file_name().unwrap();
        assert!(md.contains(&*sidecar_name.to_string_lossy()), "md advertises sidecar");

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(artifacts.primary_sidecar().unwrap()).unwrap())
                .unwrap();
        let md_name = artifacts.canonical_md().unwrap().file_name().unwrap();
        assert_eq!(
            json["artifacts"]["canonical_md_basename"],
            md_name.to_string_lossy().as_ref()
        );
    }

    #[test]
    fn per_repo_mode_produces_paired_artifacts_per_repo() {
        let tmp = TempDir::new().unwrap();
        for repo in ["alpha", "beta"] {
            let root = tmp.path().join(repo);
            std::fs::create_dir_all(&root).unwrap();
            std::fs::write(root.join("README.md"), format!("# {repo}\n")).unwrap();
        }
        let summaries = vec![
            scan_repo(&tmp.path().join("alpha"), &ScanOptions::default()).unwrap(),
            scan_repo(&tmp.path().join("beta"), &ScanOptions::default()).unwrap(),
        ];

        let out = TempDir::new().unwrap();
        let cfg = MergeConfig::default();
        let artifacts = write_reports_at(
            out.path(),
            &summaries,
            &cfg,
            MergeMode::PerRepo,
            "250801-1200",
            Utc::now(),
        )
        .unwrap();

        assert_eq!(artifacts.md_parts.len(), 2);
        assert_eq!(artifacts.sidecars.len(), 2);

        for sc_path in &artifacts.sidecars {
            let json: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(sc_path).unwrap()).unwrap();
            assert_eq!(
                json["meta"]["source_repos"].as_array().unwrap().len(),
                1,
                "per-repo sidecars carry exactly one source repo"
            );
        }
    }

    #[test]
    fn split_run_produces_ordered_parts_and_valid_structure() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("big");
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("README.md"), "# big\n").unwrap();
        // ~100 kB of text content across one file.
        std::fs::write(root.join("src/data.py"), "x = 1\n".repeat(18_000)).unwrap();
        let summaries = vec![scan_repo(&root, &ScanOptions::default()).unwrap()];

        let out = TempDir::new().unwrap();
        let cfg = MergeConfig {
            profile: Profile::Max,
            split_size: 20 * 1024,
            ..MergeConfig::default()
        };
        let artifacts = write_reports_at(
            out.path(),
            &summaries,
            &cfg,
            MergeMode::Combined,
            "250801-1200",
            Utc::now(),
        )
        .unwrap();

        let total = artifacts.md_parts.len();
        assert!(total > 1, "expected a split, got {total} part(s)");
        for (i, p) in artifacts.md_parts.iter().enumerate() {
            let text = std::fs::read_to_string(p).unwrap();
            assert!(text.starts_with(&format!("# Merge Report (Part {}/{total})", i + 1)));
            assert!(text.contains("part_signature"));
        }
    }

    #[test]
    fn plan_only_run_skips_content_but_writes_sidecar() {
        let (_hub, summaries) = fixture_hub();
        let out = TempDir::new().unwrap();
        let cfg = MergeConfig {
            plan_only: true,
            ..MergeConfig::default()
        };
        let artifacts = write_reports_at(
            out.path(),
            &summaries,
            &cfg,
            MergeMode::Combined,
            "250801-1200",
            Utc::now(),
        )
        .unwrap();

        let md = std::fs::read_to_string(artifacts.canonical_md().unwrap()).unwrap();
        assert!(!md.contains("<!-- START_OF_CONTENT -->"));
        assert!(md.contains("plan_only: true"));
        assert_eq!(artifacts.sidecars.len(), 1, "sidecar also written in plan-only runs");
    }

    #[test]
    fn sidecar_can_be_disabled() {
        let (_hub, summaries) = fixture_hub();
        let out = TempDir::new().unwrap();
        let cfg = MergeConfig {
            extras: ExtrasConfig::none(),
            ..MergeConfig::default()
        };
        let artifacts = write_reports_at(
            out.path(),
            &summaries,
            &cfg,
            MergeMode::Combined,
            "250801-1200",
            Utc::now(),
        )
        .unwrap();
        assert!(artifacts.sidecars.is_empty());
        assert_eq!(artifacts.md_parts.len(), 1);
    }
}

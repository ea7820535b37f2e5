//! Repository walker: enumerate candidate files for one repo root.
//!
//! Path normalization happens exactly once, here: every `rel_path` leaving
//! this module is forward-slash and Unicode-NFC. Downstream components treat
//! paths as opaque strings with only prefix checks and slugging.

use ignore::WalkBuilder;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::classify;
use crate::error::MergeError;
use crate::hash;
use crate::ident;
use crate::record::{InclusionReason, RepoSummary, ScannedFile};

/// Directory names dropped before recursion.
pub fn default_ignore_dirs() -> Vec<String> {
    [
        ".git",
        ".idea",
        ".vscode",
        ".vs",
        "node_modules",
        ".svelte-kit",
        ".next",
        "dist",
        "build",
        "target",
        ".venv",
        "venv",
        "__pycache__",
        ".pytest_cache",
        ".mypy_cache",
        ".ruff_cache",
        "coverage",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Top-level hub entries never treated as repositories.
fn is_skipped_hub_root(name: &str) -> bool {
    matches!(name, "merges" | "merge" | "output" | "out")
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub ignore_dirs: Vec<String>,
    /// Relative-path whitelist; `None` means everything. Entries match a
    /// file exactly or act as a directory-boundary prefix.
    pub include_paths: Option<Vec<String>>,
    /// Lowercase extensions with leading dot.
    pub ext_filter: Option<Vec<String>>,
    /// Substring match on the relative path.
    pub path_contains: Option<String>,
    pub calculate_fingerprint: bool,
    /// Hash limit hint; 0 means unlimited.
    pub max_file_bytes: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            ignore_dirs: default_ignore_dirs(),
            include_paths: None,
            ext_filter: None,
            path_contains: None,
            calculate_fingerprint: true,
            max_file_bytes: 0,
        }
    }
}

/// Critical files are admitted regardless of whitelist and filters.
pub fn is_critical_file(rel_path: &str) -> bool {
    let lower = rel_path.to_lowercase();
    if lower == "readme.md" || lower.ends_with("/readme.md") {
        return true;
    }
    if lower == ".ai-context.yml" || lower.ends_with("/.ai-context.yml") {
        return true;
    }
    if lower.contains(".wgx/profile.yml") {
        return true;
    }
    if lower.contains(".github/workflows/") && lower.contains("guard") {
        return true;
    }
    false
}

/// Normalize a whitelist: trim, strip `./`, drop empties. Any root sentinel
/// (`.`, `/`, empty after trim) disables the whitelist entirely.
fn normalize_include_paths(include: Option<&[String]>) -> Option<Vec<String>> {
    let include = include?;
    let mut normalized = Vec::new();
    for raw in include {
        let mut s = raw.trim();
        if matches!(s, "." | "/" | "") {
            return None;
        }
        if let Some(rest) = s.strip_prefix("./") {
            s = rest;
        }
        if s.is_empty() {
            return None;
        }
        normalized.push(s.to_string());
    }
    Some(normalized)
}

fn matches_include(rel_path: &str, include: &[String]) -> bool {
    include.iter().any(|p| {
        rel_path == p
            || (rel_path.len() > p.len()
                && rel_path.starts_with(p.as_str())
                && rel_path.as_bytes()[p.len()] == b'/')
    })
}

fn is_junk_file(name: &str) -> bool {
    name == ".DS_Store" || name.eq_ignore_ascii_case("thumbs.db")
}

/// Dotfile policy: hidden files are skipped except the `.env` sample trio.
/// (Critical dotfiles like `.ai-context.yml` are admitted earlier.)
fn is_skipped_dotfile(name: &str) -> bool {
    if name.starts_with(".env") {
        return !matches!(name, ".env.example" | ".env.template" | ".env.sample");
    }
    name.starts_with('.')
}

fn rel_path_string(root: &Path, abs: &Path) -> Option<String> {
    let rel = abs.strip_prefix(root).ok()?;
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(ident::nfc(&joined))
}

fn lowercase_ext(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!(".{}", ext.to_lowercase()),
        _ => String::new(),
    }
}

/// Scan one repository with the default hashing pool.
pub fn scan_repo(repo_root: &Path, opts: &ScanOptions) -> Result<RepoSummary, MergeError> {
    scan_repo_with_pool(repo_root, opts, hash::default_pool)
}

/// Scan one repository; the pool factory is invoked only when fingerprinting
/// is enabled and there is at least one file to hash.
pub fn scan_repo_with_pool<F>(
    repo_root: &Path,
    opts: &ScanOptions,
    make_pool: F,
) -> Result<RepoSummary, MergeError>
where
    F: FnOnce() -> Result<ThreadPool, MergeError>,
{
    let repo_root = repo_root
        .canonicalize()
        .map_err(|e| MergeError::Sandbox {
            repo: repo_root.display().to_string(),
            detail: format!("unreadable repo root: {e}"),
        })?;
    let repo_label = repo_root
        .file_name()
        .map(|s| ident::nfc(&s.to_string_lossy()))
        .unwrap_or_else(|| "repo".to_string());

    // An unreadable root aborts this repo's scan; per-entry errors below
    // degrade to skip-plus-diagnostic.
    std::fs::read_dir(&repo_root).map_err(|e| MergeError::Sandbox {
        repo: repo_label.clone(),
        detail: format!("unreadable repo root: {e}"),
    })?;

    let include_paths = normalize_include_paths(opts.include_paths.as_deref());
    let ext_filter: Option<Vec<String>> = opts
        .ext_filter
        .as_ref()
        .map(|v| v.iter().map(|e| e.to_lowercase()).collect());
    let path_filter = opts
        .path_contains
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let ignore_dirs = opts.ignore_dirs.clone();
    let walker = WalkBuilder::new(&repo_root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(true)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            !(is_dir && ignore_dirs.iter().any(|d| d == name.as_ref()))
        })
        .build();

    let mut files: Vec<ScannedFile> = Vec::new();

    for item in walker {
        let dent = match item {
            Ok(d) => d,
            Err(e) => {
                warn!(repo = %repo_label, "walk entry error: {e}");
                continue;
            }
        };
        if !dent.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }

        let abs_path = dent.path().to_path_buf();

        // Symlinks that resolve outside the repo root are dropped.
        if dent.path_is_symlink() {
            match abs_path.canonicalize() {
                Ok(resolved) if resolved.starts_with(&repo_root) => {}
                Ok(resolved) => {
                    warn!(
                        repo = %repo_label,
                        "dropping symlink escaping repo root: {} -> {}",
                        abs_path.display(),
                        resolved.display()
                    );
                    continue;
                }
                Err(e) => {
                    warn!(repo = %repo_label, "unresolvable symlink {}: {e}", abs_path.display());
                    continue;
                }
            }
        }

        let Some(rel_path) = rel_path_string(&repo_root, &abs_path) else {
            continue;
        };
        let file_name = rel_path.rsplit('/').next().unwrap_or(&rel_path).to_string();

        let mut inclusion_reason = InclusionReason::Normal;
        if is_critical_file(&rel_path) {
            inclusion_reason = InclusionReason::ForceInclude;
        } else {
            if is_junk_file(&file_name) || is_skipped_dotfile(&file_name) {
                continue;
            }
            if let Some(include) = include_paths.as_deref() {
                if !matches_include(&rel_path, include) {
                    continue;
                }
            }
            if let Some(pf) = path_filter {
                if !rel_path.contains(pf) {
                    continue;
                }
            }
            if let Some(exts) = ext_filter.as_deref() {
                if !exts.iter().any(|e| e == &lowercase_ext(&file_name)) {
                    continue;
                }
            }
        }

        let size_bytes = match std::fs::metadata(&abs_path) {
            Ok(m) => m.len(),
            Err(e) => {
                warn!(repo = %repo_label, "stat failed for {}: {e}", abs_path.display());
                continue;
            }
        };

        let extension = lowercase_ext(&file_name);
        let is_text = classify::is_probably_text(&abs_path, &file_name, &extension, size_bytes);
        let (category, tags) = classify::classify(&rel_path, &extension);
        let lens = classify::infer_lens(&rel_path, &extension);

        files.push(ScannedFile {
            repo_label: repo_label.clone(),
            rel_path,
            abs_path,
            size_bytes,
            is_text,
            fingerprint: None,
            extension,
            category,
            tags,
            inclusion_reason,
            lens,
        });
    }

    files.sort_by(|a, b| a.rel_path.to_lowercase().cmp(&b.rel_path.to_lowercase()));

    if opts.calculate_fingerprint {
        fingerprint_scanned(&mut files, opts.max_file_bytes, make_pool)?;
    }

    debug!(repo = %repo_label, files = files.len(), "repo scan complete");

    Ok(RepoSummary {
        name: repo_label,
        root: repo_root,
        files,
    })
}

/// Hash pass over a scan result. Text files are always hashed (up to the
/// limit); binaries only when unlimited or small enough for the limit.
fn fingerprint_scanned<F>(
    files: &mut [ScannedFile],
    max_file_bytes: u64,
    make_pool: F,
) -> Result<(), MergeError>
where
    F: FnOnce() -> Result<ThreadPool, MergeError>,
{
    let limit = if max_file_bytes > 0 {
        Some(max_file_bytes)
    } else {
        None
    };

    let mut jobs: Vec<(usize, PathBuf, Option<u64>)> = Vec::new();
    for (idx, f) in files.iter().enumerate() {
        let wanted = if f.is_text {
            true
        } else {
            limit.is_none() || f.size_bytes <= max_file_bytes
        };
        if wanted {
            jobs.push((idx, f.abs_path.clone(), limit));
        }
    }
    if jobs.is_empty() {
        return Ok(());
    }

    let pool = make_pool()?;
    let batch: Vec<(PathBuf, Option<u64>)> =
        jobs.iter().map(|(_, p, l)| (p.clone(), *l)).collect();
    let digests = hash::fingerprint_batch(&pool, &batch);

    for ((idx, _, _), digest) in jobs.into_iter().zip(digests) {
        files[idx].fingerprint = Some(digest);
    }
    Ok(())
}

/// Scan every repository under a hub directory. Unreadable repos are logged
/// and skipped; the remaining repos still merge.
pub fn scan_hub(hub: &Path, opts: &ScanOptions) -> Result<Vec<RepoSummary>, MergeError> {
    let mut names: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(hub)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("hub entry error: {e}");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || is_skipped_hub_root(&name) {
            continue;
        }
        names.push((name, path));
    }
    names.sort_by(|a, b| a.0.to_lowercase().cmp(&b.0.to_lowercase()));

    let mut summaries = Vec::new();
    for (name, path) in names {
        match scan_repo(&path, opts) {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(repo = %name, "repo scan aborted: {e}"),
        }
    }
    Ok(summaries)
}

//! File classification: text detection, category, tags, roles, reading lens.
//!
//! Everything here works on the normalized relative path and the lowercase
//! extension; the only I/O is the binary probe in [`is_probably_text`].

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::record::{Category, Lens, ScannedFile, Tag};

/// Files larger than this are treated as binary without probing.
const TEXT_PROBE_SIZE_CAP: u64 = 20 * 1024 * 1024;
/// Bytes read when probing for NUL.
const TEXT_PROBE_BYTES: usize = 4096;

fn is_known_text_ext(ext: &str) -> bool {
    matches!(
        ext,
        ".md" | ".txt"
            | ".rst"
            | ".py"
            | ".rs"
            | ".ts"
            | ".tsx"
            | ".js"
            | ".jsx"
            | ".json"
            | ".jsonl"
            | ".yml"
            | ".yaml"
            | ".toml"
            | ".ini"
            | ".cfg"
            | ".conf"
            | ".sh"
            | ".bash"
            | ".zsh"
            | ".fish"
            | ".dockerfile"
            | ".svelte"
            | ".css"
            | ".scss"
            | ".html"
            | ".htm"
            | ".xml"
            | ".csv"
            | ".log"
            | ".lock"
            | ".bats"
            | ".properties"
            | ".gradle"
            | ".groovy"
            | ".kt"
            | ".kts"
            | ".java"
            | ".c"
            | ".cpp"
            | ".h"
            | ".hpp"
            | ".go"
            | ".rb"
            | ".php"
            | ".pl"
            | ".lua"
            | ".sql"
            | ".bat"
            | ".cmd"
            | ".ps1"
            | ".make"
            | ".tf"
            | ".hcl"
            | ".gitignore"
            | ".gitattributes"
            | ".editorconfig"
            | ".cs"
            | ".swift"
            | ".adoc"
            | ".ai-context"
    )
}

fn is_known_text_bare_name(name: &str) -> bool {
    matches!(name, "makefile" | "justfile" | "dockerfile")
}

/// Text detection. Known-text extensions and bare names short-circuit; past
/// the size cap everything is binary; otherwise a 4 KiB probe decides (empty
/// is text, a NUL byte means binary).
pub fn is_probably_text(path: &Path, file_name: &str, ext: &str, size: u64) -> bool {
    let name = file_name.to_lowercase();
    if is_known_text_ext(ext) || is_known_text_bare_name(&name) {
        return true;
    }
    if size > TEXT_PROBE_SIZE_CAP {
        return false;
    }
    let mut buf = [0u8; TEXT_PROBE_BYTES];
    let n = match File::open(path).and_then(|mut f| f.read(&mut buf)) {
        Ok(n) => n,
        Err(_) => return false,
    };
    if n == 0 {
        return true;
    }
    !buf[..n].contains(&0)
}

fn is_config_filename(name: &str) -> bool {
    matches!(
        name,
        "pyproject.toml"
            | "package.json"
            | "package-lock.json"
            | "pnpm-lock.yaml"
            | "cargo.toml"
            | "cargo.lock"
            | "requirements.txt"
            | "pipfile"
            | "pipfile.lock"
            | "poetry.lock"
            | "dockerfile"
            | "docker-compose.yml"
            | "docker-compose.yaml"
            | "justfile"
            | "makefile"
            | "toolchain.versions.yml"
            | ".editorconfig"
            | ".markdownlint.jsonc"
            | ".markdownlint.yaml"
            | ".yamllint"
            | ".yamllint.yml"
            | ".lychee.toml"
            | ".vale.ini"
            | ".pre-commit-config.yaml"
            | ".gitignore"
            | ".gitmodules"
            | "tsconfig.json"
            | "babel.config.js"
            | "webpack.config.js"
            | "rollup.config.js"
            | "vite.config.js"
            | "vite.config.ts"
            | ".ai-context.yml"
    )
}

fn is_doc_ext(ext: &str) -> bool {
    matches!(ext, ".md" | ".rst" | ".txt" | ".adoc")
}

fn is_source_ext(ext: &str) -> bool {
    matches!(
        ext,
        ".py" | ".rs"
            | ".ts"
            | ".tsx"
            | ".js"
            | ".jsx"
            | ".svelte"
            | ".c"
            | ".cpp"
            | ".h"
            | ".hpp"
            | ".go"
            | ".java"
            | ".cs"
            | ".rb"
            | ".php"
            | ".swift"
            | ".kt"
            | ".sh"
            | ".bash"
            | ".pl"
            | ".lua"
    )
}

fn is_config_ext(ext: &str) -> bool {
    matches!(
        ext,
        ".toml" | ".yaml" | ".yml" | ".json" | ".lock" | ".ini" | ".cfg"
    )
}

fn has_segment(rel_path: &str, segment: &str) -> bool {
    rel_path.split('/').any(|p| p == segment)
}

/// Assign `(category, tags)` from path and extension heuristics.
///
/// Category is the first matching rule, in strict order; tags are additive
/// and independent.
pub fn classify(rel_path: &str, ext: &str) -> (Category, Vec<Tag>) {
    let name = rel_path
        .rsplit('/')
        .next()
        .unwrap_or(rel_path)
        .to_lowercase();
    let mut tags: Vec<Tag> = Vec::new();

    if name.ends_with(".ai-context.yml") {
        tags.push(Tag::AiContext);
    }
    if has_segment(rel_path, ".github")
        && has_segment(rel_path, "workflows")
        && matches!(ext, ".yml" | ".yaml")
    {
        tags.push(Tag::Ci);
    }
    if has_segment(rel_path, "docs") && has_segment(rel_path, "adr") && ext == ".md" {
        tags.push(Tag::Adr);
    }
    if name.starts_with("runbook") && ext == ".md" {
        tags.push(Tag::Runbook);
    }
    if (has_segment(rel_path, "scripts") || has_segment(rel_path, "bin"))
        && matches!(ext, ".sh" | ".py")
    {
        tags.push(Tag::Script);
    }
    if has_segment(rel_path, "export") && ext == ".jsonl" {
        tags.push(Tag::Feed);
    }
    if name.contains("lock") {
        tags.push(Tag::Lockfile);
    }
    if name == "readme.md" {
        tags.push(Tag::AiContext);
    }
    if has_segment(rel_path, ".wgx") && name.starts_with("profile") {
        tags.push(Tag::WgxProfile);
    }
    tags.dedup();

    let in_contracts = has_segment(rel_path, "contracts");

    let category = if is_config_filename(&name)
        || has_segment(rel_path, "config")
        || has_segment(rel_path, ".github")
        || has_segment(rel_path, ".wgx")
        || is_config_ext(ext)
    {
        if in_contracts {
            Category::Contract
        } else {
            Category::Config
        }
    } else if is_doc_ext(ext) || has_segment(rel_path, "docs") {
        Category::Doc
    } else if in_contracts {
        Category::Contract
    } else if has_segment(rel_path, "tests")
        || has_segment(rel_path, "test")
        || name.starts_with("test_")
        || is_test_suffixed(&name)
    {
        Category::Test
    } else if is_source_ext(ext)
        || has_segment(rel_path, "src")
        || has_segment(rel_path, "scripts")
        || has_segment(rel_path, "crates")
    {
        Category::Source
    } else {
        Category::Other
    };

    (category, tags)
}

/// `foo_test.<ext>` naming convention.
fn is_test_suffixed(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, _ext)) => stem.ends_with("_test"),
        None => false,
    }
}

/// Heuristic role labels. Only adds roles that meaningfully refine the
/// category; non-authoritative by contract.
pub fn file_roles(scan: &ScannedFile) -> Vec<String> {
    let mut roles: Vec<String> = Vec::new();
    let path = scan.rel_path.to_lowercase();
    let name = scan.file_name().to_lowercase();

    if scan.category == Category::Doc && name.contains("readme") {
        roles.push("doc-essential".into());
    }
    if path.contains("config")
        || name.ends_with(".yml")
        || name.ends_with(".yaml")
        || name.ends_with(".toml")
    {
        roles.push("config".into());
    }
    if name.starts_with("run_") || name.starts_with("main") || name.starts_with("index") {
        roles.push("entrypoint".into());
    }
    if path.contains("ai") || path.contains("context") || scan.tags.contains(&Tag::AiContext) {
        roles.push("ai-context".into());
    }

    roles.dedup();
    roles
}

/// Noise heuristic: obvious lockfiles and vendor/build artifacts. Only used
/// to decorate the manifest's `Included` label; never changes selection.
pub fn is_noise_file(rel_path: &str, file_name: &str) -> bool {
    let path = rel_path.to_lowercase();
    let name = file_name.to_lowercase();

    let noisy_dirs = [
        "node_modules/",
        "dist/",
        "build/",
        "target/",
        "venv/",
        ".venv/",
        "vendor/",
        "__pycache__/",
    ];
    if noisy_dirs.iter().any(|d| path.contains(d)) {
        return true;
    }
    matches!(
        name.as_str(),
        "package-lock.json"
            | "pnpm-lock.yaml"
            | "cargo.lock"
            | "yarn.lock"
            | "pipfile.lock"
            | "poetry.lock"
    )
}

/// Infer the coarse reading lens for a path. Focus overlay only.
pub fn infer_lens(rel_path: &str, ext: &str) -> Lens {
    let name = rel_path
        .rsplit('/')
        .next()
        .unwrap_or(rel_path)
        .to_lowercase();
    let path = rel_path.to_lowercase();

    // Guards first: validation and CI logic should surface early.
    if has_segment(rel_path, ".github")
        || has_segment(rel_path, ".wgx")
        || has_segment(rel_path, "guards")
        || has_segment(rel_path, "tests")
        || has_segment(rel_path, "test")
    {
        return Lens::Guards;
    }
    if name.starts_with("test_") || name.ends_with(".test.ts") || name.ends_with(".spec.ts") {
        return Lens::Guards;
    }

    if has_segment(rel_path, "contracts")
        || has_segment(rel_path, "schemas")
        || has_segment(rel_path, "models")
        || has_segment(rel_path, "types")
        || name.ends_with(".schema.json")
        || name.ends_with(".proto")
    {
        return Lens::DataModels;
    }

    if has_segment(rel_path, "pipelines")
        || has_segment(rel_path, "jobs")
        || path.contains("workflow")
    {
        return Lens::Pipelines;
    }

    if has_segment(rel_path, "cli")
        || has_segment(rel_path, "bin")
        || matches!(name.as_str(), "__main__.py" | "main.rs" | "index.ts" | "index.js")
        || name.starts_with("run_")
        || name.starts_with("start_")
    {
        return Lens::Entrypoints;
    }

    if has_segment(rel_path, "ui")
        || has_segment(rel_path, "app")
        || has_segment(rel_path, "web")
        || has_segment(rel_path, "frontend")
        || has_segment(rel_path, "views")
        || has_segment(rel_path, "templates")
        || matches!(ext, ".html" | ".svelte" | ".css")
    {
        return Lens::Ui;
    }

    if has_segment(rel_path, "adapters")
        || has_segment(rel_path, "interfaces")
        || has_segment(rel_path, "api")
        || has_segment(rel_path, "routes")
        || (has_segment(rel_path, "service") && !has_segment(rel_path, "core"))
    {
        return Lens::Interfaces;
    }

    if has_segment(rel_path, "docs") {
        return Lens::Entrypoints;
    }
    if matches!(ext, ".json" | ".yaml" | ".yml" | ".toml") {
        return Lens::DataModels;
    }

    Lens::Core
}

/// Markdown fence language hint for an extension.
pub fn lang_for(ext: &str) -> &'static str {
    match ext.trim_start_matches('.') {
        "py" => "python",
        "js" => "javascript",
        "ts" | "tsx" => "typescript",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" => "scss",
        "json" | "jsonl" => "json",
        "xml" => "xml",
        "yaml" | "yml" | "ai-context" => "yaml",
        "md" => "markdown",
        "sh" | "bash" | "bats" => "bash",
        "sql" => "sql",
        "php" => "php",
        "cpp" | "hpp" => "cpp",
        "c" | "h" => "c",
        "java" => "java",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "svelte" => "svelte",
        "toml" => "toml",
        "ini" | "cfg" => "ini",
        "dockerfile" => "dockerfile",
        "tf" | "hcl" => "hcl",
        "pl" => "perl",
        "lua" => "lua",
        _ => "",
    }
}

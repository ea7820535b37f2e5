//! Merge configuration: profiles, density, extras, and the single `MergeConfig`
//! value threaded through the whole pipeline.
//!
//! There is deliberately no module-level state anywhere in this crate; every
//! knob lives on [`MergeConfig`] and travels by reference.

use serde::Serialize;
use serde_json::Value;

/// Human-facing report contract, announced in the header and the meta block.
pub const REPORT_CONTRACT_NAME: &str = "mergelens-report";
pub const REPORT_CONTRACT_VERSION: &str = "2.4";
pub const SPEC_VERSION: &str = "2.4";

/// Machine-facing contract of the JSON sidecar.
pub const AGENT_CONTRACT_NAME: &str = "mergelens-agent";
pub const AGENT_CONTRACT_VERSION: &str = "v2";

/// First-line report title. The splitter rewrites the part marker behind it.
pub const REPORT_TITLE: &str = "Merge Report";

/// Named inclusion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    Overview,
    Summary,
    Dev,
    MachineLean,
    Max,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Overview => "overview",
            Profile::Summary => "summary",
            Profile::Dev => "dev",
            Profile::MachineLean => "machine-lean",
            Profile::Max => "max",
        }
    }

    /// Semantic use-case line shown next to the declared purpose.
    pub fn use_case(self) -> &'static str {
        match self {
            Profile::Overview => "index and orientation",
            Profile::Summary => "docs and context",
            Profile::Dev => "code and review snapshot",
            Profile::MachineLean => "machine-lean snapshot",
            Profile::Max => "full snapshot",
        }
    }
}

/// Per-file metadata verbosity dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaDensity {
    Min,
    Standard,
    Full,
    Auto,
}

impl MetaDensity {
    pub fn as_str(self) -> &'static str {
        match self {
            MetaDensity::Min => "min",
            MetaDensity::Standard => "standard",
            MetaDensity::Full => "full",
            MetaDensity::Auto => "auto",
        }
    }

    /// `auto` resolves to `standard` iff any path or extension filter is
    /// active, otherwise `full`.
    pub fn resolve(self, filters_active: bool) -> MetaDensity {
        match self {
            MetaDensity::Auto => {
                if filters_active {
                    MetaDensity::Standard
                } else {
                    MetaDensity::Full
                }
            }
            other => other,
        }
    }
}

/// Effective render mode. `plan_only` wins over `code_only` to avoid
/// conflicting content policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderMode {
    Full,
    PlanOnly,
    CodeOnly,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::Full => "full",
            RenderMode::PlanOnly => "plan-only",
            RenderMode::CodeOnly => "code-only",
        }
    }
}

/// Optional report extras, all off by default.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ExtrasConfig {
    pub health: bool,
    pub organism_index: bool,
    pub fleet_panorama: bool,
    pub augment_sidecar: bool,
    pub delta_reports: bool,
    pub heatmap: bool,
    pub json_sidecar: bool,
    /// Warn about fleet repos that merged without a `.wgx/profile.yml`.
    pub fleet_consistency: bool,
}

impl ExtrasConfig {
    pub fn none() -> ExtrasConfig {
        ExtrasConfig::default()
    }

    /// Service default: sidecar on, everything else off.
    pub fn service_default() -> ExtrasConfig {
        ExtrasConfig {
            json_sidecar: true,
            ..ExtrasConfig::default()
        }
    }
}

/// Everything a merge run needs to know, resolved by the caller.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub profile: Profile,
    /// Soft per-file hint; 0 means unlimited. Never truncates content.
    pub max_file_bytes: u64,
    /// Part size bound in bytes; 0 disables splitting.
    pub split_size: u64,
    pub plan_only: bool,
    pub code_only: bool,
    /// Substring filter on relative paths; a hard include.
    pub path_filter: Option<String>,
    /// Extension filter (lowercase, with leading dot); a hard include.
    pub ext_filter: Option<Vec<String>>,
    pub extras: ExtrasConfig,
    /// Opaque delta metadata, rendered verbatim and echoed in the sidecar.
    pub delta_meta: Option<Value>,
    pub meta_density: MetaDensity,
    pub calculate_fingerprint: bool,
    /// Canonical multi-repo ordering. Repos absent from the list sort after
    /// those present. Empty means pure alphabetical.
    pub repo_order: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            profile: Profile::Dev,
            max_file_bytes: 0,
            split_size: 0,
            plan_only: false,
            code_only: false,
            path_filter: None,
            ext_filter: None,
            extras: ExtrasConfig::service_default(),
            delta_meta: None,
            meta_density: MetaDensity::Full,
            calculate_fingerprint: true,
            repo_order: Vec::new(),
        }
    }
}

impl MergeConfig {
    /// Normalized `code_only`: suppressed whenever `plan_only` is set.
    pub fn effective_code_only(&self) -> bool {
        !self.plan_only && self.code_only
    }

    pub fn render_mode(&self) -> RenderMode {
        if self.plan_only {
            RenderMode::PlanOnly
        } else if self.code_only {
            RenderMode::CodeOnly
        } else {
            RenderMode::Full
        }
    }

    pub fn filters_active(&self) -> bool {
        self.path_filter.as_deref().is_some_and(|p| !p.is_empty())
            || self.ext_filter.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// The density the renderer actually uses for this run.
    pub fn resolved_density(&self) -> MetaDensity {
        self.meta_density.resolve(self.filters_active())
    }

    /// Sort index of a repo in the canonical order; absent repos sort last.
    pub fn repo_sort_index(&self, repo: &str) -> usize {
        self.repo_order
            .iter()
            .position(|r| r == repo)
            .unwrap_or(usize::MAX)
    }
}

/// Normalize a comma-separated extension list: trim, lowercase, ensure a
/// leading dot, drop empties.
pub fn normalize_ext_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let p = p.to_lowercase();
            if p.starts_with('.') {
                p
            } else {
                format!(".{p}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_only_wins_over_code_only() {
        let cfg = MergeConfig {
            plan_only: true,
            code_only: true,
            ..MergeConfig::default()
        };
        assert_eq!(cfg.render_mode(), RenderMode::PlanOnly);
        assert!(!cfg.effective_code_only());
    }

    #[test]
    fn auto_density_follows_filters() {
        assert_eq!(MetaDensity::Auto.resolve(true), MetaDensity::Standard);
        assert_eq!(MetaDensity::Auto.resolve(false), MetaDensity::Full);
        assert_eq!(MetaDensity::Min.resolve(true), MetaDensity::Min);
    }

    #[test]
    fn ext_list_normalization() {
        assert_eq!(
            normalize_ext_list(" py, .RS ,,md"),
            vec![".py".to_string(), ".rs".into(), ".md".into()]
        );
    }

    #[test]
    fn repo_sort_index_puts_unknown_repos_last() {
        let cfg = MergeConfig {
            repo_order: vec!["metarepo".into(), "tools".into()],
            ..MergeConfig::default()
        };
        assert_eq!(cfg.repo_sort_index("tools"), 1);
        assert!(cfg.repo_sort_index("zzz") > cfg.repo_sort_index("tools"));
    }
}

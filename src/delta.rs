//! Delta report rendering.
//!
//! The delta metadata is produced by an external extractor and handed in as
//! an opaque JSON object; this module renders it verbatim and never derives
//! change-sets itself. Two shapes are accepted: a `summary` object with
//! counts, or parallel arrays of added/removed/changed entries.

use serde_json::Value;

/// Cap for file lists in each delta section.
const MAX_DELTA_FILES: usize = 10;

fn list_len(v: Option<&Value>) -> usize {
    v.and_then(Value::as_array).map(|a| a.len()).unwrap_or(0)
}

fn push_list(lines: &mut Vec<String>, title: &str, items: &[Value]) {
    if items.is_empty() {
        return;
    }
    lines.push(format!("### {title}"));
    for item in items.iter().take(MAX_DELTA_FILES) {
        match item {
            Value::Object(obj) => {
                let path = obj
                    .get("path")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let delta = obj.get("size_delta").and_then(Value::as_i64).unwrap_or(0);
                if delta > 0 {
                    lines.push(format!("- `{path}` (+{delta} bytes)"));
                } else if delta < 0 {
                    lines.push(format!("- `{path}` ({delta} bytes)"));
                } else {
                    lines.push(format!("- `{path}`"));
                }
            }
            Value::String(s) => lines.push(format!("- `{s}`")),
            other => lines.push(format!("- `{other}`")),
        }
    }
    if items.len() > MAX_DELTA_FILES {
        lines.push(format!("- _(and {} more)_", items.len() - MAX_DELTA_FILES));
    }
    lines.push(String::new());
}

/// Render the Delta Report block from caller-provided metadata.
pub fn render_delta_block(delta: &Value) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("<!-- @delta:start -->".to_string());
    lines.push("## ♻ Delta Report".to_string());
    lines.push(String::new());

    let base = delta
        .get("base_import")
        .or_else(|| delta.get("base_timestamp"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let current = delta
        .get("current_timestamp")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    lines.push(format!("- **Base Import:** {base}"));
    lines.push(format!("- **Current:** {current}"));
    lines.push(String::new());

    lines.push("**Summary:**".to_string());
    match delta.get("summary").and_then(Value::as_object) {
        Some(summary) => {
            for (label, key) in [
                ("Files added", "files_added"),
                ("Files removed", "files_removed"),
                ("Files changed", "files_changed"),
            ] {
                let count = summary.get(key).and_then(Value::as_u64).unwrap_or(0);
                lines.push(format!("- {label}: {count}"));
            }
        }
        None => {
            lines.push(format!(
                "- Files added: {}",
                list_len(delta.get("files_added"))
            ));
            lines.push(format!(
                "- Files removed: {}",
                list_len(delta.get("files_removed"))
            ));
            lines.push(format!(
                "- Files changed: {}",
                list_len(delta.get("files_changed"))
            ));
        }
    }
    lines.push(String::new());

    let empty = Vec::new();
    let added = delta
        .get("files_added")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let removed = delta
        .get("files_removed")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let changed = delta
        .get("files_changed")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    push_list(&mut lines, "Added Files", added);
    push_list(&mut lines, "Removed Files", removed);
    push_list(&mut lines, "Changed Files", changed);

    lines.push("<!-- @delta:end -->".to_string());
    lines.push(String::new());
    lines.join("\n")
}

//! Fenced directory tree for the Structure section.

use std::collections::BTreeMap;

use crate::record::FileRecord;

#[derive(Default)]
struct Node {
    children: BTreeMap<String, Node>,
    is_file: bool,
}

impl Node {
    fn insert(&mut self, parts: &[&str]) {
        let Some((head, rest)) = parts.split_first() else {
            return;
        };
        let child = self.children.entry((*head).to_string()).or_default();
        if rest.is_empty() {
            child.is_file = true;
        } else {
            child.insert(rest);
        }
    }
}

fn walk(node: &Node, indent: &str, lines: &mut Vec<String>) {
    // Directories first, then files, both alphabetically.
    for (name, child) in node.children.iter().filter(|(_, c)| !c.is_file) {
        lines.push(format!("{indent}📁 {name}/"));
        walk(child, &format!("{indent}    "), lines);
    }
    for (name, _) in node.children.iter().filter(|(_, c)| c.is_file) {
        lines.push(format!("{indent}📄 {name}"));
    }
}

/// Render one fenced tree covering all repos, in record order. Records must
/// already be canonically sorted; repo groups appear in that order.
pub fn build_tree(records: &[FileRecord]) -> String {
    let mut repo_order: Vec<&str> = Vec::new();
    let mut by_repo: BTreeMap<&str, Node> = BTreeMap::new();
    for rec in records {
        if !by_repo.contains_key(rec.repo_label.as_str()) {
            repo_order.push(&rec.repo_label);
        }
        let parts: Vec<&str> = rec.rel_path.split('/').collect();
        by_repo
            .entry(rec.repo_label.as_str())
            .or_default()
            .insert(&parts);
    }

    let mut lines = vec!["```".to_string()];
    for repo in repo_order {
        lines.push(format!("📁 {repo}/"));
        walk(&by_repo[repo], "    ", &mut lines);
    }
    lines.push("```".to_string());
    lines.join("\n")
}

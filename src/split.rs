//! Part writer: consumes renderer blocks and emits N ordered parts bounded
//! by size.
//!
//! Blocks are atomic — a part boundary never falls inside a block. Parts are
//! first staged under temporary names; finalization rewrites the first-line
//! header to `(Part i/N)` (unconditionally, also for `1/1`), injects part
//! signatures for `N > 1`, and renames to canonical names. Any write or
//! rename failure is fatal and carries the partial path.

use regex::Regex;
use std::path::PathBuf;

use crate::config::REPORT_TITLE;
use crate::error::MergeError;
use crate::validate::ReportValidator;

struct PartMeta {
    first_path: Option<String>,
    last_path: Option<String>,
}

fn split_err(path: &std::path::Path, e: std::io::Error) -> MergeError {
    MergeError::Split {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Write the block stream into one or more part files.
///
/// `name_for` maps a part suffix (`""`, `-part1of3`, `-tmp-part1`) to an
/// output path. Every block is fed to the validator before it is buffered;
/// continuation headers are split artifacts and bypass it. Returns the
/// canonical part paths in order.
pub fn write_parts<I, F>(
    blocks: I,
    split_size: u64,
    validator: &mut ReportValidator,
    name_for: F,
) -> Result<Vec<PathBuf>, MergeError>
where
    I: Iterator<Item = String>,
    F: Fn(&str) -> PathBuf,
{
    let path_re = Regex::new(r"\*\*Path:\*\* `(.+?)`").expect("static regex");

    let mut tmp_paths: Vec<PathBuf> = Vec::new();
    let mut parts_meta: Vec<PartMeta> = Vec::new();

    let mut current: Vec<String> = Vec::new();
    let mut current_size: u64 = 0;
    let mut real_blocks: usize = 0;
    let mut current_paths: Vec<String> = Vec::new();
    let mut part_num: usize = 1;

    let flush = |current: &mut Vec<String>,
                     current_paths: &mut Vec<String>,
                     part_num: &mut usize,
                     tmp_paths: &mut Vec<PathBuf>,
                     parts_meta: &mut Vec<PartMeta>|
     -> Result<(), MergeError> {
        if current.is_empty() {
            return Ok(());
        }
        parts_meta.push(PartMeta {
            first_path: current_paths.first().cloned(),
            last_path: current_paths.last().cloned(),
        });
        current_paths.clear();

        let out_path = name_for(&format!("-tmp-part{part_num}"));
        std::fs::write(&out_path, current.concat()).map_err(|e| split_err(&out_path, e))?;
        tmp_paths.push(out_path);
        *part_num += 1;
        current.clear();
        Ok(())
    };

    for block in blocks {
        validator.feed(&block)?;
        let block_len = block.len() as u64;
        let block_path = path_re
            .captures(&block)
            .map(|cap| cap[1].to_string());

        if split_size > 0 && current_size + block_len > split_size && real_blocks >= 1 {
            flush(
                &mut current,
                &mut current_paths,
                &mut part_num,
                &mut tmp_paths,
                &mut parts_meta,
            )?;
            // Seed the next part with a continuation header; rewritten to
            // its final `(Part i/N)` form during finalization.
            let header = format!("# {REPORT_TITLE} (Part {part_num})\n\n");
            current_size = header.len() as u64;
            current.push(header);
            real_blocks = 0;
        }

        current.push(block);
        current_size += block_len;
        real_blocks += 1;
        if let Some(p) = block_path {
            current_paths.push(p);
        }
    }
    flush(
        &mut current,
        &mut current_paths,
        &mut part_num,
        &mut tmp_paths,
        &mut parts_meta,
    )?;

    finalize_parts(tmp_paths, parts_meta, name_for)
}

/// Rewrite headers, inject signatures, rename temp parts to canonical names.
fn finalize_parts<F>(
    tmp_paths: Vec<PathBuf>,
    parts_meta: Vec<PartMeta>,
    name_for: F,
) -> Result<Vec<PathBuf>, MergeError>
where
    F: Fn(&str) -> PathBuf,
{
    let total = tmp_paths.len();
    let mut final_paths: Vec<PathBuf> = Vec::new();
    let title_prefix = format!("# {REPORT_TITLE}");

    for (idx0, tmp_path) in tmp_paths.into_iter().enumerate() {
        let idx = idx0 + 1;
        let text = std::fs::read_to_string(&tmp_path).map_err(|e| split_err(&tmp_path, e))?;

        let mut lines: Vec<String> = text.split_inclusive('\n').map(String::from).collect();
        for i in 0..lines.len() {
            let stripped = lines[i].trim_start_matches('\u{feff}');
            if !stripped.starts_with(&title_prefix) {
                continue;
            }
            lines[i] = format!("# {REPORT_TITLE} (Part {idx}/{total})\n");

            if total > 1 {
                let meta = &parts_meta[idx0];
                let range = match (&meta.first_path, &meta.last_path) {
                    (Some(first), Some(last)) => format!("{first} ... {last}"),
                    _ => "Meta/Structure/Index".to_string(),
                };
                let prev_name = if idx > 1 {
                    name_for(&format!("-part{}of{total}", idx - 1))
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_else(|| "none".to_string())
                } else {
                    "none".to_string()
                };
                let signature = format!(
                    "<!-- part_signature:\n  part_index: {idx}\n  part_total: {total}\n  continuation_of: \"{prev_name}\"\n  range: \"{range}\"\n-->\n**[Part {idx}/{total}]** continuation_of: `{prev_name}` · range: `{range}`\n\n"
                );
                lines.insert(i + 1, signature);
            }
            break;
        }

        let suffix = if total == 1 {
            String::new()
        } else {
            format!("-part{idx}of{total}")
        };
        let final_path = name_for(&suffix);
        std::fs::write(&final_path, lines.concat()).map_err(|e| split_err(&final_path, e))?;
        std::fs::remove_file(&tmp_path).map_err(|e| split_err(&tmp_path, e))?;
        final_paths.push(final_path);
    }

    Ok(final_paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name_for_in(dir: &std::path::Path) -> impl Fn(&str) -> PathBuf + '_ {
        move |suffix: &str| dir.join(format!("repo-full-dev{suffix}-250801-1200_merge.md"))
    }

    fn blocks_for(report_blocks: &[&str]) -> Vec<String> {
        report_blocks.iter().map(|s| s.to_string()).collect()
    }

    fn head_blocks() -> Vec<String> {
        blocks_for(&[
            "# Merge Report\n\n## Source & Profile\n\n## Profile Description\n\n## Reading Plan\n\n",
            "## Plan\n\n",
            "## 🧾 Manifest\n\n",
            "<!-- START_OF_CONTENT -->\n",
            "## 📄 Content\n\n",
        ])
    }

    #[test]
    fn single_part_gets_unconditional_part_marker() {
        let tmp = TempDir::new().unwrap();
        let mut v = ReportValidator::new(false);
        let paths = write_parts(head_blocks().into_iter(), 0, &mut v, name_for_in(tmp.path())).unwrap();
        v.finish().unwrap();

        assert_eq!(paths.len(), 1);
        assert!(!paths[0].to_string_lossy().contains("part"));
        let text = std::fs::read_to_string(&paths[0]).unwrap();
        assert!(text.starts_with("# Merge Report (Part 1/1)\n"), "{}", &text[..40]);
        assert!(!text.contains("part_signature"));
    }

    #[test]
    fn splits_at_block_boundaries_with_signatures() {
        let tmp = TempDir::new().unwrap();
        let mut blocks = head_blocks();
        for i in 0..4 {
            blocks.push(format!(
                "---\n**Path:** `src/file{i}.py`\n\n```python\n{}\n```\n\n",
                "x".repeat(300)
            ));
        }
        let mut v = ReportValidator::new(false);
        let paths =
            write_parts(blocks.into_iter(), 400, &mut v, name_for_in(tmp.path())).unwrap();
        v.finish().unwrap();

        assert!(paths.len() > 1, "must split: {paths:?}");
        let total = paths.len();
        for (i, p) in paths.iter().enumerate() {
            let name = p.file_name().unwrap().to_string_lossy().to_string();
            assert!(name.contains(&format!("-part{}of{total}", i + 1)), "{name}");
            let text = std::fs::read_to_string(p).unwrap();
            assert!(
                text.starts_with(&format!("# Merge Report (Part {}/{total})\n", i + 1)),
                "part {i} header wrong"
            );
            assert!(text.contains("part_signature"));
            if i == 0 {
                assert!(text.contains("continuation_of: \"none\""));
            } else {
                let prev = paths[i - 1].file_name().unwrap().to_string_lossy();
                assert!(
                    text.contains(&format!("continuation_of: \"{prev}\"")),
                    "part {i} must name its predecessor"
                );
            }
        }

        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains("tmp-part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn no_block_is_ever_split() {
        let tmp = TempDir::new().unwrap();
        let big = format!("---\n**Path:** `big.py`\n\n```python\n{}\n```\n\n", "y".repeat(2_000));
        let mut blocks = head_blocks();
        blocks.push(big.clone());
        let mut v = ReportValidator::new(false);
        let paths = write_parts(blocks.into_iter(), 300, &mut v, name_for_in(tmp.path())).unwrap();

        let combined: String = paths
            .iter()
            .map(|p| std::fs::read_to_string(p).unwrap())
            .collect();
        // The oversized block survives intact in exactly one part.
        assert!(combined.contains(&big));
        assert_eq!(
            paths
                .iter()
                .filter(|p| std::fs::read_to_string(p).unwrap().contains("y".repeat(2_000).as_str()))
                .count(),
            1
        );
    }

    #[test]
    fn range_line_reflects_first_and_last_paths() {
        let tmp = TempDir::new().unwrap();
        let mut blocks = head_blocks();
        blocks.push("---\n**Path:** `a.py`\n\ncontent-a\n\n".to_string());
        blocks.push("---\n**Path:** `b.py`\n\ncontent-b\n\n".to_string());
        blocks.push(format!("---\n**Path:** `c.py`\n\n{}\n\n", "z".repeat(500)));
        let mut v = ReportValidator::new(false);
        let paths = write_parts(blocks.into_iter(), 260, &mut v, name_for_in(tmp.path())).unwrap();

        let first = std::fs::read_to_string(&paths[0]).unwrap();
        // The head part carries no file paths.
        assert!(first.contains("range: \"Meta/Structure/Index\"") || first.contains("range: \"a.py"));
        let last = std::fs::read_to_string(paths.last().unwrap()).unwrap();
        assert!(last.contains("range: \"c.py ... c.py\""));
    }

    #[test]
    fn write_failure_carries_the_partial_path() {
        let missing = std::path::Path::new("/definitely/missing/dir");
        let mut v = ReportValidator::new(false);
        let err = write_parts(
            head_blocks().into_iter(),
            0,
            &mut v,
            |suffix: &str| missing.join(format!("x{suffix}.md")),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::Split { .. }), "{err}");
    }
}

//! Streaming structure validator.
//!
//! Fed block-by-block as the report is written (a tee next to the file
//! sink). Tracks fenced code blocks with a stack keyed by fence length —
//! only a fence of equal-or-longer length closes one of equal-or-shorter
//! length — so heading-like lines inside embedded file content never
//! confuse the section state machine.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::REPORT_TITLE;
use crate::error::MergeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Header,
    SourceProfile,
    ProfileDesc,
    ReadingPlan,
    Plan,
    Structure,
    Index,
    Manifest,
    Content,
}

impl Step {
    fn order(self) -> u32 {
        match self {
            Step::Header => 0,
            Step::SourceProfile => 10,
            Step::ProfileDesc => 20,
            Step::ReadingPlan => 30,
            Step::Plan => 40,
            Step::Structure => 50,
            Step::Index => 55,
            Step::Manifest => 60,
            Step::Content => 70,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Step::Header => "header",
            Step::SourceProfile => "source_profile",
            Step::ProfileDesc => "profile_desc",
            Step::ReadingPlan => "reading_plan",
            Step::Plan => "plan",
            Step::Structure => "structure",
            Step::Index => "index",
            Step::Manifest => "manifest",
            Step::Content => "content",
        }
    }
}

pub struct ReportValidator {
    plan_only: bool,
    state_idx: u32,
    seen: BTreeSet<&'static str>,
    buffer: String,
    fence_stack: Vec<usize>,
    anchors: BTreeMap<String, usize>,
    anchor_re: Regex,
    index_re: Regex,
    content_re: Regex,
}

impl ReportValidator {
    pub fn new(plan_only: bool) -> ReportValidator {
        ReportValidator {
            plan_only,
            state_idx: 0,
            seen: BTreeSet::new(),
            buffer: String::new(),
            fence_stack: Vec::new(),
            anchors: BTreeMap::new(),
            anchor_re: Regex::new(r#"<a id="([^"]+)"></a>"#).expect("static regex"),
            index_re: Regex::new(r"^##\s*(?:🧭\s*)?index\s*$").expect("static regex"),
            content_re: Regex::new(r"^#{1,2}\s*(?:📄\s*)?content\s*$").expect("static regex"),
        }
    }

    /// Feed one chunk (usually one renderer block).
    pub fn feed(&mut self, chunk: &str) -> Result<(), MergeError> {
        self.buffer.push_str(chunk);
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            self.check_line(line.trim_end_matches('\n'))?;
        }
        Ok(())
    }

    fn leading_fence_len(stripped: &str) -> Option<usize> {
        if !stripped.starts_with("```") {
            return None;
        }
        Some(stripped.chars().take_while(|c| *c == '`').count())
    }

    fn in_fence(&self) -> bool {
        !self.fence_stack.is_empty()
    }

    fn check_line(&mut self, line: &str) -> Result<(), MergeError> {
        let stripped = line.trim();

        if let Some(len) = Self::leading_fence_len(stripped) {
            match self.fence_stack.last().copied() {
                None => self.fence_stack.push(len),
                Some(top) if len > top => self.fence_stack.push(len),
                Some(top) if len >= top => {
                    self.fence_stack.pop();
                }
                // Shorter fence inside an open one: embedded content.
                Some(_) => {}
            }
            return Ok(());
        }

        if self.in_fence() {
            return Ok(());
        }

        for cap in self.anchor_re.captures_iter(stripped) {
            *self.anchors.entry(cap[1].to_string()).or_insert(0) += 1;
        }

        if !stripped.starts_with('#') {
            return Ok(());
        }

        if let Some(step) = self.classify_heading(stripped) {
            self.enforce_order(step)?;
        }
        Ok(())
    }

    fn classify_heading(&self, stripped: &str) -> Option<Step> {
        let lower = stripped.to_lowercase();
        let is_h2 = stripped.starts_with("## ") && !stripped.starts_with("###");

        if stripped.starts_with(&format!("# {REPORT_TITLE}")) {
            return Some(Step::Header);
        }
        if lower.contains("source & profile") {
            return Some(Step::SourceProfile);
        }
        if lower.contains("profile description") {
            return Some(Step::ProfileDesc);
        }
        if lower.contains("reading plan") {
            return Some(Step::ReadingPlan);
        }
        if stripped == "## Plan" {
            return Some(Step::Plan);
        }
        if is_h2 && lower.contains("structure") {
            return Some(Step::Structure);
        }
        if is_h2 && lower.contains("manifest") {
            return Some(Step::Manifest);
        }
        if self.content_re.is_match(&lower) {
            return Some(Step::Content);
        }
        // Only the report's own Index heading counts; headings merely
        // containing the word "index" must not trip the state machine.
        if is_h2 && self.index_re.is_match(&lower) {
            return Some(Step::Index);
        }
        None
    }

    fn enforce_order(&mut self, step: Step) -> Result<(), MergeError> {
        let new_idx = step.order();
        if new_idx < self.state_idx {
            return Err(MergeError::Structure(format!(
                "section `{}` (order {new_idx}) appeared after order {} — invariant section order violated",
                step.name(),
                self.state_idx
            )));
        }
        self.state_idx = new_idx;
        self.seen.insert(step.name());
        Ok(())
    }

    /// Finalize: flush the tail, check required sections and anchor
    /// uniqueness.
    pub fn finish(mut self) -> Result<(), MergeError> {
        if !self.buffer.is_empty() {
            let tail = std::mem::take(&mut self.buffer);
            self.check_line(&tail)?;
        }

        let mut required: Vec<&'static str> = vec![
            "header",
            "source_profile",
            "profile_desc",
            "reading_plan",
            "plan",
        ];
        if !self.plan_only {
            required.push("manifest");
            required.push("content");
        }
        for req in required {
            if !self.seen.contains(req) {
                return Err(MergeError::Structure(format!(
                    "missing required section: {req}"
                )));
            }
        }

        let duplicates: Vec<&String> = self
            .anchors
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(anchor, _)| anchor)
            .collect();
        if !duplicates.is_empty() {
            return Err(MergeError::Structure(format!(
                "duplicate HTML anchor id(s): {}",
                duplicates
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        Ok(())
    }

    /// Validate a complete report in one call.
    pub fn validate_full(mut self, report: &str) -> Result<(), MergeError> {
        self.feed(report)?;
        self.finish()
    }
}

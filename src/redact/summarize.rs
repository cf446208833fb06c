//! Readable summaries of a masked diff report.
//!
//! A diff report is split back into its comparison sections and each
//! section that has differences is handed to a [`TextBackend`]. A failed
//! request is written into its own section and does not stop the rest.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::client::{summary_prompt, TextBackend, SUMMARY_SYSTEM_PROMPT};
use crate::error::FormdiffError;

use super::diff::{DIFF_REPORT_TITLE, SECTION_RULE};

/// File name of the summary written by [`summarize_report_file`].
pub const READABLE_REPORT_FILE: &str = "readable_diff_report.txt";

/// One comparison section read back from a diff report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffSection {
    /// The `Comparison: A vs B` line.
    pub comparison: String,
    /// Non-blank body lines, joined with newlines.
    pub diff: String,
}

impl DiffSection {
    pub fn has_differences(&self) -> bool {
        !self.diff.contains("No Differences Found")
    }
}

/// Result for one section of the readable report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionSummary {
    NoDifferences,
    Summarized { summary: String },
    Failed { error: String },
}

/// Split diff report text into its comparison sections.
///
/// Title lines, blank lines and section rules are dropped.
pub fn parse_diff_report(text: &str) -> Vec<DiffSection> {
    let mut sections: Vec<DiffSection> = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with("Comparison:") {
            if let Some(last) = sections.last_mut() {
                last.diff = lines.join("\n");
            }
            lines.clear();
            sections.push(DiffSection {
                comparison: line.to_string(),
                diff: String::new(),
            });
        } else if line.starts_with(DIFF_REPORT_TITLE) || line.starts_with("Generated:") {
            continue;
        } else if !sections.is_empty() && !line.trim().is_empty() && !is_rule(line) {
            lines.push(line);
        }
    }
    if let Some(last) = sections.last_mut() {
        last.diff = lines.join("\n");
    }

    tracing::info!(sections = sections.len(), "extracted comparison sections");
    sections
}

/// Summarize every section with differences, in report order.
pub fn summarize_sections<B>(sections: &[DiffSection], backend: &B) -> Vec<SectionSummary>
where
    B: TextBackend + ?Sized,
{
    sections
        .iter()
        .map(|section| {
            if !section.has_differences() {
                return SectionSummary::NoDifferences;
            }
            let prompt = summary_prompt(&section.comparison, &section.diff);
            match backend.complete(SUMMARY_SYSTEM_PROMPT, &prompt) {
                Ok(summary) => {
                    tracing::info!(comparison = %section.comparison, "generated summary");
                    SectionSummary::Summarized { summary }
                }
                Err(err) => {
                    tracing::warn!(
                        comparison = %section.comparison,
                        error = %err,
                        "summary failed"
                    );
                    SectionSummary::Failed {
                        error: err.to_string(),
                    }
                }
            }
        })
        .collect()
}

/// Render the readable report.
pub fn render_readable_report(sections: &[DiffSection], summaries: &[SectionSummary]) -> String {
    let mut out = String::from("Readable Comparison Report\n\n");
    for (section, summary) in sections.iter().zip(summaries) {
        out.push_str(&section.comparison);
        out.push('\n');
        out.push_str(SECTION_RULE);
        out.push('\n');
        match summary {
            SectionSummary::NoDifferences => out.push_str("No significant differences detected.\n"),
            SectionSummary::Summarized { summary } => {
                out.push_str(summary);
                out.push('\n');
            }
            SectionSummary::Failed { error } => {
                out.push_str("Error generating summary: ");
                out.push_str(error);
                out.push('\n');
            }
        }
        out.push('\n');
        out.push_str(SECTION_RULE);
        out.push_str("\n\n");
    }
    out
}

/// Outcome of summarizing one report file.
#[derive(Clone, Debug, Serialize)]
pub struct SummaryRun {
    pub output: PathBuf,
    pub sections: usize,
    pub failed: usize,
}

/// Read `input`, summarize it and write [`READABLE_REPORT_FILE`] into `out_dir`.
pub fn summarize_report_file<B>(
    input: &Path,
    out_dir: &Path,
    backend: &B,
) -> Result<SummaryRun, FormdiffError>
where
    B: TextBackend + ?Sized,
{
    if !input.is_file() {
        return Err(FormdiffError::Input {
            path: input.to_path_buf(),
            message: "diff report not found".to_string(),
        });
    }
    let text = std::fs::read_to_string(input).map_err(|source| FormdiffError::Input {
        path: input.to_path_buf(),
        message: format!("failed to read diff report: {source}"),
    })?;

    let sections = parse_diff_report(&text);
    let summaries = summarize_sections(&sections, backend);

    std::fs::create_dir_all(out_dir).map_err(|source| FormdiffError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let output = out_dir.join(READABLE_REPORT_FILE);
    std::fs::write(&output, render_readable_report(&sections, &summaries)).map_err(|source| {
        FormdiffError::Write {
            path: output.clone(),
            source,
        }
    })?;
    tracing::info!(path = %output.display(), "readable report written");

    let failed = summaries
        .iter()
        .filter(|s| matches!(s, SectionSummary::Failed { .. }))
        .count();
    Ok(SummaryRun {
        output,
        sections: sections.len(),
        failed,
    })
}

fn is_rule(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c == '=')
}

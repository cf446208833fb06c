//! Pairwise line diffs of extracted document text.
//!
//! Every unordered pair of documents gets one section holding a unified
//! diff of their lines. The same sections render twice: once verbatim and
//! once with the diff body passed through the PII masker.

use std::fmt::Write as _;

use serde::Serialize;
use similar::TextDiff;

use crate::pairs::{generate_pairs, ImagePair};

/// Separator line framing every section.
pub const SECTION_RULE: &str =
    "================================================================================";

/// First line of every diff report.
pub const DIFF_REPORT_TITLE: &str = "Document Comparison Report";

/// Text extracted from one document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub id: String,
    pub text: String,
}

/// Diff between two documents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextComparison {
    pub pair: ImagePair,
    pub first_id: String,
    pub second_id: String,
    /// Unified diff, or `None` when the texts have the same lines.
    pub diff: Option<String>,
}

impl TextComparison {
    pub fn header(&self) -> String {
        format!("Comparison: {} vs {}", self.first_id, self.second_id)
    }

    /// Section body as written to the unmasked report.
    pub fn body(&self) -> String {
        match &self.diff {
            Some(diff) => format!("Differences Found:\n{diff}"),
            None => "No Differences Found\n".to_string(),
        }
    }
}

/// Unified diff of the lines of `first` against `second`.
///
/// Line endings are normalised first, so texts that differ only in a final
/// newline or in `\r\n` compare equal.
pub fn unified_line_diff(
    first: &str,
    second: &str,
    first_id: &str,
    second_id: &str,
) -> Option<String> {
    let old = normalise_lines(first);
    let new = normalise_lines(second);
    if old == new {
        return None;
    }

    let diff = TextDiff::from_lines(old.as_str(), new.as_str());
    let rendered = diff
        .unified_diff()
        .context_radius(3)
        .missing_newline_hint(false)
        .header(first_id, second_id)
        .to_string();
    Some(rendered)
}

/// Diff every unordered pair of `documents`, in pair-generation order.
pub fn compare_documents(documents: &[ExtractedDocument]) -> Vec<TextComparison> {
    generate_pairs(documents.len())
        .into_iter()
        .map(|pair| {
            let (first, second) = (&documents[pair.first], &documents[pair.second]);
            tracing::info!("Comparing {} with {}", first.id, second.id);
            TextComparison {
                pair,
                first_id: first.id.clone(),
                second_id: second.id.clone(),
                diff: unified_line_diff(&first.text, &second.text, &first.id, &second.id),
            }
        })
        .collect()
}

/// Render the report, passing each section body through `mask`.
pub fn render_diff_report<F>(comparisons: &[TextComparison], mut mask: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = format!("{DIFF_REPORT_TITLE}\n\n");
    for comparison in comparisons {
        let body = mask(&comparison.body());
        let _ = write!(
            out,
            "{}\n{SECTION_RULE}\n{body}\n{SECTION_RULE}\n\n",
            comparison.header()
        );
    }
    out
}

fn normalise_lines(text: &str) -> String {
    text.lines().fold(String::with_capacity(text.len() + 1), |mut out, line| {
        out.push_str(line);
        out.push('\n');
        out
    })
}

//! Comparison report types, text formatting and the report writer.

use std::fmt;
use std::path::Path;

use serde::{Serialize, Serializer};

use crate::error::{ComparisonError, FormdiffError};
use crate::pairs::ImagePair;
use crate::response::parse_differences;

/// Outcome of comparing one pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonOutcome {
    /// The backend answered; the text is kept verbatim.
    Succeeded { response: String },
    /// The pair could not be compared.
    Failed {
        #[serde(serialize_with = "serialize_display")]
        error: ComparisonError,
    },
}

/// One section of the report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    pub pair: ImagePair,
    pub first_id: String,
    pub second_id: String,
    #[serde(flatten)]
    pub outcome: ComparisonOutcome,
}

impl ComparisonResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ComparisonOutcome::Succeeded { .. })
    }

    /// Numbered difference statements, if the answer has any.
    pub fn differences(&self) -> Option<Vec<String>> {
        match &self.outcome {
            ComparisonOutcome::Succeeded { response } => parse_differences(response).ok(),
            ComparisonOutcome::Failed { .. } => None,
        }
    }

    /// Header line identifying both images.
    pub fn header(&self) -> String {
        format!("Comparison between {} and {}:", self.first_id, self.second_id)
    }
}

/// All pair results for one batch, in pair-generation order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    /// Backend model that produced the answers.
    pub model: String,
    /// True if the batch was stopped before every pair was attempted.
    pub cancelled: bool,
    pub results: Vec<ComparisonResult>,
}

impl ComparisonReport {
    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.succeeded_count()
    }
}

impl fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, result) in self.results.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", result.header())?;
            match &result.outcome {
                ComparisonOutcome::Succeeded { response } => {
                    writeln!(f, "{}", response.trim_end())?;
                }
                ComparisonOutcome::Failed { error } => {
                    writeln!(f, "Comparison failed: {error}")?;
                }
            }
        }
        Ok(())
    }
}

/// Serialization format of the report artifact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Render `report` in the given format.
pub fn render_report(
    report: &ComparisonReport,
    format: ReportFormat,
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(report.to_string()),
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(report)?;
            json.push('\n');
            Ok(json)
        }
    }
}

/// Write `report` to `path`, replacing any existing file.
pub fn write_report(
    report: &ComparisonReport,
    path: &Path,
    format: ReportFormat,
) -> Result<(), FormdiffError> {
    let rendered = render_report(report, format).map_err(|source| FormdiffError::ReportSerialize {
        path: path.to_path_buf(),
        source,
    })?;

    std::fs::write(path, rendered).map_err(|source| FormdiffError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!(
        path = %path.display(),
        sections = report.results.len(),
        "comparison report written"
    );
    Ok(())
}

fn serialize_display<T: fmt::Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

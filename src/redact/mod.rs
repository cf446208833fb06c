//! PII redaction pipeline: OCR, entity detection, anonymization.
//!
//! Each stage sits behind a trait so that heavier engines can replace the
//! built-in ones. The defaults are [`OcrExtractor`], [`PatternDetector`] and
//! [`ReplaceAnonymizer`]. With two or more documents the run also writes
//! pairwise text diff reports, and [`summarize`] turns the masked one into a
//! readable summary.

pub mod detect;
pub mod diff;
pub mod ocr;
pub mod summarize;

pub use detect::{DetectedEntity, EntityKind, PatternDetector, DEFAULT_SCORE_THRESHOLD};
pub use diff::{compare_documents, render_diff_report, ExtractedDocument, TextComparison};
pub use ocr::{OcrExtractor, DEFAULT_OCR_COMMAND};
pub use summarize::{summarize_report_file, SummaryRun, READABLE_REPORT_FILE};

/// Unmasked pairwise diff report.
pub const DIFF_REPORT_FILE: &str = "diff_report.txt";

/// Diff report with every section body masked.
pub const MASKED_DIFF_REPORT_FILE: &str = "diff_report_masked.txt";

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::FormdiffError;
use crate::source::{self, SourceOptions};

/// Image or text file to plain text.
pub trait TextExtractor {
    fn extract(&self, path: &Path) -> Result<String, FormdiffError>;
}

/// Text to PII spans.
pub trait EntityDetector {
    /// Non-overlapping entities ordered by start offset.
    fn detect(&self, text: &str) -> Vec<DetectedEntity>;
}

/// Text plus spans to redacted text.
pub trait Anonymizer {
    fn anonymize(&self, text: &str, entities: &[DetectedEntity]) -> String;
}

/// Replaces every entity with `<ENTITY_TYPE>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplaceAnonymizer;

impl Anonymizer for ReplaceAnonymizer {
    fn anonymize(&self, text: &str, entities: &[DetectedEntity]) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for entity in entities {
            if entity.start < cursor
                || entity.end > text.len()
                || !text.is_char_boundary(entity.start)
                || !text.is_char_boundary(entity.end)
            {
                continue;
            }
            out.push_str(&text[cursor..entity.start]);
            out.push('<');
            out.push_str(entity.kind.as_str());
            out.push('>');
            cursor = entity.end;
        }
        out.push_str(&text[cursor..]);
        out
    }
}

/// Options for [`redact_directory`].
#[derive(Clone, Debug)]
pub struct RedactOptions {
    pub source: SourceOptions,
}

impl Default for RedactOptions {
    fn default() -> Self {
        Self {
            source: SourceOptions {
                marker: String::new(),
                extensions: ["jpg", "jpeg", "png", "pdf", "txt"]
                    .iter()
                    .map(|e| e.to_string())
                    .collect(),
                ..SourceOptions::default()
            },
        }
    }
}

/// Redact a single text.
pub fn mask_text<D, A>(text: &str, detector: &D, anonymizer: &A) -> (String, Vec<DetectedEntity>)
where
    D: EntityDetector + ?Sized,
    A: Anonymizer + ?Sized,
{
    let entities = detector.detect(text);
    (anonymizer.anonymize(text, &entities), entities)
}

/// One redacted document.
#[derive(Clone, Debug, Serialize)]
pub struct RedactedDocument {
    pub id: String,
    pub output: PathBuf,
    /// Count of masked entities per type.
    pub entities: BTreeMap<EntityKind, usize>,
}

/// A document that could not be processed.
#[derive(Clone, Debug, Serialize)]
pub struct SkippedDocument {
    pub id: String,
    pub reason: String,
}

/// Paths of the pairwise diff reports.
#[derive(Clone, Debug, Serialize)]
pub struct DiffReports {
    pub plain: PathBuf,
    pub masked: PathBuf,
    pub comparisons: usize,
    pub with_differences: usize,
}

/// Outcome of a directory redaction run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RedactSummary {
    pub documents: Vec<RedactedDocument>,
    pub skipped: Vec<SkippedDocument>,
    /// Present when at least two documents produced text.
    pub diff_reports: Option<DiffReports>,
}

impl RedactSummary {
    pub fn entity_total(&self) -> usize {
        self.documents
            .iter()
            .flat_map(|d| d.entities.values())
            .sum()
    }
}

impl fmt::Display for RedactSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Redacted {} document(s), {} entit{} masked, {} skipped",
            self.documents.len(),
            self.entity_total(),
            if self.entity_total() == 1 { "y" } else { "ies" },
            self.skipped.len()
        )?;
        for doc in &self.documents {
            let counts: Vec<String> = doc
                .entities
                .iter()
                .map(|(kind, n)| format!("{kind}={n}"))
                .collect();
            let counts = if counts.is_empty() {
                "(none)".to_string()
            } else {
                counts.join(", ")
            };
            writeln!(f, "  - {} -> {}: {}", doc.id, doc.output.display(), counts)?;
        }
        for skipped in &self.skipped {
            writeln!(f, "  ! {} skipped: {}", skipped.id, skipped.reason)?;
        }
        if let Some(reports) = &self.diff_reports {
            writeln!(
                f,
                "Compared {} pair(s), {} with differences: {}, {}",
                reports.comparisons,
                reports.with_differences,
                reports.plain.display(),
                reports.masked.display()
            )?;
        }
        Ok(())
    }
}

/// Extract, detect and mask every matching file in `dir`.
///
/// Writes `masked_<file name>.txt` into `out_dir` for each document, replacing
/// existing files. A document whose text cannot be extracted, or that yields
/// no text, is skipped and reported; failing to write output is fatal. When
/// two or more documents remain, [`DIFF_REPORT_FILE`] and
/// [`MASKED_DIFF_REPORT_FILE`] are written too.
pub fn redact_directory<E, D, A>(
    dir: &Path,
    out_dir: &Path,
    extractor: &E,
    detector: &D,
    anonymizer: &A,
    opts: &RedactOptions,
) -> Result<RedactSummary, FormdiffError>
where
    E: TextExtractor + ?Sized,
    D: EntityDetector + ?Sized,
    A: Anonymizer + ?Sized,
{
    let files = source::collect_matching_files(dir, &opts.source)?;
    if files.is_empty() {
        return Err(FormdiffError::Input {
            path: dir.to_path_buf(),
            message: "no matching documents to redact".to_string(),
        });
    }

    std::fs::create_dir_all(out_dir).map_err(|source| FormdiffError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut summary = RedactSummary::default();
    let mut extracted = Vec::new();
    for path in files {
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let text = match extractor.extract(&path) {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(document = %id, "no text extracted, skipping");
                summary.skipped.push(SkippedDocument {
                    id,
                    reason: "no text extracted".to_string(),
                });
                continue;
            }
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(document = %id, error = %err, "skipping document");
                summary.skipped.push(SkippedDocument {
                    id,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let (masked, entities) = mask_text(&text, detector, anonymizer);
        let output = out_dir.join(format!("masked_{id}.txt"));
        std::fs::write(&output, masked).map_err(|source| FormdiffError::Write {
            path: output.clone(),
            source,
        })?;

        let mut counts: BTreeMap<EntityKind, usize> = BTreeMap::new();
        for entity in &entities {
            *counts.entry(entity.kind).or_default() += 1;
        }
        tracing::info!(document = %id, masked = entities.len(), "masked document saved");

        summary.documents.push(RedactedDocument {
            id: id.clone(),
            output,
            entities: counts,
        });
        extracted.push(ExtractedDocument { id, text });
    }

    if extracted.len() >= 2 {
        summary.diff_reports = Some(write_diff_reports(
            &extracted, out_dir, detector, anonymizer,
        )?);
    } else {
        tracing::info!(documents = extracted.len(), "too few documents for diff reports");
    }

    Ok(summary)
}

fn write_diff_reports<D, A>(
    documents: &[ExtractedDocument],
    out_dir: &Path,
    detector: &D,
    anonymizer: &A,
) -> Result<DiffReports, FormdiffError>
where
    D: EntityDetector + ?Sized,
    A: Anonymizer + ?Sized,
{
    let comparisons = compare_documents(documents);
    let plain = out_dir.join(DIFF_REPORT_FILE);
    let masked = out_dir.join(MASKED_DIFF_REPORT_FILE);

    let reports = [
        (&plain, render_diff_report(&comparisons, str::to_string)),
        (
            &masked,
            render_diff_report(&comparisons, |body| mask_text(body, detector, anonymizer).0),
        ),
    ];
    for (path, text) in reports {
        std::fs::write(path, text).map_err(|source| FormdiffError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "diff report written");
    }

    Ok(DiffReports {
        comparisons: comparisons.len(),
        with_differences: comparisons.iter().filter(|c| c.diff.is_some()).count(),
        plain,
        masked,
    })
}

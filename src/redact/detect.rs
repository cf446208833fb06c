//! Pattern-based PII detection.

use std::fmt;

use regex::Regex;
use serde::Serialize;

use super::EntityDetector;

/// Category of a detected entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Ssn,
    PhoneNumber,
    EmailAddress,
    Person,
    PolicyNumber,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Ssn => "SSN",
            EntityKind::PhoneNumber => "PHONE_NUMBER",
            EntityKind::EmailAddress => "EMAIL_ADDRESS",
            EntityKind::Person => "PERSON",
            EntityKind::PolicyNumber => "POLICY_NUMBER",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PII span found in a text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectedEntity {
    pub kind: EntityKind,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    pub score: f64,
}

impl DetectedEntity {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    fn overlaps(&self, other: &DetectedEntity) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Default minimum score for an entity to be reported.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.6;

struct Recognizer {
    kind: EntityKind,
    pattern: Regex,
    score: f64,
}

/// Regex recognizers for identifiers common on tax and registration forms.
///
/// When a pattern has a capture group, only the group is reported, so labels
/// such as `Name:` survive anonymization.
pub struct PatternDetector {
    recognizers: Vec<Recognizer>,
    threshold: f64,
}

impl PatternDetector {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_SCORE_THRESHOLD)
    }

    pub fn with_threshold(threshold: f64) -> Self {
        let specs: [(EntityKind, &str, f64); 6] = [
            (EntityKind::Ssn, r"\b\d{3}-\d{2}-\d{4}\b", 0.9),
            (EntityKind::PhoneNumber, r"\(?\b\d{3}\)?[\s-]?\d{3}-\d{4}\b", 0.95),
            (EntityKind::EmailAddress, r"\b[\w.-]+@[\w.-]+\.\w+\b", 0.8),
            (
                EntityKind::EmailAddress,
                r"[\[(](?:mailto:)?\s*([\w.-]+@[\w.-]+\.\w+)\s*[\])]",
                1.0,
            ),
            (EntityKind::Person, r"(?m)Name:[ \t]*([A-Za-z][A-Za-z .]*?)[ \t]*$", 1.0),
            (
                EntityKind::PolicyNumber,
                r"Insurance Policy Number:\s*(IN-\d{8})\b",
                1.0,
            ),
        ];

        let recognizers = specs
            .into_iter()
            .map(|(kind, pattern, score)| Recognizer {
                kind,
                pattern: Regex::new(pattern).expect("built-in PII pattern compiles"),
                score,
            })
            .collect();

        Self {
            recognizers,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityDetector for PatternDetector {
    fn detect(&self, text: &str) -> Vec<DetectedEntity> {
        let mut candidates = Vec::new();
        for recognizer in &self.recognizers {
            if recognizer.score < self.threshold {
                continue;
            }
            for caps in recognizer.pattern.captures_iter(text) {
                let Some(span) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                if span.is_empty() {
                    continue;
                }
                candidates.push(DetectedEntity {
                    kind: recognizer.kind,
                    start: span.start(),
                    end: span.end(),
                    score: recognizer.score,
                });
            }
        }
        resolve_overlaps(candidates)
    }
}

/// Keep the strongest of any overlapping spans, ordered by position.
///
/// Higher score wins, then the longer span, then the earlier one.
pub fn resolve_overlaps(mut candidates: Vec<DetectedEntity>) -> Vec<DetectedEntity> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.len().cmp(&a.len()))
            .then(a.start.cmp(&b.start))
    });

    let mut kept: Vec<DetectedEntity> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| !k.overlaps(&candidate)) {
            kept.push(candidate);
        }
    }
    kept.sort_by_key(|e| e.start);
    kept
}

//! Optional structure checks on model answers.
//!
//! The client treats answers as opaque text. This stage splits an answer into
//! its numbered items and can reject lists that fall outside an expected size.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ComparisonError, FormdiffError};

/// Inclusive bounds on the number of difference items.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ItemRange {
    pub min: usize,
    pub max: usize,
}

impl ItemRange {
    pub fn new(min: usize, max: usize) -> Result<Self, FormdiffError> {
        if min == 0 || min > max {
            return Err(FormdiffError::InvalidOption(format!(
                "item range {min}-{max} must satisfy 1 <= min <= max"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, n: usize) -> bool {
        self.as_range().contains(&n)
    }

    fn as_range(&self) -> RangeInclusive<usize> {
        self.min..=self.max
    }
}

impl fmt::Display for ItemRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for ItemRange {
    type Err = FormdiffError;

    /// Accepts `5-7` or a single count such as `6`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim().parse::<usize>().map_err(|_| {
                FormdiffError::InvalidOption(format!(
                    "invalid item range '{s}' (expected e.g. 5-7)"
                ))
            })
        };

        match s.split_once('-') {
            Some((lo, hi)) => ItemRange::new(parse(lo)?, parse(hi)?),
            None => {
                let n = parse(s)?;
                ItemRange::new(n, n)
            }
        }
    }
}

/// Split a numbered list into its items.
///
/// Items start with `N.` or `N)` at the beginning of a line. Following lines
/// that do not start a new item are appended to the current one. Text before
/// the first item is ignored.
pub fn parse_differences(text: &str) -> Result<Vec<String>, ComparisonError> {
    let mut items: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = strip_item_number(trimmed) {
            items.push(rest.to_string());
        } else if let Some(current) = items.last_mut() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(trimmed);
        }
    }

    if items.is_empty() {
        return Err(ComparisonError::MalformedResponse(
            "no numbered items found".to_string(),
        ));
    }
    Ok(items)
}

/// Parse and require the item count to fall within `range`.
pub fn validate_count(text: &str, range: ItemRange) -> Result<Vec<String>, ComparisonError> {
    let items = parse_differences(text)?;
    if !range.contains(items.len()) {
        return Err(ComparisonError::MalformedResponse(format!(
            "expected {range} items, found {}",
            items.len()
        )));
    }
    Ok(items)
}

fn strip_item_number(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    Some(rest.trim_start())
}

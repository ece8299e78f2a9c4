//! Parser for episode range expressions such as `1-3, 7, 10-20:2`.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static RANGE_TERM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d*)-(\d*)(?::(\d+))?\s*$").unwrap());
static SINGLE_TERM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)\s*$").unwrap());

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum SequenceError {
    #[error("Empty sequence")]
    Empty,

    #[error("Invalid range format: {0}")]
    InvalidRange(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Step must be greater than zero: {0}")]
    ZeroStep(String),

    #[error("Range start is greater than its end: {0}")]
    Reversed(String),

    #[error("{term} is out of range 1-{max}")]
    OutOfRange { term: String, max: u32 },
}

pub(crate) type SequenceResult<T> = Result<T, SequenceError>;

/// Parses a comma separated list of numbers and ranges into sorted, distinct
/// positions in `1..=max`.
///
/// A range is written `a-b` or `a-b:step`. A missing `a` means 1, a missing
/// `b` means `max`. The first bad term fails the whole expression.
pub(crate) fn parse(spec: &str, max: u32) -> SequenceResult<Vec<u32>> {
    if spec.trim().is_empty() {
        return Err(SequenceError::Empty);
    }

    let mut numbers = BTreeSet::new();
    for term in spec.split(',') {
        if term.contains('-') {
            numbers.extend(parse_range(term, max)?);
        } else if !term.contains(':') {
            numbers.insert(parse_single(term, max)?);
        } else {
            return Err(SequenceError::UnknownFormat(term.trim().to_string()));
        }
    }

    Ok(numbers.into_iter().collect())
}

fn parse_single(term: &str, max: u32) -> SequenceResult<u32> {
    let trimmed = term.trim();
    let captures = SINGLE_TERM
        .captures(term)
        .ok_or_else(|| SequenceError::InvalidNumber(trimmed.to_string()))?;
    let number = parse_number(&captures[1], trimmed)?;
    if number == 0 || number > max {
        return Err(SequenceError::OutOfRange { term: trimmed.to_string(), max });
    }
    Ok(number)
}

fn parse_range(term: &str, max: u32) -> SequenceResult<impl Iterator<Item = u32>> {
    let trimmed = term.trim();
    let captures = RANGE_TERM
        .captures(term)
        .ok_or_else(|| SequenceError::InvalidRange(trimmed.to_string()))?;

    let bound = |index: usize, default: u32| -> SequenceResult<u32> {
        match captures.get(index).map(|m| m.as_str()) {
            Some(text) if !text.is_empty() => parse_number(text, trimmed),
            _ => Ok(default),
        }
    };
    let start = bound(1, 1)?;
    let end = bound(2, max)?;
    let step = bound(3, 1)?;

    if step == 0 {
        return Err(SequenceError::ZeroStep(trimmed.to_string()));
    }
    if start > end {
        return Err(SequenceError::Reversed(trimmed.to_string()));
    }
    if start == 0 || end > max {
        return Err(SequenceError::OutOfRange { term: trimmed.to_string(), max });
    }

    Ok((start..=end).step_by(step as usize))
}

fn parse_number(text: &str, term: &str) -> SequenceResult<u32> {
    text.parse()
        .map_err(|_| SequenceError::InvalidNumber(term.to_string()))
}

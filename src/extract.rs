//! Positional field extraction for fixed-width report lines.
//!
//! Columns are byte offsets into the raw file, so lines stay as bytes until a
//! single field has been cut out. Only then is the field decoded.

use std::borrow::Cow;
use std::ops::Range;

use crate::clock::clock_seconds;
use crate::error::{ParseError, ParseResult};

/// A raw report line together with its 0-based index, so failures can name it.
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    pub index: usize,
    pub bytes: &'a [u8],
}

impl<'a> Line<'a> {
    /// Returns the trimmed text in `columns`. A line too short to cover the
    /// range is a layout error, never an empty value.
    pub fn field(&self, columns: Range<usize>) -> ParseResult<Cow<'a, str>> {
        self.bytes
            .get(columns.clone())
            .map(|raw| decode(trim_bytes(raw)))
            .ok_or(ParseError::ShortLine {
                line: self.index,
                start: columns.start,
                end: columns.end,
                len: self.bytes.len(),
            })
    }

    /// Integer counter; blank or non-numeric text counts as zero.
    pub fn count(&self, columns: Range<usize>) -> ParseResult<i32> {
        Ok(self.field(columns)?.parse().unwrap_or(0))
    }

    /// Floating-point ratio (CCS, staffed agents); blank counts as zero.
    pub fn ratio(&self, columns: Range<usize>) -> ParseResult<f64> {
        Ok(self.field(columns)?.parse().unwrap_or(0.0))
    }

    /// Clock duration in seconds; blank or malformed text counts as zero.
    pub fn clock(&self, columns: Range<usize>) -> ParseResult<i32> {
        Ok(clock_seconds(&self.field(columns)?))
    }

    /// Integer header value that must be present.
    pub fn required(&self, columns: Range<usize>, field: &'static str) -> ParseResult<i32> {
        let value = self.field(columns)?;
        value.parse().map_err(|_| ParseError::InvalidField {
            field,
            value: value.into_owned(),
            line: self.index,
        })
    }
}

fn trim_bytes(mut raw: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = raw {
        if !first.is_ascii_whitespace() {
            break;
        }
        raw = rest;
    }
    while let [rest @ .., last] = raw {
        if !last.is_ascii_whitespace() {
            break;
        }
        raw = rest;
    }
    raw
}

/// UTF-8 when valid, otherwise Latin-1 (one byte, one char).
fn decode(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(raw.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Splits raw report contents into indexed lines.
pub fn lines(text: &[u8]) -> Vec<Line<'_>> {
    text.split(|&b| b == b'\n')
        .enumerate()
        .map(|(index, bytes)| Line { index, bytes })
        .collect()
}

/// Fetches the line at `index`, failing if the file ends before it.
pub fn line_at<'a>(lines: &[Line<'a>], index: usize) -> ParseResult<Line<'a>> {
    lines.get(index).copied().ok_or(ParseError::MissingLine {
        line: index,
        available: lines.len(),
    })
}

use thiserror::Error;

/// Failures while reading a report's fixed-width layout.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line} is missing (file has {available} lines)")]
    MissingLine { line: usize, available: usize },

    #[error("line {line} is too short for columns {start}..{end} (length {len})")]
    ShortLine {
        line: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("invalid {field} {value:?} on line {line}")]
    InvalidField {
        field: &'static str,
        value: String,
        line: usize,
    },

    #[error("unparsable report timestamp {0:?}")]
    Timestamp(String),

    #[error("report timestamp {0} precedes the unix epoch")]
    BeforeEpoch(i64),

    #[error("file {file:?} is not a {expected} report")]
    WrongType { file: String, expected: &'static str },
}

pub type ParseResult<T> = Result<T, ParseError>;

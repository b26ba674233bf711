use std::io;

use thiserror::Error;

/// Errors raised by the conversion engine itself.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid conversion setup: the session is not even started.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An input or output file could not be opened.
    #[error("failed to open \"{path}\": {reason}")]
    Open { path: String, reason: String },

    /// User requested a cooperative stop through the status sink.
    #[error("aborted by user")]
    Aborted,

    /// Output serialization failure.
    #[error("formatting error: {0}")]
    Formatting(#[from] FormattingError),

    #[error("i/o error: {0}")]
    StdioError(#[from] io::Error),
}

/// Errors raised while formatting RINEX output.
#[derive(Debug, Error)]
pub enum FormattingError {
    #[error("undefined observables")]
    UndefinedObservables,

    #[error("i/o error: {0}")]
    StdioError(#[from] io::Error),
}

/// Errors raised by the RINEX input back-end.
#[derive(Debug, Error)]
pub enum ParsingError {
    #[error("not a rinex file")]
    MissingVersion,

    #[error("file type \"{0}\" is not supported")]
    UnsupportedType(String),

    #[error("rinex revision {0} is not supported as input")]
    UnsupportedRevision(u16),

    #[error("header line parsing: {0}")]
    HeaderLine(String),

    #[error("i/o error: {0}")]
    StdioError(#[from] io::Error),
}

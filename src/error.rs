use std::error;
use std::fmt;
use std::io;
use std::num;
use std::path::{Path, PathBuf};
use std::result;
use std::str;

use csvmap_core::TokenizeError;

use crate::headers::DuplicateHeader;

/// A type alias for `Result<T, csvmap::Error>`.
pub type Result<T> = result::Result<T, Error>;

/// An error that can occur when processing CSV data.
///
/// This error can happen when writing or reading CSV data.
#[derive(Debug)]
pub enum Error {
    /// An I/O error that occurred while writing CSV data.
    Io(io::Error),
    /// A stream-fatal error that occurred while reading CSV data. It carries
    /// the file name, line number and offending text.
    Parse(ParseError),
    /// A row was written whose number of fields differs from the first row
    /// written to the same stream. Nothing was written for that row.
    UnequalLengths {
        /// The number of fields established by the first row.
        expected_len: u64,
        /// The number of fields in the rejected row.
        len: u64,
    },
    /// A value field could not be converted from its text. This fails the
    /// whole row.
    Field(FieldError),
    /// A row was requested after the end of the stream.
    Eof,
}

impl Error {
    /// Returns true if reading may continue after this error.
    ///
    /// Only I/O failures of the underlying stream stop the typed row
    /// sequence; every other error is isolated to the row that caused it.
    pub fn is_recoverable(&self) -> bool {
        match *self {
            Error::Io(_) | Error::Eof => false,
            Error::Parse(ref err) => match err.kind {
                ParseErrorKind::Open(_) | ParseErrorKind::Io(_) => false,
                _ => true,
            },
            Error::UnequalLengths { .. } | Error::Field(_) => true,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<FieldError> for Error {
    fn from(err: FieldError) -> Error {
        Error::Field(err)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            Error::Parse(ref err) => Some(err),
            Error::UnequalLengths { .. } => None,
            Error::Field(ref err) => Some(err),
            Error::Eof => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => err.fmt(f),
            Error::Parse(ref err) => err.fmt(f),
            Error::UnequalLengths { expected_len, len } => write!(
                f,
                "CSV write error: expecting {} columns, {} columns specified",
                expected_len, len
            ),
            Error::Field(ref err) => err.fmt(f),
            Error::Eof => write!(f, "CSV error: end of stream"),
        }
    }
}

/// A stream-fatal error found while reading CSV data.
///
/// Besides the kind of error, this records where it happened: the file (if
/// the reader was opened on a path), the line number and the text of the
/// row being read.
#[derive(Debug)]
pub struct ParseError {
    path: Option<PathBuf>,
    line: u64,
    text: String,
    kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(
        path: Option<&Path>,
        line: u64,
        text: String,
        kind: ParseErrorKind,
    ) -> ParseError {
        ParseError { path: path.map(Path::to_path_buf), line, text, kind }
    }

    /// The path of the file being read, if the reader was opened on a path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref().map(|p| p.as_path())
    }

    /// The line number at which the error occurred.
    ///
    /// For an unterminated quoted field, this is the line on which the row
    /// started.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The text that was being parsed. For rows that exceeded the maximum
    /// length, this is a bounded excerpt.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The kind of this error.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }
}

impl error::Error for ParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self.kind {
            ParseErrorKind::Open(ref err) | ParseErrorKind::Io(ref err) => {
                Some(err)
            }
            ParseErrorKind::Utf8(ref err) => Some(err),
            ParseErrorKind::Tokenize(ref err) => Some(err),
            ParseErrorKind::DuplicateHeader(ref err) => Some(err),
            ParseErrorKind::Column { ref err, .. } => Some(err),
            ParseErrorKind::UnexpectedEof
            | ParseErrorKind::MissingColumn { .. } => None,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let path = match self.path {
            None => "<stream>".to_string(),
            Some(ref path) => path.display().to_string(),
        };
        write!(
            f,
            "CSV parse error: {} in file [{}], line {}",
            self.kind, path, self.line
        )?;
        if !self.text.is_empty() {
            write!(f, "\ntext:\n{}", self.text)?;
        }
        Ok(())
    }
}

/// The kind of a `ParseError`.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// The underlying file could not be opened.
    Open(io::Error),
    /// Reading from the underlying stream failed.
    Io(io::Error),
    /// A line was not valid UTF-8.
    Utf8(Utf8Error),
    /// The tokenizer rejected the row: either a character followed a
    /// closing quote, or the row exceeded the maximum length.
    Tokenize(TokenizeError),
    /// The stream ended inside a quoted field.
    UnexpectedEof,
    /// Two headers share a name, compared case insensitively.
    DuplicateHeader(DuplicateHeader),
    /// A column was requested by a name that is not in the headers.
    MissingColumn {
        /// The requested name.
        name: String,
    },
    /// A column's text could not be converted to the requested type.
    Column {
        /// The column name.
        name: String,
        /// The conversion failure.
        err: ConvertError,
    },
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseErrorKind::Open(ref err) => {
                write!(f, "cannot initialize CSV reader: {}", err)
            }
            ParseErrorKind::Io(ref err) => err.fmt(f),
            ParseErrorKind::Utf8(ref err) => err.fmt(f),
            ParseErrorKind::Tokenize(ref err) => err.fmt(f),
            ParseErrorKind::UnexpectedEof => {
                write!(f, "end of stream reached inside a quoted field")
            }
            ParseErrorKind::DuplicateHeader(ref err) => err.fmt(f),
            ParseErrorKind::MissingColumn { ref name } => {
                write!(f, "no column named '{}'", name)
            }
            ParseErrorKind::Column { ref name, ref err } => {
                write!(f, "could not convert column '{}': {}", name, err)
            }
        }
    }
}

/// An error converting one field of a row into a typed record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldError {
    field: String,
    err: ConvertError,
}

impl FieldError {
    pub(crate) fn new(field: &str, err: ConvertError) -> FieldError {
        FieldError { field: field.to_string(), err }
    }

    /// The name of the field that failed.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The underlying conversion failure.
    pub fn convert_error(&self) -> &ConvertError {
        &self.err
    }
}

impl error::Error for FieldError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.err)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CSV field error: {}: {}", self.field, self.err)
    }
}

/// The reason a text value could not be converted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConvertError {
    /// A catch-all for conversions that report a plain message.
    Message(String),
    /// A boolean could not be parsed.
    ParseBool(str::ParseBoolError),
    /// An integer could not be parsed.
    ParseInt(num::ParseIntError),
    /// A float could not be parsed.
    ParseFloat(num::ParseFloatError),
    /// A character could not be parsed.
    ParseChar(std::char::ParseCharError),
}

impl error::Error for ConvertError {}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConvertError::Message(ref msg) => write!(f, "{}", msg),
            ConvertError::ParseBool(ref err) => err.fmt(f),
            ConvertError::ParseInt(ref err) => err.fmt(f),
            ConvertError::ParseFloat(ref err) => err.fmt(f),
            ConvertError::ParseChar(ref err) => err.fmt(f),
        }
    }
}

/// A UTF-8 validation error for one physical line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Utf8Error {
    /// The index into the line up to which valid UTF-8 was verified.
    valid_up_to: usize,
}

/// Create a new UTF-8 error.
pub(crate) fn new_utf8_error(valid_up_to: usize) -> Utf8Error {
    Utf8Error { valid_up_to }
}

impl Utf8Error {
    /// The index into the line up to which valid UTF-8 was verified.
    pub fn valid_up_to(&self) -> usize {
        self.valid_up_to
    }
}

impl fmt::Display for Utf8Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid UTF-8 near byte index {}", self.valid_up_to)
    }
}

impl error::Error for Utf8Error {}

/// A row-recoverable error recorded by a typed reader.
///
/// The typed row sequence records one of these for every row it could not
/// materialize and then moves on to the next row.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReadError {
    line: u64,
    message: String,
    text: String,
}

impl ReadError {
    /// Build a record from an error raised while reading the row on `line`
    /// whose raw text is `row_text`.
    pub(crate) fn new(line: u64, err: &Error, row_text: &str) -> ReadError {
        let text = match *err {
            Error::Parse(ref err) => err.text().to_string(),
            _ => row_text.to_string(),
        };
        ReadError { line, message: err.to_string(), text }
    }

    /// The line number of the row that failed.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The text of the row that failed, when available.
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use csvmap_core::{
    Strategy, TokenizeError, TokenizeResult, Tokenizer, TokenizerBuilder,
};
use tracing::{debug, trace};

use crate::convert::FromField;
use crate::error::{new_utf8_error, Error, ParseError, ParseErrorKind, Result};
use crate::headers::HeaderMap;
use crate::records::RecordReader;
use crate::schema::Record;
use crate::string_record::StringRecord;

/// The most characters of a row that an error message will show.
const EXCERPT_LEN: u64 = 80;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Builds a CSV reader with various configuration knobs.
///
/// This builder can be used to tweak the header handling, the tokenizing
/// strategy and the maximum row length. Once a reader is built, its
/// configuration cannot be changed.
#[derive(Debug)]
pub struct ReaderBuilder {
    has_headers: bool,
    strategy: Strategy,
    max_row_length: u64,
}

impl Default for ReaderBuilder {
    fn default() -> ReaderBuilder {
        ReaderBuilder {
            has_headers: true,
            strategy: Strategy::default(),
            max_row_length: 512,
        }
    }
}

impl ReaderBuilder {
    /// Create a new builder for configuring CSV parsing.
    ///
    /// To convert a builder into a reader, call one of the methods starting
    /// with `from_` or `records_from_`.
    ///
    /// # Example
    ///
    /// ```
    /// use csvmap::ReaderBuilder;
    ///
    /// # fn main() { example().unwrap(); }
    /// fn example() -> csvmap::Result<()> {
    ///     let data = "\
    /// city,country
    /// Boston,United States
    /// \"Concord, MA\",United States
    /// ";
    ///     let mut rdr = ReaderBuilder::new().from_reader(data.as_bytes())?;
    ///     let mut cities = vec![];
    ///     while !rdr.is_done() {
    ///         rdr.next_row()?;
    ///         cities.push(rdr.get_by_name("city").unwrap_or("").to_string());
    ///     }
    ///     assert_eq!(cities, vec!["Boston", "Concord, MA"]);
    ///     Ok(())
    /// }
    /// ```
    pub fn new() -> ReaderBuilder {
        ReaderBuilder::default()
    }

    /// Build a CSV reader from this configuration that reads data from the
    /// file at `path`.
    ///
    /// If the file cannot be opened, this returns a `ParseError` of kind
    /// `ParseErrorKind::Open`.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Reader<File>> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            ParseError::new(
                Some(path),
                0,
                String::new(),
                ParseErrorKind::Open(err),
            )
        })?;
        debug!(path = %path.display(), "opened CSV reader");
        Reader::new(self, file, Some(path.to_path_buf()))
    }

    /// Build a CSV reader from this configuration that reads data from
    /// `rdr`.
    ///
    /// The reader is buffered for you automatically. When headers are
    /// enabled, the header row is read before this returns.
    pub fn from_reader<R: io::Read>(&self, rdr: R) -> Result<Reader<R>> {
        Reader::new(self, rdr, None)
    }

    /// Build a typed reader of `T` records from the file at `path`.
    pub fn records_from_path<T, P>(
        &self,
        path: P,
    ) -> Result<RecordReader<File, T>>
    where
        T: Record,
        P: AsRef<Path>,
    {
        RecordReader::new(self.from_path(path)?)
    }

    /// Build a typed reader of `T` records from `rdr`.
    pub fn records_from_reader<T, R>(
        &self,
        rdr: R,
    ) -> Result<RecordReader<R, T>>
    where
        T: Record,
        R: io::Read,
    {
        RecordReader::new(self.from_reader(rdr)?)
    }

    /// Whether to treat the first row as a header row.
    ///
    /// When disabled, an untyped reader has no headers, and a typed reader
    /// derives its headers from the record type's schema.
    ///
    /// This is enabled by default.
    pub fn has_headers(&mut self, yes: bool) -> &mut ReaderBuilder {
        self.has_headers = yes;
        self
    }

    /// The strategy used to split lines into fields.
    ///
    /// `Strategy::Simple` does not support multi-line fields and must only
    /// be used on input that is known to be fully quoted.
    ///
    /// The default is `Strategy::Rfc4180`.
    pub fn strategy(&mut self, strategy: Strategy) -> &mut ReaderBuilder {
        self.strategy = strategy;
        self
    }

    /// The maximum number of characters a row may contain, not counting
    /// line terminators. Longer rows fail with a stream-fatal error whose
    /// text is a short excerpt of the row.
    ///
    /// The default is `512`.
    pub fn max_row_length(&mut self, max: u64) -> &mut ReaderBuilder {
        self.max_row_length = max;
        self
    }
}

/// An untyped CSV reader.
///
/// A reader yields one row at a time. Each row is assembled from one or more
/// physical lines, since a quoted field may contain line terminators. The
/// sequence of rows is forward only.
///
/// When the reader is configured to have headers, the first row is read
/// when the reader is opened and is available through `headers`. Columns of
/// the current row can then be looked up by name, case insensitively.
///
/// Callers should check `is_done` before asking for the next row. Asking for
/// a row after the end of the stream returns `Error::Eof`.
#[derive(Debug)]
pub struct Reader<R> {
    rdr: io::BufReader<R>,
    tok: Tokenizer,
    path: Option<PathBuf>,
    headers: HeaderMap,
    has_headers: bool,
    max_row_length: u64,
    /// The number of physical lines consumed so far.
    line: u64,
    /// The line on which the current row started.
    row_line: u64,
    done: bool,
    /// Lines to read again before reading from `rdr`.
    replay: VecDeque<String>,
    row: StringRecord,
    /// The raw text of the current row, line terminators included.
    raw: String,
    /// The end offset in `raw` of every physical line of the current row.
    line_ends: Vec<usize>,
    buf: Vec<u8>,
}

impl Reader<File> {
    /// Create a new CSV reader with a default configuration for the file at
    /// `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Reader<File>> {
        ReaderBuilder::new().from_path(path)
    }
}

impl<R: io::Read> Reader<R> {
    /// Create a new CSV reader with a default configuration for `rdr`.
    pub fn from_reader(rdr: R) -> Result<Reader<R>> {
        ReaderBuilder::new().from_reader(rdr)
    }

    fn new(
        builder: &ReaderBuilder,
        rdr: R,
        path: Option<PathBuf>,
    ) -> Result<Reader<R>> {
        let tok = TokenizerBuilder::new()
            .strategy(builder.strategy)
            .max_len(builder.max_row_length)
            .build();
        let mut rdr = Reader {
            rdr: io::BufReader::new(rdr),
            tok,
            path,
            headers: HeaderMap::new(),
            has_headers: builder.has_headers,
            max_row_length: builder.max_row_length,
            line: 0,
            row_line: 0,
            done: false,
            replay: VecDeque::new(),
            row: StringRecord::new(),
            raw: String::new(),
            line_ends: vec![],
            buf: vec![],
        };
        rdr.update_done()?;
        if rdr.has_headers && !rdr.done {
            rdr.next_row()?;
            rdr.headers = match HeaderMap::from_record(&rdr.row) {
                Ok(headers) => headers,
                Err(err) => {
                    return Err(rdr.error(
                        rdr.line,
                        rdr.raw_row().to_string(),
                        ParseErrorKind::DuplicateHeader(err),
                    ))
                }
            };
        }
        Ok(rdr)
    }

    /// Returns true when no rows remain.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The number of physical lines consumed so far, including the header
    /// row and every line of a multi-line row.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// The line on which the current row started.
    pub fn row_line(&self) -> u64 {
        self.row_line
    }

    /// The header map of this reader.
    ///
    /// This is empty when the reader has no header row.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether the first row of the data was read as a header row.
    pub fn has_headers(&self) -> bool {
        self.has_headers
    }

    /// The path this reader was opened on, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref().map(|p| p.as_path())
    }

    /// Read the next row.
    ///
    /// Errors while assembling a row are stream-fatal for untyped reading:
    /// a quote followed by a stray character, a row longer than the
    /// configured maximum, a quoted field still open at the end of the
    /// stream, invalid UTF-8 or an I/O failure.
    ///
    /// # Example
    ///
    /// ```
    /// use csvmap::Reader;
    ///
    /// # fn main() { example().unwrap(); }
    /// fn example() -> csvmap::Result<()> {
    ///     let data = "name,quote\nBob,\"Hello,\nworld\"\n";
    ///     let mut rdr = Reader::from_reader(data.as_bytes())?;
    ///     let row = rdr.next_row()?;
    ///     assert_eq!(row.get(1), Some("Hello,\nworld"));
    ///     assert_eq!(rdr.line(), 3);
    ///     assert!(rdr.is_done());
    ///     Ok(())
    /// }
    /// ```
    pub fn next_row(&mut self) -> Result<&StringRecord> {
        if self.done {
            return Err(Error::Eof);
        }
        let res = self.read_row();
        let done = self.update_done();
        res?;
        done?;
        Ok(&self.row)
    }

    /// Returns a borrowed iterator over the remaining rows.
    ///
    /// Iteration stops after the first error.
    pub fn rows(&mut self) -> RowsIter<R> {
        RowsIter { rdr: self, failed: false }
    }

    /// Returns an owned iterator over the remaining rows.
    pub fn into_rows(self) -> RowsIntoIter<R> {
        RowsIntoIter { rdr: self, failed: false }
    }

    /// The current row, as last returned by `next_row`.
    pub fn current_row(&self) -> &StringRecord {
        &self.row
    }

    /// The raw text of the current row, without its final line terminator.
    pub fn raw_row(&self) -> &str {
        trim_terminator(&self.raw)
    }

    /// The field of the current row at ordinal `i`.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.row.get(i)
    }

    /// The field of the current row in the column named `name`, compared
    /// case insensitively against the headers.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|i| self.row.get(i))
    }

    /// Convert the field of the current row in the column named `name`.
    ///
    /// Fails with a `ParseError` carrying the current row's text if the
    /// column does not exist or its text cannot be converted.
    ///
    /// # Example
    ///
    /// ```
    /// use csvmap::Reader;
    ///
    /// # fn main() { example().unwrap(); }
    /// fn example() -> csvmap::Result<()> {
    ///     let data = "Name,Age\nLuke,19\nLeia,unknown\n";
    ///     let mut rdr = Reader::from_reader(data.as_bytes())?;
    ///     rdr.next_row()?;
    ///     assert_eq!(rdr.parse_by_name::<u32>("age")?, 19);
    ///     rdr.next_row()?;
    ///     assert!(rdr.parse_by_name::<u32>("age").is_err());
    ///     Ok(())
    /// }
    /// ```
    pub fn parse_by_name<V: FromField>(&self, name: &str) -> Result<V> {
        let text = match self.get_by_name(name) {
            Some(text) => text,
            None => {
                return Err(self.error(
                    self.line,
                    self.raw_row().to_string(),
                    ParseErrorKind::MissingColumn { name: name.to_string() },
                ))
            }
        };
        V::from_field(text).map_err(|err| {
            self.error(
                self.line,
                self.raw_row().to_string(),
                ParseErrorKind::Column { name: name.to_string(), err },
            )
        })
    }

    pub(crate) fn set_headers(&mut self, headers: HeaderMap) {
        self.headers = headers;
    }

    fn read_row(&mut self) -> Result<()> {
        self.row.clear();
        self.raw.clear();
        self.line_ends.clear();
        self.tok.reset();
        let start = self.line + 1;
        self.row_line = start;
        loop {
            let begin = self.line_ends.last().copied().unwrap_or(0);
            if !self.read_line()? {
                if self.line_ends.is_empty() {
                    return Err(Error::Eof);
                }
                return Err(self.unexpected_eof(start));
            }
            let end = self.raw.len();
            match self.tok.tokenize(&self.raw[begin..end], &mut self.row) {
                Ok(TokenizeResult::Incomplete) => continue,
                Ok(TokenizeResult::Complete) => {
                    if self.line_ends.len() > 1 {
                        trace!(
                            line = start,
                            lines = self.line_ends.len(),
                            "assembled multi-line row"
                        );
                    }
                    return Ok(());
                }
                Err(err) => {
                    self.row.clear();
                    if let TokenizeError::TooLong { .. } = err {
                        self.replay_continuation(start);
                    }
                    return Err(self.tokenize_error(start, err));
                }
            }
        }
    }

    /// Append the next physical line to the raw text of the current row.
    ///
    /// Returns false at the end of the stream.
    fn read_line(&mut self) -> Result<bool> {
        if let Some(line) = self.replay.pop_front() {
            self.raw.push_str(&line);
        } else {
            self.buf.clear();
            let n = match self.rdr.read_until(b'\n', &mut self.buf) {
                Ok(n) => n,
                Err(err) => {
                    return Err(self.error(
                        self.line + 1,
                        String::new(),
                        ParseErrorKind::Io(err),
                    ))
                }
            };
            if n == 0 {
                return Ok(false);
            }
            if self.line == 0 && self.buf.starts_with(UTF8_BOM) {
                self.buf.drain(..UTF8_BOM.len());
            }
            match self.buf.to_str() {
                Ok(line) => self.raw.push_str(line),
                Err(err) => {
                    self.line += 1;
                    let kind = ParseErrorKind::Utf8(new_utf8_error(
                        err.valid_up_to(),
                    ));
                    let text = self.buf.to_str_lossy().into_owned();
                    return Err(self.error(
                        self.line,
                        trim_terminator(&text).to_string(),
                        kind,
                    ));
                }
            }
        }
        self.line += 1;
        self.line_ends.push(self.raw.len());
        Ok(true)
    }

    fn update_done(&mut self) -> Result<()> {
        if !self.replay.is_empty() {
            self.done = false;
            return Ok(());
        }
        match self.rdr.fill_buf().map(|buf| buf.is_empty()) {
            Ok(empty) => {
                self.done = empty;
                Ok(())
            }
            Err(err) => {
                self.done = true;
                let kind = ParseErrorKind::Io(err);
                Err(self.error(self.line, String::new(), kind))
            }
        }
    }

    /// Report a quoted field left open at the end of the stream.
    fn unexpected_eof(&mut self, start: u64) -> Error {
        self.replay_continuation(start);
        self.row.clear();
        self.error(
            start,
            self.raw_row().to_string(),
            ParseErrorKind::UnexpectedEof,
        )
    }

    /// Queue every line of the current row after its first line to be read
    /// again, and rewind the line counter to the row's first line.
    ///
    /// Lines after the first only belong to the row because a quote on the
    /// first line was left open.
    fn replay_continuation(&mut self, start: u64) {
        let mut begin = self.line_ends.first().copied().unwrap_or(0);
        for &end in self.line_ends.iter().skip(1) {
            self.replay.push_back(self.raw[begin..end].to_string());
            begin = end;
        }
        self.line = start;
    }

    fn tokenize_error(&self, start: u64, err: TokenizeError) -> Error {
        let text = match err {
            TokenizeError::TooLong { .. } => {
                let n = EXCERPT_LEN.min(self.max_row_length) as usize;
                self.raw_row().chars().take(n).collect()
            }
            TokenizeError::Encoding { .. } => self.raw_row().to_string(),
        };
        self.error(start, text, ParseErrorKind::Tokenize(err))
    }

    fn error(&self, line: u64, text: String, kind: ParseErrorKind) -> Error {
        Error::Parse(ParseError::new(self.path(), line, text, kind))
    }
}

fn trim_terminator(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

/// A borrowed iterator over the rows of a CSV reader.
///
/// The lifetime parameter `'r` refers to the lifetime of the underlying
/// reader.
pub struct RowsIter<'r, R: 'r> {
    rdr: &'r mut Reader<R>,
    failed: bool,
}

impl<'r, R: io::Read> RowsIter<'r, R> {
    /// Return a reference to the underlying reader.
    pub fn reader(&self) -> &Reader<R> {
        &self.rdr
    }
}

impl<'r, R: io::Read> Iterator for RowsIter<'r, R> {
    type Item = Result<StringRecord>;

    fn next(&mut self) -> Option<Result<StringRecord>> {
        next_row(&mut *self.rdr, &mut self.failed)
    }
}

/// An owned iterator over the rows of a CSV reader.
pub struct RowsIntoIter<R> {
    rdr: Reader<R>,
    failed: bool,
}

impl<R: io::Read> RowsIntoIter<R> {
    /// Return a reference to the underlying reader.
    pub fn reader(&self) -> &Reader<R> {
        &self.rdr
    }

    /// Drop this iterator and return the underlying reader.
    pub fn into_reader(self) -> Reader<R> {
        self.rdr
    }
}

impl<R: io::Read> Iterator for RowsIntoIter<R> {
    type Item = Result<StringRecord>;

    fn next(&mut self) -> Option<Result<StringRecord>> {
        next_row(&mut self.rdr, &mut self.failed)
    }
}

fn next_row<R: io::Read>(
    rdr: &mut Reader<R>,
    failed: &mut bool,
) -> Option<Result<StringRecord>> {
    if *failed || rdr.is_done() {
        return None;
    }
    match rdr.next_row() {
        Ok(row) => Some(Ok(row.clone())),
        Err(err) => {
            *failed = true;
            Some(Err(err))
        }
    }
}

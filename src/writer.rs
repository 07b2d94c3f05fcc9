use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use csvmap_core::{Terminator, WriteResult};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::{Record, Schema};
use crate::string_record::StringRecord;

/// Builds a CSV writer with various configuration knobs.
///
/// This builder can be used to tweak the row terminator and the header row
/// written when the writer is opened. Once a writer is built, its
/// configuration cannot be changed.
#[derive(Debug)]
pub struct WriterBuilder {
    terminator: Terminator,
    headers: Option<Vec<String>>,
    has_headers: bool,
}

impl Default for WriterBuilder {
    fn default() -> WriterBuilder {
        WriterBuilder {
            terminator: Terminator::default(),
            headers: None,
            has_headers: true,
        }
    }
}

impl WriterBuilder {
    /// Create a new builder for configuring CSV writing.
    ///
    /// To convert a builder into a writer, call one of the methods starting
    /// with `from_` or `records_from_`.
    ///
    /// # Example
    ///
    /// ```
    /// use csvmap::WriterBuilder;
    ///
    /// # fn main() { example().unwrap(); }
    /// fn example() -> csvmap::Result<()> {
    ///     let mut wtr = WriterBuilder::new()
    ///         .headers(vec!["city", "country"])
    ///         .from_writer(vec![])?;
    ///     wtr.write_row(vec!["Boston", "United States"])?;
    ///     wtr.write_row(vec!["Concord, MA", "United States"])?;
    ///
    ///     let data = String::from_utf8(wtr.into_inner()?).unwrap();
    ///     assert_eq!(data, "\
    /// \"city\",\"country\"
    /// \"Boston\",\"United States\"
    /// \"Concord, MA\",\"United States\"
    /// ");
    ///     Ok(())
    /// }
    /// ```
    pub fn new() -> WriterBuilder {
        WriterBuilder::default()
    }

    /// Build a CSV writer from this configuration that writes to the file at
    /// `path`. The file is created if it does not exist and truncated if it
    /// does.
    pub fn from_path<P: AsRef<Path>>(&self, path: P) -> Result<Writer<File>> {
        let path = path.as_ref();
        let file = File::create(path)?;
        debug!(path = %path.display(), "opened CSV writer");
        let mut wtr = Writer::new(self, file);
        wtr.path = Some(path.to_path_buf());
        wtr.write_headers(self.headers.as_ref())?;
        Ok(wtr)
    }

    /// Build a CSV writer from this configuration that writes to `wtr`.
    ///
    /// The writer is buffered for you automatically.
    pub fn from_writer<W: io::Write>(&self, wtr: W) -> Result<Writer<W>> {
        let mut wtr = Writer::new(self, wtr);
        wtr.write_headers(self.headers.as_ref())?;
        Ok(wtr)
    }

    /// Build a typed writer of `T` records to the file at `path`.
    pub fn records_from_path<T, P>(
        &self,
        path: P,
    ) -> Result<RecordWriter<File, T>>
    where
        T: Record,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::create(path)?;
        debug!(path = %path.display(), "opened CSV writer");
        let mut wtr = Writer::new(self, file);
        wtr.path = Some(path.to_path_buf());
        RecordWriter::new(wtr, self.has_headers)
    }

    /// Build a typed writer of `T` records to `wtr`.
    pub fn records_from_writer<T, W>(
        &self,
        wtr: W,
    ) -> Result<RecordWriter<W, T>>
    where
        T: Record,
        W: io::Write,
    {
        RecordWriter::new(Writer::new(self, wtr), self.has_headers)
    }

    /// The terminator written after every row.
    ///
    /// The default is `Terminator::Any(b'\n')`. Use `Terminator::CRLF` to
    /// write `\r\n`.
    pub fn terminator(&mut self, term: Terminator) -> &mut WriterBuilder {
        self.terminator = term;
        self
    }

    /// A header row that an untyped writer writes when it is opened.
    ///
    /// The header row counts as the first row, so it fixes the number of
    /// columns of every later row.
    pub fn headers<I, S>(&mut self, names: I) -> &mut WriterBuilder
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.headers =
            Some(names.into_iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Whether a typed writer writes its record type's field names as a
    /// header row when it is opened.
    ///
    /// This is enabled by default.
    pub fn has_headers(&mut self, yes: bool) -> &mut WriterBuilder {
        self.has_headers = yes;
        self
    }
}

/// An untyped CSV writer.
///
/// Every field is wrapped in quotes, and every quote in a field is doubled.
/// The first row written, header row included, fixes the number of columns
/// for the rest of the stream. A row with a different number of fields is
/// rejected with `Error::UnequalLengths` and nothing is written for it.
///
/// Output is buffered. Dropping the writer flushes it, but errors while
/// flushing on drop are ignored; call `flush` or `into_inner` to see them.
#[derive(Debug)]
pub struct Writer<W: io::Write> {
    wtr: io::BufWriter<W>,
    core: csvmap_core::Writer,
    /// The encoded row, valid up to `len`.
    out: Vec<u8>,
    len: usize,
    path: Option<PathBuf>,
    first_len: Option<u64>,
    rows: u64,
}

impl Writer<File> {
    /// Create a new CSV writer with a default configuration that writes to
    /// the file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Writer<File>> {
        WriterBuilder::new().from_path(path)
    }
}

impl<W: io::Write> Writer<W> {
    /// Create a new CSV writer with a default configuration that writes to
    /// `wtr`.
    pub fn from_writer(wtr: W) -> Writer<W> {
        Writer::new(&WriterBuilder::new(), wtr)
    }

    fn new(builder: &WriterBuilder, wtr: W) -> Writer<W> {
        Writer {
            wtr: io::BufWriter::new(wtr),
            core: csvmap_core::Writer::with_terminator(builder.terminator),
            out: vec![0; 1024],
            len: 0,
            path: None,
            first_len: None,
            rows: 0,
        }
    }

    fn write_headers(&mut self, headers: Option<&Vec<String>>) -> Result<()> {
        if let Some(names) = headers {
            self.write_row(names)?;
        }
        Ok(())
    }

    /// Write one row and return its encoded text, without the terminator.
    ///
    /// # Example
    ///
    /// ```
    /// use csvmap::{Error, Writer};
    ///
    /// let mut wtr = Writer::from_writer(vec![]);
    /// let line = wtr.write_row(&["Age", "Name"]).unwrap();
    /// assert_eq!(line, r#""Age","Name""#);
    ///
    /// let line = wtr.write_row(&["1", "Darth \"Vader\""]).unwrap();
    /// assert_eq!(line, r#""1","Darth ""Vader""""#);
    ///
    /// match wtr.write_row(&["1", "Darth", "extra"]) {
    ///     Err(Error::UnequalLengths { expected_len: 2, len: 3 }) => {}
    ///     res => panic!("unexpected result: {:?}", res),
    /// }
    /// assert_eq!(wtr.row_count(), 2);
    /// ```
    pub fn write_row<I, T>(&mut self, row: I) -> Result<String>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.len = 0;
        let mut count = 0;
        for field in row {
            if count > 0 {
                self.encode_with(|core, out| core.delimiter(out));
            }
            self.encode_field(field.as_ref().as_bytes());
            count += 1;
        }
        if let Some(expected_len) = self.first_len {
            if expected_len != count {
                return Err(Error::UnequalLengths { expected_len, len: count });
            }
        }
        let line = self.out[..self.len]
            .to_str()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
            .to_string();
        self.encode_with(|core, out| core.terminator(out));
        self.wtr.write_all(&self.out[..self.len])?;
        self.first_len = Some(count);
        self.rows += 1;
        Ok(line)
    }

    /// The number of rows written so far, header row included.
    pub fn row_count(&self) -> u64 {
        self.rows
    }

    /// The path this writer was opened on, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref().map(|p| p.as_path())
    }

    /// Flush the contents of the internal buffer to the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.wtr.flush()?;
        Ok(())
    }

    /// Flush the internal buffer and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.wtr.into_inner().map_err(|err| Error::Io(err.into()))
    }

    fn encode_field(&mut self, mut input: &[u8]) {
        loop {
            let (res, nin, nout) =
                self.core.field(input, &mut self.out[self.len..]);
            input = &input[nin..];
            self.len += nout;
            match res {
                WriteResult::InputEmpty => break,
                WriteResult::OutputFull => self.grow(),
            }
        }
        self.encode_with(|core, out| core.finish(out));
    }

    fn encode_with<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut csvmap_core::Writer, &mut [u8]) -> (WriteResult, usize),
    {
        loop {
            let (res, nout) = f(&mut self.core, &mut self.out[self.len..]);
            self.len += nout;
            match res {
                WriteResult::InputEmpty => return,
                WriteResult::OutputFull => self.grow(),
            }
        }
    }

    fn grow(&mut self) {
        let n = self.out.len() * 2;
        self.out.resize(n, 0);
    }
}

/// A typed CSV writer.
///
/// Every record is written as one row holding its fields that are not
/// ignored, in the order its schema declares them.
///
/// # Example
///
/// ```
/// use csvmap::{Field, Record, Schema, WriterBuilder};
///
/// #[derive(Default)]
/// struct Film {
///     title: String,
///     year: u16,
/// }
///
/// impl Record for Film {
///     fn schema() -> Schema<Film> {
///         Schema::new()
///             .field(Field::value(
///                 "Title",
///                 |f: &Film| &f.title,
///                 |f: &mut Film| &mut f.title,
///             ))
///             .field(Field::value(
///                 "Year",
///                 |f: &Film| &f.year,
///                 |f: &mut Film| &mut f.year,
///             ))
///     }
/// }
///
/// # fn main() { example().unwrap(); }
/// fn example() -> csvmap::Result<()> {
///     let mut wtr =
///         WriterBuilder::new().records_from_writer::<Film, _>(vec![])?;
///     let film = Film { title: "Star Wars".to_string(), year: 1977 };
///     assert_eq!(wtr.write_record(&film)?, r#""Star Wars","1977""#);
///
///     let data = String::from_utf8(wtr.into_inner()?).unwrap();
///     assert_eq!(data, "\"Title\",\"Year\"\n\"Star Wars\",\"1977\"\n");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct RecordWriter<W: io::Write, T> {
    wtr: Writer<W>,
    schema: Schema<T>,
    row: StringRecord,
}

impl<T: Record> RecordWriter<File, T> {
    /// Create a typed writer with a default configuration that writes to the
    /// file at `path`.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<RecordWriter<File, T>> {
        WriterBuilder::new().records_from_path(path)
    }
}

impl<W: io::Write, T: Record> RecordWriter<W, T> {
    /// Create a typed writer with a default configuration that writes to
    /// `wtr`.
    pub fn from_writer(wtr: W) -> Result<RecordWriter<W, T>> {
        WriterBuilder::new().records_from_writer(wtr)
    }

    fn new(
        mut wtr: Writer<W>,
        has_headers: bool,
    ) -> Result<RecordWriter<W, T>> {
        let schema = T::schema();
        if has_headers {
            wtr.write_row(schema.names())?;
        }
        Ok(RecordWriter { wtr, schema, row: StringRecord::new() })
    }

    /// Write one record and return its encoded text, without the
    /// terminator.
    pub fn write_record(&mut self, record: &T) -> Result<String> {
        self.row.clear();
        self.schema.write(record, &mut self.row);
        self.wtr.write_row(&self.row)
    }

    /// Write every record from `records`.
    pub fn write_records<'a, I>(&mut self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a T>,
    {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// The number of rows written so far, header row included.
    pub fn row_count(&self) -> u64 {
        self.wtr.row_count()
    }

    /// A reference to the underlying untyped writer.
    pub fn writer(&self) -> &Writer<W> {
        &self.wtr
    }

    /// Flush the contents of the internal buffer to the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.wtr.flush()
    }

    /// Flush the internal buffer and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.wtr.into_inner()
    }
}

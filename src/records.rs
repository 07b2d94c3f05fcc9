use std::fs::File;
use std::io;
use std::mem;
use std::path::Path;

use tracing::warn;

use crate::error::{Error, ParseError, ParseErrorKind, ReadError, Result};
use crate::headers::HeaderMap;
use crate::reader::{Reader, ReaderBuilder};
use crate::schema::{Mapper, Record};

/// A typed CSV reader.
///
/// A typed reader maps every row onto a record of type `T`, using the
/// headers of the file, or the record type's own field names when the file
/// has no header row.
///
/// `next_record` returns every error to the caller. The iterators returned
/// by `records` and `into_records` instead record a [`ReadError`] for each
/// row they cannot materialize and move on to the next row. Recorded errors
/// accumulate for the life of the reader and are available from `errors`.
///
/// # Example
///
/// ```
/// use csvmap::{Field, ReaderBuilder, Record, Schema};
///
/// #[derive(Debug, Default)]
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
///     let data = "year,title\n1977,Star Wars\nsoon,Rogue One\n1980,Empire\n";
///     let mut rdr = ReaderBuilder::new()
///         .records_from_reader::<Film, _>(data.as_bytes())?;
///     let titles: Vec<String> = rdr.records().map(|f| f.title).collect();
///     assert_eq!(titles, vec!["Star Wars", "Empire"]);
///     assert_eq!(rdr.errors().len(), 1);
///     assert_eq!(rdr.errors()[0].line(), 3);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct RecordReader<R, T> {
    rdr: Reader<R>,
    mapper: Mapper<T>,
    errors: Vec<ReadError>,
}

impl<T: Record> RecordReader<File, T> {
    /// Create a typed reader with a default configuration for the file at
    /// `path`.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<RecordReader<File, T>> {
        ReaderBuilder::new().records_from_path(path)
    }
}

impl<R: io::Read, T: Record> RecordReader<R, T> {
    /// Create a typed reader with a default configuration for `rdr`.
    pub fn from_reader(rdr: R) -> Result<RecordReader<R, T>> {
        ReaderBuilder::new().records_from_reader(rdr)
    }

    pub(crate) fn new(mut rdr: Reader<R>) -> Result<RecordReader<R, T>> {
        let schema = T::schema();
        if !rdr.has_headers() {
            let headers = schema.headers().map_err(|err| {
                ParseError::new(
                    rdr.path(),
                    0,
                    String::new(),
                    ParseErrorKind::DuplicateHeader(err),
                )
            })?;
            rdr.set_headers(headers);
        }
        let mapper = Mapper::with_schema(schema, rdr.headers());
        Ok(RecordReader { rdr, mapper, errors: vec![] })
    }

    /// Read the next row as a record.
    ///
    /// Every error is returned to the caller and nothing is recorded.
    pub fn next_record(&mut self) -> Result<T> {
        self.rdr.next_row()?;
        Ok(self.mapper.read(self.rdr.current_row())?)
    }

    /// Returns a borrowed iterator over the remaining records.
    ///
    /// Rows that cannot be read are recorded in `errors` and skipped.
    /// Iteration stops at the end of the stream, or after an error from the
    /// underlying stream itself.
    pub fn records(&mut self) -> RecordsIter<R, T> {
        RecordsIter { rdr: self, stopped: false }
    }

    /// Returns an owned iterator over the remaining records.
    pub fn into_records(self) -> RecordsIntoIter<R, T> {
        RecordsIntoIter { rdr: self, stopped: false }
    }

    /// The errors recorded so far, oldest first.
    pub fn errors(&self) -> &[ReadError] {
        &self.errors
    }

    /// Remove and return the errors recorded so far.
    pub fn take_errors(&mut self) -> Vec<ReadError> {
        mem::replace(&mut self.errors, vec![])
    }

    /// Forget the errors recorded so far.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// The headers records are mapped with.
    pub fn headers(&self) -> &HeaderMap {
        self.rdr.headers()
    }

    /// Returns true when no rows remain.
    pub fn is_done(&self) -> bool {
        self.rdr.is_done()
    }

    /// The number of physical lines consumed so far.
    pub fn line(&self) -> u64 {
        self.rdr.line()
    }

    /// The mapper rows are read with.
    pub fn mapper(&self) -> &Mapper<T> {
        &self.mapper
    }

    /// A reference to the underlying untyped reader.
    pub fn reader(&self) -> &Reader<R> {
        &self.rdr
    }

    /// Return the underlying untyped reader.
    pub fn into_reader(self) -> Reader<R> {
        self.rdr
    }

    fn next_recorded(&mut self, stopped: &mut bool) -> Option<T> {
        while !*stopped && !self.rdr.is_done() {
            let err = match self.next_record() {
                Ok(record) => return Some(record),
                Err(err) => err,
            };
            let line = match err {
                Error::Parse(ref err) => err.line(),
                _ => self.rdr.row_line(),
            };
            warn!(line, error = %err, "skipping CSV row");
            self.errors.push(ReadError::new(line, &err, self.rdr.raw_row()));
            if !err.is_recoverable() {
                *stopped = true;
            }
        }
        None
    }
}

/// A borrowed iterator over the records of a typed reader.
pub struct RecordsIter<'r, R: 'r, T: 'r> {
    rdr: &'r mut RecordReader<R, T>,
    stopped: bool,
}

impl<'r, R: io::Read, T: Record> RecordsIter<'r, R, T> {
    /// The errors recorded so far.
    pub fn errors(&self) -> &[ReadError] {
        self.rdr.errors()
    }
}

impl<'r, R: io::Read, T: Record> Iterator for RecordsIter<'r, R, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rdr.next_recorded(&mut self.stopped)
    }
}

/// An owned iterator over the records of a typed reader.
pub struct RecordsIntoIter<R, T> {
    rdr: RecordReader<R, T>,
    stopped: bool,
}

impl<R: io::Read, T: Record> RecordsIntoIter<R, T> {
    /// The errors recorded so far.
    pub fn errors(&self) -> &[ReadError] {
        self.rdr.errors()
    }

    /// Drop this iterator and return the typed reader.
    pub fn into_reader(self) -> RecordReader<R, T> {
        self.rdr
    }
}

impl<R: io::Read, T: Record> Iterator for RecordsIntoIter<R, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rdr.next_recorded(&mut self.stopped)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::reader::ReaderBuilder;
    use crate::schema::{Field, Record, Schema};

    use super::RecordReader;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Person {
        name: String,
        age: u32,
        nick: Option<String>,
    }

    impl Record for Person {
        fn schema() -> Schema<Person> {
            Schema::new()
                .field(Field::value(
                    "Name",
                    |p: &Person| &p.name,
                    |p: &mut Person| &mut p.name,
                ))
                .field(Field::value(
                    "Age",
                    |p: &Person| &p.age,
                    |p: &mut Person| &mut p.age,
                ))
                .field(Field::value(
                    "Nick",
                    |p: &Person| &p.nick,
                    |p: &mut Person| &mut p.nick,
                ))
        }
    }

    fn person(name: &str, age: u32, nick: Option<&str>) -> Person {
        Person {
            name: name.to_string(),
            age,
            nick: nick.map(|s| s.to_string()),
        }
    }

    #[test]
    fn reads_by_header_name() {
        let data = "nick,AGE,name\nLuky,19,Luke\n,20,Leia\n";
        let rdr = RecordReader::<_, Person>::from_reader(data.as_bytes())
            .unwrap();
        let got: Vec<Person> = rdr.into_records().collect();
        assert_eq!(
            got,
            vec![person("Luke", 19, Some("Luky")), person("Leia", 20, None)]
        );
    }

    #[test]
    fn virtual_headers() {
        let data = "Luke,19,Luky\nLeia,20,\n";
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .records_from_reader::<Person, _>(data.as_bytes())
            .unwrap();
        assert_eq!(rdr.headers().get("nick"), Some(2));
        assert_eq!(rdr.reader().get_by_name("name"), None);
        let first = rdr.next_record().unwrap();
        assert_eq!(first, person("Luke", 19, Some("Luky")));
        assert_eq!(rdr.reader().get_by_name("name"), Some("Luke"));
        assert_eq!(rdr.records().count(), 1);
        assert!(rdr.errors().is_empty());
    }

    #[test]
    fn next_record_returns_field_errors() {
        let data = "Name,Age\nLuke,old\n";
        let mut rdr = RecordReader::<_, Person>::from_reader(data.as_bytes())
            .unwrap();
        match rdr.next_record() {
            Err(Error::Field(err)) => assert_eq!(err.field(), "Age"),
            res => panic!("expected field error, got {:?}", res),
        }
        assert!(rdr.errors().is_empty());
    }

    #[test]
    fn records_skip_bad_rows() {
        let data = "Name,Age\nLuke,19\nLeia,old\n\"Han,30\nChewie,200\n";
        let mut rdr = RecordReader::<_, Person>::from_reader(data.as_bytes())
            .unwrap();
        let names: Vec<String> = rdr.records().map(|p| p.name).collect();
        assert_eq!(names, vec!["Luke", "Chewie"]);

        let errors = rdr.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].line(), 3);
        assert_eq!(errors[0].text(), "Leia,old");
        assert!(errors[0].message().contains("Age"));
        assert_eq!(errors[1].line(), 4);
        assert_eq!(errors[1].text(), "\"Han,30\nChewie,200");
        assert!(rdr.is_done());
        assert_eq!(rdr.line(), 5);
    }

    #[test]
    fn overlong_quoted_row_keeps_following_rows() {
        let long = "x".repeat(505);
        let data = format!("Name,Age\nLuke,1\n\"Leia,2\n{},3\n", long);
        let mut rdr = RecordReader::<_, Person>::from_reader(data.as_bytes())
            .unwrap();
        let got: Vec<(String, u32)> =
            rdr.records().map(|p| (p.name, p.age)).collect();
        assert_eq!(got, vec![("Luke".to_string(), 1), (long, 3)]);

        let errors = rdr.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line(), 3);
        assert!(errors[0].message().contains("exceeded maximum"));
        assert_eq!(rdr.line(), 4);
    }

    #[test]
    fn byte_order_mark_does_not_hide_first_header() {
        let data = "\u{feff}Name,Age\nLuke,19\n";
        let mut rdr = RecordReader::<_, Person>::from_reader(data.as_bytes())
            .unwrap();
        let first = rdr.next_record().unwrap();
        assert_eq!(first, person("Luke", 19, None));
    }

    #[test]
    fn errors_accumulate_until_cleared() {
        let data = "Name,Age\nx,y\n";
        let mut rdr = RecordReader::<_, Person>::from_reader(data.as_bytes())
            .unwrap();
        assert_eq!(rdr.records().count(), 0);
        assert_eq!(rdr.errors().len(), 1);
        assert_eq!(rdr.records().count(), 0);
        assert_eq!(rdr.errors().len(), 1);
        let taken = rdr.take_errors();
        assert_eq!(taken.len(), 1);
        assert!(rdr.errors().is_empty());
    }

    #[test]
    fn into_records_keeps_errors() {
        let data = "Name,Age\nLuke,x\nLeia,20\n";
        let mut it = RecordReader::<_, Person>::from_reader(data.as_bytes())
            .unwrap()
            .into_records();
        assert_eq!(it.next().map(|p| p.name), Some("Leia".to_string()));
        assert_eq!(it.next(), None);
        assert_eq!(it.errors().len(), 1);
        let mut rdr = it.into_reader();
        rdr.clear_errors();
        assert!(rdr.errors().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn errors_serialize() {
        let data = "Name,Age\nLuke,x\n";
        let mut rdr = RecordReader::<_, Person>::from_reader(data.as_bytes())
            .unwrap();
        assert_eq!(rdr.records().count(), 0);
        let json = serde_json::to_value(rdr.errors()).unwrap();
        assert_eq!(json[0]["line"], 2);
        assert_eq!(json[0]["text"], "Luke,x");
    }
}

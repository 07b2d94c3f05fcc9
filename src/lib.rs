/*!
The `csvmap` crate converts between comma separated text and sequences of
typed records.

Reading tolerates quoted fields with embedded commas, doubled quotes and
line terminators, so one row may span several physical lines. Writing wraps
every field in quotes and doubles embedded quotes, and keeps the number of
columns fixed for the whole stream.

Records are mapped through a [`Schema`], an ordered list of field
descriptors that a type provides by implementing [`Record`]. When reading,
each field takes its text from its declared column, if it has one and that
column exists in the row, and otherwise from the column whose header matches
its name, case insensitively.

Conversion failures follow two separate policies. A primitive or text field
(a [`Field::value`]) that cannot be converted fails the whole row. A nested
field (a [`Field::nested`]) that cannot be converted keeps its default value
and the rest of the row is read as usual.

# Example

```
use csvmap::{Field, Record, Schema};

#[derive(Debug, Default, PartialEq)]
struct Person {
    name: String,
    age: u32,
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
    }
}

# fn main() { example().unwrap(); }
fn example() -> csvmap::Result<()> {
    let people = vec![
        Person { name: "Luke \"Red Five\"".to_string(), age: 19 },
        Person { name: "Leia".to_string(), age: 19 },
    ];
    let path = std::env::temp_dir().join("csvmap-doc-example.csv");
    csvmap::serialize(&people, &path, true)?;

    let text = std::fs::read_to_string(&path)?;
    assert_eq!(text, "\
\"Name\",\"Age\"
\"Luke \"\"Red Five\"\"\",\"19\"
\"Leia\",\"19\"
");

    let read: Vec<Person> = csvmap::deserialize(&path, true)?;
    assert_eq!(read, people);
    std::fs::remove_file(&path)?;
    Ok(())
}
```

# Untyped reading

```
use csvmap::Reader;

# fn main() { example().unwrap(); }
fn example() -> csvmap::Result<()> {
    let data = "id,note\n1,\"two\nlines\"\n2,plain\n";
    let mut rdr = Reader::from_reader(data.as_bytes())?;
    let mut notes = vec![];
    for row in rdr.rows() {
        let row = row?;
        notes.push(row[1].to_string());
    }
    assert_eq!(notes, vec!["two\nlines", "plain"]);
    assert_eq!(rdr.line(), 4);
    Ok(())
}
```

# Logging

Readers and writers emit [`tracing`](https://docs.rs/tracing) events:
opening a path and swallowed nested conversion failures are logged at debug
level, rows skipped by a typed reader at warn level, and multi-line rows at
trace level. The crate never installs a subscriber.
*/

#![deny(missing_docs)]

use std::path::Path;

pub use csvmap_core::{Strategy, Terminator, TokenizeError};

pub use crate::convert::{FromField, ToField};
pub use crate::error::{
    ConvertError, Error, FieldError, ParseError, ParseErrorKind, ReadError,
    Result, Utf8Error,
};
pub use crate::headers::{DuplicateHeader, HeaderMap};
pub use crate::reader::{Reader, ReaderBuilder, RowsIntoIter, RowsIter};
pub use crate::records::{RecordReader, RecordsIntoIter, RecordsIter};
pub use crate::schema::{ConversionKind, Field, Mapper, Record, Schema};
pub use crate::string_record::{StringRecord, StringRecordIter};
pub use crate::writer::{RecordWriter, Writer, WriterBuilder};

mod convert;
mod error;
mod headers;
mod reader;
mod records;
mod schema;
mod string_record;
mod writer;

/// Write every record to the file at `path`, with a header row of field
/// names when `has_headers` is true.
///
/// The file is created if it does not exist and truncated if it does.
pub fn serialize<'a, T, I, P>(
    records: I,
    path: P,
    has_headers: bool,
) -> Result<()>
where
    T: Record,
    I: IntoIterator<Item = &'a T>,
    P: AsRef<Path>,
{
    let mut wtr = WriterBuilder::new()
        .has_headers(has_headers)
        .records_from_path::<T, _>(path)?;
    wtr.write_records(records)?;
    wtr.flush()
}

/// Read every record from the file at `path`.
///
/// When `has_headers` is false, columns are matched to fields by the
/// record type's own field names, in declaration order.
///
/// Rows that cannot be read are skipped. Use a [`RecordReader`] to see why.
pub fn deserialize<T, P>(path: P, has_headers: bool) -> Result<Vec<T>>
where
    T: Record,
    P: AsRef<Path>,
{
    let rdr = ReaderBuilder::new()
        .has_headers(has_headers)
        .records_from_path::<T, _>(path)?;
    Ok(rdr.into_records().collect())
}

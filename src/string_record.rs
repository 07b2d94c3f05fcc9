use std::fmt;
use std::iter::FromIterator;
use std::ops::{self, Range};

use csvmap_core::FieldSink;

/// A single CSV row stored as text.
///
/// All fields are stored contiguously in one `String`, with the end of each
/// field recorded separately. A record can be reused across reads; `clear`
/// keeps the allocations.
#[derive(Clone, Eq, PartialEq)]
pub struct StringRecord {
    /// All fields in this record, stored contiguously.
    fields: String,
    /// The number of and location of each field in this record.
    bounds: Bounds,
}

impl Default for StringRecord {
    fn default() -> StringRecord {
        StringRecord::new()
    }
}

impl StringRecord {
    /// Create a new empty `StringRecord`.
    pub fn new() -> StringRecord {
        StringRecord::with_capacity(0, 0)
    }

    /// Create a new empty `StringRecord` with room for `buffer` bytes of
    /// text spread over `fields` fields.
    pub fn with_capacity(buffer: usize, fields: usize) -> StringRecord {
        StringRecord {
            fields: String::with_capacity(buffer),
            bounds: Bounds { ends: Vec::with_capacity(fields) },
        }
    }

    /// Return the field at index `i`.
    ///
    /// If no field at index `i` exists, then this returns `None`.
    pub fn get(&self, i: usize) -> Option<&str> {
        self.bounds.get(i).map(|range| &self.fields[range])
    }

    /// Returns true if and only if this record is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of fields in this record.
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Clear this record so that it has zero fields.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.bounds.ends.clear();
    }

    /// Add a new field.
    pub fn push_field(&mut self, field: &str) {
        self.fields.truncate(self.bounds.end());
        self.fields.push_str(field);
        self.bounds.add(self.fields.len());
    }

    /// Returns an iterator over all fields in this record.
    pub fn iter(&self) -> StringRecordIter {
        StringRecordIter { r: self, start: 0, i: 0 }
    }

    /// Return the fields as owned strings.
    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }

    /// Return all of the text in this record, with fields concatenated.
    pub fn as_str(&self) -> &str {
        &self.fields[..self.bounds.end()]
    }
}

impl FieldSink for StringRecord {
    fn push(&mut self, text: &str) {
        self.fields.push_str(text);
    }

    fn end_field(&mut self) {
        self.bounds.add(self.fields.len());
    }
}

impl fmt::Debug for StringRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "StringRecord(")?;
        f.debug_list().entries(self.iter()).finish()?;
        write!(f, ")")
    }
}

impl ops::Index<usize> for StringRecord {
    type Output = str;
    fn index(&self, i: usize) -> &str {
        match self.get(i) {
            Some(field) => field,
            None => panic!(
                "field index {} out of bounds for record with {} fields",
                i,
                self.len()
            ),
        }
    }
}

impl<T: AsRef<str>> From<Vec<T>> for StringRecord {
    fn from(fields: Vec<T>) -> StringRecord {
        StringRecord::from_iter(fields)
    }
}

impl<'a, T: AsRef<str>> From<&'a [T]> for StringRecord {
    fn from(fields: &'a [T]) -> StringRecord {
        StringRecord::from_iter(fields)
    }
}

impl<T: AsRef<str>> FromIterator<T> for StringRecord {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> StringRecord {
        let mut record = StringRecord::new();
        record.extend(iter);
        record
    }
}

impl<T: AsRef<str>> Extend<T> for StringRecord {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for field in iter {
            self.push_field(field.as_ref());
        }
    }
}

impl<'a> IntoIterator for &'a StringRecord {
    type IntoIter = StringRecordIter<'a>;
    type Item = &'a str;
    fn into_iter(self) -> StringRecordIter<'a> {
        self.iter()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for StringRecord {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// An iterator over the fields in a string record.
pub struct StringRecordIter<'a> {
    r: &'a StringRecord,
    start: usize,
    i: usize,
}

impl<'a> Iterator for StringRecordIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        match self.r.bounds.ends.get(self.i) {
            None => None,
            Some(&end) => {
                let field = &self.r.fields[self.start..end];
                self.start = end;
                self.i += 1;
                Some(field)
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.r.len() - self.i;
        (n, Some(n))
    }
}

impl<'a> ExactSizeIterator for StringRecordIter<'a> {}

/// The bounds of fields in a single record.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Bounds {
    /// The ending index of each field. Guaranteed to fall on UTF-8 boundaries.
    ends: Vec<usize>,
}

impl Bounds {
    /// Returns the bounds of field `i`.
    fn get(&self, i: usize) -> Option<Range<usize>> {
        let end = match self.ends.get(i) {
            None => return None,
            Some(&end) => end,
        };
        let start = match i.checked_sub(1).and_then(|i| self.ends.get(i)) {
            None => 0,
            Some(&start) => start,
        };
        Some(Range { start, end })
    }

    /// Return the last position of the last field.
    ///
    /// If there are no fields, this returns `0`.
    fn end(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Returns the number of fields in these bounds.
    fn len(&self) -> usize {
        self.ends.len()
    }

    /// Add a new field with the given ending position.
    fn add(&mut self, pos: usize) {
        debug_assert!(pos >= self.end());
        self.ends.push(pos);
    }
}

#[cfg(test)]
mod tests {
    use csvmap_core::FieldSink;

    use super::StringRecord;

    #[test]
    fn record_1() {
        let mut rec = StringRecord::new();
        rec.push_field("foo");

        assert_eq!(rec.len(), 1);
        assert_eq!(rec.get(0), Some("foo"));
        assert_eq!(rec.get(1), None);
        assert_eq!(rec.get(2), None);
    }

    #[test]
    fn record_2() {
        let mut rec = StringRecord::new();
        rec.push_field("foo");
        rec.push_field("quux");

        assert_eq!(rec.len(), 2);
        assert_eq!(rec.get(0), Some("foo"));
        assert_eq!(rec.get(1), Some("quux"));
        assert_eq!(rec.get(2), None);
        assert_eq!(rec.get(3), None);
    }

    #[test]
    fn empty_record() {
        let rec = StringRecord::new();

        assert_eq!(rec.len(), 0);
        assert_eq!(rec.get(0), None);
        assert_eq!(rec.get(1), None);
    }

    #[test]
    fn empty_surround() {
        let mut rec = StringRecord::new();
        rec.push_field("foo");
        rec.push_field("");
        rec.push_field("quux");
        rec.push_field("");

        assert_eq!(rec.len(), 4);
        assert_eq!(rec.get(0), Some("foo"));
        assert_eq!(rec.get(1), Some(""));
        assert_eq!(rec.get(2), Some("quux"));
        assert_eq!(rec.get(3), Some(""));
        assert_eq!(rec.get(4), None);
        assert_eq!(rec.as_str(), "fooquux");
    }

    #[test]
    fn sink_pieces_form_one_field() {
        let mut rec = StringRecord::new();
        rec.push("ab");
        rec.push("c\n");
        assert_eq!(rec.len(), 0);
        rec.push("d");
        rec.end_field();
        rec.end_field();

        assert_eq!(rec.len(), 2);
        assert_eq!(rec.get(0), Some("abc\nd"));
        assert_eq!(rec.get(1), Some(""));
    }

    #[test]
    fn push_field_drops_unfinished_text() {
        let mut rec = StringRecord::new();
        rec.push_field("a");
        rec.push("partial");
        rec.push_field("b");
        assert_eq!(rec.to_vec(), vec!["a", "b"]);
    }

    #[test]
    fn clear_reuses() {
        let mut rec = StringRecord::from(vec!["a", "b"]);
        rec.clear();
        assert!(rec.is_empty());
        rec.push_field("c");
        assert_eq!(&rec[0], "c");
    }

    #[test]
    fn iter_and_collect() {
        let rec: StringRecord = vec!["x", "y", "z"].into_iter().collect();
        let got: Vec<&str> = rec.iter().collect();
        assert_eq!(got, vec!["x", "y", "z"]);
        assert_eq!(rec.iter().len(), 3);
        let debug = format!("{:?}", rec);
        assert_eq!(debug, "StringRecord([\"x\", \"y\", \"z\"])");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_as_sequence() {
        let rec = StringRecord::from(vec!["a", "b,c"]);
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"["a","b,c"]"#);
    }
}

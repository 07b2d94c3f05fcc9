use std::collections::HashMap;
use std::error;
use std::fmt;

use crate::string_record::StringRecord;

/// A mapping from column name to column ordinal.
///
/// Names are matched case insensitively and must be unique under that
/// comparison. The original spelling and order of the names is kept.
///
/// A header map is either read from the first row of a file, or derived
/// from a record type's schema when the file has no header row (see
/// [`Schema::headers`](crate::Schema::headers)).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeaderMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> HeaderMap {
        HeaderMap::default()
    }

    /// Build a header map from names given in column order.
    ///
    /// Returns an error if two names are equal when compared case
    /// insensitively.
    pub fn from_names<I, S>(names: I) -> Result<HeaderMap, DuplicateHeader>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = HeaderMap::new();
        for (i, name) in names.into_iter().enumerate() {
            let name = name.as_ref();
            if let Some(&first) = map.index.get(&fold(name)) {
                return Err(DuplicateHeader {
                    name: name.to_string(),
                    first,
                    second: i,
                });
            }
            map.index.insert(fold(name), i);
            map.names.push(name.to_string());
        }
        Ok(map)
    }

    /// Build a header map from a row read from a file.
    pub fn from_record(
        record: &StringRecord,
    ) -> Result<HeaderMap, DuplicateHeader> {
        HeaderMap::from_names(record)
    }

    /// Return the ordinal of the column with the given name.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(&fold(name)).copied()
    }

    /// Return the name of the column at ordinal `i`.
    pub fn name(&self, i: usize) -> Option<&str> {
        self.names.get(i).map(|s| s.as_str())
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The number of headers.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Iterate over the header names in column order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Two headers with the same name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DuplicateHeader {
    name: String,
    first: usize,
    second: usize,
}

impl DuplicateHeader {
    /// The name of the second header, as spelled in the input.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordinal of the first header with this name.
    pub fn first(&self) -> usize {
        self.first
    }

    /// The ordinal of the second header with this name.
    pub fn second(&self) -> usize {
        self.second
    }
}

impl fmt::Display for DuplicateHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "duplicate header name '{}' at columns {} and {}",
            self.name, self.first, self.second
        )
    }
}

impl error::Error for DuplicateHeader {}

#[cfg(test)]
mod tests {
    use crate::string_record::StringRecord;

    use super::HeaderMap;

    #[test]
    fn case_insensitive() {
        let map = HeaderMap::from_names(vec!["Name", "AGE"]).unwrap();
        assert_eq!(map.get("name"), Some(0));
        assert_eq!(map.get("NAME"), Some(0));
        assert_eq!(map.get("age"), Some(1));
        assert_eq!(map.get("city"), None);
        assert_eq!(map.name(1), Some("AGE"));
        assert_eq!(map.names().collect::<Vec<_>>(), vec!["Name", "AGE"]);
    }

    #[test]
    fn from_record() {
        let rec = StringRecord::from(vec!["B", "A"]);
        let map = HeaderMap::from_record(&rec).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("a"), Some(1));
    }

    #[test]
    fn duplicates_are_rejected() {
        let err = HeaderMap::from_names(vec!["id", "name", "ID"]).unwrap_err();
        assert_eq!(err.name(), "ID");
        assert_eq!(err.first(), 0);
        assert_eq!(err.second(), 2);
    }

    #[test]
    fn empty() {
        let map = HeaderMap::new();
        assert!(map.is_empty());
        assert_eq!(map.get(""), None);
    }
}

use std::fmt;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::convert::{FromField, ToField};
use crate::error::{ConvertError, FieldError};
use crate::headers::{DuplicateHeader, HeaderMap};
use crate::string_record::StringRecord;

/// A type that maps to and from one CSV row.
///
/// Implementations list their fields once, in declaration order, through
/// [`Schema`]. A reader or writer calls `schema` when it is opened and keeps
/// the result for the life of the stream.
///
/// # Example
///
/// ```
/// use csvmap::{Field, Record, Schema};
///
/// #[derive(Debug, Default)]
/// struct Person {
///     name: String,
///     age: u32,
///     scratch: String,
/// }
///
/// impl Record for Person {
///     fn schema() -> Schema<Person> {
///         Schema::new()
///             .field(Field::value(
///                 "Name",
///                 |p: &Person| &p.name,
///                 |p: &mut Person| &mut p.name,
///             ))
///             .field(Field::value(
///                 "Age",
///                 |p: &Person| &p.age,
///                 |p: &mut Person| &mut p.age,
///             ))
///             .field(
///                 Field::value(
///                     "Scratch",
///                     |p: &Person| &p.scratch,
///                     |p: &mut Person| &mut p.scratch,
///                 )
///                 .ignore(),
///             )
///     }
/// }
///
/// let schema = Person::schema();
/// let names: Vec<&str> = schema.names().collect();
/// assert_eq!(names, vec!["Name", "Age"]);
/// ```
pub trait Record: Default + 'static {
    /// The fields of this record type.
    fn schema() -> Schema<Self>;
}

/// The ordered list of field descriptors for a record type.
pub struct Schema<T> {
    fields: Vec<Field<T>>,
}

impl<T> Default for Schema<T> {
    fn default() -> Schema<T> {
        Schema { fields: vec![] }
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Schema").field("fields", &self.fields).finish()
    }
}

impl<T> Schema<T> {
    /// Create an empty schema.
    pub fn new() -> Schema<T> {
        Schema::default()
    }

    /// Add a field after all fields added so far.
    pub fn field(mut self, field: Field<T>) -> Schema<T> {
        self.fields.push(field);
        self
    }

    /// All field descriptors, ignored ones included, in declaration order.
    pub fn fields(&self) -> &[Field<T>] {
        &self.fields
    }

    /// The names of the fields that are not ignored, in declaration order.
    ///
    /// This is the header row written for the record type.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| !f.ignored).map(|f| f.name.as_str())
    }

    /// The virtual header map of this record type: every field that is not
    /// ignored, numbered in declaration order.
    pub fn headers(&self) -> Result<HeaderMap, DuplicateHeader> {
        HeaderMap::from_names(self.names())
    }

    /// Write the fields of `record` that are not ignored to `row`, in
    /// declaration order.
    pub fn write(&self, record: &T, row: &mut StringRecord) {
        let mut buf = String::new();
        for field in self.fields.iter().filter(|f| !f.ignored) {
            buf.clear();
            field.write(record, &mut buf);
            row.push_field(&buf);
        }
    }
}

/// How the text of a field is converted, chosen when the field is declared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConversionKind {
    /// A primitive or text value. Conversion failures fail the row.
    Value,
    /// A nested type built from text. Empty text is skipped and conversion
    /// failures leave the field at its default.
    Nested,
    /// No conversion from text exists. The field is never read, but is
    /// still written.
    Unsupported,
}

type ReadFn<T> = Box<dyn Fn(&mut T, &str) -> Result<(), ConvertError>>;
type WriteFn<T> = Box<dyn Fn(&T, &mut String)>;

enum Conversion<T> {
    Value { read: ReadFn<T>, write: WriteFn<T> },
    Nested { read: ReadFn<T>, write: WriteFn<T> },
    Unsupported { write: WriteFn<T> },
}

/// A descriptor of one field of a record type.
///
/// A descriptor has a logical name (used for headers), an optional declared
/// column order (which takes precedence over the name when reading), an
/// ignored flag, and a conversion strategy fixed by the constructor used.
pub struct Field<T> {
    name: String,
    order: Option<usize>,
    ignored: bool,
    conversion: Conversion<T>,
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("ignored", &self.ignored)
            .field("kind", &self.kind())
            .finish()
    }
}

impl<T: 'static> Field<T> {
    /// A primitive or text field, converted with [`FromField`] and
    /// [`ToField`].
    ///
    /// `get` and `get_mut` select the field on a record.
    pub fn value<V, G, M>(name: &str, get: G, get_mut: M) -> Field<T>
    where
        V: FromField + ToField + 'static,
        G: Fn(&T) -> &V + 'static,
        M: Fn(&mut T) -> &mut V + 'static,
    {
        Field::new(
            name,
            Conversion::Value {
                read: Box::new(move |record: &mut T, text: &str| {
                    *get_mut(record) = V::from_field(text)?;
                    Ok(())
                }),
                write: Box::new(move |record: &T, out: &mut String| {
                    get(record).to_field(out)
                }),
            },
        )
    }

    /// A nested field built from its text with `FromStr`, and written with
    /// `Display`.
    pub fn nested<V, G, M>(name: &str, get: G, get_mut: M) -> Field<T>
    where
        V: FromStr + fmt::Display + 'static,
        V::Err: fmt::Display,
        G: Fn(&T) -> &V + 'static,
        M: Fn(&mut T) -> &mut V + 'static,
    {
        Field::new(
            name,
            Conversion::Nested {
                read: Box::new(move |record: &mut T, text: &str| {
                    let value = text.parse::<V>().map_err(|err| {
                        ConvertError::Message(err.to_string())
                    })?;
                    *get_mut(record) = value;
                    Ok(())
                }),
                write: Box::new(move |record: &T, out: &mut String| {
                    out.push_str(&get(record).to_string())
                }),
            },
        )
    }

    /// A field with no conversion from text. It is written with `Display`
    /// and skipped when reading.
    pub fn unsupported<V, G>(name: &str, get: G) -> Field<T>
    where
        V: fmt::Display + 'static,
        G: Fn(&T) -> &V + 'static,
    {
        Field::new(
            name,
            Conversion::Unsupported {
                write: Box::new(move |record: &T, out: &mut String| {
                    out.push_str(&get(record).to_string())
                }),
            },
        )
    }
}

impl<T> Field<T> {
    fn new(name: &str, conversion: Conversion<T>) -> Field<T> {
        Field {
            name: name.to_string(),
            order: None,
            ignored: false,
            conversion,
        }
    }

    /// Declare the column this field is read from. A declared order within
    /// the row wins over a header lookup by name.
    pub fn order(mut self, order: usize) -> Field<T> {
        self.order = Some(order);
        self
    }

    /// Exclude this field from headers, reading and writing.
    pub fn ignore(mut self) -> Field<T> {
        self.ignored = true;
        self
    }

    /// The logical name of this field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared column order, if any.
    pub fn declared_order(&self) -> Option<usize> {
        self.order
    }

    /// Whether this field is ignored.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// The conversion strategy of this field.
    pub fn kind(&self) -> ConversionKind {
        match self.conversion {
            Conversion::Value { .. } => ConversionKind::Value,
            Conversion::Nested { .. } => ConversionKind::Nested,
            Conversion::Unsupported { .. } => ConversionKind::Unsupported,
        }
    }

    /// Set this field on `record` from `text`.
    ///
    /// Only value fields can fail. Nested fields swallow their failures and
    /// unsupported fields are skipped.
    fn read(&self, record: &mut T, text: &str) -> Result<(), FieldError> {
        match self.conversion {
            Conversion::Value { ref read, .. } => {
                read(record, text)
                    .map_err(|err| FieldError::new(&self.name, err))
            }
            Conversion::Nested { ref read, .. } => {
                if text.is_empty() {
                    return Ok(());
                }
                if let Err(err) = read(record, text) {
                    debug!(
                        field = %self.name,
                        error = %err,
                        "nested conversion failed, keeping default value"
                    );
                }
                Ok(())
            }
            Conversion::Unsupported { .. } => {
                trace!(field = %self.name, "no conversion from text");
                Ok(())
            }
        }
    }

    fn write(&self, record: &T, out: &mut String) {
        match self.conversion {
            Conversion::Value { ref write, .. }
            | Conversion::Nested { ref write, .. }
            | Conversion::Unsupported { ref write } => write(record, out),
        }
    }
}

/// Maps rows onto records of one type for one stream.
///
/// The header lookup of every field is resolved once, when the mapper is
/// built. For each row, a field that is not ignored takes its text from:
///
/// 1. its declared order, if that column exists in the row;
/// 2. otherwise the column its name resolves to in the header map, if
///    that column exists in the row;
/// 3. otherwise nowhere, and the field keeps its default value.
pub struct Mapper<T> {
    schema: Schema<T>,
    by_name: Vec<Option<usize>>,
}

impl<T> fmt::Debug for Mapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("schema", &self.schema)
            .field("by_name", &self.by_name)
            .finish()
    }
}

impl<T: Record> Mapper<T> {
    /// Build a mapper for `T` against the given headers.
    pub fn new(headers: &HeaderMap) -> Mapper<T> {
        Mapper::with_schema(T::schema(), headers)
    }

    /// Build a mapper from an explicit schema against the given headers.
    pub fn with_schema(schema: Schema<T>, headers: &HeaderMap) -> Mapper<T> {
        let by_name =
            schema.fields.iter().map(|f| headers.get(&f.name)).collect();
        Mapper { schema, by_name }
    }

    /// The schema this mapper reads with.
    pub fn schema(&self) -> &Schema<T> {
        &self.schema
    }

    /// The column a field would be read from for a row of `row_len`
    /// columns, or `None` if the field stays unset.
    pub fn column(&self, field: usize, row_len: usize) -> Option<usize> {
        let f = self.schema.fields.get(field)?;
        if f.ignored {
            return None;
        }
        match f.order {
            Some(i) if i < row_len => Some(i),
            _ => self.by_name[field].filter(|&i| i < row_len),
        }
    }

    /// Build a record from one row.
    ///
    /// Fails only when a value field cannot be converted.
    pub fn read(&self, row: &StringRecord) -> Result<T, FieldError> {
        let mut record = T::default();
        for (i, field) in self.schema.fields.iter().enumerate() {
            let text = match self.column(i, row.len()).and_then(|c| row.get(c))
            {
                None => continue,
                Some(text) => text,
            };
            field.read(&mut record, text)?;
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::str::FromStr;

    use crate::error::ConvertError;
    use crate::headers::HeaderMap;
    use crate::string_record::StringRecord;

    use super::{ConversionKind, Field, Mapper, Record, Schema};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl FromStr for Point {
        type Err = String;

        fn from_str(s: &str) -> Result<Point, String> {
            let mut it = s.split(';');
            match (it.next(), it.next(), it.next()) {
                (Some(x), Some(y), None) => Ok(Point {
                    x: x.parse().map_err(|_| format!("bad x: {}", x))?,
                    y: y.parse().map_err(|_| format!("bad y: {}", y))?,
                }),
                _ => Err(format!("not a point: {}", s)),
            }
        }
    }

    impl fmt::Display for Point {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{};{}", self.x, self.y)
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Tags(Vec<String>);

    impl fmt::Display for Tags {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{}", self.0.join("|"))
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Place {
        name: String,
        count: u32,
        at: Point,
        tags: Tags,
        cache: String,
    }

    impl Record for Place {
        fn schema() -> Schema<Place> {
            Schema::new()
                .field(Field::value(
                    "Name",
                    |p: &Place| &p.name,
                    |p: &mut Place| &mut p.name,
                ))
                .field(Field::value(
                    "Count",
                    |p: &Place| &p.count,
                    |p: &mut Place| &mut p.count,
                ))
                .field(Field::nested(
                    "At",
                    |p: &Place| &p.at,
                    |p: &mut Place| &mut p.at,
                ))
                .field(Field::unsupported("Tags", |p: &Place| &p.tags))
                .field(
                    Field::value(
                        "Cache",
                        |p: &Place| &p.cache,
                        |p: &mut Place| &mut p.cache,
                    )
                    .ignore(),
                )
        }
    }

    fn headers(names: &[&str]) -> HeaderMap {
        HeaderMap::from_names(names).unwrap()
    }

    #[test]
    fn descriptors() {
        let schema = Place::schema();
        let kinds: Vec<ConversionKind> =
            schema.fields().iter().map(|f| f.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                ConversionKind::Value,
                ConversionKind::Value,
                ConversionKind::Nested,
                ConversionKind::Unsupported,
                ConversionKind::Value,
            ]
        );
        assert!(schema.fields()[4].is_ignored());
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names, vec!["Name", "Count", "At", "Tags"]);
    }

    #[test]
    fn virtual_headers() {
        let map = Place::schema().headers().unwrap();
        assert_eq!(map.get("name"), Some(0));
        assert_eq!(map.get("tags"), Some(3));
        assert_eq!(map.get("cache"), None);
    }

    #[test]
    fn read_by_name() {
        let mapper =
            Mapper::<Place>::new(&headers(&["count", "tags", "name", "at"]));
        let row = StringRecord::from(vec!["3", "a|b", "Home", "1;2"]);
        let place = mapper.read(&row).unwrap();
        assert_eq!(
            place,
            Place {
                name: "Home".to_string(),
                count: 3,
                at: Point { x: 1, y: 2 },
                tags: Tags::default(),
                cache: String::new(),
            }
        );
    }

    #[test]
    fn nested_failure_keeps_default() {
        let mapper = Mapper::<Place>::new(&Place::schema().headers().unwrap());
        let row = StringRecord::from(vec!["Home", "3", "nowhere", ""]);
        let place = mapper.read(&row).unwrap();
        assert_eq!(place.name, "Home");
        assert_eq!(place.count, 3);
        assert_eq!(place.at, Point::default());
    }

    #[test]
    fn nested_empty_is_skipped() {
        let mapper = Mapper::<Place>::new(&Place::schema().headers().unwrap());
        let row = StringRecord::from(vec!["Home", "3", "", ""]);
        assert_eq!(mapper.read(&row).unwrap().at, Point::default());
    }

    #[test]
    fn value_failure_fails_row() {
        let mapper = Mapper::<Place>::new(&Place::schema().headers().unwrap());
        let row = StringRecord::from(vec!["Home", "three", "1;2", ""]);
        let err = mapper.read(&row).unwrap_err();
        assert_eq!(err.field(), "Count");
        assert!(match *err.convert_error() {
            ConvertError::ParseInt(_) => true,
            _ => false,
        });
    }

    #[test]
    fn short_row_leaves_fields_unset() {
        let mapper = Mapper::<Place>::new(&Place::schema().headers().unwrap());
        let row = StringRecord::from(vec!["Home"]);
        let place = mapper.read(&row).unwrap();
        assert_eq!(place.name, "Home");
        assert_eq!(place.count, 0);
    }

    #[test]
    fn write_in_declaration_order() {
        let place = Place {
            name: "Home".to_string(),
            count: 3,
            at: Point { x: 1, y: 2 },
            tags: Tags(vec!["a".to_string(), "b".to_string()]),
            cache: "never written".to_string(),
        };
        let mut row = StringRecord::new();
        Place::schema().write(&place, &mut row);
        assert_eq!(row.to_vec(), vec!["Home", "3", "1;2", "a|b"]);
    }

    #[derive(Debug, Default, PartialEq)]
    struct Ordered {
        a: String,
        b: String,
    }

    impl Record for Ordered {
        fn schema() -> Schema<Ordered> {
            Schema::new()
                .field(
                    Field::value(
                        "A",
                        |r: &Ordered| &r.a,
                        |r: &mut Ordered| &mut r.a,
                    )
                    .order(0),
                )
                .field(Field::value(
                    "B",
                    |r: &Ordered| &r.b,
                    |r: &mut Ordered| &mut r.b,
                ))
        }
    }

    #[test]
    fn declared_order_wins_over_name() {
        let mapper = Mapper::<Ordered>::new(&headers(&["B", "A"]));
        let row = StringRecord::from(vec!["x", "y"]);
        let got = mapper.read(&row).unwrap();
        assert_eq!(got, Ordered { a: "x".to_string(), b: "x".to_string() });
        assert_eq!(mapper.column(0, 2), Some(0));
        assert_eq!(mapper.column(1, 2), Some(0));
    }

    #[test]
    fn declared_order_out_of_bounds_falls_back_to_name() {
        let schema = Schema::new().field(
            Field::value(
                "A",
                |r: &Ordered| &r.a,
                |r: &mut Ordered| &mut r.a,
            )
            .order(5),
        );
        let mapper = Mapper::with_schema(schema, &headers(&["B", "A"]));
        let row = StringRecord::from(vec!["x", "y"]);
        assert_eq!(mapper.read(&row).unwrap().a, "y");
    }
}

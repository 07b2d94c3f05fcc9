use crate::error::ConvertError;

/// Types that can be read directly from the text of one field.
///
/// This is the conversion used for primitive and text fields. A failure
/// here is fatal to the row being read.
///
/// Numbers and booleans ignore surrounding whitespace, and booleans are
/// case insensitive. `Option<T>` reads an empty field as `None`.
pub trait FromField: Sized {
    /// Convert the text of a field.
    fn from_field(field: &str) -> Result<Self, ConvertError>;
}

/// Types that can be written as the text of one field.
pub trait ToField {
    /// Append the text of this value to `out`.
    fn to_field(&self, out: &mut String);
}

macro_rules! impl_int {
    ($($ty:ty),*) => {
        $(
            impl FromField for $ty {
                fn from_field(field: &str) -> Result<$ty, ConvertError> {
                    field.trim().parse().map_err(ConvertError::ParseInt)
                }
            }

            impl ToField for $ty {
                fn to_field(&self, out: &mut String) {
                    out.push_str(itoa::Buffer::new().format(*self));
                }
            }
        )*
    }
}

macro_rules! impl_float {
    ($($ty:ty),*) => {
        $(
            impl FromField for $ty {
                fn from_field(field: &str) -> Result<$ty, ConvertError> {
                    field.trim().parse().map_err(ConvertError::ParseFloat)
                }
            }

            impl ToField for $ty {
                fn to_field(&self, out: &mut String) {
                    out.push_str(ryu::Buffer::new().format(*self));
                }
            }
        )*
    }
}

impl_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);
impl_float!(f32, f64);

impl FromField for bool {
    fn from_field(field: &str) -> Result<bool, ConvertError> {
        field
            .trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(ConvertError::ParseBool)
    }
}

impl ToField for bool {
    fn to_field(&self, out: &mut String) {
        out.push_str(if *self { "true" } else { "false" });
    }
}

impl FromField for char {
    fn from_field(field: &str) -> Result<char, ConvertError> {
        field.parse().map_err(ConvertError::ParseChar)
    }
}

impl ToField for char {
    fn to_field(&self, out: &mut String) {
        out.push(*self);
    }
}

impl FromField for String {
    fn from_field(field: &str) -> Result<String, ConvertError> {
        Ok(field.to_string())
    }
}

impl ToField for String {
    fn to_field(&self, out: &mut String) {
        out.push_str(self);
    }
}

impl<T: FromField> FromField for Option<T> {
    fn from_field(field: &str) -> Result<Option<T>, ConvertError> {
        if field.is_empty() {
            Ok(None)
        } else {
            T::from_field(field).map(Some)
        }
    }
}

impl<T: ToField> ToField for Option<T> {
    fn to_field(&self, out: &mut String) {
        if let Some(ref value) = *self {
            value.to_field(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ConvertError;

    use super::{FromField, ToField};

    fn text<T: ToField>(value: T) -> String {
        let mut out = String::new();
        value.to_field(&mut out);
        out
    }

    #[test]
    fn integers() {
        assert_eq!(u32::from_field("42"), Ok(42));
        assert_eq!(i64::from_field(" -7 "), Ok(-7));
        assert!(match u8::from_field("256") {
            Err(ConvertError::ParseInt(_)) => true,
            _ => false,
        });
        assert_eq!(text(-12i32), "-12");
        assert_eq!(text(u128::MAX), u128::MAX.to_string());
    }

    #[test]
    fn floats() {
        assert_eq!(f64::from_field("1.5"), Ok(1.5));
        assert!(f32::from_field("one").is_err());
        assert_eq!(text(1.5f64), "1.5");
        assert_eq!(f64::from_field(&text(0.1f64)), Ok(0.1));
    }

    #[test]
    fn booleans() {
        assert_eq!(bool::from_field("True"), Ok(true));
        assert_eq!(bool::from_field(" false"), Ok(false));
        assert!(bool::from_field("yes").is_err());
        assert_eq!(text(true), "true");
    }

    #[test]
    fn chars_and_text() {
        assert_eq!(char::from_field("x"), Ok('x'));
        assert!(char::from_field("xy").is_err());
        assert_eq!(String::from_field(" a,b "), Ok(" a,b ".to_string()));
        assert_eq!(text("say \"hi\"".to_string()), "say \"hi\"");
    }

    #[test]
    fn options() {
        assert_eq!(Option::<u32>::from_field(""), Ok(None));
        assert_eq!(Option::<u32>::from_field("3"), Ok(Some(3)));
        assert!(Option::<u32>::from_field("x").is_err());
        assert_eq!(text(None::<u32>), "");
        assert_eq!(text(Some(9u32)), "9");
    }
}

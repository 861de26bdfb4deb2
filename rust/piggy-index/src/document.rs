//! Document model: a document is an ordered list of named fields.

/// A numeric field value, tagged with its width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl From<i8> for NumericValue {
    fn from(value: i8) -> Self {
        NumericValue::Int(value as i32)
    }
}

impl From<i16> for NumericValue {
    fn from(value: i16) -> Self {
        NumericValue::Int(value as i32)
    }
}

impl From<i32> for NumericValue {
    fn from(value: i32) -> Self {
        NumericValue::Int(value)
    }
}

impl From<i64> for NumericValue {
    fn from(value: i64) -> Self {
        NumericValue::Long(value)
    }
}

impl From<f32> for NumericValue {
    fn from(value: f32) -> Self {
        NumericValue::Float(value)
    }
}

impl From<f64> for NumericValue {
    fn from(value: f64) -> Self {
        NumericValue::Double(value)
    }
}

/// Read access to one field of a document.
///
/// A stored field exposes exactly one of the three value accessors.
pub trait IndexableField {
    fn name(&self) -> &str;

    fn stored(&self) -> bool;

    fn string_value(&self) -> Option<&str> {
        None
    }

    fn binary_value(&self) -> Option<&[u8]> {
        None
    }

    fn numeric_value(&self) -> Option<NumericValue> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Binary(Vec<u8>),
    Numeric(NumericValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    value: FieldValue,
    stored: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Field {
        Field {
            name: name.into(),
            value,
            stored: true,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Field {
        Field::new(name, FieldValue::Text(value.into()))
    }

    pub fn binary(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Field {
        Field::new(name, FieldValue::Binary(value.into()))
    }

    pub fn numeric(name: impl Into<String>, value: impl Into<NumericValue>) -> Field {
        Field::new(name, FieldValue::Numeric(value.into()))
    }

    /// Marks the field as indexed-only: it is skipped by the stored-field encoder.
    pub fn not_stored(mut self) -> Field {
        self.stored = false;
        self
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }
}

impl IndexableField for Field {
    fn name(&self) -> &str {
        &self.name
    }

    fn stored(&self) -> bool {
        self.stored
    }

    fn string_value(&self) -> Option<&str> {
        match &self.value {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    fn binary_value(&self) -> Option<&[u8]> {
        match &self.value {
            FieldValue::Binary(b) => Some(b),
            _ => None,
        }
    }

    fn numeric_value(&self) -> Option<NumericValue> {
        match self.value {
            FieldValue::Numeric(n) => Some(n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Document {
        Default::default()
    }

    pub fn add(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn with(mut self, field: Field) -> Document {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl AsRef<[Field]> for Document {
    fn as_ref(&self) -> &[Field] {
        &self.fields
    }
}

impl FromIterator<Field> for Document {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Document {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Document, Field, IndexableField, NumericValue};

    #[test]
    fn test_field_accessors() {
        let doc = Document::new()
            .with(Field::text("title", "hello,world"))
            .with(Field::numeric("count", 42))
            .with(Field::binary("blob", vec![1u8, 2, 3]).not_stored())
            .with(Field::numeric("small", 7i8));

        let fields = doc.fields();
        assert_eq!(fields[0].name(), "title");
        assert_eq!(fields[0].string_value(), Some("hello,world"));
        assert!(fields[0].numeric_value().is_none());
        assert_eq!(fields[1].numeric_value(), Some(NumericValue::Int(42)));
        assert_eq!(fields[2].binary_value(), Some(&[1u8, 2, 3][..]));
        assert!(!fields[2].stored());
        assert_eq!(fields[3].numeric_value(), Some(NumericValue::Int(7)));
    }

    #[test]
    fn test_numeric_widths() {
        assert_eq!(NumericValue::from(1i16), NumericValue::Int(1));
        assert_eq!(NumericValue::from(1i64), NumericValue::Long(1));
        assert_eq!(NumericValue::from(1.5f32), NumericValue::Float(1.5));
        assert_eq!(NumericValue::from(1.5f64), NumericValue::Double(1.5));
    }
}

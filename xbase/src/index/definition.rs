//! Key definitions: which fields make up a key and how it is typed.

use crate::index::IndexError;
use crate::index::field::{FieldSource, FieldType, date_to_julian};
use crate::index::key::{FLOAT_KEY_LEN, FloatKey, KeyKind, NUMERIC_KEY_LEN, NodeKey};
use crate::index::node::NodeFormat;

/// Longest key, in bytes, the page formats allow.
pub const MAX_KEY_LENGTH: u16 = 100;

/// Longest key expression stored in a header.
pub const MAX_EXPRESSION_LENGTH: usize = 100;

/// Key type recorded in tag descriptors and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// `C`: text keys.
    Character,
    /// `N`: 8-byte doubles.
    Numeric,
    /// `F`: 12-byte packed decimals.
    Float,
    /// `D`: Julian day numbers stored as 8-byte doubles.
    Date,
}

impl KeyType {
    /// Type byte as stored on disk.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Character => b'C',
            Self::Numeric => b'N',
            Self::Float => b'F',
            Self::Date => b'D',
        }
    }

    /// Parse a stored type byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code.to_ascii_uppercase() {
            b'C' => Some(Self::Character),
            b'N' => Some(Self::Numeric),
            b'F' => Some(Self::Float),
            b'D' => Some(Self::Date),
            _ => None,
        }
    }

    /// The key variant this type produces.
    #[must_use]
    pub const fn key_kind(self) -> KeyKind {
        match self {
            Self::Character => KeyKind::Text,
            Self::Numeric | Self::Date => KeyKind::Numeric,
            Self::Float => KeyKind::Float,
        }
    }

    /// A key that sorts at or before every stored key of this type.
    ///
    /// Text keys are NUL-trimmed on disk, so the NUL sentinel is the
    /// empty string.
    #[must_use]
    pub fn min_key(self) -> NodeKey {
        match self.key_kind() {
            KeyKind::Text => NodeKey::text(""),
            KeyKind::Numeric => NodeKey::Numeric(f64::MIN),
            KeyKind::Float => NodeKey::Float(FloatKey::MIN),
        }
    }

    /// A key that sorts at or after every stored key of this type.
    ///
    /// Stored text is Latin-1 and at most `MAX_KEY_LENGTH` wide, so the
    /// text sentinel is that many `0xFF` characters.
    #[must_use]
    pub fn max_key(self) -> NodeKey {
        match self.key_kind() {
            KeyKind::Text => NodeKey::text("\u{FF}".repeat(usize::from(MAX_KEY_LENGTH))),
            KeyKind::Numeric => NodeKey::Numeric(f64::MAX),
            KeyKind::Float => NodeKey::Float(FloatKey::MAX),
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", char::from(self.code()))
    }
}

/// The fields, type and width of one tag's keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    expression: String,
    fields: Vec<String>,
    key_type: KeyType,
    key_length: u16,
    unique: bool,
}

impl KeyDefinition {
    /// Split a key expression such as `LAST + FIRST` into field names.
    pub fn parse_expression(expression: &str) -> Result<Vec<String>, IndexError> {
        if expression.len() > MAX_EXPRESSION_LENGTH {
            return Err(IndexError::InvalidKeyExpression(format!(
                "{expression:?} is longer than {MAX_EXPRESSION_LENGTH} characters"
            )));
        }
        let fields: Vec<String> = expression
            .split('+')
            .map(|part| part.trim().to_ascii_uppercase())
            .collect();
        for name in &fields {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(IndexError::InvalidKeyExpression(expression.to_string()));
            }
        }
        Ok(fields)
    }

    /// Derive a definition from the table's fields.
    ///
    /// All date fields give a `D` key, all numeric-like fields give `N`
    /// (`F` in MDX files), anything else gives a text key as wide as the
    /// fields combined.
    pub fn from_fields(
        expression: &str,
        source: &dyn FieldSource,
        format: NodeFormat,
        unique: bool,
    ) -> Result<Self, IndexError> {
        let fields = Self::parse_expression(expression)?;
        let mut types = Vec::with_capacity(fields.len());
        let mut text_length: u32 = 0;
        for name in &fields {
            let field = source
                .field(name)
                .ok_or_else(|| IndexError::UnknownField(name.clone()))?;
            types.push(field.field_type());
            text_length += u32::from(field.length());
        }

        let key_type = if types.iter().all(|t| *t == FieldType::Date) {
            KeyType::Date
        } else if types.iter().all(|t| t.is_numeric()) {
            match format {
                NodeFormat::Ndx => KeyType::Numeric,
                NodeFormat::Mdx => KeyType::Float,
            }
        } else {
            KeyType::Character
        };

        let key_length = match key_type {
            KeyType::Character => {
                u16::try_from(text_length.min(u32::from(MAX_KEY_LENGTH))).unwrap_or(MAX_KEY_LENGTH)
            }
            other => fixed_length(other),
        };
        Self::new(expression, fields, key_type, key_length, unique)
    }

    /// Rebuild a definition from what a header stores.
    pub fn from_stored(
        expression: &str,
        key_type: KeyType,
        key_length: u16,
        unique: bool,
    ) -> Result<Self, IndexError> {
        let fields = Self::parse_expression(expression)?;
        Self::new(expression, fields, key_type, key_length, unique)
    }

    fn new(
        expression: &str,
        fields: Vec<String>,
        key_type: KeyType,
        key_length: u16,
        unique: bool,
    ) -> Result<Self, IndexError> {
        let valid_length = match key_type {
            KeyType::Character => (1..=MAX_KEY_LENGTH).contains(&key_length),
            other => key_length == fixed_length(other),
        };
        if !valid_length {
            return Err(IndexError::InvalidHeader(format!(
                "key length {key_length} is not valid for key type {key_type}"
            )));
        }
        Ok(Self {
            expression: expression.trim().to_string(),
            fields,
            key_type,
            key_length,
            unique,
        })
    }

    /// The expression as written.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Field names in key order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Key width in bytes.
    #[must_use]
    pub const fn key_length(&self) -> u16 {
        self.key_length
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the key is a single plain field.
    #[must_use]
    pub fn is_single_field(&self) -> bool {
        self.fields.len() == 1
    }

    /// Build the key for the current record.
    ///
    /// Text keys concatenate the field values in order. Numeric, float and
    /// date keys add up the numeric value of each field, dates counting as
    /// Julian day numbers. Null and blank values contribute nothing.
    pub fn build_key(&self, source: &dyn FieldSource) -> Result<NodeKey, IndexError> {
        if self.key_type == KeyType::Character {
            let mut text = String::new();
            for name in &self.fields {
                let field = source
                    .field(name)
                    .ok_or_else(|| IndexError::UnknownField(name.clone()))?;
                if let Some(value) = field.get() {
                    text.push_str(value);
                }
            }
            return Ok(NodeKey::Text(text));
        }

        let mut sum = 0.0;
        for name in &self.fields {
            let field = source
                .field(name)
                .ok_or_else(|| IndexError::UnknownField(name.clone()))?;
            let Some(value) = field.get().map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let number = if field.field_type() == FieldType::Date {
                date_to_julian(value)
            } else {
                value.parse::<f64>().ok().filter(|n| n.is_finite())
            };
            sum += number.ok_or_else(|| IndexError::InvalidFieldValue {
                field: name.clone(),
                value: value.to_string(),
            })?;
        }
        let out_of_range = || IndexError::InvalidFieldValue {
            field: self.expression.clone(),
            value: sum.to_string(),
        };
        match self.key_type {
            KeyType::Float => FloatKey::checked_from_f64(sum)
                .map(NodeKey::Float)
                .ok_or_else(out_of_range),
            _ if sum.is_finite() => Ok(NodeKey::Numeric(sum)),
            _ => Err(out_of_range()),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn fixed_length(key_type: KeyType) -> u16 {
    match key_type {
        KeyType::Float => FLOAT_KEY_LEN as u16,
        KeyType::Character | KeyType::Numeric | KeyType::Date => NUMERIC_KEY_LEN as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::field::Table;
    use crate::testing::MemoryTable;

    fn table() -> MemoryTable {
        MemoryTable::new("PEOPLE")
            .with_field("NAME", FieldType::Character, 20)
            .with_field("CITY", FieldType::Character, 15)
            .with_field("AGE", FieldType::Numeric, 3)
            .with_field("SALARY", FieldType::Float, 10)
            .with_field("BORN", FieldType::Date, 8)
    }

    #[test]
    fn test_parse_expression() {
        let fields = KeyDefinition::parse_expression(" name + City ").expect("parse");
        assert_eq!(fields, vec!["NAME".to_string(), "CITY".to_string()]);

        assert!(KeyDefinition::parse_expression("NAME+").is_err());
        assert!(KeyDefinition::parse_expression("UPPER(NAME)").is_err());
    }

    #[test]
    fn test_key_type_from_fields() {
        let t = table();
        let text = KeyDefinition::from_fields("NAME+CITY", &t, NodeFormat::Mdx, false)
            .expect("text key");
        assert_eq!(text.key_type(), KeyType::Character);
        assert_eq!(text.key_length(), 35);

        let ndx_number =
            KeyDefinition::from_fields("AGE+SALARY", &t, NodeFormat::Ndx, true).expect("number");
        assert_eq!(ndx_number.key_type(), KeyType::Numeric);
        assert_eq!(ndx_number.key_length(), 8);
        assert!(ndx_number.is_unique());

        let mdx_number =
            KeyDefinition::from_fields("AGE", &t, NodeFormat::Mdx, false).expect("float");
        assert_eq!(mdx_number.key_type(), KeyType::Float);
        assert_eq!(mdx_number.key_length(), 12);

        let date = KeyDefinition::from_fields("BORN", &t, NodeFormat::Mdx, false).expect("date");
        assert_eq!(date.key_type(), KeyType::Date);

        let mixed =
            KeyDefinition::from_fields("NAME+AGE", &t, NodeFormat::Ndx, false).expect("mixed");
        assert_eq!(mixed.key_type(), KeyType::Character);
        assert_eq!(mixed.key_length(), 23);
    }

    #[test]
    fn test_unknown_field() {
        let result = KeyDefinition::from_fields("MISSING", &table(), NodeFormat::Ndx, false);
        assert!(matches!(result, Err(IndexError::UnknownField(name)) if name == "MISSING"));
    }

    #[test]
    fn test_stored_lengths_are_checked() {
        assert!(KeyDefinition::from_stored("AGE", KeyType::Numeric, 8, false).is_ok());
        assert!(KeyDefinition::from_stored("AGE", KeyType::Numeric, 12, false).is_err());
        assert!(KeyDefinition::from_stored("NAME", KeyType::Character, 0, false).is_err());
        assert!(KeyDefinition::from_stored("NAME", KeyType::Character, 101, false).is_err());
    }

    #[test]
    fn test_build_text_key() {
        let mut t = table();
        t.append(&[("NAME", Some("SMITH")), ("CITY", None)]);
        t.go_to(1).expect("go to");
        let definition =
            KeyDefinition::from_fields("NAME+CITY", &t, NodeFormat::Ndx, false).expect("def");
        assert_eq!(
            definition.build_key(t.fields()).expect("key"),
            NodeKey::text("SMITH")
        );
    }

    #[test]
    fn test_build_numeric_keys() {
        let mut t = table();
        t.append(&[
            ("AGE", Some(" 40")),
            ("SALARY", Some("2.5")),
            ("BORN", Some("20000102")),
        ]);
        t.append(&[("AGE", Some("")), ("SALARY", Some("abc"))]);
        t.go_to(1).expect("go to");

        let sum = KeyDefinition::from_fields("AGE+SALARY", &t, NodeFormat::Ndx, false)
            .expect("def");
        assert_eq!(sum.build_key(t.fields()).expect("key"), NodeKey::Numeric(42.5));

        let float = KeyDefinition::from_fields("AGE", &t, NodeFormat::Mdx, false).expect("def");
        assert_eq!(float.build_key(t.fields()).expect("key"), NodeKey::float(40.0));

        let date = KeyDefinition::from_fields("BORN", &t, NodeFormat::Ndx, false).expect("def");
        assert_eq!(
            date.build_key(t.fields()).expect("key"),
            NodeKey::Numeric(2_451_546.0)
        );

        t.go_to(2).expect("go to");
        assert!(matches!(
            sum.build_key(t.fields()),
            Err(IndexError::InvalidFieldValue { field, .. }) if field == "SALARY"
        ));
        assert_eq!(float.build_key(t.fields()).expect("key"), NodeKey::float(0.0));
    }

    #[test]
    fn test_build_key_rejects_sums_out_of_range() {
        let mut t = table();
        t.append(&[("AGE", Some("3e250")), ("SALARY", Some("4e250"))]);
        let float = KeyDefinition::from_fields("AGE+SALARY", &t, NodeFormat::Mdx, false)
            .expect("def");
        assert!(matches!(
            float.build_key(t.fields()),
            Err(IndexError::InvalidFieldValue { field, .. }) if field == "AGE+SALARY"
        ));

        let numeric = KeyDefinition::from_fields("AGE+SALARY", &t, NodeFormat::Ndx, false)
            .expect("def");
        assert!(matches!(
            numeric.build_key(t.fields()),
            Ok(NodeKey::Numeric(sum)) if sum > 6.9e250
        ));

        t.append(&[("AGE", Some("1e308")), ("SALARY", Some("1e308"))]);
        assert!(matches!(
            numeric.build_key(t.fields()),
            Err(IndexError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn test_sentinels_bracket_keys() {
        use crate::index::key::KeyComparison;
        use std::cmp::Ordering;

        let samples = [
            (KeyType::Character, NodeKey::text("A")),
            (KeyType::Numeric, NodeKey::Numeric(-1.0e300)),
            (KeyType::Float, NodeKey::float(-1.0e30)),
        ];
        for (key_type, sample) in samples {
            let min = key_type.min_key();
            let max = key_type.max_key();
            assert_eq!(
                min.compare(&sample, KeyComparison::Strict),
                Ok(Ordering::Less)
            );
            assert_eq!(
                max.compare(&sample, KeyComparison::Strict),
                Ok(Ordering::Greater)
            );
        }
    }
}

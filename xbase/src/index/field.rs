//! Table-side collaborators consumed by the index layer.
//!
//! The index never reads table rows itself. It asks a `FieldSource` for
//! the current value of the fields named in a key expression, and walks a
//! `Table` record by record when a tag is rebuilt.

use chrono::{Datelike, NaiveDate};

use crate::index::IndexError;

/// dBase field type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Character,
    Numeric,
    Float,
    Date,
    Logical,
    Memo,
}

impl FieldType {
    /// The type code stored in table headers.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Character => 'C',
            Self::Numeric => 'N',
            Self::Float => 'F',
            Self::Date => 'D',
            Self::Logical => 'L',
            Self::Memo => 'M',
        }
    }

    /// Whether values of this type take part in numeric key sums.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Numeric | Self::Float | Self::Date)
    }
}

impl TryFrom<char> for FieldType {
    type Error = char;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase() {
            'C' => Ok(Self::Character),
            'N' => Ok(Self::Numeric),
            'F' => Ok(Self::Float),
            'D' => Ok(Self::Date),
            'L' => Ok(Self::Logical),
            'M' => Ok(Self::Memo),
            _ => Err(value),
        }
    }
}

/// One column of the current table record.
pub trait Field {
    /// Column name.
    fn name(&self) -> &str;

    /// Current value as text, `None` when null.
    fn get(&self) -> Option<&str>;

    /// Column type.
    fn field_type(&self) -> FieldType;

    /// Declared width in bytes.
    fn length(&self) -> u16;
}

/// Field lookup for the current record.
pub trait FieldSource {
    /// Look up a field by name. Implementations match case-insensitively.
    fn field(&self, name: &str) -> Option<&dyn Field>;
}

/// A table that can be walked record by record.
pub trait Table {
    /// Table name, recorded in the MDX anchor.
    fn name(&self) -> &str;

    /// Number of records; record numbers run from 1 to this value.
    fn record_count(&self) -> u32;

    /// Make `record` the current record.
    fn go_to(&mut self, record: u32) -> Result<(), IndexError>;

    /// Fields of the current record.
    fn fields(&self) -> &dyn FieldSource;
}

/// Julian day number of 0000-12-31, the day before `num_days_from_ce` 1.
const JULIAN_DAY_BEFORE_CE: i64 = 1_721_425;

/// Julian day number of a Gregorian calendar date.
#[must_use]
pub fn julian_day(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce()) + JULIAN_DAY_BEFORE_CE
}

/// Convert a `YYYYMMDD` date value to its Julian day number.
///
/// Returns `None` for values that are not a calendar date.
#[must_use]
pub fn date_to_julian(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
    // Julian day numbers stay far inside f64's exact integer range.
    #[allow(clippy::cast_precision_loss)]
    Some(julian_day(date) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_codes() {
        for t in [
            FieldType::Character,
            FieldType::Numeric,
            FieldType::Float,
            FieldType::Date,
            FieldType::Logical,
            FieldType::Memo,
        ] {
            assert_eq!(FieldType::try_from(t.code()), Ok(t));
        }
        assert_eq!(FieldType::try_from('n'), Ok(FieldType::Numeric));
        assert_eq!(FieldType::try_from('X'), Err('X'));
    }

    #[test]
    fn test_julian_day_known_values() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("date");
        assert_eq!(julian_day(date(2000, 1, 1)), 2_451_545);
        assert_eq!(julian_day(date(1970, 1, 1)), 2_440_588);
        assert_eq!(julian_day(date(2000, 3, 1)) - julian_day(date(2000, 2, 28)), 2);
    }

    #[test]
    fn test_date_to_julian() {
        assert_eq!(date_to_julian("20000101"), Some(2_451_545.0));
        assert_eq!(date_to_julian("20000102"), Some(2_451_546.0));
        assert_eq!(date_to_julian("        "), None);
        assert_eq!(date_to_julian("20001301"), None);
        assert_eq!(date_to_julian("2000-1-1"), None);
    }

    #[test]
    fn test_date_to_julian_rejects_impossible_days() {
        assert_eq!(date_to_julian("20230231"), None);
        assert_eq!(date_to_julian("20230431"), None);
        assert_eq!(date_to_julian("20230229"), None);
        assert_eq!(date_to_julian("20240229"), Some(2_460_370.0));
        assert_eq!(date_to_julian("20230303"), Some(2_460_007.0));
    }
}

//! In-memory table fixtures.
//!
//! `MemoryTable` stands in for a DBF table: it keeps rows as optional
//! strings and exposes the current row through `FieldSource`.

use crate::index::IndexError;
use crate::index::field::{Field, FieldSource, FieldType, Table};

/// One column of a `MemoryTable`, holding the current row's value.
#[derive(Debug, Clone)]
pub struct MemoryField {
    name: String,
    field_type: FieldType,
    length: u16,
    value: Option<String>,
}

impl MemoryField {
    #[must_use]
    pub fn new(name: &str, field_type: FieldType, length: u16) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            field_type,
            length,
            value: None,
        }
    }

    pub fn set(&mut self, value: Option<&str>) {
        self.value = value.map(str::to_string);
    }
}

impl Field for MemoryField {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self) -> Option<&str> {
        self.value.as_deref()
    }

    fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn length(&self) -> u16 {
        self.length
    }
}

/// A table held in memory. Record numbers start at 1.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    columns: Vec<MemoryField>,
    rows: Vec<Vec<Option<String>>>,
    current: u32,
}

impl MemoryTable {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
            current: 0,
        }
    }

    /// Add a column. Existing rows get a null value for it.
    #[must_use]
    pub fn with_field(mut self, name: &str, field_type: FieldType, length: u16) -> Self {
        self.columns.push(MemoryField::new(name, field_type, length));
        for row in &mut self.rows {
            row.push(None);
        }
        self
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Append a row and make it current. Columns not named are null.
    pub fn append(&mut self, values: &[(&str, Option<&str>)]) -> u32 {
        let mut row = vec![None; self.columns.len()];
        for (name, value) in values {
            if let Some(index) = self.column(name) {
                row[index] = value.map(str::to_string);
            }
        }
        self.rows.push(row);
        self.current = self.record_count();
        self.load();
        self.current
    }

    /// Change a value of the current row.
    pub fn set(&mut self, name: &str, value: Option<&str>) -> Result<(), IndexError> {
        let index = self
            .column(name)
            .ok_or_else(|| IndexError::UnknownField(name.to_string()))?;
        let row = self
            .current
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| self.rows.get_mut(i))
            .ok_or_else(|| IndexError::Table("no current record".to_string()))?;
        row[index] = value.map(str::to_string);
        self.columns[index].set(value);
        Ok(())
    }

    /// The current record number, 0 before the first `go_to`.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.current
    }

    fn load(&mut self) {
        let Some(row) = self
            .current
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| self.rows.get(i))
        else {
            return;
        };
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.set(value.as_deref());
        }
    }
}

impl FieldSource for MemoryTable {
    fn field(&self, name: &str) -> Option<&dyn Field> {
        self.column(name)
            .map(|index| &self.columns[index] as &dyn Field)
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn record_count(&self) -> u32 {
        u32::try_from(self.rows.len()).unwrap_or(u32::MAX)
    }

    fn go_to(&mut self, record: u32) -> Result<(), IndexError> {
        if record == 0 || record > self.record_count() {
            return Err(IndexError::Table(format!(
                "record {record} out of range 1..={}",
                self.record_count()
            )));
        }
        self.current = record;
        self.load();
        Ok(())
    }

    fn fields(&self) -> &dyn FieldSource {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_and_current_record() {
        let mut table = MemoryTable::new("PEOPLE").with_field("NAME", FieldType::Character, 10);
        assert_eq!(table.append(&[("name", Some("ALICE"))]), 1);
        assert_eq!(table.append(&[]), 2);

        assert_eq!(table.field("NAME").and_then(Field::get), None);
        table.go_to(1).expect("go to");
        assert_eq!(table.field("Name").and_then(Field::get), Some("ALICE"));

        table.set("NAME", Some("ALICIA")).expect("set");
        table.go_to(2).expect("go to");
        table.go_to(1).expect("go to");
        assert_eq!(table.field("NAME").and_then(Field::get), Some("ALICIA"));

        assert!(matches!(table.go_to(3), Err(IndexError::Table(_))));
        assert!(table.field("MISSING").is_none());
    }
}

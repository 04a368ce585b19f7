//! In-memory record table.
//!
//! A `Table` is an ordered list of named columns and an ordered list of
//! rows. Any column layout can be built; [`crate::schema::validate`] reports
//! what is wrong with it.

use crate::schema::IMAGE_CSV_COLUMNS;
use std::fmt;

/// A single cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value
    Null,
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
}

impl Value {
    /// Whether the cell is missing
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text of a `Text` cell
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload of an `Int` cell
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Inferred type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Every cell is an integer
    Int64,
    /// Numbers only, with at least one float or missing cell
    Float64,
    /// Every cell is text
    Utf8,
    /// Mixed cells, or no cells at all
    Object,
}

impl DType {
    /// Infer the type of a column from its cells
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let (mut ints, mut floats, mut nulls, mut texts) = (0usize, 0usize, 0usize, 0usize);
        for value in values {
            match value {
                Value::Null => nulls += 1,
                Value::Int(_) => ints += 1,
                Value::Float(_) => floats += 1,
                Value::Text(_) => texts += 1,
            }
        }

        let numeric = ints + floats + nulls;
        match (texts, numeric) {
            (0, 0) => Self::Object,
            (0, _) if floats == 0 && nulls == 0 => Self::Int64,
            (0, _) => Self::Float64,
            (_, 0) => Self::Utf8,
            _ => Self::Object,
        }
    }

    /// Whether the type is an integer type
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Int64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Utf8 => "utf8",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Table construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// A row does not match the column count
    #[error("Row {row} has {actual} values but the table has {expected} columns")]
    RowWidth {
        /// Zero based row index
        row: usize,
        /// Column count
        expected: usize,
        /// Values in the row
        actual: usize,
    },

    /// A requested column does not exist
    #[error("Unknown column: {name}")]
    UnknownColumn {
        /// Requested name
        name: String,
    },

    /// The same column name appears twice
    #[error("Duplicate column: {name}")]
    DuplicateColumn {
        /// Repeated name
        name: String,
    },
}

/// Ordered, named columns with ordered rows
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns
    ///
    /// # Errors
    ///
    /// Returns error if a column name is repeated
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Result<Self, TableError> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(TableError::DuplicateColumn { name: name.clone() });
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Create a table from columns and rows
    ///
    /// # Errors
    ///
    /// Returns error if a column is repeated or a row has the wrong width
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Result<Self, TableError> {
        let mut table = Self::new(columns)?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Create a table with the canonical `image_uri, label, split` columns
    pub fn from_records<U, L, S>(records: impl IntoIterator<Item = (U, L, S)>) -> Self
    where
        U: Into<Value>,
        L: Into<Value>,
        S: Into<Value>,
    {
        Self {
            columns: IMAGE_CSV_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            rows: records
                .into_iter()
                .map(|(uri, label, split)| vec![uri.into(), label.into(), split.into()])
                .collect(),
        }
    }

    /// Append a row
    ///
    /// # Errors
    ///
    /// Returns error if the row width does not match the columns
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Column names in order
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in order
    #[must_use]
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Whether a column exists
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of one column, top to bottom
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    /// Inferred type of a column
    #[must_use]
    pub fn dtype(&self, name: &str) -> Option<DType> {
        self.column_values(name).map(DType::infer)
    }

    /// Project the table onto `names`, in that order
    ///
    /// # Errors
    ///
    /// Returns error if a name is unknown or repeated
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, TableError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name.as_ref())
                    .ok_or_else(|| TableError::UnknownColumn {
                        name: name.as_ref().to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut projected = Self::new(names.iter().map(|n| n.as_ref().to_string()))?;
        projected.rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(projected)
    }

    /// Rows viewed as image records.
    ///
    /// Reads cells by canonical position, so only meaningful on a table that
    /// passed [`crate::schema::validate`].
    pub fn records(&self) -> impl Iterator<Item = ImageRecord<'_>> + '_ {
        self.rows.iter().filter(|row| row.len() >= 3).map(|row| ImageRecord {
            image_uri: &row[0],
            label: &row[1],
            split: &row[2],
        })
    }
}

/// Borrowed view of one row of a validated table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRecord<'a> {
    /// Image location
    pub image_uri: &'a Value,
    /// Class label
    pub label: &'a Value,
    /// Partition tag
    pub split: &'a Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Table {
        Table::from_records([
            ("gs://b/1.jpg", "cat", "TRAIN"),
            ("gs://b/2.jpg", "dog", "VALIDATION"),
            ("gs://b/3.jpg", "cat", "TEST"),
        ])
    }

    #[test]
    fn test_from_records_canonical_columns() {
        let table = sample();
        assert_eq!(table.columns(), ["image_uri", "label", "split"]);
        assert_eq!(table.num_rows(), 3);
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Table::new(["a", "b", "a"]).unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn { name: "a".to_string() });
    }

    #[test]
    fn test_push_row_width_checked() {
        let mut table = Table::new(["a", "b"]).unwrap();
        assert!(table.push_row(vec![Value::Int(1), Value::Int(2)]).is_ok());
        let err = table.push_row(vec![Value::Int(1)]).unwrap_err();
        assert_eq!(
            err,
            TableError::RowWidth {
                row: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_select_reorders_columns() {
        let table = sample();
        let projected = table.select(&["split", "image_uri"]).unwrap();
        assert_eq!(projected.columns(), ["split", "image_uri"]);
        assert_eq!(projected.rows()[1], vec![Value::from("VALIDATION"), Value::from("gs://b/2.jpg")]);
    }

    #[test]
    fn test_select_unknown_column() {
        let err = sample().select(&["uri"]).unwrap_err();
        assert_eq!(err, TableError::UnknownColumn { name: "uri".to_string() });
    }

    #[test]
    fn test_dtype_inference() {
        assert_eq!(DType::infer(&[Value::Int(1), Value::Int(2)]), DType::Int64);
        assert_eq!(DType::infer(&[Value::Int(1), Value::Float(2.5)]), DType::Float64);
        assert_eq!(DType::infer(&[Value::Int(1), Value::Null]), DType::Float64);
        assert_eq!(DType::infer(&[Value::from("a"), Value::from("b")]), DType::Utf8);
        assert_eq!(DType::infer(&[Value::from("a"), Value::Int(1)]), DType::Object);
        assert_eq!(DType::infer(&[Value::from("a"), Value::Null]), DType::Object);
        assert_eq!(DType::infer(std::iter::empty::<&Value>()), DType::Object);
    }

    #[test]
    fn test_table_dtype() {
        let table = Table::from_records([("gs://b/1.jpg", 0, "TRAIN"), ("gs://b/2.jpg", 1, "TEST")]);
        assert_eq!(table.dtype("label"), Some(DType::Int64));
        assert_eq!(table.dtype("split"), Some(DType::Utf8));
        assert_eq!(table.dtype("missing"), None);
    }

    #[test]
    fn test_records_view() {
        let table = sample();
        let first = table.records().next().unwrap();
        assert_eq!(first.image_uri.as_str(), Some("gs://b/1.jpg"));
        assert_eq!(first.label.to_string(), "cat");
        assert_eq!(first.split.to_string(), "TRAIN");
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }

    proptest! {
        #[test]
        fn prop_select_preserves_rows(labels in proptest::collection::vec(0i64..100, 0..50)) {
            let table = Table::from_records(
                labels.iter().enumerate().map(|(i, l)| (format!("gs://b/{}.jpg", i), *l, "TRAIN")),
            );
            let projected = table.select(&["label", "image_uri"]).unwrap();
            prop_assert_eq!(projected.columns(), ["label", "image_uri"]);
            prop_assert_eq!(projected.num_rows(), table.num_rows());
            for (src, dst) in table.rows().iter().zip(projected.rows()) {
                prop_assert_eq!(&dst[0], &src[1]);
                prop_assert_eq!(&dst[1], &src[0]);
            }
        }
    }
}

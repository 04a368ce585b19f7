//! Record table schema check.

use crate::table::Table;

/// Image location column
pub const IMAGE_URI_KEY: &str = "image_uri";
/// Label column
pub const LABEL_KEY: &str = "label";
/// Split column
pub const SPLIT_KEY: &str = "split";

/// Required columns, in required order
pub const IMAGE_CSV_COLUMNS: [&str; 3] = [IMAGE_URI_KEY, LABEL_KEY, SPLIT_KEY];

/// Schema violation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A required column is absent
    #[error("Table must contain a `{column}` column")]
    MissingColumn {
        /// Absent column
        column: String,
    },

    /// Required columns are present but the column list is wrong
    #[error("Table column order must be {expected:?}, got {actual:?}")]
    ColumnOrder {
        /// Required column list
        expected: Vec<String>,
        /// Column list found
        actual: Vec<String>,
    },

    /// A key column has an empty cell
    #[error("Missing value in column `{column}` at row {row}")]
    MissingValue {
        /// Column holding the empty cell
        column: String,
        /// Zero based row index
        row: usize,
    },
}

/// Check that `table` has exactly the `image_uri, label, split` columns, in
/// that order, with no empty cells.
///
/// # Errors
///
/// Returns the first violation found
pub fn validate(table: &Table) -> Result<(), SchemaError> {
    for column in IMAGE_CSV_COLUMNS {
        if !table.has_column(column) {
            return Err(SchemaError::MissingColumn {
                column: column.to_string(),
            });
        }
    }

    if table.columns() != IMAGE_CSV_COLUMNS {
        return Err(SchemaError::ColumnOrder {
            expected: IMAGE_CSV_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            actual: table.columns().to_vec(),
        });
    }

    for (row, cells) in table.rows().iter().enumerate() {
        if let Some(index) = cells.iter().position(|cell| cell.is_null()) {
            return Err(SchemaError::MissingValue {
                column: IMAGE_CSV_COLUMNS[index].to_string(),
                row,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use proptest::prelude::*;

    fn valid() -> Table {
        Table::from_records([("gs://b/1.jpg", "cat", "TRAIN"), ("gs://b/2.jpg", "dog", "TEST")])
    }

    #[test]
    fn test_valid_table() {
        assert!(validate(&valid()).is_ok());
    }

    #[test]
    fn test_renamed_uri_column() {
        let table = Table::from_rows(
            ["uri", "label", "split"],
            [vec![Value::from("gs://b/1.jpg"), Value::from("cat"), Value::from("TRAIN")]],
        )
        .unwrap();
        assert_eq!(
            validate(&table),
            Err(SchemaError::MissingColumn {
                column: "image_uri".to_string()
            })
        );
    }

    #[test]
    fn test_missing_label_and_split() {
        let table = Table::new(["image_uri", "split"]).unwrap();
        assert_eq!(
            validate(&table).unwrap_err().to_string(),
            "Table must contain a `label` column"
        );

        let table = Table::new(["image_uri", "label"]).unwrap();
        assert_eq!(
            validate(&table),
            Err(SchemaError::MissingColumn {
                column: "split".to_string()
            })
        );
    }

    #[test]
    fn test_wrong_order() {
        let table = valid().select(&["label", "image_uri", "split"]).unwrap();
        assert!(matches!(validate(&table), Err(SchemaError::ColumnOrder { .. })));
    }

    #[test]
    fn test_extra_column() {
        let table = Table::new(["image_uri", "label", "split", "weight"]).unwrap();
        let err = validate(&table).unwrap_err();
        assert!(err.to_string().contains("weight"));
    }

    #[test]
    fn test_missing_value() {
        let table = Table::from_records([
            (Value::from("gs://b/1.jpg"), Value::from("cat"), Value::from("TRAIN")),
            (Value::from("gs://b/2.jpg"), Value::Null, Value::from("TRAIN")),
        ]);
        assert_eq!(
            validate(&table),
            Err(SchemaError::MissingValue {
                column: "label".to_string(),
                row: 1
            })
        );
    }

    fn permutations() -> Vec<[&'static str; 3]> {
        let [a, b, c] = IMAGE_CSV_COLUMNS;
        vec![[a, c, b], [b, a, c], [b, c, a], [c, a, b], [c, b, a]]
    }

    proptest! {
        #[test]
        fn prop_reordered_columns_fail(pick in 0usize..5, rows in 0usize..20) {
            let table = Table::from_records(
                (0..rows).map(|i| (format!("gs://b/{}.jpg", i), "cat", "TRAIN")),
            );
            let order = permutations()[pick];
            let reordered = table.select(&order).unwrap();
            prop_assert!(validate(&reordered).is_err());
        }

        #[test]
        fn prop_dropped_column_fails(drop in 0usize..3) {
            let mut names: Vec<&str> = IMAGE_CSV_COLUMNS.to_vec();
            names.remove(drop);
            let table = valid().select(&names).unwrap();
            let is_missing = matches!(validate(&table), Err(SchemaError::MissingColumn { .. }));
            prop_assert!(is_missing);
        }
    }
}

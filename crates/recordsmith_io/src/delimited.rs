//! Delimited text to record table.

use recordsmith_core::{HeaderSpec, Table, TableError, Value, IMAGE_CSV_COLUMNS};

/// Delimited file parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsvError {
    /// Malformed input
    #[error("Malformed delimited data at line {line}: {reason}")]
    Malformed {
        /// One based line number
        line: u64,
        /// Parser message
        reason: String,
    },

    /// A record has the wrong number of fields
    #[error("Line {line} has {actual} fields, expected {expected}")]
    FieldCount {
        /// One based line number
        line: u64,
        /// Fields in the first record
        expected: usize,
        /// Fields on this line
        actual: usize,
    },

    /// The requested header record does not exist
    #[error("No header record at row {row}")]
    MissingHeader {
        /// Requested header row
        row: usize,
    },

    /// The header produced an invalid table
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

impl ColumnKind {
    fn infer(cells: &[&str]) -> Self {
        let present = || cells.iter().filter(|c| !c.is_empty());
        if present().all(|c| c.parse::<i64>().is_ok()) {
            Self::Int
        } else if present().all(|c| c.parse::<f64>().is_ok()) {
            Self::Float
        } else {
            Self::Text
        }
    }

    fn convert(self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            Self::Int => cell.parse().map_or_else(|_| Value::from(cell), Value::Int),
            Self::Float => cell.parse().map_or_else(|_| Value::from(cell), Value::Float),
            Self::Text => Value::from(cell),
        }
    }
}

fn malformed(err: &csv::Error) -> CsvError {
    CsvError::Malformed {
        line: err.position().map_or(0, csv::Position::line),
        reason: err.to_string(),
    }
}

/// Parse delimited text into a table.
///
/// Empty cells become `Null`. Each column is typed as a whole: integers if
/// every present cell is an integer, floats if every present cell is a
/// number, text otherwise.
///
/// # Errors
///
/// Returns error if the data is malformed, the header row is missing or a
/// record has the wrong width
pub fn parse_delimited(data: &[u8], delimiter: u8, header: &HeaderSpec) -> Result<Table, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);
    let mut records = reader.records();

    let columns: Vec<String> = match header {
        HeaderSpec::FromFirstRow | HeaderSpec::Row(_) => {
            let row = match header {
                HeaderSpec::Row(n) => *n,
                _ => 0,
            };
            for record in records.by_ref().take(row) {
                record.map_err(|e| malformed(&e))?;
            }
            match records.next() {
                Some(record) => record
                    .map_err(|e| malformed(&e))?
                    .iter()
                    .map(str::to_string)
                    .collect(),
                None => return Err(CsvError::MissingHeader { row }),
            }
        }
        HeaderSpec::NoHeader => IMAGE_CSV_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
        HeaderSpec::Names(names) => names.clone(),
    };

    let mut raw: Vec<csv::StringRecord> = Vec::new();
    for record in records {
        let record = record.map_err(|e| malformed(&e))?;
        if record.len() != columns.len() {
            return Err(CsvError::FieldCount {
                line: record.position().map_or(0, csv::Position::line),
                expected: columns.len(),
                actual: record.len(),
            });
        }
        raw.push(record);
    }

    let kinds: Vec<ColumnKind> = (0..columns.len())
        .map(|i| {
            let cells: Vec<&str> = raw.iter().map(|r| &r[i]).collect();
            ColumnKind::infer(&cells)
        })
        .collect();

    let rows = raw.iter().map(|record| {
        record
            .iter()
            .zip(&kinds)
            .map(|(cell, kind)| kind.convert(cell))
            .collect::<Vec<_>>()
    });

    Ok(Table::from_rows(columns, rows)?)
}

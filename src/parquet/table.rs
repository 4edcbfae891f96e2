//! Save and load an emissions table as a parquet file.

use std::{fs::File, path::Path, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema},
};
use chrono::NaiveDate;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use tempfile::NamedTempFile;

use crate::{
    error::{IngestError, Result},
    table::{Cell, EmissionsTable},
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Text,
    Int,
    Float,
    Date,
}

/// Writes `table` to `file_path`. The file is staged next to its destination and
/// moved into place once complete, so a failed write never leaves a truncated file.
pub fn save_table(table: &EmissionsTable, file_path: &Path) -> Result<()> {
    if table.columns().is_empty() {
        return Err(IngestError::Config(format!(
            "refusing to write {} with no columns",
            file_path.display()
        )));
    }

    let batch = to_record_batch(table)?;

    let dir = file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(dir)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(staged.as_file_mut(), batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    staged.persist(file_path).map_err(|e| IngestError::Io(e.error))?;

    Ok(())
}

pub fn load_table(file_path: &Path) -> Result<EmissionsTable> {
    let file = File::open(file_path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut table: Option<EmissionsTable> = None;
    for batch in reader {
        let batch = batch?;
        let columns: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();

        let decoded: Vec<Vec<Cell>> = batch
            .columns()
            .iter()
            .map(decode_column)
            .collect::<Result<_>>()?;

        let rows = (0..batch.num_rows())
            .map(|i| decoded.iter().map(|col| col[i].clone()).collect())
            .collect();

        let part = EmissionsTable::from_rows(columns, rows)?;
        match table.as_mut() {
            Some(t) => t.append(part)?,
            None => table = Some(part),
        }
    }

    Ok(table.unwrap_or_default())
}

fn to_record_batch(table: &EmissionsTable) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(table.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns().len());

    for (idx, name) in table.columns().iter().enumerate() {
        let cells: Vec<&Cell> = table.rows().iter().map(|row| &row[idx]).collect();
        let kind = column_kind(&cells);

        let array: ArrayRef = match kind {
            ColumnKind::Int => Arc::new(Int64Array::from(
                cells.iter().map(|c| c.as_i64()).collect::<Vec<_>>(),
            )),
            ColumnKind::Float => Arc::new(Float64Array::from(
                cells.iter().map(|c| c.as_f64()).collect::<Vec<_>>(),
            )),
            ColumnKind::Date => Arc::new(Date32Array::from(
                cells
                    .iter()
                    .map(|c| c.as_date().map(days_since_epoch))
                    .collect::<Vec<_>>(),
            )),
            ColumnKind::Text => Arc::new(StringArray::from(
                cells
                    .iter()
                    .map(|c| if c.is_null() { None } else { Some(c.to_string()) })
                    .collect::<Vec<_>>(),
            )),
        };

        let data_type = match kind {
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Date => DataType::Date32,
            ColumnKind::Text => DataType::Utf8,
        };
        fields.push(Field::new(name, data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Narrowest arrow type able to hold every non-null cell of a column.
fn column_kind(cells: &[&Cell]) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for cell in cells {
        let this = match cell {
            Cell::Null => continue,
            Cell::Int(_) => ColumnKind::Int,
            Cell::Float(_) => ColumnKind::Float,
            Cell::Date(_) => ColumnKind::Date,
            Cell::Text(_) => return ColumnKind::Text,
        };
        kind = Some(match (kind, this) {
            (None, k) => k,
            (Some(a), b) if a == b => a,
            (Some(ColumnKind::Int), ColumnKind::Float) | (Some(ColumnKind::Float), ColumnKind::Int) => {
                ColumnKind::Float
            }
            _ => return ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn decode_column(array: &ArrayRef) -> Result<Vec<Cell>> {
    let len = array.len();
    let cells = match array.data_type() {
        DataType::Utf8 => {
            let a = downcast::<StringArray>(array)?;
            (0..len)
                .map(|i| if a.is_null(i) { Cell::Null } else { Cell::Text(a.value(i).to_string()) })
                .collect()
        }
        DataType::Int64 => {
            let a = downcast::<Int64Array>(array)?;
            (0..len)
                .map(|i| if a.is_null(i) { Cell::Null } else { Cell::Int(a.value(i)) })
                .collect()
        }
        DataType::Float64 => {
            let a = downcast::<Float64Array>(array)?;
            (0..len)
                .map(|i| if a.is_null(i) { Cell::Null } else { Cell::Float(a.value(i)) })
                .collect()
        }
        DataType::Date32 => {
            let a = downcast::<Date32Array>(array)?;
            (0..len)
                .map(|i| {
                    if a.is_null(i) {
                        Cell::Null
                    } else {
                        date_from_days(a.value(i)).map(Cell::Date).unwrap_or(Cell::Null)
                    }
                })
                .collect()
        }
        other => {
            return Err(IngestError::UnsupportedFormat(format!(
                "parquet column of type {other}"
            )))
        }
    };
    Ok(cells)
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        IngestError::UnsupportedFormat(format!("unexpected array for {}", array.data_type()))
    })
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::days(days as i64))
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn should_save_and_reload_mixed_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emissions.parquet");
        let table = EmissionsTable::from_rows(
            vec![
                "facility".to_string(),
                "year".to_string(),
                "emissions".to_string(),
                "date".to_string(),
            ],
            vec![
                vec![
                    Cell::Text("A".to_string()),
                    Cell::Int(2022),
                    Cell::Int(10),
                    Cell::Date(NaiveDate::from_ymd_opt(2022, 1, 1).unwrap()),
                ],
                vec![Cell::Null, Cell::Int(2021), Cell::Float(2.5), Cell::Null],
            ],
        )
        .unwrap();

        save_table(&table, &path).unwrap();
        let loaded = load_table(&path).unwrap();

        assert_eq!(loaded.columns(), table.columns());
        assert_eq!(loaded.rows()[0][0], Cell::Text("A".to_string()));
        assert_eq!(loaded.rows()[0][2], Cell::Float(10.0));
        assert_eq!(loaded.rows()[1][0], Cell::Null);
        assert_eq!(
            loaded.rows()[0][3],
            Cell::Date(NaiveDate::from_ymd_opt(2022, 1, 1).unwrap())
        );
    }

    #[test]
    fn should_widen_mixed_types_to_text() {
        let a = Cell::Int(1);
        let b = Cell::Text("x".to_string());
        let c = Cell::Float(1.5);
        assert_eq!(column_kind(&[&a, &c]), ColumnKind::Float);
        assert_eq!(column_kind(&[&a, &b]), ColumnKind::Text);
        assert_eq!(column_kind(&[&Cell::Null]), ColumnKind::Text);
    }

    #[test]
    fn should_refuse_table_without_columns() {
        let dir = tempdir().unwrap();
        let err = save_table(&EmissionsTable::default(), &dir.path().join("x.parquet"));
        assert!(err.is_err());
    }
}

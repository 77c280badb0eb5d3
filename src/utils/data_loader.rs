//! Data loading utilities
//!
//! CSV round-trips for stage artifacts and conversions between polars frames
//! and the ndarray matrices the models consume.

use crate::error::{ChurnflowError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;

/// CSV loader for stage artifacts
pub struct DataLoader {
    /// Rows scanned for schema inference
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(1000),
        }
    }

    /// Set the number of rows used for schema inference (`None` scans all)
    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            ChurnflowError::DataError(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let reader = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file);

        reader.finish().map_err(|e| {
            ChurnflowError::DataError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

/// Save DataFrame to CSV, creating parent directories
pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| ChurnflowError::DataError(e.to_string()))
}

/// Column values cast to f64, nulls preserved
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| ChurnflowError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Column values cast to f64; a null is an error
pub fn column_to_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    column_values(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| {
                ChurnflowError::InvalidInput(format!(
                    "Column '{}' has a missing value at row {}",
                    name, row
                ))
            })
        })
        .collect()
}

/// Whether a dtype takes part in numeric comparisons
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Stack the named columns into a row-major matrix
pub fn frame_to_array(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let mut x = Array2::zeros((n_rows, columns.len()));
    for (j, name) in columns.iter().enumerate() {
        let values = column_to_f64(df, name)?;
        for (i, v) in values.into_iter().enumerate() {
            x[[i, j]] = v;
        }
    }
    Ok(x)
}

/// Build a frame from a matrix, optionally appending an integer label column last
pub fn array_to_frame(
    x: &Array2<f64>,
    columns: &[String],
    label: Option<(&str, &Array1<i64>)>,
) -> Result<DataFrame> {
    if x.ncols() != columns.len() {
        return Err(ChurnflowError::ShapeError {
            expected: format!("{} columns", columns.len()),
            actual: format!("{} columns", x.ncols()),
        });
    }

    let mut out: Vec<Column> = columns
        .iter()
        .enumerate()
        .map(|(j, name)| Column::new(name.as_str().into(), x.column(j).to_vec()))
        .collect();

    if let Some((name, y)) = label {
        if y.len() != x.nrows() {
            return Err(ChurnflowError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        out.push(Column::new(name.into(), y.to_vec()));
    }

    Ok(DataFrame::new(out)?)
}

/// Split a labelled matrix artifact back into features and labels
///
/// The label is expected as the final column; the remaining header must match
/// `feature_names` exactly and in order.
pub fn split_labelled(
    df: &DataFrame,
    feature_names: &[String],
    label_column: &str,
) -> Result<(Array2<f64>, Array1<i64>)> {
    let header: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let expected_width = feature_names.len() + 1;
    if header.len() != expected_width
        || header[..feature_names.len()] != *feature_names
        || header[feature_names.len()] != label_column
    {
        return Err(ChurnflowError::ShapeError {
            expected: format!("{:?} + {}", feature_names, label_column),
            actual: format!("{:?}", header),
        });
    }

    let x = frame_to_array(df, feature_names)?;
    let y: Vec<i64> = column_to_f64(df, label_column)?
        .into_iter()
        .map(|v| v.round() as i64)
        .collect();
    Ok((x, Array1::from_vec(y)))
}

/// Flatten JSON records (one object per row) into a frame
///
/// Columns appear in the order keys are first seen. Number columns become
/// float, string columns text, boolean columns boolean; a key missing from a
/// record, or an explicit null, is a null cell. Mixing kinds in one column is
/// an error.
pub fn records_to_frame(records: &[serde_json::Map<String, serde_json::Value>]) -> Result<DataFrame> {
    use serde_json::Value;

    let mut names: Vec<&str> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key.as_str());
            }
        }
    }

    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let values: Vec<&Value> = records
            .iter()
            .map(|r| r.get(name).unwrap_or(&Value::Null))
            .collect();
        let mismatch = |v: &Value| {
            ChurnflowError::InvalidInput(format!(
                "Field '{}' mixes value types (unexpected {})",
                name, v
            ))
        };

        let column = match values.iter().find(|v| !v.is_null()) {
            Some(Value::String(_)) => {
                let cells = values
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => Ok(Some(s.clone())),
                        Value::Null => Ok(None),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<Option<String>>>>()?;
                Column::new(name.into(), cells)
            }
            Some(Value::Bool(_)) => {
                let cells = values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Ok(Some(*b)),
                        Value::Null => Ok(None),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<Option<bool>>>>()?;
                Column::new(name.into(), cells)
            }
            Some(Value::Number(_)) | None => {
                let cells = values
                    .iter()
                    .map(|v| match v {
                        Value::Number(n) => Ok(n.as_f64()),
                        Value::Null => Ok(None),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<Vec<Option<f64>>>>()?;
                Column::new(name.into(), cells)
            }
            Some(other) => return Err(mismatch(other)),
        };
        columns.push(column);
    }

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_csv_round_trip_keeps_integers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let mut df = df!("A" => &[1i64, 2, 3], "B" => &[0.5f64, 1.5, 2.5]).unwrap();

        save_csv(&mut df, &path).unwrap();
        let loaded = DataLoader::new().load_csv(&path).unwrap();

        assert_eq!(loaded.shape(), (3, 2));
        assert_eq!(loaded.column("A").unwrap().dtype(), &DataType::Int64);
        assert_eq!(column_to_f64(&loaded, "B").unwrap(), vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn test_frame_array_round_trip_with_label() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0i64, 1];
        let names = vec!["f1".to_string(), "f2".to_string()];

        let df = array_to_frame(&x, &names, Some(("label", &y))).unwrap();
        let (x2, y2) = split_labelled(&df, &names, "label").unwrap();

        assert_eq!(x, x2);
        assert_eq!(y, y2);
    }

    #[test]
    fn test_split_labelled_rejects_reordered_header() {
        let df = df!("f2" => &[1.0], "f1" => &[2.0], "label" => &[0i64]).unwrap();
        let names = vec!["f1".to_string(), "f2".to_string()];
        assert!(split_labelled(&df, &names, "label").is_err());
    }

    #[test]
    fn test_null_is_rejected() {
        let df = df!("a" => &[Some(1.0), None]).unwrap();
        assert!(matches!(
            column_to_f64(&df, "a"),
            Err(ChurnflowError::InvalidInput(_))
        ));
        assert_eq!(column_values(&df, "a").unwrap(), vec![Some(1.0), None]);
    }

    #[test]
    fn test_records_to_frame() {
        let records: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(
            r#"[{"a": 1, "b": "x"}, {"a": 2.5, "c": true}, {"a": null, "b": "y"}]"#,
        )
        .unwrap();
        let df = records_to_frame(&records).unwrap();

        assert_eq!(df.shape(), (3, 3));
        assert_eq!(df.column("a").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("b").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("c").unwrap().dtype(), &DataType::Boolean);
        assert_eq!(column_values(&df, "a").unwrap(), vec![Some(1.0), Some(2.5), None]);

        let mixed: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(r#"[{"a": 1}, {"a": "one"}]"#).unwrap();
        assert!(records_to_frame(&mixed).is_err());
    }
}

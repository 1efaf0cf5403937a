//! CSV and Parquet readers producing ordered record sets

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::error::Result;
use crate::types::Record;

/// Read a CSV file, inferring one type per column
///
/// Columns whose non-empty cells all parse as integers become integers, then
/// floats, then booleans; anything else stays a string. Empty cells are null.
pub fn extract_csv(path: &Path) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = dedupe_headers(reader.headers()?.iter());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for row in reader.records() {
        rows.push(row?.iter().map(str::to_string).collect());
    }

    let kinds: Vec<ColumnKind> = (0..headers.len())
        .map(|col| ColumnKind::infer(rows.iter().map(|row| row[col].as_str())))
        .collect();

    Ok(rows
        .into_iter()
        .map(|row| {
            headers
                .iter()
                .zip(kinds.iter())
                .zip(row)
                .map(|((name, kind), cell)| (name.clone(), kind.convert(cell)))
                .collect()
        })
        .collect())
}

/// Parse CSV text with every value kept as a string
///
/// Rows whose field count differs from the header are an error.
pub fn extract_csv_text(content: &str) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers = dedupe_headers(reader.headers()?.iter());

    let mut records: Vec<Record> = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(
            headers
                .iter()
                .zip(row.iter())
                .map(|(name, cell)| (name.clone(), Value::String(cell.to_string())))
                .collect(),
        );
    }
    Ok(records)
}

/// Read every row of a Parquet file in row-group order
pub fn extract_parquet(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file)?;
    let expected = reader.metadata().file_metadata().num_rows().max(0) as usize;

    let mut records: Vec<Record> = Vec::with_capacity(expected);
    for row in reader.get_row_iter(None)? {
        let row = row?;
        records.push(
            row.get_column_iter()
                .map(|(name, field)| (name.clone(), field_to_json(field)))
                .collect(),
        );
    }
    Ok(records)
}

fn field_to_json(field: &Field) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Bool(*b),
        Field::Byte(n) => Value::from(*n),
        Field::Short(n) => Value::from(*n),
        Field::Int(n) => Value::from(*n),
        Field::Long(n) => Value::from(*n),
        Field::UByte(n) => Value::from(*n),
        Field::UShort(n) => Value::from(*n),
        Field::UInt(n) => Value::from(*n),
        Field::ULong(n) => Value::from(*n),
        Field::Float(n) => float_value(*n as f64),
        Field::Double(n) => float_value(*n),
        Field::Str(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

fn float_value(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Repeated header names get a `.N` suffix so no column is lost
fn dedupe_headers<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .map(|name| {
            let count = seen.entry(name.to_string()).or_insert(0);
            let unique = if *count == 0 {
                name.to_string()
            } else {
                format!("{}.{}", name, count)
            };
            *count += 1;
            unique
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

impl ColumnKind {
    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let (mut int, mut float, mut boolean) = (true, true, true);
        let mut any = false;

        for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
            any = true;
            int &= cell.parse::<i64>().is_ok();
            float &= cell.parse::<f64>().is_ok();
            boolean &= parse_bool(cell).is_some();
            if !(int || float || boolean) {
                return Self::Text;
            }
        }

        match (any, int, float, boolean) {
            (false, ..) => Self::Text,
            (_, true, _, _) => Self::Int,
            (_, _, true, _) => Self::Float,
            (_, _, _, true) => Self::Bool,
            _ => Self::Text,
        }
    }

    fn convert(self, cell: String) -> Value {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        match self {
            Self::Int => trimmed.parse::<i64>().map(Value::from).unwrap_or(Value::String(cell)),
            Self::Float => trimmed
                .parse::<f64>()
                .map(float_value)
                .unwrap_or(Value::String(cell)),
            Self::Bool => parse_bool(trimmed).map(Value::Bool).unwrap_or(Value::String(cell)),
            Self::Text => Value::String(cell),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parquet::data_type::{ByteArray, ByteArrayType, Int32Type};
    use parquet::file::properties::WriterProperties;
    use parquet::file::writer::SerializedFileWriter;
    use parquet::schema::parser::parse_message_type;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Write `(id, name)` rows as one row group; no rows writes an empty file
    pub(crate) fn write_parquet(path: &Path, rows: &[(i32, &str)]) {
        let schema = Arc::new(
            parse_message_type(
                "message schema { REQUIRED INT32 id; REQUIRED BYTE_ARRAY name (UTF8); }",
            )
            .unwrap(),
        );
        let file = File::create(path).unwrap();
        let mut writer =
            SerializedFileWriter::new(file, schema, Arc::new(WriterProperties::builder().build()))
                .unwrap();

        if !rows.is_empty() {
            let ids: Vec<i32> = rows.iter().map(|(id, _)| *id).collect();
            let names: Vec<ByteArray> = rows.iter().map(|(_, name)| ByteArray::from(*name)).collect();

            let mut group = writer.next_row_group().unwrap();
            let mut col = group.next_column().unwrap().unwrap();
            col.typed::<Int32Type>().write_batch(&ids, None, None).unwrap();
            col.close().unwrap();
            let mut col = group.next_column().unwrap().unwrap();
            col.typed::<ByteArrayType>().write_batch(&names, None, None).unwrap();
            col.close().unwrap();
            group.close().unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn test_csv_infers_column_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(
            &path,
            "name,age,score,active,zip\nAda,36,9.5,true,02139\nBob,,7,False,\n",
        )
        .unwrap();

        let records = extract_csv(&path).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            Value::Object(records[0].clone()),
            json!({"name": "Ada", "age": 36, "score": 9.5, "active": true, "zip": 2139})
        );
        assert_eq!(records[1]["age"], Value::Null);
        assert_eq!(records[1]["score"], json!(7.0));
        assert_eq!(records[1]["active"], json!(false));
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, ["name", "age", "score", "active", "zip"]);
    }

    #[test]
    fn test_csv_mixed_column_stays_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mixed.csv");
        std::fs::write(&path, "code\n12\nA7\n").unwrap();

        let records = extract_csv(&path).unwrap();
        assert_eq!(records[0]["code"], json!("12"));
        assert_eq!(records[1]["code"], json!("A7"));
    }

    #[test]
    fn test_csv_duplicate_headers_are_kept() {
        let records = extract_csv_text("a,a,b\n1,2,3\n").unwrap();
        assert_eq!(Value::Object(records[0].clone()), json!({"a": "1", "a.1": "2", "b": "3"}));
    }

    #[test]
    fn test_csv_text_keeps_strings() {
        let records = extract_csv_text("id,qty\n7,3.0\n").unwrap();
        assert_eq!(records[0]["id"], json!("7"));
        assert_eq!(records[0]["qty"], json!("3.0"));
    }

    #[test]
    fn test_csv_ragged_row_is_error() {
        assert!(extract_csv_text("a,b\n1,2,3\n").is_err());
    }

    #[test]
    fn test_csv_header_only_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("header.csv");
        std::fs::write(&path, "a,b\n").unwrap();
        assert!(extract_csv(&path).unwrap().is_empty());
    }

    #[test]
    fn test_parquet_rows_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.parquet");
        write_parquet(&path, &[(1, "alpha"), (2, "beta"), (3, "gamma")]);

        let records = extract_parquet(&path).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(Value::Object(records[1].clone()), json!({"id": 2, "name": "beta"}));
        assert_eq!(records[2]["name"], json!("gamma"));
    }

    #[test]
    fn test_parquet_zero_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.parquet");
        write_parquet(&path, &[]);

        assert!(extract_parquet(&path).unwrap().is_empty());
    }

    #[test]
    fn test_parquet_garbage_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.parquet");
        std::fs::write(&path, b"not parquet at all").unwrap();

        assert!(extract_parquet(&path).is_err());
    }
}

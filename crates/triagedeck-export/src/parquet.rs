//! Parquet dataset writer with a pinned name/type map.
//!
//! The schema is derived from `include_fields` alone: the three event
//! timestamp fields are INT64, every other projected field (ids, notes,
//! dotted metadata paths) is a UTF-8 byte array, and all columns are
//! OPTIONAL. Writer properties are fixed — uncompressed, 1 MiB data pages —
//! so that two runs over the same snapshot produce byte-identical files.

use std::sync::Arc;

use ::parquet::{
  basic::{Compression, ConvertedType, Repetition, Type as PhysicalType},
  data_type::{ByteArray, ByteArrayType, Int64Type},
  file::{properties::WriterProperties, writer::SerializedFileWriter},
  schema::types::Type,
};
use serde_json::Value;

use crate::Result;

const DATA_PAGE_SIZE: usize = 1024 * 1024;
const WRITE_BATCH_SIZE: usize = 1024;

/// Fields pinned to INT64; everything else is a UTF-8 byte array.
fn is_int64_field(name: &str) -> bool {
  matches!(name, "ts_client" | "ts_client_effective" | "ts_server")
}

fn build_schema(fields: &[String]) -> Result<Arc<Type>> {
  let mut columns: Vec<Arc<Type>> = Vec::with_capacity(fields.len());
  for field in fields {
    let column = if is_int64_field(field) {
      Type::primitive_type_builder(field, PhysicalType::INT64)
        .with_repetition(Repetition::OPTIONAL)
        .build()?
    } else {
      Type::primitive_type_builder(field, PhysicalType::BYTE_ARRAY)
        .with_repetition(Repetition::OPTIONAL)
        .with_converted_type(ConvertedType::UTF8)
        .build()?
    };
    columns.push(Arc::new(column));
  }
  Ok(Arc::new(
    Type::group_type_builder("dataset").with_fields(columns).build()?,
  ))
}

/// Render a projected value into UTF-8 bytes for a byte-array column.
fn text_cell(value: &Value) -> Option<Vec<u8>> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone().into_bytes()),
    Value::Bool(b) => Some(b.to_string().into_bytes()),
    Value::Number(n) => Some(n.to_string().into_bytes()),
    other => Some(other.to_string().into_bytes()),
  }
}

/// Serialize `rows` (projected values aligned with `fields`) into a parquet
/// file held in memory. A single row group keeps the layout repeatable.
pub fn write_parquet(
  fields: &[String],
  rows: &[Vec<Value>],
) -> Result<Vec<u8>> {
  let schema = build_schema(fields)?;
  let props = Arc::new(
    WriterProperties::builder()
      .set_compression(Compression::UNCOMPRESSED)
      .set_data_page_size_limit(DATA_PAGE_SIZE)
      .set_write_batch_size(WRITE_BATCH_SIZE)
      .build(),
  );

  let mut out: Vec<u8> = Vec::new();
  let mut writer = SerializedFileWriter::new(&mut out, schema, props)?;
  let mut row_group = writer.next_row_group()?;

  let mut column_index = 0usize;
  while let Some(mut column) = row_group.next_column()? {
    let field = &fields[column_index];
    let mut def_levels: Vec<i16> = Vec::with_capacity(rows.len());

    if is_int64_field(field) {
      let mut values: Vec<i64> = Vec::new();
      for row in rows {
        match row[column_index].as_i64() {
          Some(v) => {
            values.push(v);
            def_levels.push(1);
          }
          None => def_levels.push(0),
        }
      }
      column
        .typed::<Int64Type>()
        .write_batch(&values, Some(&def_levels), None)?;
    } else {
      let mut values: Vec<ByteArray> = Vec::new();
      for row in rows {
        match text_cell(&row[column_index]) {
          Some(bytes) => {
            values.push(ByteArray::from(bytes));
            def_levels.push(1);
          }
          None => def_levels.push(0),
        }
      }
      column
        .typed::<ByteArrayType>()
        .write_batch(&values, Some(&def_levels), None)?;
    }

    column.close()?;
    column_index += 1;
  }

  row_group.close()?;
  writer.close()?;
  Ok(out)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn writes_a_valid_parquet_envelope() {
    let fields = fields(&["external_id", "decision_id", "ts_server"]);
    let rows = vec![
      vec![json!("img_0001"), json!("pass"), json!(10)],
      vec![json!("img_0002"), json!(null), json!(null)],
    ];
    let bytes = write_parquet(&fields, &rows).unwrap();
    assert!(bytes.len() > 8);
    assert_eq!(&bytes[..4], b"PAR1");
    assert_eq!(&bytes[bytes.len() - 4..], b"PAR1");
  }

  #[test]
  fn empty_dataset_still_produces_a_file() {
    let bytes = write_parquet(&fields(&["external_id"]), &[]).unwrap();
    assert_eq!(&bytes[..4], b"PAR1");
  }

  #[test]
  fn output_is_byte_identical_across_runs() {
    let fields = fields(&["external_id", "ts_server", "metadata.subject_id"]);
    let rows: Vec<Vec<serde_json::Value>> = (0..100)
      .map(|i| {
        vec![json!(format!("img_{i:04}")), json!(i), json!("s-1")]
      })
      .collect();
    let a = write_parquet(&fields, &rows).unwrap();
    let b = write_parquet(&fields, &rows).unwrap();
    assert_eq!(a, b);
  }
}

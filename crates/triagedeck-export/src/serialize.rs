//! Deterministic dataset serializers.
//!
//! The serialization order of rows plus the allow-listed projection is the
//! sole determinant of the output hash, so both text formats are fully
//! specified here:
//!
//! - jsonl — one record per line, keys in `include_fields` order, UTF-8, LF
//!   separators, no trailing newline after the last line;
//! - csv — header row equal to `include_fields`, RFC 4180 quoting, LF line
//!   endings.
//!
//! Parquet lives in its own module; it buffers projected values and writes
//! the columnar file on `finish`.

use serde_json::Value;
use triagedeck_core::export::{ExportFormat, ExportRow};

use crate::{Result, parquet::write_parquet, snapshot::field_value};

// ─── CSV helpers ─────────────────────────────────────────────────────────────

/// RFC 4180: quote a field iff it contains a comma, quote, CR, or LF; double
/// embedded quotes.
fn csv_escape(s: &str) -> String {
  if s.contains([',', '"', '\r', '\n']) {
    format!("\"{}\"", s.replace('"', "\"\""))
  } else {
    s.to_string()
  }
}

/// Render a projected JSON value into a csv cell. Null is the empty cell;
/// nested structures are embedded as compact JSON.
fn csv_cell(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => csv_escape(s),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    other => csv_escape(&other.to_string()),
  }
}

// ─── jsonl helpers ───────────────────────────────────────────────────────────

/// One jsonl record with keys in `fields` order.
fn jsonl_line(row: &ExportRow, fields: &[String]) -> Result<String> {
  let mut line = String::from("{");
  for (i, field) in fields.iter().enumerate() {
    if i > 0 {
      line.push(',');
    }
    line.push_str(&serde_json::to_string(field)?);
    line.push(':');
    line.push_str(&serde_json::to_string(&field_value(row, field))?);
  }
  line.push('}');
  Ok(line)
}

// ─── Writer ──────────────────────────────────────────────────────────────────

/// Incremental dataset writer. Rows are fed in bounded chunks (the worker
/// checks for cancellation between chunks); `finish` yields the final bytes.
pub struct DatasetWriter {
  format:       ExportFormat,
  fields:       Vec<String>,
  buf:          Vec<u8>,
  /// Projected values buffered for the columnar format.
  column_rows:  Vec<Vec<Value>>,
  rows_written: u64,
}

impl DatasetWriter {
  pub fn new(format: ExportFormat, fields: Vec<String>) -> Self {
    let mut buf = Vec::new();
    if format == ExportFormat::Csv {
      let header: Vec<String> =
        fields.iter().map(|f| csv_escape(f)).collect();
      buf.extend_from_slice(header.join(",").as_bytes());
      buf.push(b'\n');
    }
    Self {
      format,
      fields,
      buf,
      column_rows: Vec::new(),
      rows_written: 0,
    }
  }

  pub fn rows_written(&self) -> u64 { self.rows_written }

  /// Bytes buffered so far; a lower bound on the final size for the text
  /// formats, used for early limit enforcement.
  pub fn buffered_len(&self) -> usize { self.buf.len() }

  pub fn write_rows(&mut self, rows: &[ExportRow]) -> Result<()> {
    for row in rows {
      match self.format {
        ExportFormat::Jsonl => {
          if self.rows_written > 0 {
            self.buf.push(b'\n');
          }
          let line = jsonl_line(row, &self.fields)?;
          self.buf.extend_from_slice(line.as_bytes());
        }
        ExportFormat::Csv => {
          let cells: Vec<String> = self
            .fields
            .iter()
            .map(|f| csv_cell(&field_value(row, f)))
            .collect();
          self.buf.extend_from_slice(cells.join(",").as_bytes());
          self.buf.push(b'\n');
        }
        ExportFormat::Parquet => {
          let values: Vec<Value> =
            self.fields.iter().map(|f| field_value(row, f)).collect();
          self.column_rows.push(values);
        }
      }
      self.rows_written += 1;
    }
    Ok(())
  }

  pub fn finish(self) -> Result<Vec<u8>> {
    match self.format {
      ExportFormat::Jsonl | ExportFormat::Csv => Ok(self.buf),
      ExportFormat::Parquet => write_parquet(&self.fields, &self.column_rows),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;
  use uuid::Uuid;

  use super::*;

  fn row(external_id: &str, decision: &str, note: &str, ts: i64) -> ExportRow {
    ExportRow {
      item_id:             Uuid::nil(),
      external_id:         external_id.into(),
      logical_uri:         format!("/media/{external_id}.jpg"),
      metadata:            json!({"subject_id": "s-1"}),
      user_id:             Some("reviewer@example.com".into()),
      event_id:            Some(Uuid::nil()),
      decision_id:         Some(decision.into()),
      note:                Some(note.into()),
      ts_client:           Some(ts - 1),
      ts_client_effective: Some(ts - 1),
      ts_server:           Some(ts),
    }
  }

  fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn jsonl_keys_follow_field_order_without_trailing_newline() {
    let mut w = DatasetWriter::new(
      ExportFormat::Jsonl,
      fields(&["external_id", "decision_id", "ts_server"]),
    );
    w.write_rows(&[row("img_0001", "pass", "", 10)]).unwrap();
    w.write_rows(&[row("img_0002", "fail", "", 20)]).unwrap();
    let bytes = w.finish().unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(
      text,
      "{\"external_id\":\"img_0001\",\"decision_id\":\"pass\",\"ts_server\":10}\n\
       {\"external_id\":\"img_0002\",\"decision_id\":\"fail\",\"ts_server\":20}"
    );
  }

  #[test]
  fn jsonl_renders_missing_fields_as_null() {
    let mut w = DatasetWriter::new(
      ExportFormat::Jsonl,
      fields(&["external_id", "metadata.missing"]),
    );
    w.write_rows(&[row("img_0001", "pass", "", 10)]).unwrap();
    let text = String::from_utf8(w.finish().unwrap()).unwrap();
    assert_eq!(
      text,
      "{\"external_id\":\"img_0001\",\"metadata.missing\":null}"
    );
  }

  #[test]
  fn csv_header_equals_include_fields() {
    let mut w = DatasetWriter::new(
      ExportFormat::Csv,
      fields(&["external_id", "decision_id", "note"]),
    );
    w.write_rows(&[row("img_0001", "pass", "fine", 10)]).unwrap();
    let text = String::from_utf8(w.finish().unwrap()).unwrap();
    assert_eq!(
      text,
      "external_id,decision_id,note\nimg_0001,pass,fine\n"
    );
  }

  #[test]
  fn csv_quotes_per_rfc_4180() {
    let mut w =
      DatasetWriter::new(ExportFormat::Csv, fields(&["external_id", "note"]));
    w.write_rows(&[row("img_0001", "pass", "hello, \"world\"\nbye", 10)])
      .unwrap();
    let text = String::from_utf8(w.finish().unwrap()).unwrap();
    assert_eq!(
      text,
      "external_id,note\nimg_0001,\"hello, \"\"world\"\"\nbye\"\n"
    );
  }

  #[test]
  fn csv_null_is_empty_cell() {
    let mut w = DatasetWriter::new(
      ExportFormat::Csv,
      fields(&["external_id", "variant_key", "ts_server"]),
    );
    w.write_rows(&[row("img_0001", "pass", "", 10)]).unwrap();
    let text = String::from_utf8(w.finish().unwrap()).unwrap();
    assert_eq!(text, "external_id,variant_key,ts_server\nimg_0001,,10\n");
  }

  #[test]
  fn empty_jsonl_dataset_is_empty_bytes() {
    let w = DatasetWriter::new(ExportFormat::Jsonl, fields(&["external_id"]));
    assert!(w.finish().unwrap().is_empty());
  }

  #[test]
  fn serialization_is_deterministic_across_runs() {
    let rows: Vec<ExportRow> = (0..5)
      .map(|i| row(&format!("img_{i:04}"), "pass", "", 10 + i as i64))
      .collect();
    let run = |format: ExportFormat| {
      let mut w = DatasetWriter::new(
        format,
        fields(&["external_id", "decision_id", "ts_server"]),
      );
      w.write_rows(&rows).unwrap();
      w.finish().unwrap()
    };
    for format in
      [ExportFormat::Jsonl, ExportFormat::Csv, ExportFormat::Parquet]
    {
      assert_eq!(run(format), run(format), "{format:?} not deterministic");
    }
  }
}

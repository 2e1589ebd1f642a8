//! JSONL reading and writing.
//!
//! Both question sets and result files share one convention: an optional
//! metadata object on the first line, then one record per line. A first line
//! that carries a `position` field is a record, not metadata, even if it also
//! has metadata-looking keys.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::Result;

/// True when a parsed first line should be treated as the metadata header.
#[must_use]
pub fn is_metadata_line(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    if obj.contains_key("position") {
        return false;
    }
    obj.contains_key("metadata") || obj.contains_key("novel_summary")
}

/// Read a JSONL file into `(metadata, records)`.
///
/// Blank lines are skipped. Lines that fail to parse as JSON are returned in
/// place as `None` entries so callers can count and report them with line
/// numbers intact.
pub fn read_values(path: &Path) -> Result<(Option<Value>, Vec<(usize, Option<Value>)>)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut metadata = None;
    let mut records = Vec::new();
    let mut saw_first = false;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: Option<Value> = serde_json::from_str(trimmed).ok();
        if !saw_first {
            saw_first = true;
            if let Some(value) = &parsed {
                if is_metadata_line(value) {
                    metadata = parsed;
                    continue;
                }
            }
        }
        records.push((idx + 1, parsed));
    }

    Ok((metadata, records))
}

/// Line-oriented JSON writer that flushes after every record.
///
/// Flushing per record is what makes interrupted runs resumable: every line
/// already on disk is a completed result.
pub struct JsonlWriter {
    inner: BufWriter<File>,
}

impl JsonlWriter {
    /// Create (truncate) the file at `path`, creating parent directories.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Ok(Self { inner: BufWriter::new(file) })
    }

    /// Serialize one record as a JSON line and flush it to disk.
    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.inner, record)?;
        self.inner.write_all(b"\n")?;
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_detection() {
        assert!(is_metadata_line(&json!({"metadata": {"model_name": "m"}})));
        assert!(is_metadata_line(&json!({"novel_summary": "s"})));
        assert!(!is_metadata_line(&json!({"question": "q"})));
        // A line with a position is a record even with metadata keys present.
        assert!(!is_metadata_line(&json!({
            "metadata": {},
            "position": {"start_pos": 0, "end_pos": 1}
        })));
        assert!(!is_metadata_line(&json!("just a string")));
    }

    #[test]
    fn read_values_splits_metadata_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        std::fs::write(
            &path,
            "{\"metadata\":{\"model_name\":\"m\"}}\n{\"a\":1}\n\nnot json\n{\"a\":2}\n",
        )
        .unwrap();

        let (metadata, records) = read_values(&path).unwrap();
        assert!(metadata.is_some());
        assert_eq!(records.len(), 3);
        assert!(records[0].1.is_some());
        assert!(records[1].1.is_none(), "unparseable line kept as None");
        assert_eq!(records[1].0, 4, "line numbers preserved");
    }

    #[test]
    fn missing_metadata_line_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        std::fs::write(&path, "{\"a\":1}\n{\"a\":2}\n").unwrap();

        let (metadata, records) = read_values(&path).unwrap();
        assert!(metadata.is_none());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn writer_emits_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        {
            let mut writer = JsonlWriter::create(&path).unwrap();
            writer.write_record(&json!({"x": 1})).unwrap();
            writer.write_record(&json!({"x": 2})).unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}

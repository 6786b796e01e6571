use crate::source::{RecordSource, RecordStream};
use anyhow::{Context, Result};
use serde_json::Value;
use std::{fs::File, io::BufRead, path::PathBuf};

/// A [`RecordSource`] over JSONL files.
///
/// Each file id is a path, resolved against an optional root directory. Every
/// non-blank line is one record: a JSON array holding one field per slot.
///
/// ```ignore
/// // data/part-0.jsonl
/// // [[0.1, 0.2], 3, [[1, 0.5], [4, 1.0]]]
/// let source = JsonlSource::new().with_root("data");
/// let stream = source.open("part-0.jsonl")?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonlSource {
    root: Option<PathBuf>,
}

impl JsonlSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative file ids against `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn resolve(&self, file: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(file),
            None => PathBuf::from(file),
        }
    }
}

impl RecordSource<Value> for JsonlSource {
    fn open(&self, file: &str) -> Result<RecordStream<Value>> {
        let path = self.resolve(file);
        let handle =
            File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = std::io::BufReader::new(handle);

        let iter = reader.lines().enumerate().filter_map(|(line_num, line)| {
            let line = match line {
                Ok(l) if l.trim().is_empty() => return None, // Skip blanks
                Ok(l) => l,
                Err(e) => return Some(Err(e.into())),
            };
            Some(
                serde_json::from_str::<Value>(&line)
                    .with_context(|| format!("Invalid JSON at line {}", line_num + 1)),
            )
        });
        Ok(Box::new(iter))
    }
}

#[cfg(test)]
mod jsonl_tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn test_jsonl_source_streams_records() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "[[0.5, 1.5], 3]")?;
        writeln!(file)?;
        writeln!(file, "[[2.0, 2.5], 1]")?;

        let source = JsonlSource::new();
        let path = file.path().to_string_lossy().into_owned();
        let records: Vec<Value> = source.open(&path)?.collect::<Result<_>>()?;
        assert_eq!(records, vec![json!([[0.5, 1.5], 3]), json!([[2.0, 2.5], 1])]);
        Ok(())
    }

    #[test]
    fn test_jsonl_source_resolves_root_and_reports_lines() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("part-0.jsonl"), "[1]\n{not json\n")?;

        let source = JsonlSource::new().with_root(dir.path());
        let mut stream = source.open("part-0.jsonl")?;
        assert_eq!(stream.next().transpose()?, Some(json!([1])));

        let err = stream.next().expect("second line").unwrap_err();
        assert!(err.to_string().contains("Invalid JSON at line 2"));
        assert!(stream.next().is_none());

        assert!(source.open("missing.jsonl").is_err());
        Ok(())
    }
}

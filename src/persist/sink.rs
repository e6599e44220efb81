use crate::persist::error::PersistResult;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Appends one row of round results per save to a CSV file.
///
/// The first save against a destination that does not exist yet writes the
/// header row of field names; every save appends one data row in the same
/// field order.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist one round's fields, creating the file (with header) first if
    /// needed.
    pub async fn save(&self, fields: &[(&'static str, String)]) -> PersistResult<()> {
        if !tokio::fs::try_exists(&self.path).await? {
            let header: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
            tokio::fs::write(&self.path, format!("{}\r\n", header.join(","))).await?;
        }

        let row: Vec<&str> = fields.iter().map(|(_, value)| value.as_str()).collect();
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format!("{}\r\n", row.join(",")).as_bytes())
            .await?;
        file.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fields(count: u64) -> Vec<(&'static str, String)> {
        vec![
            ("clients", "1".to_string()),
            ("count", count.to_string()),
            ("percentage", "100%".to_string()),
        ]
    }

    #[tokio::test]
    async fn test_first_save_writes_header_and_row() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path().join("1_1.csv"));

        sink.save(&fields(3)).await.unwrap();

        let contents = tokio::fs::read_to_string(sink.path()).await.unwrap();
        assert_eq!(contents, "clients,count,percentage\r\n1,3,100%\r\n");
    }

    #[tokio::test]
    async fn test_later_saves_append_rows_only() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path().join("1_1.csv"));

        sink.save(&fields(3)).await.unwrap();
        sink.save(&fields(6)).await.unwrap();

        let contents = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "clients,count,percentage");
        assert_eq!(lines[1], "1,3,100%");
        assert_eq!(lines[2], "1,6,100%");
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let sink = CsvSink::new(dir.path().join("gone").join("1_1.csv"));
        assert!(sink.save(&fields(1)).await.is_err());
    }
}

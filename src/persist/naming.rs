use crate::persist::error::PersistResult;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Pick the next result file in `dir`.
///
/// Result files are numbered `<test>_<run>.csv` so repeated benchmark runs
/// against the same target line up side by side. The next file increments
/// the highest test number found; an empty (or missing, it is created here)
/// directory starts at `1_1.csv`.
pub async fn next_run_file(dir: &Path) -> PersistResult<PathBuf> {
    let pattern = Regex::new(r"^(\d+)_(\d+)\.csv$").expect("literal pattern");

    tokio::fs::create_dir_all(dir).await?;

    let mut last_test: u32 = 0;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(caps) = pattern.captures(name) {
            if let Ok(test) = caps[1].parse::<u32>() {
                last_test = last_test.max(test);
            }
        }
    }

    Ok(dir.join(format!("{}_1.csv", last_test + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_directory_starts_at_one() {
        let dir = TempDir::new().unwrap();
        let file = next_run_file(dir.path()).await.unwrap();
        assert_eq!(file.file_name().unwrap(), "1_1.csv");
    }

    #[tokio::test]
    async fn test_missing_directory_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("go").join("benchmarks");

        let file = next_run_file(&nested).await.unwrap();
        assert_eq!(file.file_name().unwrap(), "1_1.csv");
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_increments_past_highest_existing() {
        let dir = TempDir::new().unwrap();
        for name in ["1_1.csv", "3_1.csv", "2_1.csv"] {
            tokio::fs::write(dir.path().join(name), "").await.unwrap();
        }

        let file = next_run_file(dir.path()).await.unwrap();
        assert_eq!(file.file_name().unwrap(), "4_1.csv");
    }

    #[tokio::test]
    async fn test_unrelated_files_ignored() {
        let dir = TempDir::new().unwrap();
        for name in ["notes.txt", "7.csv", "x_1.csv"] {
            tokio::fs::write(dir.path().join(name), "").await.unwrap();
        }

        let file = next_run_file(dir.path()).await.unwrap();
        assert_eq!(file.file_name().unwrap(), "1_1.csv");
    }
}

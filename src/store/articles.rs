//! CSV article record store.
//!
//! Header `url,title,text,label`, standard CSV quoting. Rows are only ever
//! appended, one batch per ingestion run.

use super::{ensure_parent, read_optional};
use crate::errors::StoreError;
use crate::models::ArticleRecord;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::io::SeekFrom;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct ArticleStore {
    path: PathBuf,
}

impl ArticleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URLs that already have a record. Absent or empty file: empty set.
    pub async fn load_urls(&self) -> Result<HashSet<String>, StoreError> {
        let Some(bytes) = read_optional(&self.path).await? else {
            return Ok(HashSet::new());
        };
        if bytes.is_empty() {
            return Ok(HashSet::new());
        }

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader
            .headers()
            .map_err(|e| StoreError::csv(&self.path, e))?
            .clone();
        let Some(url_col) = headers.iter().position(|h| h.trim() == "url") else {
            return Err(StoreError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, "missing `url` column"),
            ));
        };

        let mut urls = HashSet::new();
        for row in reader.records() {
            let row = row.map_err(|e| StoreError::csv(&self.path, e))?;
            if let Some(url) = row.get(url_col) {
                let url = url.trim();
                if !url.is_empty() {
                    urls.insert(url.to_string());
                }
            }
        }
        Ok(urls)
    }

    /// Every record in file order.
    pub async fn load_records(&self) -> Result<Vec<ArticleRecord>, StoreError> {
        let bytes = read_optional(&self.path).await?.unwrap_or_default();
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        csv::Reader::from_reader(bytes.as_slice())
            .deserialize()
            .collect::<Result<Vec<ArticleRecord>, _>>()
            .map_err(|e| StoreError::csv(&self.path, e))
    }

    /// Append `records` in a single write, adding the header if the file is new or empty.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = records.len()))]
    pub async fn append(&self, records: &[ArticleRecord]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let existing_len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let mut buf = Vec::new();
        if existing_len > 0 && !self.ends_with_newline().await? {
            buf.push(b'\n');
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(existing_len == 0)
            .from_writer(buf);
        for record in records {
            writer
                .serialize(record)
                .map_err(|e| StoreError::csv(&self.path, e))?;
        }
        let buf = writer
            .into_inner()
            .map_err(|e| StoreError::io(&self.path, e.into_error()))?;

        ensure_parent(&self.path).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(&buf)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        info!("Appended article records");
        Ok(records.len())
    }

    /// Whether the last byte of a non-empty store is `\n`.
    async fn ends_with_newline(&self) -> Result<bool, StoreError> {
        let mut file = File::open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.seek(SeekFrom::End(-1))
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(last[0] == b'\n')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(url: &str, text: &str, label: i64) -> ArticleRecord {
        ArticleRecord {
            url: url.to_string(),
            title: format!("Title, \"quoted\" for {url}"),
            text: text.to_string(),
            label,
        }
    }

    #[tokio::test]
    async fn test_missing_store_has_no_urls() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path().join("articles.csv"));
        assert!(store.load_urls().await.unwrap().is_empty());
        assert!(store.load_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path().join("articles.csv"));

        store.append(&[record("https://a.hu/1", "first\nparagraph", 0)]).await.unwrap();
        store.append(&[record("https://a.hu/2", "", 0)]).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("url,title,text,label\n"));
        assert_eq!(raw.matches("url,title,text,label").count(), 1);

        let records = store.load_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "first\nparagraph");
        assert_eq!(records[0].title, "Title, \"quoted\" for https://a.hu/1");
        assert_eq!(records[1].text, "");
    }

    #[tokio::test]
    async fn test_load_urls_reads_url_column() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path().join("articles.csv"));
        store
            .append(&[record("https://a.hu/1", "x", 1), record("https://b.hu/2", "y", 1)])
            .await
            .unwrap();

        let urls = store.load_urls().await.unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains("https://b.hu/2"));
    }

    #[tokio::test]
    async fn test_load_urls_with_reordered_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("articles.csv");
        std::fs::write(&path, "label,url,title,text\n0,https://a.hu/1,t,x\n").unwrap();

        let urls = ArticleStore::new(path).load_urls().await.unwrap();
        assert!(urls.contains("https://a.hu/1"));
    }

    #[tokio::test]
    async fn test_append_after_row_without_trailing_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("articles.csv");
        std::fs::write(&path, "url,title,text,label\nhttps://a.hu/1,t,x,0").unwrap();
        let store = ArticleStore::new(path);

        store.append(&[record("https://a.hu/2", "y", 0)]).await.unwrap();

        let urls = store.load_urls().await.unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains("https://a.hu/1"));
        let records = store.load_records().await.unwrap();
        assert_eq!(records[0].text, "x");
        assert_eq!(records[1].url, "https://a.hu/2");
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_create_file() {
        let dir = TempDir::new().unwrap();
        let store = ArticleStore::new(dir.path().join("articles.csv"));
        assert_eq!(store.append(&[]).await.unwrap(), 0);
        assert!(!store.path().exists());
    }
}

//! Line-delimited URL store.
//!
//! One absolute URL per line, UTF-8, newline-terminated. Lines are trimmed on
//! load and blank lines are ignored, so a hand-edited file still loads. Writes
//! never introduce a duplicate line.

use super::{ensure_parent, read_optional, write_atomic};
use crate::errors::StoreError;
use itertools::Itertools;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// A URL set persisted at `path`.
#[derive(Debug, Clone)]
pub struct UrlStore {
    path: PathBuf,
}

/// Whether `url` is a member of a loaded store snapshot.
pub fn contains(set: &HashSet<String>, url: &str) -> bool {
    set.contains(url.trim())
}

impl UrlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_text(&self) -> Result<String, StoreError> {
        let bytes = read_optional(&self.path).await?.unwrap_or_default();
        String::from_utf8(bytes).map_err(|e| {
            StoreError::io(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// Retained lines in file order, trimmed, blanks dropped.
    pub async fn load_lines(&self) -> Result<Vec<String>, StoreError> {
        let text = self.read_text().await?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Load the store as a set. An absent or empty file is an empty set.
    pub async fn load(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self.load_lines().await?.into_iter().collect())
    }

    /// Append the URLs not already present, returning how many were written.
    ///
    /// The snapshot is taken at call start and grows as the input is scanned,
    /// so duplicates inside `urls` are written once. Calling this again with
    /// the same input writes nothing.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub async fn append_new<I, S>(&self, urls: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let existing = self.read_text().await?;
        let mut known: HashSet<&str> = existing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let incoming: Vec<String> = urls
            .into_iter()
            .map(|u| u.as_ref().trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();

        let mut buf = String::new();
        if !existing.is_empty() && !existing.ends_with('\n') {
            buf.push('\n');
        }
        let mut written = 0usize;
        for url in &incoming {
            if known.insert(url.as_str()) {
                buf.push_str(url);
                buf.push('\n');
                written += 1;
            }
        }

        if written == 0 {
            debug!("Nothing new to append");
            return Ok(0);
        }

        ensure_parent(&self.path).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;

        debug!(written, "Appended URLs");
        Ok(written)
    }

    /// Rewrite the store without the lines whose trimmed value is in `exclude`.
    ///
    /// Retained lines keep their relative order. Returns the number of lines removed.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), exclude = exclude.len()))]
    pub async fn rewrite_excluding(&self, exclude: &HashSet<String>) -> Result<usize, StoreError> {
        let lines = self.load_lines().await?;
        let before = lines.len();
        let kept = lines
            .into_iter()
            .filter(|l| !exclude.contains(l))
            .collect::<Vec<_>>();
        let removed = before - kept.len();

        write_atomic(&self.path, render(&kept).as_bytes()).await?;
        info!(removed, remaining = kept.len(), "Rewrote URL store");
        Ok(removed)
    }

    /// Union this store into `dest` and write `dest` back sorted.
    ///
    /// Merging the same source again yields the same file. This store is left
    /// untouched.
    ///
    /// # Arguments
    ///
    /// * `dest` - The canonical store, rewritten atomically
    ///
    /// # Returns
    ///
    /// The number of distinct URLs in `dest` after the merge.
    #[instrument(level = "info", skip_all, fields(source = %self.path.display(), dest = %dest.path.display()))]
    pub async fn merge_sorted_into(&self, dest: &UrlStore) -> Result<usize, StoreError> {
        let mut union = dest.load().await?;
        union.extend(self.load().await?);

        let sorted = union.into_iter().sorted().collect_vec();
        write_atomic(&dest.path, render(&sorted).as_bytes()).await?;
        info!(size = sorted.len(), "Merged URL stores");
        Ok(sorted.len())
    }

    /// Empty the store in place. The file itself is kept.
    pub async fn clear(&self) -> Result<(), StoreError> {
        write_atomic(&self.path, b"").await
    }
}

fn render(lines: &[String]) -> String {
    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir, name: &str) -> UrlStore {
        UrlStore::new(dir.path().join(name))
    }

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, "0_urls.txt");
        assert!(s.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_trims_and_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, "0_urls.txt");
        std::fs::write(s.path(), "  https://a.hu/1 \n\n\nhttps://a.hu/2\n").unwrap();

        let set = s.load().await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(contains(&set, "https://a.hu/1"));
        assert!(contains(&set, " https://a.hu/2 "));
    }

    #[tokio::test]
    async fn test_append_new_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, "00_urls_tmp.txt");
        let input = ["https://a.hu/1", "https://a.hu/2", "https://a.hu/1"];

        assert_eq!(s.append_new(input).await.unwrap(), 2);
        let once = std::fs::read_to_string(s.path()).unwrap();

        assert_eq!(s.append_new(input).await.unwrap(), 0);
        let twice = std::fs::read_to_string(s.path()).unwrap();

        assert_eq!(once, twice);
        assert_eq!(once, "https://a.hu/1\nhttps://a.hu/2\n");
    }

    #[tokio::test]
    async fn test_append_new_only_writes_unseen() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, "0_urls.txt");
        s.append_new(["https://a.hu/1"]).await.unwrap();

        let written = s
            .append_new(["https://a.hu/1", "https://a.hu/3", ""])
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(s.load_lines().await.unwrap(), vec!["https://a.hu/1", "https://a.hu/3"]);
    }

    #[tokio::test]
    async fn test_append_after_unterminated_last_line() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, "0_urls.txt");
        std::fs::write(s.path(), "https://a.hu/1").unwrap();

        s.append_new(["https://a.hu/2"]).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(s.path()).unwrap(),
            "https://a.hu/1\nhttps://a.hu/2\n"
        );
    }

    #[tokio::test]
    async fn test_rewrite_excluding_preserves_order() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, "0_urls.txt");
        std::fs::write(s.path(), "https://c.hu\nhttps://a.hu\nhttps://b.hu\nhttps://d.hu\n").unwrap();

        let exclude: HashSet<String> = ["https://a.hu".to_string(), "https://x.hu".to_string()].into();
        let removed = s.rewrite_excluding(&exclude).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(
            s.load_lines().await.unwrap(),
            vec!["https://c.hu", "https://b.hu", "https://d.hu"]
        );
    }

    #[tokio::test]
    async fn test_merge_sorted_is_idempotent_and_deduplicated() {
        let dir = TempDir::new().unwrap();
        let temp = store(&dir, "11_urls_tmp.txt");
        let canonical = store(&dir, "1_urls.txt");
        std::fs::write(temp.path(), "https://b.hu\nhttps://a.hu\n").unwrap();
        std::fs::write(canonical.path(), "https://c.hu\nhttps://a.hu\n").unwrap();

        assert_eq!(temp.merge_sorted_into(&canonical).await.unwrap(), 3);
        let once = std::fs::read_to_string(canonical.path()).unwrap();
        assert_eq!(temp.merge_sorted_into(&canonical).await.unwrap(), 3);
        let twice = std::fs::read_to_string(canonical.path()).unwrap();

        assert_eq!(once, "https://a.hu\nhttps://b.hu\nhttps://c.hu\n");
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_merge_with_missing_source_keeps_dest() {
        let dir = TempDir::new().unwrap();
        let temp = store(&dir, "00_urls_tmp.txt");
        let canonical = store(&dir, "0_urls.txt");
        std::fs::write(canonical.path(), "https://z.hu\nhttps://y.hu\n").unwrap();

        assert_eq!(temp.merge_sorted_into(&canonical).await.unwrap(), 2);
        assert_eq!(
            canonical.load_lines().await.unwrap(),
            vec!["https://y.hu", "https://z.hu"]
        );
    }

    #[tokio::test]
    async fn test_clear_keeps_empty_file() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, "00_urls_tmp.txt");
        s.append_new(["https://a.hu"]).await.unwrap();
        s.clear().await.unwrap();
        assert!(s.path().exists());
        assert!(s.load().await.unwrap().is_empty());
    }
}

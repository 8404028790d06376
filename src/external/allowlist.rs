use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

const LOG_TARGET: &str = "external::allowlist";

/// Source of truth for which emails may join a table. The core never reads
/// the backing store directly, only this trait.
#[async_trait]
pub trait AllowList: Send + Sync {
    async fn allowed_emails(&self) -> Result<HashSet<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AllowListFile {
    Bare(Vec<String>),
    Wrapped { emails: Vec<String> },
}

fn normalize(emails: Vec<String>) -> HashSet<String> {
    emails
        .into_iter()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Local-file-backed allow list, matching the original's JSON file
/// (`{"emails": [...]}` or a bare array) with an in-memory cache guarded by
/// `parking_lot::RwLock`.
pub struct LocalAllowList {
    path: PathBuf,
    cache: RwLock<Option<HashSet<String>>>,
}

impl LocalAllowList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    fn read_from_disk(&self) -> Result<HashSet<String>> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read allow-list file {}", self.path.display()))?;
        let parsed: AllowListFile = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse allow-list file {}", self.path.display()))?;
        let emails = match parsed {
            AllowListFile::Bare(emails) => emails,
            AllowListFile::Wrapped { emails } => emails,
        };
        Ok(normalize(emails))
    }
}

#[async_trait]
impl AllowList for LocalAllowList {
    async fn allowed_emails(&self) -> Result<HashSet<String>> {
        if let Some(cached) = self.cache.read().clone() {
            return Ok(cached);
        }
        let emails = self.read_from_disk()?;
        *self.cache.write() = Some(emails.clone());
        tracing::debug!(target: LOG_TARGET, count = emails.len(), "loaded allow list");
        Ok(emails)
    }
}

/// Placeholder used behind the deployment marker (§2.3); the core has no
/// dependency on the remote document store's shape.
pub struct RemoteAllowList;

#[async_trait]
impl AllowList for RemoteAllowList {
    async fn allowed_emails(&self) -> Result<HashSet<String>> {
        tracing::warn!(target: LOG_TARGET, "remote allow list not configured, denying all");
        Ok(HashSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_wrapped_emails_file() {
        let path = write_temp_file("wrapped", r#"{"emails": [" Foo@Bar.com ", "baz@qux.com"]}"#);
        let store = LocalAllowList::new(path);
        let emails = store.allowed_emails().await.unwrap();
        assert!(emails.contains("foo@bar.com"));
        assert!(emails.contains("baz@qux.com"));
    }

    #[tokio::test]
    async fn reads_bare_array_file() {
        let path = write_temp_file("bare", r#"["a@b.com"]"#);
        let store = LocalAllowList::new(path);
        let emails = store.allowed_emails().await.unwrap();
        assert_eq!(emails.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_yields_empty_set() {
        let store = LocalAllowList::new("/nonexistent/allows.json");
        let emails = store.allowed_emails().await.unwrap();
        assert!(emails.is_empty());
    }

    fn write_temp_file(label: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "allowlist_test_{}_{}_{}.json",
            label,
            std::process::id(),
            contents.len()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const LOG_TARGET: &str = "external::earnings";

/// A player's running earnings totals, matching the original's
/// `DEFAULT_STATS` shape.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EarningsStats {
    pub hands: i64,
    pub chips_delta: i64,
    pub hands_69_92: i64,
    pub chips_delta_69_92: i64,
}

/// An additive increment applied to one player's stats, emitted once per
/// hand per participant by the settlement barrier.
#[derive(Debug, Clone)]
pub struct EarningsUpdate {
    pub email: String,
    pub hands: i64,
    pub chips_delta: i64,
    pub hands_69_92: i64,
    pub chips_delta_69_92: i64,
}

/// Returns true if the two hole-card ranks form the set {6,9} or {9,2} —
/// tracked as a separate earnings counter per the original's "69/92 hand".
pub fn is_69_92_hand(rank_a: u8, rank_b: u8) -> bool {
    let mut ranks = [rank_a, rank_b];
    ranks.sort_unstable();
    ranks == [6, 9] || ranks == [2, 9]
}

#[async_trait]
pub trait EarningsStore: Send + Sync {
    async fn get(&self, email: &str) -> Result<EarningsStats>;
    async fn apply_updates(&self, updates: &[EarningsUpdate]) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EarningsFile {
    #[serde(default)]
    users: HashMap<String, EarningsStats>,
}

/// Local-file-backed earnings ledger. Writes are serialized by an internal
/// `parking_lot::RwLock`, matching the teacher's in-memory store pattern.
pub struct LocalEarningsStore {
    path: PathBuf,
    data: RwLock<EarningsFile>,
}

impl LocalEarningsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = Self::read_from_disk(&path).unwrap_or_default();
        Self {
            path,
            data: RwLock::new(data),
        }
    }

    fn read_from_disk(path: &PathBuf) -> Result<EarningsFile> {
        if !path.exists() {
            return Ok(EarningsFile::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read earnings file {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(EarningsFile::default());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse earnings file {}", path.display()))
    }

    fn write_to_disk(&self, data: &EarningsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create earnings directory {}", parent.display())
            })?;
        }
        let serialized =
            serde_json::to_string_pretty(data).context("failed to serialize earnings data")?;
        std::fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write earnings file {}", self.path.display()))
    }
}

#[async_trait]
impl EarningsStore for LocalEarningsStore {
    async fn get(&self, email: &str) -> Result<EarningsStats> {
        let data = self.data.read();
        Ok(data.users.get(email).copied().unwrap_or_default())
    }

    async fn apply_updates(&self, updates: &[EarningsUpdate]) -> Result<()> {
        let relevant: Vec<&EarningsUpdate> =
            updates.iter().filter(|u| !u.email.is_empty()).collect();
        if relevant.is_empty() {
            return Ok(());
        }

        let mut data = self.data.write();
        for update in &relevant {
            let stats = data.users.entry(update.email.clone()).or_default();
            stats.hands += update.hands;
            stats.chips_delta += update.chips_delta;
            stats.hands_69_92 += update.hands_69_92;
            stats.chips_delta_69_92 += update.chips_delta_69_92;
        }
        self.write_to_disk(&data)?;
        tracing::debug!(target: LOG_TARGET, count = relevant.len(), "applied earnings updates");
        Ok(())
    }
}

/// Placeholder used behind the deployment marker (§2.3); writes are
/// accepted and logged but not persisted anywhere durable.
pub struct RemoteEarningsStore;

#[async_trait]
impl EarningsStore for RemoteEarningsStore {
    async fn get(&self, _email: &str) -> Result<EarningsStats> {
        Ok(EarningsStats::default())
    }

    async fn apply_updates(&self, updates: &[EarningsUpdate]) -> Result<()> {
        tracing::warn!(target: LOG_TARGET, count = updates.len(), "remote earnings store not configured, dropping updates");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("earnings_test_{}_{}.json", label, std::process::id()))
    }

    #[tokio::test]
    async fn applies_additive_updates() {
        let path = temp_path("additive");
        let _ = std::fs::remove_file(&path);
        let store = LocalEarningsStore::new(&path);

        store
            .apply_updates(&[EarningsUpdate {
                email: "a@b.com".into(),
                hands: 1,
                chips_delta: 50,
                hands_69_92: 0,
                chips_delta_69_92: 0,
            }])
            .await
            .unwrap();
        store
            .apply_updates(&[EarningsUpdate {
                email: "a@b.com".into(),
                hands: 1,
                chips_delta: -20,
                hands_69_92: 1,
                chips_delta_69_92: -20,
            }])
            .await
            .unwrap();

        let stats = store.get("a@b.com").await.unwrap();
        assert_eq!(stats.hands, 2);
        assert_eq!(stats.chips_delta, 30);
        assert_eq!(stats.hands_69_92, 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn recognizes_69_and_92_hands() {
        assert!(is_69_92_hand(6, 9));
        assert!(is_69_92_hand(9, 6));
        assert!(is_69_92_hand(9, 2));
        assert!(!is_69_92_hand(9, 9));
        assert!(!is_69_92_hand(10, 2));
    }
}

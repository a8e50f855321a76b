//! Budget Approvals Store (spec §4.I).
//!
//! An append-only JSON ledger keyed by UTC day, read by
//! [`crate::budget::DailyTokenBudget`] on rollover and written when the
//! `auto` approval policy lifts today's ceiling. Grounded on the
//! restrictive-permissions, read-modify-write-under-lock pattern the auth
//! stack uses for credential files (spec §4.I: "parent directories created
//! with restrictive permissions"); cross-process exclusion is out of scope
//! per §1's "cooperative, not authoritative" framing of the shared store,
//! so the lock here is an in-process `tokio::sync::Mutex`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ApprovalsError {
    #[error("failed to read approvals ledger at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("approvals ledger at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write approvals ledger at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("increment must be positive, got {0}")]
    NonPositiveIncrement(i64),
}

/// One day's entry in the ledger (spec §3 `ApprovalLedger`, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayApproval {
    pub tokens: u64,
    pub increments: u32,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

type Ledger = HashMap<String, DayApproval>;

/// File-backed [`ApprovalLedger`], one JSON object keyed by `YYYY-MM-DD`.
#[derive(Clone)]
pub struct ApprovalsStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl ApprovalsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Two consecutive calls with no intervening write return equal
    /// values (spec §8 "Idempotent approval read"). A missing, unreadable,
    /// or corrupt file reads as `0` rather than erroring — per §4.I the
    /// raise on a corrupt ledger belongs to the write path, not reads.
    pub fn read_approved_tokens(&self, day: &str) -> u64 {
        self.read_ledger_lenient().get(day).map_or(0, |entry| entry.tokens)
    }

    /// Like [`Self::read_ledger`], but a corrupt or unreadable file is
    /// treated as an empty ledger instead of raising (spec §4.I).
    fn read_ledger_lenient(&self) -> Ledger {
        self.read_ledger().unwrap_or_default()
    }

    /// Append `increment` tokens to `day`'s approval under an exclusive
    /// lock across the read-modify-write (spec §4.I, §4.E auto-approve).
    /// Rejects non-positive increments; ledger values are monotonically
    /// non-decreasing per day.
    pub async fn approve_increment(
        &self,
        day: &str,
        increment: u64,
    ) -> Result<DayApproval, ApprovalsError> {
        if increment == 0 {
            return Err(ApprovalsError::NonPositiveIncrement(0));
        }
        let _guard = self.lock.lock().await;

        let mut ledger = self.read_ledger()?;
        let entry = ledger.entry(day.to_string()).or_insert(DayApproval {
            tokens: 0,
            increments: 0,
            updated_at: Utc::now(),
        });
        entry.tokens += increment;
        entry.increments += 1;
        entry.updated_at = Utc::now();
        let result = entry.clone();

        self.write_ledger(&ledger)?;
        Ok(result)
    }

    fn read_ledger(&self) -> Result<Ledger, ApprovalsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(Ledger::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| ApprovalsError::Corrupt {
                path: self.path.display().to_string(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Ledger::new()),
            Err(source) => Err(ApprovalsError::Read {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }

    fn write_ledger(&self, ledger: &Ledger) -> Result<(), ApprovalsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_restrictive(parent).map_err(|source| ApprovalsError::Write {
                    path: self.path.display().to_string(),
                    source,
                })?;
            }
        }

        let body = serde_json::to_string_pretty(ledger).expect("ledger serializes");
        write_file_restrictive(&self.path, &body).map_err(|source| ApprovalsError::Write {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[cfg(unix)]
fn create_dir_restrictive(dir: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.exists() {
        return Ok(());
    }
    std::fs::DirBuilder::new().mode(0o700).recursive(true).create(dir)
}

#[cfg(not(unix))]
fn create_dir_restrictive(dir: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_file_restrictive(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_file_restrictive(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_zero() {
        let dir = tempdir().unwrap();
        let store = ApprovalsStore::new(dir.path().join("approvals.json"));
        assert_eq!(store.read_approved_tokens("2025-01-15"), 0);
    }

    #[tokio::test]
    async fn approve_increment_is_monotonically_non_decreasing() {
        let dir = tempdir().unwrap();
        let store = ApprovalsStore::new(dir.path().join("approvals.json"));
        let first = store.approve_increment("2025-01-15", 1000).await.unwrap();
        assert_eq!(first.tokens, 1000);
        assert_eq!(first.increments, 1);

        let second = store.approve_increment("2025-01-15", 500).await.unwrap();
        assert_eq!(second.tokens, 1500);
        assert_eq!(second.increments, 2);
    }

    #[tokio::test]
    async fn zero_increment_is_rejected() {
        let dir = tempdir().unwrap();
        let store = ApprovalsStore::new(dir.path().join("approvals.json"));
        let err = store.approve_increment("2025-01-15", 0).await.unwrap_err();
        assert!(matches!(err, ApprovalsError::NonPositiveIncrement(0)));
    }

    #[tokio::test]
    async fn two_consecutive_reads_with_no_write_agree() {
        let dir = tempdir().unwrap();
        let store = ApprovalsStore::new(dir.path().join("approvals.json"));
        store.approve_increment("2025-01-15", 200).await.unwrap();
        let a = store.read_approved_tokens("2025-01-15");
        let b = store.read_approved_tokens("2025-01-15");
        assert_eq!(a, b);
    }

    #[test]
    fn corrupt_file_reads_as_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("approvals.json");
        std::fs::write(&path, "not json").unwrap();
        let store = ApprovalsStore::new(path);
        assert_eq!(store.read_approved_tokens("2025-01-15"), 0);
    }

    #[tokio::test]
    async fn corrupt_file_raises_on_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("approvals.json");
        std::fs::write(&path, "not json").unwrap();
        let store = ApprovalsStore::new(path);
        let err = store.approve_increment("2025-01-15", 1000).await.unwrap_err();
        assert!(matches!(err, ApprovalsError::Corrupt { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn ledger_file_is_created_with_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("approvals.json");
        let store = ApprovalsStore::new(&path);
        store.approve_increment("2025-01-15", 10).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

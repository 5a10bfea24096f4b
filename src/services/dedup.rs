//! Ledger of releases already handled
//!
//! Keys are SHA-256 digests of the enclosure URL, or of the title when a
//! source gives no enclosure.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::services::candidate::ResolvedCandidate;

/// Ledger key for an enclosure, falling back to the title
pub fn ledger_key(enclosure_url: &str, title: &str) -> String {
    let source = if enclosure_url.trim().is_empty() {
        title
    } else {
        enclosure_url
    };
    let mut hasher = Sha256::new();
    hasher.update(source.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
pub trait DedupLedger: Send + Sync {
    async fn is_already_processed(&self, enclosure_or_title: &str) -> bool;

    /// Claim `enclosure_or_title`. Returns false when it was already recorded,
    /// so of two concurrent callers exactly one wins.
    async fn try_record(&self, enclosure_or_title: &str) -> bool;

    /// Drop a claim, for releases that were claimed but never dispatched
    async fn forget(&self, enclosure_or_title: &str);

    /// Claim a resolved release by enclosure, or by title without one.
    /// Returns false when it was already recorded.
    async fn record_processed(&self, release: &ResolvedCandidate) -> bool {
        let key = if release.enclosure_url.is_empty() {
            release.parsed.raw_title.as_str()
        } else {
            release.enclosure_url.as_str()
        };
        self.try_record(key).await
    }
}

#[derive(Debug, Default)]
pub struct MemoryLedger {
    seen: Mutex<HashSet<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

#[async_trait]
impl DedupLedger for MemoryLedger {
    async fn is_already_processed(&self, enclosure_or_title: &str) -> bool {
        self.seen
            .lock()
            .contains(&ledger_key(enclosure_or_title, ""))
    }

    async fn try_record(&self, enclosure_or_title: &str) -> bool {
        self.seen.lock().insert(ledger_key(enclosure_or_title, ""))
    }

    async fn forget(&self, enclosure_or_title: &str) {
        self.seen.lock().remove(&ledger_key(enclosure_or_title, ""));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser::parse_release;
    use std::sync::Arc;

    #[test]
    fn test_ledger_key_falls_back_to_title() {
        assert_eq!(ledger_key("", "Some.Title"), ledger_key("Some.Title", ""));
        assert_ne!(ledger_key("https://a/1.torrent", "x"), ledger_key("", "x"));
        assert_eq!(ledger_key("u", "").len(), 64);
    }

    #[tokio::test]
    async fn test_try_record_is_exclusive() {
        let ledger = Arc::new(MemoryLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.try_record("https://site/dl/1").await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(ledger.is_already_processed("https://site/dl/1").await);

        ledger.forget("https://site/dl/1").await;
        assert!(!ledger.is_already_processed("https://site/dl/1").await);
        assert!(ledger.try_record("https://site/dl/1").await);
    }

    #[tokio::test]
    async fn test_record_processed_uses_title_without_enclosure() {
        let ledger = MemoryLedger::new();
        let release = ResolvedCandidate {
            parsed: parse_release("Movie.2020.1080p", None),
            ..Default::default()
        };
        assert!(ledger.record_processed(&release).await);
        assert!(ledger.is_already_processed("Movie.2020.1080p").await);
        assert!(!ledger.record_processed(&release).await);
        assert_eq!(ledger.len(), 1);
    }
}

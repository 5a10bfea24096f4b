//! Indexer Manager
//!
//! Fans a query out to every registered site at once:
//! - at most `max_concurrent` sites are fetched at a time
//! - each site gets its own timeout
//! - one failing or panicking site never aborts the others

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{CandidateQuery, CandidateSource, RawCandidate, SiteProfile, SourceRegistry};

#[derive(Debug, Clone)]
pub struct IndexerManagerConfig {
    pub max_concurrent: usize,
    pub site_timeout: Duration,
}

impl Default for IndexerManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            site_timeout: Duration::from_secs(30),
        }
    }
}

/// Everything one site returned for a query
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub site: SiteProfile,
    pub candidates: Vec<RawCandidate>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

pub struct IndexerManager {
    registry: Arc<SourceRegistry>,
    config: IndexerManagerConfig,
    permits: Arc<Semaphore>,
}

impl IndexerManager {
    pub fn new(registry: Arc<SourceRegistry>, config: IndexerManagerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            registry,
            config,
            permits,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Query every registered site concurrently.
    ///
    /// Batches come back in registration order; a site that failed or timed
    /// out yields an empty batch carrying the error.
    pub async fn fetch_all(&self, query: &CandidateQuery) -> Vec<SourceBatch> {
        let sites = self.registry.sites();
        let mut tasks = JoinSet::new();

        for (index, (site, source)) in sites.into_iter().enumerate() {
            let query = query.clone();
            let permits = self.permits.clone();
            let timeout = self.config.site_timeout;
            tasks.spawn(async move {
                let batch = Self::fetch_single(site, source, &query, permits, timeout).await;
                (index, batch)
            });
        }

        let mut batches = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => batches.push(result),
                Err(e) => error!(error = %e, "Indexer fetch task panicked"),
            }
        }
        batches.sort_by_key(|(index, _)| *index);

        let batches: Vec<SourceBatch> = batches.into_iter().map(|(_, b)| b).collect();
        info!(
            sites = batches.len(),
            candidates = batches.iter().map(|b| b.candidates.len()).sum::<usize>(),
            failed = batches.iter().filter(|b| b.error.is_some()).count(),
            "Fetched candidates from all sites"
        );
        batches
    }

    async fn fetch_single(
        site: SiteProfile,
        source: Arc<dyn CandidateSource>,
        query: &CandidateQuery,
        permits: Arc<Semaphore>,
        timeout: Duration,
    ) -> SourceBatch {
        let start = Instant::now();
        // Only fails when the semaphore is closed, which never happens here
        let _permit = permits.acquire_owned().await.ok();

        let result = tokio::time::timeout(timeout, source.fetch_candidates(query)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let (candidates, error) = match result {
            Ok(Ok(candidates)) => (candidates, None),
            Ok(Err(e)) => {
                warn!(site = %site.id, error = %e, "Site fetch failed");
                (vec![], Some(format!("{e:#}")))
            }
            Err(_) => {
                warn!(site = %site.id, timeout_secs = timeout.as_secs(), "Site fetch timed out");
                (vec![], Some("timed out".to_string()))
            }
        };

        SourceBatch {
            site,
            candidates,
            elapsed_ms,
            error,
        }
    }
}

impl std::fmt::Debug for IndexerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexerManager")
            .field("sites", &self.registry.len())
            .field("max_concurrent", &self.config.max_concurrent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Items(usize),
        Fail,
        Hang,
    }

    struct MockSource {
        id: String,
        behaviour: Behaviour,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CandidateSource for MockSource {
        fn id(&self) -> &str {
            &self.id
        }

        fn identify(&self, _url: &str) -> bool {
            false
        }

        async fn fetch_candidates(&self, _query: &CandidateQuery) -> Result<Vec<RawCandidate>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Items(n) => Ok((0..n)
                    .map(|i| RawCandidate {
                        title: format!("Release {i}"),
                        site_id: self.id.clone(),
                        ..Default::default()
                    })
                    .collect()),
                Behaviour::Fail => bail!("site is down"),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(vec![])
                }
            }
        }
    }

    fn registry(behaviours: Vec<Behaviour>) -> (SourceRegistry, Arc<AtomicUsize>) {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = SourceRegistry::new();
        for (i, behaviour) in behaviours.into_iter().enumerate() {
            let id = format!("site{i}");
            let profile = SiteProfile {
                id: id.clone(),
                url: format!("https://{id}.example/"),
                enabled: true,
                ..Default::default()
            };
            let source = MockSource {
                id,
                behaviour,
                in_flight: in_flight.clone(),
                peak: peak.clone(),
            };
            registry.register(profile, Arc::new(source)).unwrap();
        }
        (registry, peak)
    }

    #[tokio::test]
    async fn test_fetch_all_isolates_failures() {
        let (registry, _) = registry(vec![Behaviour::Items(2), Behaviour::Fail, Behaviour::Hang]);
        let manager = IndexerManager::new(
            Arc::new(registry),
            IndexerManagerConfig {
                max_concurrent: 3,
                site_timeout: Duration::from_millis(200),
            },
        );

        let batches = manager.fetch_all(&CandidateQuery::latest()).await;
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].site.id, "site0");
        assert_eq!(batches[0].candidates.len(), 2);
        assert!(batches[0].error.is_none());
        assert!(batches[1].error.as_deref().unwrap().contains("site is down"));
        assert_eq!(batches[2].error.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (registry, peak) = registry((0..6).map(|_| Behaviour::Items(1)).collect());
        let manager = IndexerManager::new(
            Arc::new(registry),
            IndexerManagerConfig {
                max_concurrent: 2,
                site_timeout: Duration::from_secs(5),
            },
        );
        let batches = manager.fetch_all(&CandidateQuery::latest()).await;
        assert_eq!(batches.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}

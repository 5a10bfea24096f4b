//! Integration tests for the subscription scan
//!
//! A full scan over a mock site: parse, resolve, rule gate, match, select,
//! dispatch, then the write-back to the subscriptions.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use pretty_assertions::assert_eq;

use librarian_match::indexer::{
    CandidateQuery, CandidateSource, IndexerManager, IndexerManagerConfig, RawCandidate,
    SiteProfile, SourceRegistry,
};
use librarian_match::jobs::{ScanServices, ScanSettings, SubscriptionScanner};
use librarian_match::services::cache::create_cache;
use librarian_match::services::catalog::{
    CatalogLink, CatalogQuery, CatalogRecord, FetchError, SeasonInfo,
};
use librarian_match::services::dedup::{DedupLedger, MemoryLedger};
use librarian_match::services::downloader::LoggingDispatcher;
use librarian_match::services::library::{HoldingQuery, LibraryHoldings, LoggingRefresher};
use librarian_match::services::notifications::{
    BroadcastNotifier, NotificationCategory, NotifierConfig,
};
use librarian_match::services::parser::{MediaKind, TitleParser};
use librarian_match::services::resolver::{CatalogResolver, ResolverSettings};
use librarian_match::services::rules::{RuleBook, RuleEngine};
use librarian_match::services::subscriptions::{Subscription, SubscriptionMatcher, SubscriptionStore};

struct FixedSite {
    candidates: Vec<RawCandidate>,
}

#[async_trait]
impl CandidateSource for FixedSite {
    fn id(&self) -> &str {
        "pt"
    }

    fn identify(&self, url: &str) -> bool {
        url.contains("pt.example")
    }

    async fn fetch_candidates(&self, _query: &CandidateQuery) -> Result<Vec<RawCandidate>> {
        Ok(self.candidates.clone())
    }
}

#[derive(Default)]
struct Catalog {
    searches: AtomicUsize,
}

#[async_trait]
impl CatalogQuery for Catalog {
    async fn search_by_name_year(
        &self,
        _name: &str,
        year: Option<&str>,
        kind: MediaKind,
    ) -> Result<Vec<CatalogRecord>, FetchError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let records = [
            CatalogRecord {
                catalog_id: 157336,
                media_kind: MediaKind::Movie,
                title: "Interstellar".to_string(),
                release_date: Some("2014-11-05".to_string()),
                ..Default::default()
            },
            CatalogRecord {
                catalog_id: 90001,
                media_kind: MediaKind::Tv,
                title: "某剧".to_string(),
                release_date: Some("2021-04-01".to_string()),
                ..Default::default()
            },
        ];
        Ok(records
            .into_iter()
            .filter(|r| kind == MediaKind::Unknown || r.media_kind == kind)
            .filter(|r| year.is_none_or(|y| r.year() == Some(y)))
            .collect())
    }

    async fn get_alternate_titles(
        &self,
        _catalog_id: u64,
        _kind: MediaKind,
    ) -> Result<Vec<String>, FetchError> {
        Ok(Vec::new())
    }

    async fn get_season_list(&self, _catalog_id: u64) -> Result<Vec<SeasonInfo>, FetchError> {
        Ok(Vec::new())
    }

    async fn get_details(
        &self,
        _catalog_id: u64,
        _kind: MediaKind,
    ) -> Result<Option<CatalogRecord>, FetchError> {
        Ok(None)
    }

    async fn scrape_search_links(&self, _name: &str) -> Result<Vec<CatalogLink>, FetchError> {
        Ok(Vec::new())
    }
}

/// No movies held; season 2 of the show is missing 5, 6 and 7
struct Library;

#[async_trait]
impl LibraryHoldings for Library {
    async fn has_movie(&self, _query: HoldingQuery<'_>) -> Option<bool> {
        Some(false)
    }

    async fn get_missing_episodes(
        &self,
        _query: HoldingQuery<'_>,
        _season: u32,
        _total_episode_count: Option<u32>,
    ) -> Option<BTreeSet<u32>> {
        Some(BTreeSet::from([5, 6, 7]))
    }
}

fn raw(title: &str, enclosure: &str, seeders: u32) -> RawCandidate {
    RawCandidate {
        title: title.to_string(),
        enclosure_url: enclosure.to_string(),
        size: 10 * 1024 * 1024 * 1024,
        seeders,
        site_id: "pt".to_string(),
        ..Default::default()
    }
}

struct Harness {
    scanner: SubscriptionScanner,
    store: Arc<SubscriptionStore>,
    ledger: Arc<MemoryLedger>,
    dispatcher: Arc<LoggingDispatcher>,
    notifier: Arc<BroadcastNotifier>,
    catalog: Arc<Catalog>,
}

fn harness() -> Harness {
    let site = FixedSite {
        candidates: vec![
            raw("Interstellar.2014.1080p.BluRay.x264-GROUP", "https://pt.example/dl/1", 10),
            raw("Interstellar.2014.2160p.BluRay.x265-GROUP", "https://pt.example/dl/2", 50),
            raw("某剧.S02E05.1080p", "https://pt.example/dl/3", 5),
        ],
    };
    let mut registry = SourceRegistry::new();
    registry
        .register(
            SiteProfile {
                id: "pt".to_string(),
                name: "Example PT".to_string(),
                url: "https://pt.example/".to_string(),
                enabled: true,
                ..Default::default()
            },
            Arc::new(site),
        )
        .unwrap();

    let store = Arc::new(SubscriptionStore::new());
    store
        .add(Subscription {
            id: "movie".to_string(),
            kind: MediaKind::Movie,
            title: "Interstellar".to_string(),
            year: Some("2014".to_string()),
            ..Default::default()
        })
        .unwrap();
    store
        .add(Subscription {
            id: "show".to_string(),
            kind: MediaKind::Tv,
            title: "某剧".to_string(),
            season: Some(2),
            total_episode_count: Some(6),
            start_episode: Some(3),
            ..Default::default()
        })
        .unwrap();

    let catalog = Arc::new(Catalog::default());
    let resolver = CatalogResolver::new(
        catalog.clone(),
        None,
        create_cache(Duration::from_secs(300)),
        create_cache(Duration::from_secs(300)),
        ResolverSettings::default(),
    );
    let rules = Arc::new(RuleEngine::new(RuleBook::new(&[], None).unwrap()));
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = Arc::new(LoggingDispatcher::new());
    let notifier = Arc::new(BroadcastNotifier::new(NotifierConfig::default()));

    let services = ScanServices {
        indexers: Arc::new(IndexerManager::new(
            Arc::new(registry),
            IndexerManagerConfig::default(),
        )),
        parser: Arc::new(TitleParser::default()),
        resolver: Arc::new(resolver),
        matcher: Arc::new(SubscriptionMatcher::new(rules, Arc::new(Library))),
        subscriptions: store.clone(),
        ledger: ledger.clone(),
        dispatcher: dispatcher.clone(),
        refresher: Arc::new(LoggingRefresher),
        notifier: notifier.clone(),
    };

    Harness {
        scanner: SubscriptionScanner::new(services, ScanSettings::default()),
        store,
        ledger,
        dispatcher,
        notifier,
        catalog,
    }
}

#[tokio::test]
async fn scan_dispatches_best_release_and_updates_subscriptions() {
    let harness = harness();
    let mut events = harness.notifier.subscribe();

    let summary = harness.scanner.run().await.unwrap();
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(summary.failed, 0);

    let titles: Vec<String> = harness
        .dispatcher
        .submissions()
        .into_iter()
        .map(|s| s.title)
        .collect();
    assert_eq!(
        titles,
        vec![
            "Interstellar.2014.2160p.BluRay.x265-GROUP".to_string(),
            "某剧.S02E05.1080p".to_string(),
        ]
    );

    // The movie subscription finished; the show still wants episode 6
    assert!(harness.store.get("movie").await.is_none());
    let show = harness.store.get("show").await.unwrap();
    assert_eq!(show.recorded_missing, Some(BTreeSet::from([6])));

    // The release that lost selection can be picked up again later
    assert!(!harness.ledger.is_already_processed("https://pt.example/dl/1").await);
    assert!(harness.ledger.is_already_processed("https://pt.example/dl/2").await);

    // Two distinct names, each resolved once
    assert_eq!(harness.catalog.searches.load(Ordering::SeqCst), 2);

    let mut categories = Vec::new();
    while let Ok(event) = events.try_recv() {
        categories.push(event.category);
    }
    let count = |c: NotificationCategory| categories.iter().filter(|x| **x == c).count();
    assert_eq!(count(NotificationCategory::Download), 2);
    assert_eq!(count(NotificationCategory::SubscriptionFinished), 1);
    assert_eq!(count(NotificationCategory::ScanSummary), 1);
}

#[tokio::test]
async fn second_scan_skips_dispatched_releases() {
    let harness = harness();
    harness.scanner.run().await.unwrap();

    let summary = harness.scanner.run().await.unwrap();
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.skipped_duplicate, 2);
    // The 1080p copy has no movie subscription left to satisfy
    assert_eq!(summary.unmatched, 1);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(harness.dispatcher.submissions().len(), 2);
}

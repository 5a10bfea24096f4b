//! Subscription scan job
//!
//! One scan polls every site, then runs each site's candidates through
//! parse -> resolve -> rules -> match on a worker of its own. Accepted
//! releases are pooled, narrowed by [`select_downloads`], dispatched, and
//! written back to the subscriptions.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::indexer::{CandidateQuery, IndexerManager, RawCandidate, SiteProfile};
use crate::services::candidate::ResolvedCandidate;
use crate::services::dedup::DedupLedger;
use crate::services::download_selector::{AcceptedRelease, select_downloads};
use crate::services::downloader::DownloadDispatcher;
use crate::services::library::LibraryRefresher;
use crate::services::notifications::{NotificationCategory, Notifier};
use crate::services::parser::TitleParser;
use crate::services::resolver::CatalogResolver;
use crate::services::subscriptions::{
    MatchResult, NoMatchReason, Subscription, SubscriptionMatch, SubscriptionMatcher,
    SubscriptionStore,
};

/// Per-scan counters, logged once at the end
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub fetched: usize,
    pub skipped_duplicate: usize,
    pub unidentified: usize,
    pub unresolved: usize,
    pub filtered: usize,
    pub unmatched: usize,
    pub accepted: usize,
    pub dispatched: usize,
    pub failed: usize,
}

impl ScanSummary {
    fn merge(&mut self, other: &ScanSummary) {
        self.fetched += other.fetched;
        self.skipped_duplicate += other.skipped_duplicate;
        self.unidentified += other.unidentified;
        self.unresolved += other.unresolved;
        self.filtered += other.filtered;
        self.unmatched += other.unmatched;
        self.accepted += other.accepted;
        self.dispatched += other.dispatched;
        self.failed += other.failed;
    }
}

/// Everything a scan talks to
#[derive(Clone)]
pub struct ScanServices {
    pub indexers: Arc<IndexerManager>,
    pub parser: Arc<TitleParser>,
    pub resolver: Arc<CatalogResolver>,
    pub matcher: Arc<SubscriptionMatcher>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub ledger: Arc<dyn DedupLedger>,
    pub dispatcher: Arc<dyn DownloadDispatcher>,
    pub refresher: Arc<dyn LibraryRefresher>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanSettings {
    /// Disable the resolver's unscoped retry
    pub strict: bool,
    pub download_dir: Option<String>,
}

/// The per-site half of a scan: everything up to and including matching
#[derive(Clone)]
struct SiteWorker {
    parser: Arc<TitleParser>,
    resolver: Arc<CatalogResolver>,
    matcher: Arc<SubscriptionMatcher>,
    ledger: Arc<dyn DedupLedger>,
    movie_subs: Arc<Vec<Subscription>>,
    tv_subs: Arc<Vec<Subscription>>,
    strict: bool,
}

/// Ledger key of a release: its enclosure, or its title when there is none
fn claim_key<'a>(enclosure_url: &'a str, title: &'a str) -> &'a str {
    if enclosure_url.trim().is_empty() {
        title
    } else {
        enclosure_url
    }
}

fn release_key(candidate: &ResolvedCandidate) -> &str {
    claim_key(&candidate.enclosure_url, &candidate.parsed.raw_title)
}

impl SiteWorker {
    async fn run(
        self,
        site: SiteProfile,
        candidates: Vec<RawCandidate>,
    ) -> (ScanSummary, Vec<AcceptedRelease>) {
        let mut summary = ScanSummary {
            fetched: candidates.len(),
            ..Default::default()
        };
        let mut accepted = Vec::new();
        for raw in candidates {
            if let Some(release) = self.process(&site, raw, &mut summary).await {
                accepted.push(release);
            }
        }
        debug!(site = %site.id, accepted = accepted.len(), "Site worker finished");
        (summary, accepted)
    }

    async fn process(
        &self,
        site: &SiteProfile,
        raw: RawCandidate,
        summary: &mut ScanSummary,
    ) -> Option<AcceptedRelease> {
        if self.ledger.is_already_processed(claim_key(&raw.enclosure_url, &raw.title)).await {
            summary.skipped_duplicate += 1;
            return None;
        }

        let parsed = self.parser.parse(&raw.title, raw.subtitle.as_deref());
        if !parsed.is_identified() {
            debug!(title = %raw.title, "Could not identify release name");
            summary.unidentified += 1;
            return None;
        }

        // Unresolved releases can still satisfy fuzzy subscriptions
        let record = self.resolver.resolve(&parsed, None, self.strict).await;
        if record.is_none() {
            summary.unresolved += 1;
        }

        let candidate = ResolvedCandidate {
            parsed,
            record,
            size_bytes: raw.size,
            seeders: raw.seeders,
            peers: raw.peers,
            upload_factor: raw.upload_factor,
            download_factor: raw.download_factor,
            is_hit_and_run: raw.is_hit_and_run,
            site_identity: site.id.clone(),
            site_priority_order: site.priority,
            enclosure_url: raw.enclosure_url.clone(),
            page_url: raw.page_url.clone(),
        };

        let result = self
            .matcher
            .match_candidate(
                &candidate,
                site.rule_group.as_deref(),
                &self.movie_subs,
                &self.tv_subs,
            )
            .await;
        let matched = match result {
            Ok(MatchResult::Matched(matched)) => matched,
            Ok(MatchResult::NoMatch(reason)) => {
                match &reason {
                    NoMatchReason::RuleGate { .. } | NoMatchReason::Filter(_) => {
                        summary.filtered += 1
                    }
                    _ => summary.unmatched += 1,
                }
                debug!(title = %raw.title, reason = ?reason, "Release not matched");
                return None;
            }
            Err(e) => {
                error!(
                    title = %raw.title,
                    site = %site.id,
                    error = %e,
                    "Malformed rules, skipping release"
                );
                summary.failed += 1;
                return None;
            }
        };

        // Another worker may have claimed the same enclosure meanwhile
        if !self.ledger.try_record(claim_key(&raw.enclosure_url, &raw.title)).await {
            summary.skipped_duplicate += 1;
            return None;
        }
        info!(
            title = %raw.title,
            site = %site.id,
            subscription = %matched.subscription_id,
            score = matched.final_score,
            "Release accepted"
        );
        summary.accepted += 1;
        Some(AcceptedRelease { candidate, matched })
    }
}

pub struct SubscriptionScanner {
    services: ScanServices,
    settings: ScanSettings,
}

impl SubscriptionScanner {
    pub fn new(services: ScanServices, settings: ScanSettings) -> Self {
        Self { services, settings }
    }

    /// Run one scan over every registered site
    pub async fn run(&self) -> Result<ScanSummary> {
        let services = &self.services;
        if services.subscriptions.is_empty() {
            info!("No subscriptions, skipping scan");
            return Ok(ScanSummary::default());
        }

        services.resolver.purge_expired();

        let worker = SiteWorker {
            parser: services.parser.clone(),
            resolver: services.resolver.clone(),
            matcher: services.matcher.clone(),
            ledger: services.ledger.clone(),
            movie_subs: Arc::new(services.subscriptions.movies().await),
            tv_subs: Arc::new(services.subscriptions.tvs().await),
            strict: self.settings.strict,
        };

        let batches = services.indexers.fetch_all(&CandidateQuery::latest()).await;
        let mut summary = ScanSummary::default();
        let mut workers = JoinSet::new();
        for batch in batches {
            if batch.error.is_some() {
                summary.failed += 1;
            }
            workers.spawn(worker.clone().run(batch.site, batch.candidates));
        }

        let mut accepted = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((site_summary, site_accepted)) => {
                    summary.merge(&site_summary);
                    accepted.extend(site_accepted);
                }
                Err(e) => {
                    error!(error = %e, "Site worker panicked");
                    summary.failed += 1;
                }
            }
        }

        let claimed: Vec<String> = accepted
            .iter()
            .map(|a| release_key(&a.candidate).to_string())
            .collect();
        let selected = select_downloads(accepted);
        for key in &claimed {
            if !selected.iter().any(|s| release_key(&s.candidate) == key) {
                services.ledger.forget(key).await;
            }
        }

        for release in selected {
            if self.dispatch(&release).await {
                summary.dispatched += 1;
                self.apply_acceptance(&release).await;
            } else {
                summary.failed += 1;
                services.ledger.forget(release_key(&release.candidate)).await;
            }
        }

        info!(
            fetched = summary.fetched,
            skipped_duplicate = summary.skipped_duplicate,
            unidentified = summary.unidentified,
            unresolved = summary.unresolved,
            filtered = summary.filtered,
            unmatched = summary.unmatched,
            accepted = summary.accepted,
            dispatched = summary.dispatched,
            failed = summary.failed,
            "Subscription scan finished"
        );
        if summary.dispatched > 0 {
            let body = format!(
                "{} new downloads from {} releases ({} filtered, {} unmatched)",
                summary.dispatched, summary.fetched, summary.filtered, summary.unmatched
            );
            services
                .notifier
                .notify(NotificationCategory::ScanSummary, "Subscription scan", &body)
                .await;
        }
        Ok(summary)
    }

    async fn dispatch(&self, release: &AcceptedRelease) -> bool {
        let candidate = &release.candidate;
        let submitted = self
            .services
            .dispatcher
            .submit(
                &candidate.enclosure_url,
                self.settings.download_dir.as_deref(),
                candidate,
            )
            .await;
        match submitted {
            Ok(Some(task_id)) => {
                debug!(task_id = %task_id, title = %candidate.parsed.raw_title, "Dispatched");
                true
            }
            Ok(None) => {
                warn!(title = %candidate.parsed.raw_title, "Download client declined release");
                false
            }
            Err(e) => {
                warn!(title = %candidate.parsed.raw_title, error = %e, "Failed to dispatch release");
                false
            }
        }
    }

    /// Write an accepted download back to its subscription
    async fn apply_acceptance(&self, release: &AcceptedRelease) {
        let services = &self.services;
        let candidate = &release.candidate;
        let matched: &SubscriptionMatch = &release.matched;
        let id = matched.subscription_id.as_str();
        let title = candidate.display_title();
        let catalog_id = candidate.record.as_ref().map(|r| r.catalog_id);

        let finished = if matched.fuzzy {
            false
        } else if matched.is_upgrade {
            services.subscriptions.record_upgrade(id, matched.final_score).await;
            false
        } else if let Some((season, remaining)) = &matched.season_gap {
            if matched.indeterminate {
                services.subscriptions.record_indeterminate(id).await;
            }
            let merged = services.subscriptions.record_episodes(id, remaining).await;
            let indeterminate = services
                .subscriptions
                .get(id)
                .await
                .is_some_and(|s| s.indeterminate);
            debug!(subscription = %id, season, missing = ?merged, "Season gap updated");
            merged.is_some_and(|m| m.is_empty()) && !indeterminate
        } else {
            true
        };

        if finished && services.subscriptions.remove(id) {
            services
                .notifier
                .notify(NotificationCategory::SubscriptionFinished, title, "Subscription complete")
                .await;
        }

        services.refresher.refresh(title, catalog_id).await;
        let body = format!(
            "{} {} from {}",
            candidate.parsed.season_episode_string(),
            candidate.parsed.quality_string(),
            candidate.site_identity
        );
        services
            .notifier
            .notify(NotificationCategory::Download, title, body.trim())
            .await;
    }
}

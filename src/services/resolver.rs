//! Catalog resolution
//!
//! Reconciles a [`ParsedRelease`] with one catalog record. Each resolution walks
//! a fixed ladder of increasingly expensive lookups and stops at the first hit:
//!
//! 1. name + year (±1) exact title match
//! 2. alternate titles of the top year-filtered results
//! 3. the same two steps without the year (non-strict, or no year parsed)
//! 4. the catalog's public search page, only when it has exactly one hit
//! 5. search-engine keyword inference, then steps 1-3 again with the keyword
//!
//! Collaborator failures and timeouts never escape: they are logged and the
//! ladder moves on. Results, including "not found", are cached per
//! [`ResolutionKey`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::services::cache::SharedCache;
use crate::services::catalog::{CatalogQuery, CatalogRecord, FetchError};
use crate::services::keyword_inference::{KeywordGuess, KeywordInference};
use crate::services::parser::{MediaKind, ParsedRelease};
use crate::services::text_utils::{contains_cjk, titles_equal};

/// Episodes of one season, or the whole season when the count is unknown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeSet {
    All,
    Only(BTreeSet<u32>),
}

impl EpisodeSet {
    pub fn intersect(&self, other: &EpisodeSet) -> EpisodeSet {
        match (self, other) {
            (EpisodeSet::All, other) => other.clone(),
            (this, EpisodeSet::All) => this.clone(),
            (EpisodeSet::Only(a), EpisodeSet::Only(b)) => {
                EpisodeSet::Only(a.intersection(b).copied().collect())
            }
        }
    }

    /// Whether a release carrying `episodes` fills part of this gap. An empty
    /// list is a whole-season pack.
    pub fn overlaps(&self, episodes: &[u32]) -> bool {
        match self {
            EpisodeSet::All => true,
            EpisodeSet::Only(set) if episodes.is_empty() => !set.is_empty(),
            EpisodeSet::Only(set) => episodes.iter().any(|e| set.contains(e)),
        }
    }

    /// What is left after a release carrying `episodes` arrives
    pub fn without(&self, episodes: &[u32]) -> EpisodeSet {
        match self {
            _ if episodes.is_empty() => EpisodeSet::Only(BTreeSet::new()),
            EpisodeSet::All => EpisodeSet::All,
            EpisodeSet::Only(set) => {
                EpisodeSet::Only(set.iter().filter(|e| !episodes.contains(e)).copied().collect())
            }
        }
    }

    /// Nothing missing
    pub fn is_empty(&self) -> bool {
        matches!(self, EpisodeSet::Only(set) if set.is_empty())
    }
}

/// Missing episodes per season
pub type SeasonGaps = BTreeMap<u32, EpisodeSet>;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    /// Scrape the catalog's search page when the API finds nothing
    pub search_web: bool,
    /// Ask general search engines for a better keyword as a last resort
    pub search_keyword: bool,
    /// Never drop the year to retry an unscoped search
    pub strict_mode: bool,
    /// Budget for any single collaborator call
    pub call_timeout: Duration,
    /// How many search results get their alternate titles fetched
    pub alt_title_candidates: usize,
    /// Accepted distance between parsed and catalog release years
    pub year_tolerance: i32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            search_web: true,
            search_keyword: false,
            strict_mode: false,
            call_timeout: Duration::from_secs(5),
            alt_title_candidates: 5,
            year_tolerance: 1,
        }
    }
}

/// Cache key: kind, name, year and season of the parsed release
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub media_kind: MediaKind,
    pub name: String,
    pub year: Option<String>,
    pub season: Option<u32>,
}

impl ResolutionKey {
    pub fn new(parsed: &ParsedRelease, year: Option<&str>) -> Self {
        Self {
            media_kind: parsed.media_kind,
            name: parsed.name().to_string(),
            year: year.map(str::to_string),
            season: match parsed.media_kind {
                MediaKind::Tv => parsed.season_list.first().copied(),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ResolutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]{}-{}-{}",
            self.media_kind,
            self.name,
            self.year.as_deref().unwrap_or(""),
            self.season.map(|s| s.to_string()).unwrap_or_default()
        )
    }
}

/// What the resolution cache remembers for a key
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResolution {
    Found(CatalogRecord),
    /// Sentinel for "every step ran and nothing matched"
    NotFound,
}

impl CachedResolution {
    /// Catalog id of the cached answer; `0` for the not-found sentinel
    pub fn catalog_id(&self) -> u64 {
        match self {
            CachedResolution::Found(record) => record.catalog_id,
            CachedResolution::NotFound => 0,
        }
    }
}

/// Per-resolution bookkeeping. Any failed or timed-out call taints the run so
/// that its "not found" outcome is not cached.
#[derive(Debug, Default)]
struct Attempt {
    failed_calls: usize,
}

pub struct CatalogResolver {
    catalog: Arc<dyn CatalogQuery>,
    keywords: Option<KeywordInference>,
    cache: SharedCache<CachedResolution>,
    keyword_cache: SharedCache<Option<KeywordGuess>>,
    settings: ResolverSettings,
}

impl CatalogResolver {
    pub fn new(
        catalog: Arc<dyn CatalogQuery>,
        keywords: Option<KeywordInference>,
        cache: SharedCache<CachedResolution>,
        keyword_cache: SharedCache<Option<KeywordGuess>>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            catalog,
            keywords,
            cache,
            keyword_cache,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve a parsed release to at most one catalog record.
    ///
    /// `preferred_year` overrides the parsed year. `strict` (or strict mode in
    /// the settings) disables the unscoped retry when a year is known.
    pub async fn resolve(
        &self,
        parsed: &ParsedRelease,
        preferred_year: Option<&str>,
        strict: bool,
    ) -> Option<CatalogRecord> {
        let name = parsed.name();
        if name.is_empty() {
            return None;
        }
        let year = preferred_year.or(parsed.year.as_deref());
        let key = ResolutionKey::new(parsed, year).to_string();

        if let Some(cached) = self.cache.get(&key) {
            debug!(key = %key, catalog_id = cached.catalog_id(), "Resolution cache hit");
            return match cached {
                CachedResolution::Found(record) => Some(record),
                CachedResolution::NotFound => None,
            };
        }

        let strict = strict || self.settings.strict_mode;
        let season = parsed.season_list.first().copied();
        let mut attempt = Attempt::default();

        let mut found = self
            .search_catalog(&mut attempt, name, year, season, parsed.media_kind, strict)
            .await;

        if found.is_none() && self.settings.search_web && !contains_cjk(name) {
            found = self
                .call(
                    &mut attempt,
                    "web_scrape_single_result",
                    self.catalog.web_scrape_single_result(name),
                )
                .await
                .flatten();
        }

        if found.is_none() && self.settings.search_keyword {
            found = self.search_by_keyword(&mut attempt, name).await;
        }

        match found {
            Some(record) => {
                info!(
                    name = %name,
                    catalog_id = record.catalog_id,
                    title = %record.title,
                    kind = %record.media_kind,
                    "Resolved release"
                );
                match self.cache.insert_if_absent(key, CachedResolution::Found(record)) {
                    CachedResolution::Found(record) => Some(record),
                    CachedResolution::NotFound => None,
                }
            }
            None if attempt.failed_calls == 0 => {
                info!(name = %name, year = ?year, "No catalog match");
                self.cache.insert_if_absent(key, CachedResolution::NotFound);
                None
            }
            None => {
                warn!(
                    name = %name,
                    year = ?year,
                    failed_calls = attempt.failed_calls,
                    "No catalog match, not caching because lookups failed"
                );
                None
            }
        }
    }

    /// Drop every cached answer pointing at `catalog_id`; `0` drops all not-found entries
    pub fn invalidate(&self, catalog_id: u64) -> usize {
        let removed = self
            .cache
            .remove_where(|cached| cached.catalog_id() == catalog_id);
        debug!(catalog_id, removed, "Invalidated resolution cache");
        removed
    }

    /// Evict expired resolutions and keyword guesses; returns how many went
    pub fn purge_expired(&self) -> usize {
        let removed = self.cache.cleanup_expired() + self.keyword_cache.cleanup_expired();
        if removed > 0 {
            debug!(removed, "Purged expired resolver cache entries");
        }
        removed
    }

    pub fn invalidate_key(&self, key: &ResolutionKey) -> bool {
        self.cache.remove(&key.to_string())
    }

    /// Steps 1-3, dispatched on the parsed kind
    async fn search_catalog(
        &self,
        attempt: &mut Attempt,
        name: &str,
        year: Option<&str>,
        season: Option<u32>,
        kind: MediaKind,
        strict: bool,
    ) -> Option<CatalogRecord> {
        match (kind, year) {
            (MediaKind::Tv, _) => {
                if let (Some(year), Some(season)) = (year, season)
                    && let Some(record) = self.search_tv_by_season(attempt, name, year, season).await
                {
                    return Some(record);
                }
                if let Some(record) = self.search_kind(attempt, name, year, MediaKind::Tv).await {
                    return Some(record);
                }
                if year.is_some() && !strict {
                    return self.search_kind(attempt, name, None, MediaKind::Tv).await;
                }
                None
            }
            (_, Some(year)) => {
                for candidate_year in self.year_range(year) {
                    if let Some(record) = self
                        .search_kind(attempt, name, Some(&candidate_year), MediaKind::Movie)
                        .await
                    {
                        return Some(record);
                    }
                }
                if let Some(record) = self
                    .search_kind(attempt, name, Some(year), MediaKind::Tv)
                    .await
                {
                    return Some(record);
                }
                if !strict {
                    return self.search_kind(attempt, name, None, MediaKind::Unknown).await;
                }
                None
            }
            (_, None) => self.search_kind(attempt, name, None, MediaKind::Unknown).await,
        }
    }

    /// The parsed year first, then its neighbours within tolerance
    fn year_range(&self, year: &str) -> Vec<String> {
        let Ok(base) = year.parse::<i32>() else {
            return vec![year.to_string()];
        };
        let mut years = vec![base.to_string()];
        for offset in 1..=self.settings.year_tolerance {
            years.push((base + offset).to_string());
            years.push((base - offset).to_string());
        }
        years
    }

    /// One catalog search, then exact title match, then alternate titles
    async fn search_kind(
        &self,
        attempt: &mut Attempt,
        name: &str,
        year: Option<&str>,
        kind: MediaKind,
    ) -> Option<CatalogRecord> {
        debug!(name = %name, year = ?year, kind = %kind, "Searching catalog");
        let records = self
            .call(
                attempt,
                "search_by_name_year",
                self.catalog.search_by_name_year(name, year, kind),
            )
            .await?;
        let records: Vec<CatalogRecord> = records
            .into_iter()
            .filter(|r| year.is_none_or(|y| r.year() == Some(y)))
            .collect();

        if let Some(record) = records.iter().find(|r| record_title_matches(name, r)) {
            return Some(record.clone());
        }
        self.match_alternate_titles(attempt, name, &records).await
    }

    async fn match_alternate_titles(
        &self,
        attempt: &mut Attempt,
        name: &str,
        records: &[CatalogRecord],
    ) -> Option<CatalogRecord> {
        for record in records.iter().take(self.settings.alt_title_candidates) {
            let Some(titles) = self
                .call(
                    attempt,
                    "get_alternate_titles",
                    self.catalog
                        .get_alternate_titles(record.catalog_id, record.media_kind),
                )
                .await
            else {
                continue;
            };
            if titles.iter().any(|t| titles_equal(name, t)) {
                debug!(name = %name, catalog_id = record.catalog_id, "Matched on alternate title");
                return Some(CatalogRecord {
                    alternate_titles: titles,
                    ..record.clone()
                });
            }
        }
        None
    }

    /// A show whose first-air year or one of whose seasons matches `year` and `season`
    async fn search_tv_by_season(
        &self,
        attempt: &mut Attempt,
        name: &str,
        year: &str,
        season: u32,
    ) -> Option<CatalogRecord> {
        debug!(name = %name, year = %year, season, "Searching catalog by season");
        let shows = self
            .call(
                attempt,
                "search_by_name_year",
                self.catalog.search_by_name_year(name, None, MediaKind::Tv),
            )
            .await?;

        if let Some(show) = shows
            .iter()
            .find(|s| record_title_matches(name, s) && s.year() == Some(year))
        {
            return Some(show.clone());
        }

        for show in shows.iter().take(self.settings.alt_title_candidates) {
            let Some(titles) = self
                .call(
                    attempt,
                    "get_alternate_titles",
                    self.catalog.get_alternate_titles(show.catalog_id, MediaKind::Tv),
                )
                .await
            else {
                continue;
            };
            if !record_title_matches(name, show) && !titles.iter().any(|t| titles_equal(name, t)) {
                continue;
            }
            let Some(seasons) = self
                .call(
                    attempt,
                    "get_season_list",
                    self.catalog.get_season_list(show.catalog_id),
                )
                .await
            else {
                continue;
            };
            if seasons
                .iter()
                .any(|s| s.season_number == season && s.year() == Some(year))
            {
                return Some(CatalogRecord {
                    alternate_titles: titles,
                    ..show.clone()
                });
            }
        }
        None
    }

    /// Step 5: infer a keyword from search engines, then search with it
    async fn search_by_keyword(&self, attempt: &mut Attempt, name: &str) -> Option<CatalogRecord> {
        let keywords = self.keywords.as_ref()?;

        let guess = match self.keyword_cache.get(name) {
            Some(guess) => guess,
            None => {
                let guess = self
                    .call(attempt, "keyword_inference", keywords.infer(name))
                    .await?;
                self.keyword_cache.insert_if_absent(name.to_string(), guess)
            }
        }?;

        info!(name = %name, keyword = %guess.keyword, "Searching catalog with inferred keyword");
        if guess.is_movie {
            self.search_kind(attempt, &guess.keyword, None, MediaKind::Movie)
                .await
        } else {
            self.search_kind(attempt, &guess.keyword, None, MediaKind::Unknown)
                .await
        }
    }

    /// Run one collaborator call under the per-call timeout, folding any
    /// failure into `None` and marking the attempt as tainted
    async fn call<T, F>(&self, attempt: &mut Attempt, operation: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, FetchError>>,
    {
        let error = match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(e)) => e,
            Err(_) => FetchError::Timeout,
        };
        warn!(operation = %operation, error = %error, "Catalog lookup failed, falling through");
        attempt.failed_calls += 1;
        None
    }
}

fn record_title_matches(name: &str, record: &CatalogRecord) -> bool {
    titles_equal(name, &record.title)
        || record
            .original_title
            .as_deref()
            .is_some_and(|t| titles_equal(name, t))
}

/// Merge two per-season missing-episode maps.
///
/// Seasons present in both keep the intersection of their episodes. Seasons
/// only in `source` are ignored unless `target` is empty.
pub fn intersect_season_gaps(target: &SeasonGaps, source: &SeasonGaps) -> SeasonGaps {
    if target.is_empty() {
        return source.clone();
    }
    target
        .iter()
        .map(|(season, episodes)| {
            let merged = match source.get(season) {
                Some(other) => episodes.intersect(other),
                None => episodes.clone(),
            };
            (*season, merged)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::create_cache;
    use crate::services::catalog::{CatalogLink, SeasonInfo};
    use crate::services::parser::parse_release;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockCatalog {
        records: Vec<CatalogRecord>,
        alternates: Vec<(u64, Vec<String>)>,
        seasons: Vec<SeasonInfo>,
        fail_search: bool,
        searches: AtomicUsize,
        alternate_calls: AtomicUsize,
        scrapes: AtomicUsize,
    }

    #[async_trait]
    impl CatalogQuery for MockCatalog {
        async fn search_by_name_year(
            &self,
            _name: &str,
            _year: Option<&str>,
            kind: MediaKind,
        ) -> Result<Vec<CatalogRecord>, FetchError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            if self.fail_search {
                return Err(FetchError::Status(503));
            }
            Ok(self
                .records
                .iter()
                .filter(|r| kind == MediaKind::Unknown || r.media_kind == kind)
                .cloned()
                .collect())
        }

        async fn get_alternate_titles(
            &self,
            catalog_id: u64,
            _kind: MediaKind,
        ) -> Result<Vec<String>, FetchError> {
            self.alternate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .alternates
                .iter()
                .find(|(id, _)| *id == catalog_id)
                .map(|(_, t)| t.clone())
                .unwrap_or_default())
        }

        async fn get_season_list(&self, _catalog_id: u64) -> Result<Vec<SeasonInfo>, FetchError> {
            Ok(self.seasons.clone())
        }

        async fn get_details(
            &self,
            _catalog_id: u64,
            _kind: MediaKind,
        ) -> Result<Option<CatalogRecord>, FetchError> {
            Ok(None)
        }

        async fn scrape_search_links(&self, _name: &str) -> Result<Vec<CatalogLink>, FetchError> {
            self.scrapes.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn record(id: u64, kind: MediaKind, title: &str, date: &str) -> CatalogRecord {
        CatalogRecord {
            catalog_id: id,
            media_kind: kind,
            title: title.to_string(),
            original_title: None,
            release_date: Some(date.to_string()),
            alternate_titles: Vec::new(),
        }
    }

    fn resolver(catalog: Arc<MockCatalog>) -> CatalogResolver {
        CatalogResolver::new(
            catalog,
            None,
            create_cache(Duration::from_secs(60)),
            create_cache(Duration::from_secs(60)),
            ResolverSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_exact_match_skips_fallbacks() {
        let catalog = Arc::new(MockCatalog {
            records: vec![record(157336, MediaKind::Movie, "Interstellar", "2014-11-05")],
            ..Default::default()
        });
        let resolver = resolver(catalog.clone());
        let parsed = parse_release("Interstellar.2014.1080p.BluRay.x264-GROUP", None);

        let found = resolver.resolve(&parsed, None, false).await.unwrap();
        assert_eq!(found.catalog_id, 157336);
        assert_eq!(catalog.searches.load(Ordering::SeqCst), 1);
        assert_eq!(catalog.alternate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(catalog.scrapes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_year_tolerance() {
        let catalog = Arc::new(MockCatalog {
            records: vec![record(1, MediaKind::Movie, "Boundary", "2015-01-02")],
            ..Default::default()
        });
        let resolver = resolver(catalog.clone());
        let parsed = parse_release("Boundary.2014.1080p.WEB-DL", None);

        let found = resolver.resolve(&parsed, None, false).await.unwrap();
        assert_eq!(found.catalog_id, 1);
        // 2014, then 2015
        assert_eq!(catalog.searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_alternate_title_match() {
        let catalog = Arc::new(MockCatalog {
            records: vec![record(7, MediaKind::Movie, "Le Fabuleux Destin", "2001-04-25")],
            alternates: vec![(7, vec!["Amelie".to_string()])],
            ..Default::default()
        });
        let resolver = resolver(catalog.clone());
        let parsed = parse_release("Amelie.2001.720p.BluRay", None);

        let found = resolver.resolve(&parsed, None, false).await.unwrap();
        assert_eq!(found.catalog_id, 7);
        assert_eq!(found.alternate_titles, vec!["Amelie".to_string()]);
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let catalog = Arc::new(MockCatalog::default());
        let resolver = resolver(catalog.clone());
        let parsed = parse_release("Nothing.Here.2020.1080p", None);

        assert_eq!(resolver.resolve(&parsed, None, false).await, None);
        let searches = catalog.searches.load(Ordering::SeqCst);
        let scrapes = catalog.scrapes.load(Ordering::SeqCst);
        assert_eq!(scrapes, 1);

        assert_eq!(resolver.resolve(&parsed, None, false).await, None);
        assert_eq!(catalog.searches.load(Ordering::SeqCst), searches);
        assert_eq!(catalog.scrapes.load(Ordering::SeqCst), scrapes);

        assert_eq!(resolver.invalidate(0), 1);
        assert_eq!(resolver.resolve(&parsed, None, false).await, None);
        assert!(catalog.searches.load(Ordering::SeqCst) > searches);
    }

    #[tokio::test]
    async fn test_failed_lookups_are_not_negatively_cached() {
        let catalog = Arc::new(MockCatalog {
            fail_search: true,
            ..Default::default()
        });
        let resolver = resolver(catalog.clone());
        let parsed = parse_release("Offline.2020.1080p", None);

        assert_eq!(resolver.resolve(&parsed, None, false).await, None);
        let searches = catalog.searches.load(Ordering::SeqCst);
        assert_eq!(resolver.resolve(&parsed, None, false).await, None);
        assert_eq!(catalog.searches.load(Ordering::SeqCst), searches * 2);
    }

    #[tokio::test]
    async fn test_strict_skips_unscoped_search() {
        let catalog = Arc::new(MockCatalog::default());
        let resolver = resolver(catalog.clone());
        let parsed = parse_release("Strict.Name.2020.1080p", None);

        resolver.resolve(&parsed, None, true).await;
        // 2020, 2021, 2019 movie + 2020 tv, no multi
        assert_eq!(catalog.searches.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_tv_season_precision() {
        let catalog = Arc::new(MockCatalog {
            records: vec![record(66732, MediaKind::Tv, "Stranger Things", "2016-07-15")],
            seasons: vec![
                SeasonInfo {
                    season_number: 1,
                    episode_count: 8,
                    air_date: Some("2016-07-15".to_string()),
                },
                SeasonInfo {
                    season_number: 4,
                    episode_count: 9,
                    air_date: Some("2022-05-27".to_string()),
                },
            ],
            ..Default::default()
        });
        let resolver = resolver(catalog.clone());
        let parsed = parse_release("Stranger.Things.2022.S04E01.1080p.WEB-DL", None);

        let found = resolver.resolve(&parsed, None, true).await.unwrap();
        assert_eq!(found.catalog_id, 66732);
        assert_eq!(catalog.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_id() {
        let catalog = Arc::new(MockCatalog {
            records: vec![record(157336, MediaKind::Movie, "Interstellar", "2014-11-05")],
            ..Default::default()
        });
        let resolver = resolver(catalog.clone());
        let parsed = parse_release("Interstellar.2014.1080p", None);

        resolver.resolve(&parsed, None, false).await;
        assert_eq!(resolver.invalidate(42), 0);
        assert_eq!(resolver.invalidate(157336), 1);
    }

    #[test]
    fn test_resolution_key_format() {
        let parsed = parse_release("Some.Show.S02E05.1080p", None);
        let key = ResolutionKey::new(&parsed, Some("2020"));
        assert_eq!(key.to_string(), "[tv]Some Show-2020-2");
    }

    #[test]
    fn test_intersect_season_gaps() {
        let only = |eps: &[u32]| EpisodeSet::Only(eps.iter().copied().collect());
        let target: SeasonGaps = [(1, only(&[3, 4, 5, 6])), (2, EpisodeSet::All), (3, only(&[1]))].into();
        let source: SeasonGaps = [(1, only(&[5, 6, 7])), (2, only(&[9])), (4, only(&[1]))].into();

        let merged = intersect_season_gaps(&target, &source);
        let expected: SeasonGaps = [(1, only(&[5, 6])), (2, only(&[9])), (3, only(&[1]))].into();
        assert_eq!(merged, expected);

        assert_eq!(intersect_season_gaps(&SeasonGaps::new(), &source), source);
    }

    #[test]
    fn test_episode_set_overlap_and_removal() {
        let gap = EpisodeSet::Only(BTreeSet::from([5, 6]));
        assert!(gap.overlaps(&[5]));
        assert!(!gap.overlaps(&[7]));
        assert!(gap.overlaps(&[]));
        assert_eq!(gap.without(&[5]), EpisodeSet::Only(BTreeSet::from([6])));
        assert!(gap.without(&[]).is_empty());
        assert_eq!(EpisodeSet::All.without(&[1]), EpisodeSet::All);
        assert!(!EpisodeSet::All.is_empty());
    }
}

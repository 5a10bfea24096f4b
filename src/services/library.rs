//! Library holdings and refresh collaborators
//!
//! The matcher asks [`LibraryHoldings`] what is already on disk; the scan job
//! pokes [`LibraryRefresher`] after a download is handed off.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Identity of a movie or show as the subscription knows it
#[derive(Debug, Clone, Copy)]
pub struct HoldingQuery<'a> {
    pub title: &'a str,
    pub year: Option<&'a str>,
    pub catalog_id: Option<u64>,
}

#[async_trait]
pub trait LibraryHoldings: Send + Sync {
    /// `None` when the library can't tell
    async fn has_movie(&self, query: HoldingQuery<'_>) -> Option<bool>;

    /// Episodes of `season` not yet in the library.
    ///
    /// `None` means "could not determine"; an empty set means nothing is missing.
    async fn get_missing_episodes(
        &self,
        query: HoldingQuery<'_>,
        season: u32,
        total_episode_count: Option<u32>,
    ) -> Option<BTreeSet<u32>>;
}

#[async_trait]
pub trait LibraryRefresher: Send + Sync {
    async fn refresh(&self, title: &str, catalog_id: Option<u64>);
}

/// Holdings declared in the plan file, keyed by catalog id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HoldingsSnapshot {
    pub movies: Vec<u64>,
    /// `catalog id -> season -> held episodes`
    pub episodes: HashMap<u64, HashMap<u32, BTreeSet<u32>>>,
}

/// In-memory [`LibraryHoldings`] over a [`HoldingsSnapshot`]
#[derive(Debug, Default)]
pub struct StaticLibrary {
    movies: HashSet<u64>,
    episodes: HashMap<u64, HashMap<u32, BTreeSet<u32>>>,
}

impl StaticLibrary {
    pub fn new(snapshot: HoldingsSnapshot) -> Self {
        Self {
            movies: snapshot.movies.into_iter().collect(),
            episodes: snapshot.episodes,
        }
    }
}

#[async_trait]
impl LibraryHoldings for StaticLibrary {
    async fn has_movie(&self, query: HoldingQuery<'_>) -> Option<bool> {
        query.catalog_id.map(|id| self.movies.contains(&id))
    }

    async fn get_missing_episodes(
        &self,
        query: HoldingQuery<'_>,
        season: u32,
        total_episode_count: Option<u32>,
    ) -> Option<BTreeSet<u32>> {
        let total = total_episode_count?;
        let held = query
            .catalog_id
            .and_then(|id| self.episodes.get(&id))
            .and_then(|seasons| seasons.get(&season));
        Some(
            (1..=total)
                .filter(|e| held.is_none_or(|h| !h.contains(e)))
                .collect(),
        )
    }
}

/// Refresher that only logs; stands in until a media server is wired up
#[derive(Debug, Default)]
pub struct LoggingRefresher;

#[async_trait]
impl LibraryRefresher for LoggingRefresher {
    async fn refresh(&self, title: &str, catalog_id: Option<u64>) {
        info!(title = %title, catalog_id = ?catalog_id, "Library refresh requested");
    }
}

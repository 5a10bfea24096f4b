//! External metadata catalog seam
//!
//! The resolver only ever talks to a [`CatalogQuery`]; [`TmdbCatalog`] is the
//! production implementation and tests plug in counting mocks.

mod error;
mod tmdb;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use error::FetchError;
pub use tmdb::{TmdbCatalog, parse_search_links};

use crate::services::parser::MediaKind;

/// One movie or TV show as the catalog knows it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub catalog_id: u64,
    pub media_kind: MediaKind,
    pub title: String,
    pub original_title: Option<String>,
    /// Release date (movies) or first air date (TV), `YYYY-MM-DD`
    pub release_date: Option<String>,
    #[serde(default)]
    pub alternate_titles: Vec<String>,
}

impl CatalogRecord {
    /// Four-digit year of the release/first-air date
    pub fn year(&self) -> Option<&str> {
        date_year(self.release_date.as_deref())
    }
}

/// One season of a TV show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonInfo {
    pub season_number: u32,
    pub episode_count: u32,
    pub air_date: Option<String>,
}

impl SeasonInfo {
    pub fn year(&self) -> Option<&str> {
        date_year(self.air_date.as_deref())
    }
}

/// A result link found on the catalog's public search page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CatalogLink {
    pub media_kind: MediaKind,
    pub catalog_id: u64,
}

fn date_year(date: Option<&str>) -> Option<&str> {
    let date = date?;
    let year = date.get(..4)?;
    year.chars().all(|c| c.is_ascii_digit()).then_some(year)
}

/// Query capability the resolver needs from a metadata catalog
#[async_trait]
pub trait CatalogQuery: Send + Sync {
    /// Search by name, optionally scoped to a year. `MediaKind::Unknown` searches both kinds.
    async fn search_by_name_year(
        &self,
        name: &str,
        year: Option<&str>,
        kind: MediaKind,
    ) -> Result<Vec<CatalogRecord>, FetchError>;

    /// Alternative and translated titles of one record
    async fn get_alternate_titles(
        &self,
        catalog_id: u64,
        kind: MediaKind,
    ) -> Result<Vec<String>, FetchError>;

    /// Seasons of a TV show
    async fn get_season_list(&self, catalog_id: u64) -> Result<Vec<SeasonInfo>, FetchError>;

    /// Full record by id
    async fn get_details(
        &self,
        catalog_id: u64,
        kind: MediaKind,
    ) -> Result<Option<CatalogRecord>, FetchError>;

    /// Result links on the catalog's public search page
    async fn scrape_search_links(&self, name: &str) -> Result<Vec<CatalogLink>, FetchError>;

    /// The scraped search page's only hit, or `None` when it has zero or several
    async fn web_scrape_single_result(
        &self,
        name: &str,
    ) -> Result<Option<CatalogRecord>, FetchError> {
        let links = self.scrape_search_links(name).await?;
        match links.as_slice() {
            [link] => self.get_details(link.catalog_id, link.media_kind).await,
            _ => {
                debug!(name = %name, links = links.len(), "Web search is not a single hit");
                Ok(None)
            }
        }
    }
}

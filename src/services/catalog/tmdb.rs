//! TMDB (The Movie Database) catalog adapter
//!
//! API base URL: https://api.themoviedb.org/3
//! Web search page: https://www.themoviedb.org/search?query=
//!
//! Rate limiting: TMDB allows ~40 requests per 10 seconds. All calls go
//! through a shared [`RateLimitedClient`], which also retries transient errors.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;

use super::{CatalogLink, CatalogQuery, CatalogRecord, FetchError, SeasonInfo};
use crate::services::parser::MediaKind;
use crate::services::rate_limiter::RateLimitedClient;

const API_BASE_URL: &str = "https://api.themoviedb.org/3";
const WEB_BASE_URL: &str = "https://www.themoviedb.org";

static RESULT_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[data-id]").unwrap());

/// Page of search results
#[derive(Debug, Clone, Deserialize)]
struct TmdbPage {
    #[serde(default)]
    results: Vec<TmdbItem>,
}

/// Movie, show, or multi-search item. Movies use `title`, shows use `name`.
#[derive(Debug, Clone, Default, Deserialize)]
struct TmdbItem {
    id: u64,
    media_type: Option<String>,
    title: Option<String>,
    name: Option<String>,
    original_title: Option<String>,
    original_name: Option<String>,
    release_date: Option<String>,
    first_air_date: Option<String>,
    #[serde(default)]
    seasons: Vec<TmdbSeason>,
}

#[derive(Debug, Clone, Deserialize)]
struct TmdbSeason {
    season_number: u32,
    #[serde(default)]
    episode_count: u32,
    air_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TmdbAltTitle {
    title: String,
}

/// `/movie/{id}/alternative_titles` uses `titles`, `/tv/{id}/...` uses `results`
#[derive(Debug, Clone, Default, Deserialize)]
struct TmdbAltTitles {
    #[serde(default)]
    titles: Vec<TmdbAltTitle>,
    #[serde(default)]
    results: Vec<TmdbAltTitle>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TmdbTranslations {
    #[serde(default)]
    translations: Vec<TmdbTranslation>,
}

#[derive(Debug, Clone, Deserialize)]
struct TmdbTranslation {
    #[serde(default)]
    data: TmdbTranslationData,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TmdbTranslationData {
    title: Option<String>,
    name: Option<String>,
}

impl TmdbItem {
    fn kind(&self, requested: MediaKind) -> MediaKind {
        match self.media_type.as_deref() {
            Some("movie") => MediaKind::Movie,
            Some("tv") => MediaKind::Tv,
            _ => requested,
        }
    }

    fn into_record(self, requested: MediaKind) -> CatalogRecord {
        let media_kind = self.kind(requested);
        let (title, original_title, release_date) = match media_kind {
            MediaKind::Tv => (self.name, self.original_name, self.first_air_date),
            _ => (self.title, self.original_title, self.release_date),
        };
        CatalogRecord {
            catalog_id: self.id,
            media_kind,
            title: title.unwrap_or_default(),
            original_title,
            release_date: release_date.filter(|d| !d.is_empty()),
            alternate_titles: Vec::new(),
        }
    }
}

fn kind_path(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Tv => "tv",
        _ => "movie",
    }
}

/// Extract unique `/movie/<id>` and `/tv/<id>` result links from a TMDB search page
pub fn parse_search_links(html: &str) -> Vec<CatalogLink> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&RESULT_LINK_SELECTOR) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let (media_kind, rest) = if let Some(rest) = href.strip_prefix("/movie/") {
            (MediaKind::Movie, rest)
        } else if let Some(rest) = href.strip_prefix("/tv/") {
            (MediaKind::Tv, rest)
        } else {
            continue;
        };
        // `/movie/157336-interstellar`
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        let Ok(catalog_id) = digits.parse::<u64>() else {
            continue;
        };
        let link = CatalogLink {
            media_kind,
            catalog_id,
        };
        if seen.insert(link) {
            links.push(link);
        }
    }
    links
}

/// TMDB-backed [`CatalogQuery`]
pub struct TmdbCatalog {
    client: Arc<RateLimitedClient>,
    api_key: String,
    language: String,
}

impl TmdbCatalog {
    pub fn new(client: Arc<RateLimitedClient>, api_key: String, language: String) -> Self {
        Self {
            client,
            api_key,
            language,
        }
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn api_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        extra: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        if !self.has_api_key() {
            return Err(FetchError::Unavailable("TMDB API key not configured".into()));
        }
        let url = format!("{API_BASE_URL}{path}");
        let mut query: Vec<(&str, &str)> = vec![
            ("api_key", self.api_key.as_str()),
            ("language", self.language.as_str()),
        ];
        query.extend_from_slice(extra);
        self.client.get_json(&url, &query).await
    }
}

#[async_trait]
impl CatalogQuery for TmdbCatalog {
    async fn search_by_name_year(
        &self,
        name: &str,
        year: Option<&str>,
        kind: MediaKind,
    ) -> Result<Vec<CatalogRecord>, FetchError> {
        let (path, year_param) = match kind {
            MediaKind::Movie => ("/search/movie", "year"),
            MediaKind::Tv => ("/search/tv", "first_air_date_year"),
            MediaKind::Unknown => ("/search/multi", "year"),
        };
        let mut extra = vec![("query", name), ("include_adult", "false")];
        if let Some(year) = year {
            extra.push((year_param, year));
        }

        let page: TmdbPage = self.api_get(path, &extra).await?;
        let records: Vec<CatalogRecord> = page
            .results
            .into_iter()
            .filter(|item| {
                kind != MediaKind::Unknown
                    || matches!(item.media_type.as_deref(), Some("movie") | Some("tv"))
            })
            .map(|item| item.into_record(kind))
            .collect();

        debug!(name = %name, year = ?year, kind = %kind, count = records.len(), "TMDB search returned results");
        Ok(records)
    }

    async fn get_alternate_titles(
        &self,
        catalog_id: u64,
        kind: MediaKind,
    ) -> Result<Vec<String>, FetchError> {
        let base = format!("/{}/{catalog_id}", kind_path(kind));
        let alternatives: TmdbAltTitles =
            self.api_get(&format!("{base}/alternative_titles"), &[]).await?;
        let translations: TmdbTranslations =
            self.api_get(&format!("{base}/translations"), &[]).await?;

        let mut titles: Vec<String> = Vec::new();
        let alt = alternatives
            .titles
            .into_iter()
            .chain(alternatives.results)
            .map(|t| t.title);
        let translated = translations
            .translations
            .into_iter()
            .filter_map(|t| t.data.title.or(t.data.name));
        for title in alt.chain(translated) {
            if !title.is_empty() && !titles.contains(&title) {
                titles.push(title);
            }
        }
        Ok(titles)
    }

    async fn get_season_list(&self, catalog_id: u64) -> Result<Vec<SeasonInfo>, FetchError> {
        let show: TmdbItem = self.api_get(&format!("/tv/{catalog_id}"), &[]).await?;
        Ok(show
            .seasons
            .into_iter()
            .map(|s| SeasonInfo {
                season_number: s.season_number,
                episode_count: s.episode_count,
                air_date: s.air_date.filter(|d| !d.is_empty()),
            })
            .collect())
    }

    async fn get_details(
        &self,
        catalog_id: u64,
        kind: MediaKind,
    ) -> Result<Option<CatalogRecord>, FetchError> {
        let path = format!("/{}/{catalog_id}", kind_path(kind));
        match self.api_get::<TmdbItem>(&path, &[]).await {
            Ok(item) => Ok(Some(item.into_record(kind))),
            Err(FetchError::Status(404)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn scrape_search_links(&self, name: &str) -> Result<Vec<CatalogLink>, FetchError> {
        let url = format!(
            "{WEB_BASE_URL}/search?query={}",
            urlencoding::encode(name)
        );
        let html = self
            .client
            .get_text(&url, &[], &[("Accept-Language", self.language.as_str())])
            .await?;
        let links = parse_search_links(&html);
        debug!(name = %name, links = links.len(), "Scraped TMDB search page");
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_search_links_dedupes() {
        let html = r#"
            <div class="results">
              <a data-id="157336" data-media-type="movie" href="/movie/157336-interstellar">Interstellar</a>
              <a data-id="157336" data-media-type="movie" href="/movie/157336-interstellar"><img/></a>
              <a data-id="1399" data-media-type="tv" href="/tv/1399-game-of-thrones">GoT</a>
              <a data-id="42" href="/person/42-someone">Person</a>
              <a href="/movie/1-no-data-id">Ignored</a>
            </div>"#;
        let links = parse_search_links(html);
        assert_eq!(
            links,
            vec![
                CatalogLink {
                    media_kind: MediaKind::Movie,
                    catalog_id: 157336
                },
                CatalogLink {
                    media_kind: MediaKind::Tv,
                    catalog_id: 1399
                },
            ]
        );
    }

    #[test]
    fn test_parse_search_links_empty_page() {
        assert!(parse_search_links("<html><body>No results</body></html>").is_empty());
    }

    #[test]
    fn test_multi_item_into_record() {
        let item: TmdbItem = serde_json::from_str(
            r#"{"id": 1399, "media_type": "tv", "name": "Game of Thrones",
                "original_name": "Game of Thrones", "first_air_date": "2011-04-17"}"#,
        )
        .unwrap();
        let record = item.into_record(MediaKind::Unknown);
        assert_eq!(record.media_kind, MediaKind::Tv);
        assert_eq!(record.title, "Game of Thrones");
        assert_eq!(record.year(), Some("2011"));
    }

    #[test]
    fn test_movie_item_into_record() {
        let item: TmdbItem = serde_json::from_str(
            r#"{"id": 157336, "title": "Interstellar", "original_title": "Interstellar",
                "release_date": ""}"#,
        )
        .unwrap();
        let record = item.into_record(MediaKind::Movie);
        assert_eq!(record.media_kind, MediaKind::Movie);
        assert_eq!(record.release_date, None);
    }
}

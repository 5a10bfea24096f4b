//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::jobs::DEFAULT_SCAN_SCHEDULE;
use crate::services::keyword_inference::KeywordScoring;
use crate::services::resolver::ResolverSettings;

/// How eagerly the resolver falls back to name-only searches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    #[default]
    Normal,
    /// Never drop a known year to retry unscoped
    Strict,
}

impl FromStr for MatchMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" | "" => Ok(MatchMode::Normal),
            "strict" => Ok(MatchMode::Strict),
            other => bail!("unknown match mode {other:?}, expected normal or strict"),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// TMDB API key
    pub tmdb_api_key: Option<String>,

    /// Language for TMDB responses
    pub tmdb_language: String,

    /// Scrape TMDB's search page when the API finds nothing
    pub search_tmdb_web: bool,

    /// Ask Bing/Baidu for a better keyword as a last resort
    pub search_keyword: bool,

    pub match_mode: MatchMode,

    /// Regex alternatives removed from titles before parsing
    pub ignored_words: Vec<String>,

    /// `pattern -> replacement` pairs applied before parsing
    pub replaced_words: Vec<(String, String)>,

    pub resolver_cache_ttl: Duration,

    /// Budget for any single catalog or search-engine call
    pub catalog_timeout: Duration,

    /// Sites fetched in parallel
    pub indexer_max_concurrent: usize,

    pub indexer_timeout: Duration,

    pub keyword_similarity_threshold: f64,

    pub keyword_diff_score_threshold: f64,

    /// Cron expression (with seconds) for scheduled scans
    pub scan_schedule: String,

    /// JSON scan plan
    pub plan_path: PathBuf,

    /// Where the download client should put files
    pub download_dir: Option<String>,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Invalid {key}: {value:?}")),
        _ => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => bail!("Invalid {key}: {value:?}"),
        },
        Err(_) => Ok(default),
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// `a||b||c`
pub fn split_words(value: &str) -> Vec<String> {
    value
        .split("||")
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// `pattern@replacement||pattern@replacement`
pub fn split_replacements(value: &str) -> Result<Vec<(String, String)>> {
    split_words(value)
        .into_iter()
        .map(|pair| match pair.split_once('@') {
            Some((pattern, replacement)) if !pattern.is_empty() => {
                Ok((pattern.to_string(), replacement.to_string()))
            }
            _ => bail!("Invalid REPLACED_WORDS entry {pair:?}, expected pattern@replacement"),
        })
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let match_mode = env::var("MATCH_MODE")
            .unwrap_or_default()
            .parse()
            .context("Invalid MATCH_MODE")?;

        Ok(Self {
            tmdb_api_key: env::var("TMDB_API_KEY").ok().filter(|k| !k.is_empty()),

            tmdb_language: env::var("TMDB_LANGUAGE").unwrap_or_else(|_| "zh-CN".to_string()),

            search_tmdb_web: env_bool("SEARCH_TMDB_WEB", true)?,

            search_keyword: env_bool("SEARCH_KEYWORD", false)?,

            match_mode,

            ignored_words: split_words(&env::var("IGNORED_WORDS").unwrap_or_default()),

            replaced_words: split_replacements(&env::var("REPLACED_WORDS").unwrap_or_default())?,

            resolver_cache_ttl: Duration::from_secs(env_or(
                "RESOLVER_CACHE_TTL_SECS",
                7 * 24 * 60 * 60,
            )?),

            catalog_timeout: Duration::from_secs(env_or("CATALOG_TIMEOUT_SECS", 5)?),

            indexer_max_concurrent: env_or("INDEXER_MAX_CONCURRENT", 4)?,

            indexer_timeout: Duration::from_secs(env_or("INDEXER_TIMEOUT_SECS", 30)?),

            keyword_similarity_threshold: env_or("KEYWORD_SIMILARITY_THRESHOLD", 0.9)?,

            keyword_diff_score_threshold: env_or("KEYWORD_DIFF_SCORE_THRESHOLD", 30.0)?,

            scan_schedule: env::var("SCAN_SCHEDULE")
                .unwrap_or_else(|_| DEFAULT_SCAN_SCHEDULE.to_string()),

            plan_path: env::var("PLAN_PATH")
                .map(|p| expand_home(&p))
                .unwrap_or_else(|_| PathBuf::from("./data/plan.json")),

            download_dir: env::var("DOWNLOAD_DIR")
                .ok()
                .filter(|d| !d.is_empty())
                .map(|d| expand_home(&d).to_string_lossy().into_owned()),
        })
    }

    pub fn is_strict(&self) -> bool {
        self.match_mode == MatchMode::Strict
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            search_web: self.search_tmdb_web,
            search_keyword: self.search_keyword,
            strict_mode: self.is_strict(),
            call_timeout: self.catalog_timeout,
            ..Default::default()
        }
    }

    pub fn keyword_scoring(&self) -> KeywordScoring {
        KeywordScoring {
            similarity_threshold: self.keyword_similarity_threshold,
            diff_score_threshold: self.keyword_diff_score_threshold,
            ..Default::default()
        }
    }
}

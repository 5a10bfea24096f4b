//! Candidate sources
//!
//! A site is anything that can hand back raw releases: an RSS feed, a
//! Torznab endpoint, a scraped listing. Each one implements
//! [`CandidateSource`] and is registered in a [`SourceRegistry`] keyed by its
//! domain. The [`IndexerManager`] fans a query out across every registered
//! site with bounded concurrency.

pub mod manager;
pub mod registry;
pub mod rss;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use manager::{IndexerManager, IndexerManagerConfig, SourceBatch};
pub use registry::{SourceRegistry, site_domain};
pub use rss::{RssFeedSource, parse_feed};

/// One release exactly as a site lists it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCandidate {
    pub title: String,
    pub subtitle: Option<String>,
    pub enclosure_url: String,
    pub size: u64,
    pub seeders: u32,
    pub peers: u32,
    pub upload_factor: Option<f64>,
    pub download_factor: Option<f64>,
    pub site_id: String,
    pub page_url: Option<String>,
    pub is_hit_and_run: bool,
}

/// A configured site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub id: String,
    pub name: String,
    /// Site home page; its host is the registry key
    pub url: String,
    pub rss_url: Option<String>,
    /// Higher wins when the same release shows up on several sites
    pub priority: i32,
    /// Rule group applied to releases from this site when a subscription has none
    pub rule_group: Option<String>,
    pub enabled: bool,
}

/// What to ask a site for. An empty query is "latest releases".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateQuery {
    pub keyword: Option<String>,
}

impl CandidateQuery {
    pub fn latest() -> Self {
        Self::default()
    }
}

/// Capability every site adapter provides
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Site id, as subscriptions refer to it
    fn id(&self) -> &str;

    /// Whether this adapter serves `url`
    fn identify(&self, url: &str) -> bool;

    async fn fetch_candidates(&self, query: &CandidateQuery) -> Result<Vec<RawCandidate>>;
}

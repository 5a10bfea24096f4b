//! Site adapters keyed by domain, built once at startup

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use url::Url;

use super::{CandidateSource, RssFeedSource, SiteProfile};
use crate::services::rate_limiter::RateLimitedClient;

/// Host of `url` without a leading `www.`
pub fn site_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

struct RegisteredSite {
    profile: SiteProfile,
    source: Arc<dyn CandidateSource>,
}

#[derive(Default)]
pub struct SourceRegistry {
    sites: Vec<RegisteredSite>,
    by_domain: HashMap<String, usize>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// RSS adapters for every enabled profile that has a feed
    pub fn from_profiles(profiles: &[SiteProfile], request_timeout: Duration) -> Result<Self> {
        let client = Arc::new(RateLimitedClient::for_rss(request_timeout)?);
        let mut registry = Self::new();
        for profile in profiles.iter().filter(|p| p.enabled) {
            let Some(feed_url) = profile.rss_url.as_deref() else {
                warn!(site = %profile.id, "Site has no RSS feed, skipping");
                continue;
            };
            let source = RssFeedSource::new(&profile.id, feed_url, client.clone())?;
            registry.register(profile.clone(), Arc::new(source))?;
        }
        info!(sites = registry.len(), "Site registry built");
        Ok(registry)
    }

    pub fn register(&mut self, profile: SiteProfile, source: Arc<dyn CandidateSource>) -> Result<()> {
        let domain = site_domain(&profile.url)
            .or_else(|| profile.rss_url.as_deref().and_then(site_domain))
            .with_context(|| format!("site {} has no usable url", profile.id))?;
        if self.by_domain.contains_key(&domain) {
            bail!("domain {domain} is already registered");
        }
        self.by_domain.insert(domain, self.sites.len());
        self.sites.push(RegisteredSite { profile, source });
        Ok(())
    }

    /// Adapter serving `url`, by domain and then by asking each adapter
    pub fn resolve(&self, url: &str) -> Option<Arc<dyn CandidateSource>> {
        if let Some(index) = site_domain(url).and_then(|d| self.by_domain.get(&d)) {
            return Some(self.sites[*index].source.clone());
        }
        self.sites
            .iter()
            .find(|s| s.source.identify(url))
            .map(|s| s.source.clone())
    }

    pub fn profile(&self, site_id: &str) -> Option<&SiteProfile> {
        self.sites
            .iter()
            .map(|s| &s.profile)
            .find(|p| p.id == site_id)
    }

    /// Registered sites in registration order
    pub fn sites(&self) -> Vec<(SiteProfile, Arc<dyn CandidateSource>)> {
        self.sites
            .iter()
            .map(|s| (s.profile.clone(), s.source.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

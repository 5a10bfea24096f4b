//! Service wiring shared by the CLI subcommands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::indexer::{IndexerManager, IndexerManagerConfig, SourceRegistry};
use crate::jobs::{ScanPlan, ScanServices, ScanSettings, SubscriptionScanner};
use crate::services::cache::create_cache;
use crate::services::catalog::TmdbCatalog;
use crate::services::dedup::MemoryLedger;
use crate::services::downloader::LoggingDispatcher;
use crate::services::keyword_inference::{KeywordInference, SearchEngine};
use crate::services::library::{LoggingRefresher, StaticLibrary};
use crate::services::notifications::create_notifier;
use crate::services::parser::{ParserSettings, TitleParser};
use crate::services::rate_limiter::RateLimitedClient;
use crate::services::resolver::CatalogResolver;
use crate::services::rules::RuleEngine;
use crate::services::search_engines::{BaiduSearch, BingSearch};
use crate::services::subscriptions::SubscriptionMatcher;

pub fn build_parser(config: &Config) -> Result<TitleParser> {
    let settings = ParserSettings::new(&config.ignored_words, &config.replaced_words)
        .context("Invalid IGNORED_WORDS or REPLACED_WORDS")?;
    Ok(TitleParser::new(settings))
}

pub fn build_resolver(config: &Config) -> Result<CatalogResolver> {
    let tmdb_client = Arc::new(RateLimitedClient::for_tmdb(config.catalog_timeout)?);
    let catalog = TmdbCatalog::new(
        tmdb_client,
        config.tmdb_api_key.clone().unwrap_or_default(),
        config.tmdb_language.clone(),
    );
    if !catalog.has_api_key() {
        tracing::warn!("TMDB_API_KEY is not set, catalog lookups will find nothing");
    }

    let keywords = if config.search_keyword {
        let engines: Vec<Arc<dyn SearchEngine>> = vec![
            Arc::new(BingSearch::new(Arc::new(RateLimitedClient::for_search_engine(
                "bing",
                config.catalog_timeout,
            )?))),
            Arc::new(BaiduSearch::new(Arc::new(RateLimitedClient::for_search_engine(
                "baidu",
                config.catalog_timeout,
            )?))),
        ];
        Some(KeywordInference::new(
            engines,
            config.keyword_scoring(),
            config.catalog_timeout,
        ))
    } else {
        None
    };

    Ok(CatalogResolver::new(
        Arc::new(catalog),
        keywords,
        create_cache(config.resolver_cache_ttl),
        create_cache(config.resolver_cache_ttl),
        config.resolver_settings(),
    ))
}

/// Everything a scan needs, from configuration and a loaded plan
pub fn build_scanner(config: &Config, plan: &ScanPlan) -> Result<SubscriptionScanner> {
    let registry = SourceRegistry::from_profiles(&plan.sites, config.indexer_timeout)?;
    let indexers = IndexerManager::new(
        Arc::new(registry),
        IndexerManagerConfig {
            max_concurrent: config.indexer_max_concurrent,
            site_timeout: config.indexer_timeout,
        },
    );

    let rules = Arc::new(RuleEngine::new(plan.rule_book()?));
    let library = Arc::new(StaticLibrary::new(plan.holdings.clone()));
    let matcher = SubscriptionMatcher::new(rules, library)
        .with_year_tolerance(config.resolver_settings().year_tolerance);

    let services = ScanServices {
        indexers: Arc::new(indexers),
        parser: Arc::new(build_parser(config)?),
        resolver: Arc::new(build_resolver(config)?),
        matcher: Arc::new(matcher),
        subscriptions: Arc::new(plan.subscription_store()?),
        ledger: Arc::new(MemoryLedger::new()),
        dispatcher: Arc::new(LoggingDispatcher::new()),
        refresher: Arc::new(LoggingRefresher),
        notifier: create_notifier(),
    };
    info!(
        sites = services.indexers.registry().len(),
        subscriptions = services.subscriptions.len(),
        "Scanner ready"
    );

    Ok(SubscriptionScanner::new(
        services,
        ScanSettings {
            strict: config.is_strict(),
            download_dir: config.download_dir.clone(),
        },
    ))
}

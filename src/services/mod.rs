//! Release identification and matching services

pub mod cache;
pub mod candidate;
pub mod catalog;
pub mod dedup;
pub mod download_selector;
pub mod downloader;
pub mod keyword_inference;
pub mod library;
pub mod notifications;
pub mod parser;
pub mod rate_limiter;
pub mod resolver;
pub mod rules;
pub mod search_engines;
pub mod subscriptions;
pub mod text_utils;

pub use cache::{SharedCache, TtlCache, create_cache};
pub use candidate::ResolvedCandidate;
pub use catalog::{CatalogQuery, CatalogRecord, FetchError, TmdbCatalog};
pub use dedup::{DedupLedger, MemoryLedger};
pub use download_selector::{AcceptedRelease, select_downloads};
pub use downloader::{DownloadDispatcher, LoggingDispatcher};
pub use keyword_inference::{KeywordInference, KeywordScoring, SearchEngine};
pub use library::{LibraryHoldings, LibraryRefresher, LoggingRefresher, StaticLibrary};
pub use notifications::{BroadcastNotifier, NotificationCategory, Notifier, NotifierConfig};
pub use parser::{MediaKind, ParsedRelease, ParserSettings, TitleParser, parse_release};
pub use rate_limiter::RateLimitedClient;
pub use resolver::{CachedResolution, CatalogResolver, EpisodeSet, ResolverSettings};
pub use rules::{RuleBook, RuleEngine, RuleError, RuleGroup};
pub use search_engines::{BaiduSearch, BingSearch};
pub use subscriptions::{MatchResult, Subscription, SubscriptionMatcher, SubscriptionStore};

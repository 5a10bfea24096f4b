//! Search-engine-assisted keyword inference
//!
//! Last resort for names the catalog cannot place: ask general web search
//! engines about the name and vote on the bolded phrases they highlight.
//! Earlier phrases on a page weigh more, and pages with few highlighted
//! phrases give each one more weight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::services::catalog::FetchError;
use crate::services::text_utils::similarity_ratio;

/// Release boilerplate removed before asking a search engine
const KEYWORD_BLACKLIST: &[&str] = &[
    "中字", "韩语", "双字", "中英", "日语", "双语", "国粤", "HD", "BD", "中日", "粤语",
    "完全版", "法语", "西班牙语", "HRHDTVAC3264", "未删减版", "未删减", "国语", "字幕组",
    "人人影视", "www66ystv", "人人影视制作", "英语", "www6vhaotv", "无删减版", "完成版",
    "德意",
];

static SUBTITLE_GROUP_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\w+字幕[组社]?").unwrap());

/// Highlighted phrases one engine returned for a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineHits {
    pub phrases: Vec<String>,
    /// Knowledge-panel title, when the engine shows one
    pub entity_title: Option<String>,
    pub entity_is_movie: bool,
}

/// A general web search engine that highlights matching phrases
#[async_trait]
pub trait SearchEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn emphasized_phrases(&self, query: &str) -> Result<EngineHits, FetchError>;
}

/// Weights and thresholds for phrase voting
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordScoring {
    /// Fewer than 5 phrases: `[first two, rest]`
    pub few_weights: [f64; 2],
    /// Fewer than 10 phrases: `[first two, first half, rest]`
    pub some_weights: [f64; 3],
    /// 10 or more: `[first two, first quarter, first half, first three quarters, rest]`
    pub many_weights: [f64; 5],
    /// Minimum similarity between query and phrase for the phrase to count
    pub similarity_threshold: f64,
    /// Score gap above which the top phrase wins over a longer runner-up
    pub diff_score_threshold: f64,
    /// Score given to a knowledge-panel title
    pub entity_score: f64,
    /// A phrase at or above this score is never second-guessed
    pub full_score: f64,
}

impl Default for KeywordScoring {
    fn default() -> Self {
        Self {
            few_weights: [10.0, 2.0],
            some_weights: [10.0, 2.0, 1.0],
            many_weights: [10.0, 3.0, 2.0, 0.5, 0.5],
            similarity_threshold: 0.9,
            diff_score_threshold: 30.0,
            entity_score: 200.0,
            full_score: 100.0,
        }
    }
}

impl KeywordScoring {
    /// Weight of the phrase at `index` among `count` phrases
    pub fn weight(&self, index: usize, count: usize) -> f64 {
        if count < 5 {
            if index < 2 {
                self.few_weights[0]
            } else {
                self.few_weights[1]
            }
        } else if count < 10 {
            if index < 2 {
                self.some_weights[0]
            } else if index < count / 2 {
                self.some_weights[1]
            } else {
                self.some_weights[2]
            }
        } else if index < 2 {
            self.many_weights[0]
        } else if index < count / 4 {
            self.many_weights[1]
        } else if index < count / 2 {
            self.many_weights[2]
        } else if index < count * 3 / 4 {
            self.many_weights[3]
        } else {
            self.many_weights[4]
        }
    }
}

/// The inferred keyword and whether the engine thought it was a movie
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordGuess {
    pub keyword: String,
    pub is_movie: bool,
}

/// Remove subtitle-group prefixes and blacklist words; longest words go first
pub fn strip_blacklist(name: &str) -> String {
    let mut cleaned = SUBTITLE_GROUP_PREFIX_RE.replace(name, "").into_owned();
    let mut words: Vec<&str> = KEYWORD_BLACKLIST.to_vec();
    words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
    for word in words {
        cleaned = cleaned.replace(word, " ");
    }
    cleaned.trim().to_string()
}

/// Add each phrase's positional weight into `scores`, keyed by lowercase phrase
pub fn score_phrases(phrases: &[String], scores: &mut Vec<(String, f64)>, scoring: &KeywordScoring) {
    let count = phrases.len();
    for (index, phrase) in phrases.iter().enumerate() {
        let weight = scoring.weight(index, count);
        let key = phrase.to_lowercase();
        match scores.iter_mut().find(|(k, _)| *k == key) {
            Some((_, score)) => *score += weight,
            None => scores.push((key, weight)),
        }
    }
}

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Pick the winning phrase from accumulated scores
pub fn select_keyword(mut scores: Vec<(String, f64)>, scoring: &KeywordScoring) -> Option<String> {
    // Stable: equal scores keep first-seen order
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    let (top, top_score) = scores.first()?.clone();
    let Some((second, second_score)) = scores.get(1).cloned() else {
        return Some(top);
    };

    let chosen = if second.contains(&top) {
        if top_score >= scoring.full_score
            || top_score - second_score > scoring.diff_score_threshold
        {
            top
        } else {
            second
        }
    } else {
        top
    };

    if is_numeric(&chosen)
        && let Some((alternative, _)) = scores.iter().find(|(k, _)| !is_numeric(k))
    {
        return Some(alternative.clone());
    }
    Some(chosen)
}

/// Runs the configured engines and votes on their highlighted phrases
pub struct KeywordInference {
    engines: Vec<Arc<dyn SearchEngine>>,
    scoring: KeywordScoring,
    call_timeout: Duration,
}

impl KeywordInference {
    pub fn new(
        engines: Vec<Arc<dyn SearchEngine>>,
        scoring: KeywordScoring,
        call_timeout: Duration,
    ) -> Self {
        Self {
            engines,
            scoring,
            call_timeout,
        }
    }

    /// Infer a cleaner search keyword for `name`.
    ///
    /// Errors only when every engine failed; a page with nothing useful is `Ok(None)`.
    pub async fn infer(&self, name: &str) -> Result<Option<KeywordGuess>, FetchError> {
        let query = strip_blacklist(name);
        if query.is_empty() || self.engines.is_empty() {
            return Ok(None);
        }

        let calls = self.engines.iter().map(|engine| {
            let query = query.clone();
            async move {
                match tokio::time::timeout(self.call_timeout, engine.emphasized_phrases(&query))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout),
                }
            }
        });
        let results = join_all(calls).await;

        let mut scores: Vec<(String, f64)> = Vec::new();
        let mut is_movie = false;
        let mut first_error = None;
        let mut any_ok = false;

        for (engine, result) in self.engines.iter().zip(results) {
            let hits = match result {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(engine = %engine.name(), query = %query, error = %e, "Search engine lookup failed");
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            any_ok = true;

            let phrases: Vec<String> = hits
                .phrases
                .into_iter()
                .filter(|p| {
                    !p.is_empty() && similarity_ratio(&query, p) > self.scoring.similarity_threshold
                })
                .collect();
            if phrases.is_empty() {
                continue;
            }
            if let Some(title) = hits.entity_title.filter(|t| !t.is_empty()) {
                match scores.iter_mut().find(|(k, _)| *k == title) {
                    Some((_, score)) => *score = self.scoring.entity_score,
                    None => scores.push((title, self.scoring.entity_score)),
                }
                is_movie |= hits.entity_is_movie;
            }
            score_phrases(&phrases, &mut scores, &self.scoring);
        }

        if !any_ok && let Some(e) = first_error {
            return Err(e);
        }

        debug!(query = %query, candidates = ?scores.iter().take(4).collect::<Vec<_>>(), "Keyword candidates");
        let Some(keyword) = select_keyword(scores, &self.scoring) else {
            return Ok(None);
        };
        info!(name = %name, keyword = %keyword, is_movie, "Inferred search keyword");
        Ok(Some(KeywordGuess { keyword, is_movie }))
    }
}

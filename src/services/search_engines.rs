//! Bing and Baidu result-page scrapers for keyword inference
//!
//! Only the highlighted (`<strong>` / `<em>`) phrases and Bing's knowledge
//! panel title are read; everything else on the page is ignored.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::services::catalog::FetchError;
use crate::services::keyword_inference::{EngineHits, SearchEngine};
use crate::services::rate_limiter::RateLimitedClient;

const BING_SEARCH_URL: &str = "https://cn.bing.com/search";
const BAIDU_SEARCH_URL: &str = "https://www.baidu.com/s";

static BING_STRONG_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(concat!(
        "#sp_requery strong, #sp_recourse strong, #tile_link_cn strong, ",
        ".b_ad .ad_esltitle~div strong, h2 strong, .b_caption p strong, ",
        ".b_snippetBigText strong, .recommendationsTableTitle+.b_slideexp strong, ",
        ".recommendationsTableTitle+table strong, .recommendationsTableTitle+ul strong, ",
        ".pageRecoContainer .b_module_expansion_control strong, ",
        ".pageRecoContainer .b_title>strong, .b_rs strong, .b_rrsr strong, ",
        "#dict_ans strong, .b_listnav>.b_ans_stamp>strong, ",
        "#b_content #ans_nws .na_cnt strong, .adltwrnmsg strong"
    ))
    .unwrap()
});
static BING_ENTITY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("aside h2.b_entityTitle").unwrap());
static BING_MOVIE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"aside div[data-feedbk-ids="Movie"]"#).unwrap());
static BAIDU_EM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("em").unwrap());

/// `Arrival (2016)` -> `Arrival`
static TRAILING_YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(\d{4}\)$").unwrap());

fn element_texts(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Highlighted phrases and knowledge-panel title from a Bing results page
pub fn parse_bing_page(html: &str) -> EngineHits {
    let document = Html::parse_document(html);
    let phrases = element_texts(&document, &BING_STRONG_SELECTOR);
    let entity_title = document
        .select(&BING_ENTITY_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>())
        .map(|t| TRAILING_YEAR_RE.replace(t.trim(), "").into_owned())
        .filter(|t| !t.is_empty());
    let entity_is_movie = document.select(&BING_MOVIE_SELECTOR).next().is_some();
    EngineHits {
        phrases,
        entity_title,
        entity_is_movie,
    }
}

/// Highlighted phrases from a Baidu results page
pub fn parse_baidu_page(html: &str) -> EngineHits {
    let document = Html::parse_document(html);
    EngineHits {
        phrases: element_texts(&document, &BAIDU_EM_SELECTOR),
        ..Default::default()
    }
}

pub struct BingSearch {
    client: Arc<RateLimitedClient>,
}

impl BingSearch {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchEngine for BingSearch {
    fn name(&self) -> &str {
        "bing"
    }

    async fn emphasized_phrases(&self, query: &str) -> Result<EngineHits, FetchError> {
        let html = self
            .client
            .get_text(
                BING_SEARCH_URL,
                &[("q", query), ("qs", "n"), ("form", "QBRE"), ("sp", "-1")],
                &[],
            )
            .await?;
        Ok(parse_bing_page(&html))
    }
}

pub struct BaiduSearch {
    client: Arc<RateLimitedClient>,
}

impl BaiduSearch {
    pub fn new(client: Arc<RateLimitedClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchEngine for BaiduSearch {
    fn name(&self) -> &str {
        "baidu"
    }

    async fn emphasized_phrases(&self, query: &str) -> Result<EngineHits, FetchError> {
        let html = self
            .client
            .get_text(
                BAIDU_SEARCH_URL,
                &[("ie", "utf-8"), ("tn", "baiduhome_pg"), ("wd", query)],
                &[],
            )
            .await?;
        Ok(parse_baidu_page(&html))
    }
}

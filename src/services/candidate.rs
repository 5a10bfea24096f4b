//! A parsed release joined with its catalog record and site economics

use serde::{Deserialize, Serialize};

use crate::services::catalog::CatalogRecord;
use crate::services::parser::ParsedRelease;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedCandidate {
    pub parsed: ParsedRelease,
    /// `None` when the resolver found nothing; only fuzzy subscriptions can take it
    pub record: Option<CatalogRecord>,
    pub size_bytes: u64,
    pub seeders: u32,
    pub peers: u32,
    /// Promotion factors as the site reports them; `None` when unknown
    pub upload_factor: Option<f64>,
    pub download_factor: Option<f64>,
    pub is_hit_and_run: bool,
    pub site_identity: String,
    /// Higher sorts first when several sites offer the same release
    pub site_priority_order: i32,
    pub enclosure_url: String,
    pub page_url: Option<String>,
}

impl ResolvedCandidate {
    /// Title plus subtitle, the text include/exclude rules search
    pub fn full_text(&self) -> String {
        match self.parsed.raw_subtitle.as_deref().filter(|s| !s.is_empty()) {
            Some(subtitle) => format!("{} {subtitle}", self.parsed.raw_title),
            None => self.parsed.raw_title.clone(),
        }
    }

    /// Catalog title when resolved, else the parsed name
    pub fn display_title(&self) -> &str {
        self.record
            .as_ref()
            .map(|r| r.title.as_str())
            .unwrap_or_else(|| self.parsed.name())
    }

    /// Catalog year when resolved, else the parsed year
    pub fn year(&self) -> Option<&str> {
        self.record
            .as_ref()
            .and_then(|r| r.year())
            .or(self.parsed.year.as_deref())
    }

    /// Size per episode for multi-episode TV releases
    pub fn size_per_episode(&self) -> u64 {
        match self.parsed.episode_list.len() {
            0 | 1 => self.size_bytes,
            n => self.size_bytes / n as u64,
        }
    }

    /// `ul dl` promotion label, e.g. `1 0` for free-leech
    pub fn promotion_label(&self) -> String {
        let fmt = |f: Option<f64>| f.map(|v| v.to_string()).unwrap_or_else(|| "?".to_string());
        format!("{} {}", fmt(self.upload_factor), fmt(self.download_factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser::parse_release;

    #[test]
    fn test_full_text_and_fallbacks() {
        let candidate = ResolvedCandidate {
            parsed: parse_release("Some.Show.S01E01-E04.1080p", Some("first four")),
            size_bytes: 8_000,
            ..Default::default()
        };
        assert_eq!(candidate.full_text(), "Some.Show.S01E01-E04.1080p first four");
        assert_eq!(candidate.display_title(), "Some Show");
        assert_eq!(candidate.size_per_episode(), 2_000);
        assert_eq!(candidate.promotion_label(), "? ?");
    }
}

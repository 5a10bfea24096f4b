//! Subscriptions and the matcher that decides which one a release satisfies

mod matcher;
mod store;

use std::collections::BTreeSet;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

pub use matcher::{MatchResult, NoMatchReason, SubscriptionMatch, SubscriptionMatcher};
pub use store::SubscriptionStore;

use crate::services::parser::MediaKind;
use crate::services::resolver::EpisodeSet;
use crate::services::rules::FilterArgs;

/// Season value that lets a fuzzy TV subscription take any season
pub const ANY_SEASON: u32 = 0;

/// A movie or TV subscription
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    pub id: String,
    pub kind: MediaKind,
    /// Exact title, or the regex / substring for fuzzy subscriptions
    pub title: String,
    pub year: Option<String>,
    pub catalog_id: Option<u64>,
    /// TV only
    pub season: Option<u32>,
    pub fuzzy_match: bool,
    /// Sites this subscription accepts releases from; empty means all
    pub site_allowlist: BTreeSet<String>,
    /// Sites to actively search, when searching is wired up
    pub search_sites: Vec<String>,
    pub is_upgrade_mode: bool,
    pub filter_rule_group_id: Option<String>,
    pub filters: FilterArgs,
    pub total_episode_count: Option<u32>,
    /// First episode of interest when the missing set is derived from the total
    pub start_episode: Option<u32>,
    /// Episodes still wanted, once recorded. `None` until the first acceptance.
    pub recorded_missing: Option<BTreeSet<u32>>,
    /// Upgrade mode: score of the best release accepted so far
    pub best_accepted_score: Option<i32>,
    /// Holdings were unknown when an episode was accepted
    pub indeterminate: bool,
}

impl Subscription {
    pub fn is_tv(&self) -> bool {
        self.kind == MediaKind::Tv
    }

    /// Target season, defaulting to 1 for TV
    pub fn target_season(&self) -> u32 {
        self.season.filter(|s| *s != ANY_SEASON).unwrap_or(1)
    }

    /// `S02`, or `None` when any season is acceptable
    pub fn season_string(&self) -> Option<String> {
        self.season
            .filter(|s| *s != ANY_SEASON)
            .map(|s| format!("S{s:02}"))
    }

    /// Episodes this subscription still wants, before consulting the library
    pub fn wanted_episodes(&self) -> EpisodeSet {
        if let Some(recorded) = &self.recorded_missing {
            return EpisodeSet::Only(recorded.clone());
        }
        match self.total_episode_count {
            Some(total) => {
                let start = self.start_episode.unwrap_or(1).max(1);
                EpisodeSet::Only((start..=total).collect())
            }
            None => EpisodeSet::All,
        }
    }

    /// Case-insensitive regex search of the fuzzy pattern; falls back to a
    /// substring search when the title isn't a valid regex
    pub fn fuzzy_matches(&self, text: &str) -> bool {
        let pattern = self.title.trim();
        if pattern.is_empty() {
            return false;
        }
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(text),
            Err(_) => text.to_lowercase().contains(&pattern.to_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wanted_episodes() {
        let mut sub = Subscription {
            kind: MediaKind::Tv,
            total_episode_count: Some(6),
            start_episode: Some(3),
            ..Default::default()
        };
        assert_eq!(sub.wanted_episodes(), EpisodeSet::Only(BTreeSet::from([3, 4, 5, 6])));

        sub.recorded_missing = Some(BTreeSet::from([6]));
        assert_eq!(sub.wanted_episodes(), EpisodeSet::Only(BTreeSet::from([6])));

        let unknown = Subscription {
            kind: MediaKind::Tv,
            ..Default::default()
        };
        assert_eq!(unknown.wanted_episodes(), EpisodeSet::All);
    }

    #[test]
    fn test_fuzzy_matches() {
        let sub = Subscription {
            title: "mandalorian.*2160p".to_string(),
            fuzzy_match: true,
            ..Default::default()
        };
        assert!(sub.fuzzy_matches("The.Mandalorian.S03E01.2160p.WEB-DL"));
        assert!(!sub.fuzzy_matches("The.Mandalorian.S03E01.1080p.WEB-DL"));

        let literal = Subscription {
            title: "C++ (".to_string(),
            ..Default::default()
        };
        assert!(literal.fuzzy_matches("learning c++ (2020)"));
    }

    #[test]
    fn test_season_string() {
        let sub = Subscription {
            season: Some(2),
            ..Default::default()
        };
        assert_eq!(sub.season_string().as_deref(), Some("S02"));
        let any = Subscription {
            season: Some(ANY_SEASON),
            ..Default::default()
        };
        assert_eq!(any.season_string(), None);
        assert_eq!(any.target_season(), 1);
    }
}

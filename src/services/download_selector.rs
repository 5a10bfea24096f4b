//! Picks which accepted releases of a batch actually get downloaded
//!
//! Several sites often carry the same release, and one scan can accept more
//! than one release for the same subscription. Selection orders the accepted
//! set best-first, drops duplicates, and then lets each subscription take
//! only what it still needs.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::services::candidate::ResolvedCandidate;
use crate::services::subscriptions::SubscriptionMatch;

/// A candidate together with the subscription it satisfied
#[derive(Debug, Clone)]
pub struct AcceptedRelease {
    pub candidate: ResolvedCandidate,
    pub matched: SubscriptionMatch,
}

impl AcceptedRelease {
    fn sort_key(&self) -> (i32, i32, u32, usize, usize) {
        let parsed = &self.candidate.parsed;
        (
            self.candidate.site_priority_order,
            self.matched.final_score,
            self.candidate.seeders,
            parsed.season_list.len(),
            parsed.episode_list.len(),
        )
    }

    fn dedup_key(&self) -> String {
        format!(
            "{}{}",
            self.candidate.display_title().to_lowercase(),
            self.candidate.parsed.season_episode_string()
        )
    }
}

/// What a TV subscription has taken so far in this batch
#[derive(Default)]
struct TakenEpisodes {
    whole_season: bool,
    episodes: BTreeSet<u32>,
}

impl TakenEpisodes {
    fn wants(&self, episodes: &[u32]) -> bool {
        if self.whole_season {
            return false;
        }
        if episodes.is_empty() {
            // A season pack only when nothing else was taken
            return self.episodes.is_empty();
        }
        episodes.iter().any(|e| !self.episodes.contains(e))
    }

    fn take(&mut self, episodes: &[u32]) {
        if episodes.is_empty() {
            self.whole_season = true;
        }
        self.episodes.extend(episodes.iter().copied());
    }
}

/// Order, dedupe and pick downloads from the accepted releases of one scan.
///
/// - Movies take their best candidate.
/// - TV takes candidates that still add missing episodes.
/// - Upgrade subscriptions take their single best.
/// - Fuzzy subscriptions take everything that survives deduplication.
pub fn select_downloads(mut accepted: Vec<AcceptedRelease>) -> Vec<AcceptedRelease> {
    accepted.sort_by_key(|a| Reverse(a.sort_key()));

    let mut seen_enclosures = HashSet::new();
    let mut seen_titles = HashSet::new();
    let mut single_taken = HashSet::new();
    let mut tv_taken: HashMap<String, TakenEpisodes> = HashMap::new();
    let mut selected = Vec::new();

    for release in accepted {
        let enclosure = release.candidate.enclosure_url.clone();
        if !enclosure.is_empty() && seen_enclosures.contains(&enclosure) {
            continue;
        }
        let title_key = release.dedup_key();
        if seen_titles.contains(&title_key) {
            continue;
        }

        let matched = &release.matched;
        let id = matched.subscription_id.clone();
        let take = if matched.fuzzy {
            true
        } else if matched.is_upgrade || matched.season_gap.is_none() {
            single_taken.insert(id)
        } else {
            let episodes = &release.candidate.parsed.episode_list;
            let taken = tv_taken.entry(id).or_default();
            let wants = taken.wants(episodes);
            if wants {
                taken.take(episodes);
            }
            wants
        };

        if take {
            seen_enclosures.insert(enclosure);
            seen_titles.insert(title_key);
            selected.push(release);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser::parse_release;
    use crate::services::resolver::EpisodeSet;
    use pretty_assertions::assert_eq;

    fn accepted(title: &str, sub: &str, site_order: i32, score: i32, tv: bool) -> AcceptedRelease {
        AcceptedRelease {
            candidate: ResolvedCandidate {
                parsed: parse_release(title, None),
                site_priority_order: site_order,
                enclosure_url: format!("https://site{site_order}/{title}"),
                ..Default::default()
            },
            matched: SubscriptionMatch {
                subscription_id: sub.to_string(),
                is_upgrade: false,
                fuzzy: false,
                final_score: score,
                rule_group: None,
                season_gap: tv.then(|| (1, EpisodeSet::All)),
                indeterminate: false,
            },
        }
    }

    fn titles(selected: &[AcceptedRelease]) -> Vec<String> {
        selected
            .iter()
            .map(|a| a.candidate.parsed.raw_title.clone())
            .collect()
    }

    #[test]
    fn test_movie_takes_best_candidate() {
        let selected = select_downloads(vec![
            accepted("Movie.2020.720p.WEB-DL", "m", 1, 97, false),
            accepted("Movie.2020.2160p.BluRay", "m", 1, 99, false),
            accepted("Movie.2020.1080p.BluRay", "m", 2, 98, false),
        ]);
        // Site order outranks rule score
        assert_eq!(titles(&selected), vec!["Movie.2020.1080p.BluRay".to_string()]);
    }

    #[test]
    fn test_tv_takes_each_missing_episode_once() {
        let selected = select_downloads(vec![
            accepted("Show.S01E01.1080p.WEB-DL", "t", 1, 98, true),
            accepted("Show.S01E01.2160p.WEB-DL", "t", 1, 99, true),
            accepted("Show.S01E02.1080p.WEB-DL", "t", 1, 98, true),
        ]);
        assert_eq!(
            titles(&selected),
            vec![
                "Show.S01E01.2160p.WEB-DL".to_string(),
                "Show.S01E02.1080p.WEB-DL".to_string(),
            ]
        );
    }

    #[test]
    fn test_duplicate_enclosures_are_dropped() {
        let mut first = accepted("Fuzzy.Thing.1080p", "f", 1, 0, false);
        first.matched.fuzzy = true;
        let mut second = first.clone();
        second.matched.subscription_id = "g".to_string();
        let selected = select_downloads(vec![first, second]);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_upgrade_takes_single_best() {
        let mut low = accepted("Movie.2020.1080p.BluRay", "u", 1, 95, false);
        low.matched.is_upgrade = true;
        let mut high = accepted("Movie.2020.2160p.BluRay", "u", 1, 99, false);
        high.matched.is_upgrade = true;
        let selected = select_downloads(vec![low, high]);
        assert_eq!(titles(&selected), vec!["Movie.2020.2160p.BluRay".to_string()]);
    }
}

use std::sync::Arc;

use tracing::{debug, warn};

use super::Subscription;
use crate::services::candidate::ResolvedCandidate;
use crate::services::library::{HoldingQuery, LibraryHoldings};
use crate::services::parser::MediaKind;
use crate::services::resolver::{EpisodeSet, SeasonGaps, intersect_season_gaps};
use crate::services::rules::{FilterReject, RuleEngine, RuleError};
use crate::services::text_utils::titles_equal;

/// An accepted release
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionMatch {
    pub subscription_id: String,
    pub is_upgrade: bool,
    pub fuzzy: bool,
    /// `100 - rank` of the rule clause that matched, 0 without one
    pub final_score: i32,
    pub rule_group: Option<String>,
    /// TV only: season and the episodes still missing once this release lands
    pub season_gap: Option<(u32, EpisodeSet)>,
    /// The library could not say what is held
    pub indeterminate: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NoMatchReason {
    NoSubscription,
    RuleGate { group: Option<String> },
    Filter(FilterReject),
    AlreadyHeld,
    NotMissing,
    IncompleteUpgrade,
    NotBetter { score: i32, best: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    NoMatch(NoMatchReason),
    Matched(SubscriptionMatch),
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

pub struct SubscriptionMatcher {
    rules: Arc<RuleEngine>,
    library: Arc<dyn LibraryHoldings>,
    year_tolerance: i32,
}

impl SubscriptionMatcher {
    pub fn new(rules: Arc<RuleEngine>, library: Arc<dyn LibraryHoldings>) -> Self {
        Self {
            rules,
            library,
            year_tolerance: 1,
        }
    }

    pub fn with_year_tolerance(mut self, year_tolerance: i32) -> Self {
        self.year_tolerance = year_tolerance;
        self
    }

    /// Match one candidate against the subscriptions, first registered first.
    ///
    /// `site_rule_group` is the rule group of the site the release came from,
    /// used when the subscription has none of its own. A malformed filter on
    /// the chosen subscription is an error for this candidate only.
    pub async fn match_candidate(
        &self,
        candidate: &ResolvedCandidate,
        site_rule_group: Option<&str>,
        movie_subs: &[Subscription],
        tv_subs: &[Subscription],
    ) -> Result<MatchResult, RuleError> {
        let kind = candidate
            .record
            .as_ref()
            .map(|r| r.media_kind)
            .unwrap_or(candidate.parsed.media_kind);
        let pools: Vec<&[Subscription]> = match kind {
            MediaKind::Movie => vec![movie_subs],
            MediaKind::Tv => vec![tv_subs],
            MediaKind::Unknown => vec![movie_subs, tv_subs],
        };

        let Some(subscription) = pools
            .into_iter()
            .flatten()
            .filter(|sub| self.in_site_scope(sub, candidate))
            .find(|sub| self.identity_matches(sub, candidate))
        else {
            return Ok(MatchResult::NoMatch(NoMatchReason::NoSubscription));
        };

        debug!(
            title = %candidate.parsed.raw_title,
            subscription = %subscription.id,
            fuzzy = subscription.fuzzy_match,
            "Candidate matched subscription identity"
        );

        // Rule gate
        let group = subscription
            .filter_rule_group_id
            .as_deref()
            .or(site_rule_group);
        let verdict = self.rules.check_rules(candidate, group);
        if !verdict.matched {
            return Ok(MatchResult::NoMatch(NoMatchReason::RuleGate {
                group: verdict.group_name,
            }));
        }
        let filter = subscription.filters.compile()?;
        if let Err(reject) = filter.check(candidate) {
            return Ok(MatchResult::NoMatch(NoMatchReason::Filter(reject)));
        }

        let mut accepted = SubscriptionMatch {
            subscription_id: subscription.id.clone(),
            is_upgrade: false,
            fuzzy: subscription.fuzzy_match,
            final_score: verdict.final_score(),
            rule_group: verdict.group_name,
            season_gap: None,
            indeterminate: false,
        };

        if subscription.fuzzy_match {
            return Ok(MatchResult::Matched(accepted));
        }
        if subscription.is_upgrade_mode {
            return Ok(self.check_upgrade(subscription, candidate, accepted));
        }
        if subscription.is_tv() {
            return Ok(self.check_missing_episodes(subscription, candidate, accepted).await);
        }

        let held = self
            .library
            .has_movie(HoldingQuery {
                title: &subscription.title,
                year: subscription.year.as_deref(),
                catalog_id: candidate.record.as_ref().map(|r| r.catalog_id),
            })
            .await;
        match held {
            Some(true) => return Ok(MatchResult::NoMatch(NoMatchReason::AlreadyHeld)),
            Some(false) => {}
            None => {
                warn!(
                    subscription = %subscription.id,
                    title = %subscription.title,
                    "Library holdings unknown, accepting movie"
                );
                accepted.indeterminate = true;
            }
        }
        Ok(MatchResult::Matched(accepted))
    }

    fn in_site_scope(&self, sub: &Subscription, candidate: &ResolvedCandidate) -> bool {
        sub.site_allowlist.is_empty() || sub.site_allowlist.contains(&candidate.site_identity)
    }

    fn identity_matches(&self, sub: &Subscription, candidate: &ResolvedCandidate) -> bool {
        let parsed = &candidate.parsed;

        if sub.fuzzy_match {
            let text = format!(
                "{} {} {}",
                candidate.full_text(),
                parsed.name(),
                parsed.year.as_deref().unwrap_or("")
            );
            if !sub.fuzzy_matches(&text) {
                return false;
            }
            return match (sub.is_tv(), sub.season_string()) {
                (true, Some(season)) => parsed.season_string() == season,
                _ => true,
            };
        }

        // Exact identity needs a catalog record
        let Some(record) = &candidate.record else {
            return false;
        };
        if record.media_kind != sub.kind {
            return false;
        }

        if let Some(catalog_id) = sub.catalog_id {
            if record.catalog_id != catalog_id {
                return false;
            }
        } else {
            let name_ok = titles_equal(&sub.title, &record.title)
                || record
                    .original_title
                    .as_deref()
                    .is_some_and(|t| titles_equal(&sub.title, t));
            if !name_ok {
                return false;
            }
            if let Some(year) = sub.year.as_deref().filter(|y| !y.is_empty()) {
                let candidate_year = candidate.year();
                let year_ok = match sub.kind {
                    MediaKind::Tv => candidate_year == Some(year),
                    _ => years_within(year, candidate_year, self.year_tolerance),
                };
                if !year_ok {
                    return false;
                }
            }
        }

        match (sub.is_tv(), sub.season_string()) {
            (true, Some(season)) => parsed.season_string() == season,
            _ => true,
        }
    }

    fn check_upgrade(
        &self,
        sub: &Subscription,
        candidate: &ResolvedCandidate,
        mut accepted: SubscriptionMatch,
    ) -> MatchResult {
        // A partial season can't replace a whole one
        if sub.is_tv() && !candidate.parsed.episode_list.is_empty() {
            return MatchResult::NoMatch(NoMatchReason::IncompleteUpgrade);
        }
        if let Some(best) = sub.best_accepted_score
            && accepted.final_score <= best
        {
            debug!(
                subscription = %sub.id,
                score = accepted.final_score,
                best,
                "Upgrade candidate is not better"
            );
            return MatchResult::NoMatch(NoMatchReason::NotBetter {
                score: accepted.final_score,
                best,
            });
        }
        accepted.is_upgrade = true;
        MatchResult::Matched(accepted)
    }

    async fn check_missing_episodes(
        &self,
        sub: &Subscription,
        candidate: &ResolvedCandidate,
        mut accepted: SubscriptionMatch,
    ) -> MatchResult {
        let season = sub.target_season();
        let wanted = sub.wanted_episodes();
        if wanted.is_empty() {
            return MatchResult::NoMatch(NoMatchReason::AlreadyHeld);
        }

        let library_missing = self
            .library
            .get_missing_episodes(
                HoldingQuery {
                    title: &sub.title,
                    year: sub.year.as_deref(),
                    catalog_id: candidate.record.as_ref().map(|r| r.catalog_id),
                },
                season,
                sub.total_episode_count,
            )
            .await;
        let library_missing = match library_missing {
            Some(missing) if missing.is_empty() => {
                return MatchResult::NoMatch(NoMatchReason::AlreadyHeld);
            }
            Some(missing) => EpisodeSet::Only(missing),
            None => {
                accepted.indeterminate = true;
                EpisodeSet::All
            }
        };

        let target: SeasonGaps = [(season, wanted)].into();
        let source: SeasonGaps = [(season, library_missing)].into();
        let missing = intersect_season_gaps(&target, &source)
            .remove(&season)
            .unwrap_or(EpisodeSet::All);

        let episodes = &candidate.parsed.episode_list;
        if !missing.overlaps(episodes) {
            debug!(
                subscription = %sub.id,
                episodes = ?episodes,
                missing = ?missing,
                "Episodes already held"
            );
            return MatchResult::NoMatch(NoMatchReason::NotMissing);
        }

        accepted.season_gap = Some((season, missing.without(episodes)));
        MatchResult::Matched(accepted)
    }
}

fn years_within(wanted: &str, actual: Option<&str>, tolerance: i32) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match (wanted.parse::<i32>(), actual.parse::<i32>()) {
        (Ok(w), Ok(a)) => (w - a).abs() <= tolerance,
        _ => wanted == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::CatalogRecord;
    use crate::services::library::{HoldingsSnapshot, StaticLibrary};
    use crate::services::parser::parse_release;
    use crate::services::rules::{RuleBook, RuleClause, RuleGroup};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    struct FixedLibrary {
        movie_held: Option<bool>,
        missing: Option<BTreeSet<u32>>,
    }

    #[async_trait]
    impl LibraryHoldings for FixedLibrary {
        async fn has_movie(&self, _query: HoldingQuery<'_>) -> Option<bool> {
            self.movie_held
        }

        async fn get_missing_episodes(
            &self,
            _query: HoldingQuery<'_>,
            _season: u32,
            _total: Option<u32>,
        ) -> Option<BTreeSet<u32>> {
            self.missing.clone()
        }
    }

    fn matcher_with(library: impl LibraryHoldings + 'static, groups: Vec<RuleGroup>) -> SubscriptionMatcher {
        let book = RuleBook::new(&groups, None).unwrap();
        SubscriptionMatcher::new(Arc::new(RuleEngine::new(book)), Arc::new(library))
    }

    fn empty_matcher() -> SubscriptionMatcher {
        matcher_with(StaticLibrary::new(HoldingsSnapshot::default()), Vec::new())
    }

    fn resolved(title: &str, record: CatalogRecord) -> ResolvedCandidate {
        ResolvedCandidate {
            parsed: parse_release(title, None),
            record: Some(record),
            site_identity: "site-a".to_string(),
            ..Default::default()
        }
    }

    fn movie_record(id: u64, title: &str, date: &str) -> CatalogRecord {
        CatalogRecord {
            catalog_id: id,
            media_kind: MediaKind::Movie,
            title: title.to_string(),
            release_date: Some(date.to_string()),
            ..Default::default()
        }
    }

    fn movie_sub(id: &str, title: &str, year: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            kind: MediaKind::Movie,
            title: title.to_string(),
            year: Some(year.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_movie_by_name_and_year() {
        let matcher = empty_matcher();
        let candidate = resolved(
            "Interstellar.2014.1080p.BluRay.x264-GROUP",
            movie_record(157336, "Interstellar", "2014-11-05"),
        );

        let result = matcher
            .match_candidate(&candidate, None, &[movie_sub("m1", "Interstellar", "2015")], &[])
            .await
            .unwrap();
        assert_matches!(result, MatchResult::Matched(m) if m.subscription_id == "m1" && !m.is_upgrade);

        let result = matcher
            .match_candidate(&candidate, None, &[movie_sub("m1", "Interstellar", "2016")], &[])
            .await
            .unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::NoSubscription));
    }

    #[tokio::test]
    async fn test_site_allowlist() {
        let matcher = empty_matcher();
        let candidate = resolved(
            "Interstellar.2014.1080p",
            movie_record(157336, "Interstellar", "2014-11-05"),
        );
        let mut sub = movie_sub("m1", "Interstellar", "2014");
        sub.site_allowlist = BTreeSet::from(["site-b".to_string()]);

        let result = matcher
            .match_candidate(&candidate, None, &[sub], &[])
            .await
            .unwrap();
        assert!(!result.is_match());
    }

    #[tokio::test]
    async fn test_movie_already_held() {
        let matcher = matcher_with(
            FixedLibrary {
                movie_held: Some(true),
                missing: None,
            },
            Vec::new(),
        );
        let candidate = resolved(
            "Interstellar.2014.1080p",
            movie_record(157336, "Interstellar", "2014-11-05"),
        );
        let result = matcher
            .match_candidate(&candidate, None, &[movie_sub("m1", "Interstellar", "2014")], &[])
            .await
            .unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::AlreadyHeld));
    }

    #[tokio::test]
    async fn test_movie_unknown_holdings_is_indeterminate() {
        let matcher = matcher_with(
            FixedLibrary {
                movie_held: None,
                missing: None,
            },
            Vec::new(),
        );
        let candidate = resolved(
            "Interstellar.2014.1080p",
            movie_record(157336, "Interstellar", "2014-11-05"),
        );
        let result = matcher
            .match_candidate(&candidate, None, &[movie_sub("m1", "Interstellar", "2014")], &[])
            .await
            .unwrap();
        assert_matches!(result, MatchResult::Matched(m) if m.indeterminate && m.subscription_id == "m1");
    }

    #[tokio::test]
    async fn test_fuzzy_first_registered_wins() {
        let matcher = empty_matcher();
        let candidate = ResolvedCandidate {
            parsed: parse_release("Some.Obscure.Concert.2021.1080p.WEB-DL", None),
            ..Default::default()
        };
        let first = Subscription {
            id: "first".to_string(),
            kind: MediaKind::Movie,
            title: "obscure concert".to_string(),
            fuzzy_match: true,
            ..Default::default()
        };
        let second = Subscription {
            id: "second".to_string(),
            title: "Concert".to_string(),
            ..first.clone()
        };

        let result = matcher
            .match_candidate(&candidate, None, &[first, second], &[])
            .await
            .unwrap();
        assert_matches!(result, MatchResult::Matched(m) if m.subscription_id == "first" && m.fuzzy);
    }

    #[tokio::test]
    async fn test_rule_gate_is_a_hard_reject() {
        let group = RuleGroup {
            id: "uhd".to_string(),
            name: "uhd only".to_string(),
            clauses: vec![RuleClause {
                name: "4k".to_string(),
                quality_pattern: Some("2160p|4K".to_string()),
                priority_rank: 1,
                ..Default::default()
            }],
        };
        let matcher = matcher_with(StaticLibrary::new(HoldingsSnapshot::default()), vec![group]);
        let candidate = resolved(
            "Interstellar.2014.1080p",
            movie_record(157336, "Interstellar", "2014-11-05"),
        );
        let mut sub = movie_sub("m1", "Interstellar", "2014");
        sub.filter_rule_group_id = Some("uhd".to_string());
        let fallback = movie_sub("m2", "Interstellar", "2014");

        let result = matcher
            .match_candidate(&candidate, None, &[sub, fallback], &[])
            .await
            .unwrap();
        assert_matches!(result, MatchResult::NoMatch(NoMatchReason::RuleGate { .. }));
    }

    #[tokio::test]
    async fn test_malformed_filter_is_an_error() {
        let matcher = empty_matcher();
        let candidate = resolved(
            "Interstellar.2014.1080p",
            movie_record(157336, "Interstellar", "2014-11-05"),
        );
        let mut sub = movie_sub("m1", "Interstellar", "2014");
        sub.filters.include = Some("(".to_string());

        assert!(
            matcher
                .match_candidate(&candidate, None, &[sub], &[])
                .await
                .is_err()
        );
    }

    fn tv_record() -> CatalogRecord {
        CatalogRecord {
            catalog_id: 90001,
            media_kind: MediaKind::Tv,
            title: "某剧".to_string(),
            release_date: Some("2020-01-01".to_string()),
            ..Default::default()
        }
    }

    fn tv_sub() -> Subscription {
        Subscription {
            id: "t1".to_string(),
            kind: MediaKind::Tv,
            title: "某剧".to_string(),
            season: Some(2),
            total_episode_count: Some(8),
            recorded_missing: Some(BTreeSet::from([3, 4, 5, 6])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tv_missing_intersection() {
        let matcher = matcher_with(
            FixedLibrary {
                movie_held: None,
                missing: Some(BTreeSet::from([5, 6, 7])),
            },
            Vec::new(),
        );
        let candidate = resolved("某剧.S02E05.1080p", tv_record());

        let result = matcher
            .match_candidate(&candidate, None, &[], &[tv_sub()])
            .await
            .unwrap();
        let MatchResult::Matched(accepted) = result else {
            panic!("expected a match, got {result:?}");
        };
        assert_eq!(
            accepted.season_gap,
            Some((2, EpisodeSet::Only(BTreeSet::from([6]))))
        );

        // Once the remaining set is recorded, the same episode no longer matches
        let mut sub = tv_sub();
        sub.recorded_missing = Some(BTreeSet::from([6]));
        let again = matcher
            .match_candidate(&candidate, None, &[], &[sub])
            .await
            .unwrap();
        assert_eq!(again, MatchResult::NoMatch(NoMatchReason::NotMissing));
    }

    #[tokio::test]
    async fn test_tv_wrong_season() {
        let matcher = empty_matcher();
        let candidate = resolved("某剧.S03E05.1080p", tv_record());
        let result = matcher
            .match_candidate(&candidate, None, &[], &[tv_sub()])
            .await
            .unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::NoSubscription));
    }

    #[tokio::test]
    async fn test_tv_indeterminate_holdings() {
        let matcher = matcher_with(
            FixedLibrary {
                movie_held: None,
                missing: None,
            },
            Vec::new(),
        );
        let candidate = resolved("某剧.S02E05.1080p", tv_record());
        let result = matcher
            .match_candidate(&candidate, None, &[], &[tv_sub()])
            .await
            .unwrap();
        assert_matches!(result, MatchResult::Matched(m) if m.indeterminate);
    }

    #[tokio::test]
    async fn test_upgrade_mode() {
        let group = RuleGroup {
            id: "g".to_string(),
            name: "ranked".to_string(),
            clauses: vec![
                RuleClause {
                    name: "uhd".to_string(),
                    quality_pattern: Some("2160p".to_string()),
                    priority_rank: 5,
                    ..Default::default()
                },
                RuleClause {
                    name: "hd".to_string(),
                    quality_pattern: Some("720p".to_string()),
                    priority_rank: 15,
                    ..Default::default()
                },
            ],
        };
        let matcher = matcher_with(StaticLibrary::new(HoldingsSnapshot::default()), vec![group]);
        let mut sub = movie_sub("u1", "Interstellar", "2014");
        sub.is_upgrade_mode = true;
        sub.filter_rule_group_id = Some("g".to_string());
        sub.best_accepted_score = Some(90);

        let worse = resolved("Interstellar.2014.720p.WEB-DL", movie_record(157336, "Interstellar", "2014-11-05"));
        let result = matcher
            .match_candidate(&worse, None, &[sub.clone()], &[])
            .await
            .unwrap();
        assert_eq!(
            result,
            MatchResult::NoMatch(NoMatchReason::NotBetter { score: 85, best: 90 })
        );

        let better = resolved("Interstellar.2014.2160p.WEB-DL", movie_record(157336, "Interstellar", "2014-11-05"));
        let result = matcher
            .match_candidate(&better, None, &[sub], &[])
            .await
            .unwrap();
        assert_matches!(result, MatchResult::Matched(m) if m.is_upgrade && m.final_score == 95);
    }

    #[tokio::test]
    async fn test_upgrade_rejects_partial_season() {
        let matcher = empty_matcher();
        let mut sub = tv_sub();
        sub.is_upgrade_mode = true;
        let candidate = resolved("某剧.S02E05.1080p", tv_record());
        let result = matcher
            .match_candidate(&candidate, None, &[], &[sub])
            .await
            .unwrap();
        assert_eq!(result, MatchResult::NoMatch(NoMatchReason::IncompleteUpgrade));
    }

    #[test]
    fn test_years_within() {
        assert!(years_within("2014", Some("2015"), 1));
        assert!(!years_within("2014", Some("2016"), 1));
        assert!(!years_within("2014", None, 1));
    }
}

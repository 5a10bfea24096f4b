//! Rule groups and the ad hoc release filter
//!
//! A [`RuleBook`] holds the user's rule groups compiled once at startup. The
//! [`RuleEngine`] evaluates a candidate against one group and returns whether
//! it passed plus a tie-break rank taken from the first clause that matched.
//! The [`AdvancedFilter`] is a separate gate built from per-subscription
//! restype/pix/team/promotion/keyword arguments; callers apply both.

mod filter;

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use filter::{AdvancedFilter, FilterArgs, FilterReject, PIX_PRESETS, RESTYPE_PRESETS};

use crate::services::candidate::ResolvedCandidate;
use crate::services::parser::MediaKind;

/// Ranks are stored "lower is better" and inverted against this base
pub const RANK_INVERSION_BASE: i32 = 100;

/// Group id that disables rule filtering
pub const NO_FILTER_GROUP: &str = "-1";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {rule:?}: invalid pattern {pattern:?}: {source}")]
    Pattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {rule:?}: invalid size range {value:?}")]
    SizeRange { rule: String, value: String },

    #[error("rule {rule:?}: invalid promotion expression {value:?}")]
    Promotion { rule: String, value: String },

    #[error("duplicate rule group id {0:?}")]
    DuplicateGroup(String),

    #[error("default rule group {0:?} does not exist")]
    UnknownDefault(String),
}

/// One clause of a rule group, as stored in the plan file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleClause {
    pub name: String,
    /// Searched in the parsed resolution
    pub resolution_pattern: Option<String>,
    /// Searched in the quality string (type, effect, resolution)
    pub quality_pattern: Option<String>,
    /// Searched in the release group
    pub team_pattern: Option<String>,
    /// Every pattern must match title + subtitle
    pub include: Vec<String>,
    /// No pattern may match title + subtitle: a single matching pattern rejects
    pub exclude: Vec<String>,
    /// GiB range, `"max"` or `"min,max"`; an empty bound is open
    pub size: Option<String>,
    /// `"<min upload factor> <max download factor>"`, e.g. `"1.0 0"`
    pub promotion: Option<String>,
    /// Lower wins
    pub priority_rank: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub clauses: Vec<RuleClause>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SizeRange {
    min_gib: f64,
    max_gib: Option<f64>,
}

impl SizeRange {
    fn parse(rule: &str, value: &str) -> Result<Self, RuleError> {
        let invalid = || RuleError::SizeRange {
            rule: rule.to_string(),
            value: value.to_string(),
        };
        let bound = |s: &str| -> Result<Option<f64>, RuleError> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                s.parse::<f64>().map(Some).map_err(|_| invalid())
            }
        };
        let (min_gib, max_gib) = match value.split_once(',') {
            Some((min, max)) => (bound(min)?.unwrap_or(0.0), bound(max)?),
            None => (0.0, bound(value)?),
        };
        if max_gib.is_some_and(|max| max < min_gib) {
            return Err(invalid());
        }
        Ok(Self { min_gib, max_gib })
    }

    fn contains(&self, bytes: u64) -> bool {
        let gib = bytes as f64 / GIB;
        gib >= self.min_gib && self.max_gib.is_none_or(|max| gib <= max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PromotionLimit {
    min_upload: f64,
    max_download: f64,
}

impl PromotionLimit {
    fn parse(rule: &str, value: &str) -> Result<Self, RuleError> {
        let invalid = || RuleError::Promotion {
            rule: rule.to_string(),
            value: value.to_string(),
        };
        let mut parts = value.split_whitespace();
        let (Some(ul), Some(dl), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        Ok(Self {
            min_upload: ul.parse().map_err(|_| invalid())?,
            max_download: dl.parse().map_err(|_| invalid())?,
        })
    }

    fn allows(&self, upload: f64, download: f64) -> bool {
        upload >= self.min_upload && download <= self.max_download
    }
}

pub(crate) fn compile_pattern(rule: &str, pattern: &str) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern.trim())
        .case_insensitive(true)
        .build()
        .map_err(|source| RuleError::Pattern {
            rule: rule.to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

fn compile_optional(rule: &str, pattern: &Option<String>) -> Result<Option<Regex>, RuleError> {
    pattern
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(|p| compile_pattern(rule, p))
        .transpose()
}

fn compile_list(rule: &str, patterns: &[String]) -> Result<Vec<Regex>, RuleError> {
    patterns
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| compile_pattern(rule, p))
        .collect()
}

#[derive(Debug, Clone)]
struct CompiledClause {
    name: String,
    resolution: Option<Regex>,
    quality: Option<Regex>,
    team: Option<Regex>,
    include: Vec<Regex>,
    /// Rejects on any one match, not only when all of them match
    exclude: Vec<Regex>,
    size: Option<SizeRange>,
    promotion: Option<PromotionLimit>,
    priority_rank: i32,
}

impl CompiledClause {
    fn compile(clause: &RuleClause) -> Result<Self, RuleError> {
        let rule = clause.name.as_str();
        Ok(Self {
            name: clause.name.clone(),
            resolution: compile_optional(rule, &clause.resolution_pattern)?,
            quality: compile_optional(rule, &clause.quality_pattern)?,
            team: compile_optional(rule, &clause.team_pattern)?,
            include: compile_list(rule, &clause.include)?,
            exclude: compile_list(rule, &clause.exclude)?,
            size: clause
                .size
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| SizeRange::parse(rule, s))
                .transpose()?,
            promotion: clause
                .promotion
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(|s| PromotionLimit::parse(rule, s))
                .transpose()?,
            priority_rank: clause.priority_rank,
        })
    }

    fn matches(&self, candidate: &ResolvedCandidate) -> bool {
        let parsed = &candidate.parsed;

        // A pattern on an attribute the release doesn't have is a miss
        let attribute_matches = |pattern: &Option<Regex>, value: Option<&str>| match pattern {
            None => true,
            Some(re) => value.is_some_and(|v| re.is_match(v)),
        };
        let quality = parsed.quality_string();
        if !attribute_matches(&self.resolution, parsed.resolution.as_deref())
            || !attribute_matches(&self.quality, Some(quality.as_str()).filter(|q| !q.is_empty()))
            || !attribute_matches(&self.team, parsed.release_group.as_deref())
        {
            return false;
        }

        let text = candidate.full_text();
        if !self.include.iter().all(|re| re.is_match(&text)) {
            return false;
        }
        if self.exclude.iter().any(|re| re.is_match(&text)) {
            return false;
        }

        if let Some(size) = &self.size
            && candidate.size_bytes > 0
        {
            let bytes = match parsed.media_kind {
                MediaKind::Tv if parsed.episode_list.is_empty() => None,
                MediaKind::Tv => Some(candidate.size_per_episode()),
                _ => Some(candidate.size_bytes),
            };
            if bytes.is_some_and(|b| !size.contains(b)) {
                return false;
            }
        }

        if let Some(promotion) = &self.promotion
            && let (Some(ul), Some(dl)) = (candidate.upload_factor, candidate.download_factor)
            && !promotion.allows(ul, dl)
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone)]
struct CompiledGroup {
    name: String,
    clauses: Vec<CompiledClause>,
}

/// All rule groups, compiled and validated
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    groups: HashMap<String, CompiledGroup>,
    default_group: Option<String>,
}

impl RuleBook {
    /// Compile every group. Clauses are ordered by rank; equal ranks keep their stored order.
    pub fn new(groups: &[RuleGroup], default_group: Option<&str>) -> Result<Self, RuleError> {
        let mut compiled = HashMap::new();
        for group in groups {
            let mut clauses = group
                .clauses
                .iter()
                .map(CompiledClause::compile)
                .collect::<Result<Vec<_>, _>>()?;
            clauses.sort_by_key(|c| c.priority_rank);
            let entry = CompiledGroup {
                name: group.name.clone(),
                clauses,
            };
            if compiled.insert(group.id.clone(), entry).is_some() {
                return Err(RuleError::DuplicateGroup(group.id.clone()));
            }
        }

        let default_group = default_group.filter(|id| !id.is_empty()).map(str::to_string);
        if let Some(id) = &default_group
            && !compiled.contains_key(id)
        {
            return Err(RuleError::UnknownDefault(id.clone()));
        }
        Ok(Self {
            groups: compiled,
            default_group,
        })
    }

    pub fn default_group(&self) -> Option<&str> {
        self.default_group.as_deref()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Outcome of a rule-group check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleVerdict {
    pub matched: bool,
    /// Stored rank of the clause that matched; `None` when no clause was involved
    pub priority_rank: Option<i32>,
    pub group_name: Option<String>,
}

impl RuleVerdict {
    fn pass(group_name: Option<String>) -> Self {
        Self {
            matched: true,
            priority_rank: None,
            group_name,
        }
    }

    /// Bigger is better; a pass without a clause scores 0
    pub fn final_score(&self) -> i32 {
        self.priority_rank
            .map(|rank| RANK_INVERSION_BASE - rank)
            .unwrap_or(0)
    }
}

pub struct RuleEngine {
    book: RuleBook,
}

impl RuleEngine {
    pub fn new(book: RuleBook) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &RuleBook {
        &self.book
    }

    /// Evaluate `candidate` against a group, or the default group when `rule_group_id` is `None`.
    ///
    /// An unknown group id, a missing default and an empty group all pass
    /// without a rank.
    pub fn check_rules(
        &self,
        candidate: &ResolvedCandidate,
        rule_group_id: Option<&str>,
    ) -> RuleVerdict {
        let group_id = match rule_group_id.filter(|id| !id.is_empty()) {
            Some(NO_FILTER_GROUP) => return RuleVerdict::pass(Some("no-filter".to_string())),
            Some(id) => id,
            None => match self.book.default_group() {
                Some(id) => id,
                None => return RuleVerdict::pass(None),
            },
        };

        let Some(group) = self.book.groups.get(group_id) else {
            warn!(group_id = %group_id, "Rule group not found, not filtering");
            return RuleVerdict::pass(None);
        };

        if group.clauses.is_empty() {
            return RuleVerdict::pass(Some(group.name.clone()));
        }

        match group.clauses.iter().find(|clause| clause.matches(candidate)) {
            Some(clause) => {
                debug!(
                    title = %candidate.parsed.raw_title,
                    group = %group.name,
                    clause = %clause.name,
                    rank = clause.priority_rank,
                    "Rule clause matched"
                );
                RuleVerdict {
                    matched: true,
                    priority_rank: Some(clause.priority_rank),
                    group_name: Some(group.name.clone()),
                }
            }
            None => {
                debug!(
                    title = %candidate.parsed.raw_title,
                    group = %group.name,
                    size = candidate.size_bytes,
                    promotion = %candidate.promotion_label(),
                    "No rule clause matched"
                );
                RuleVerdict {
                    matched: false,
                    priority_rank: None,
                    group_name: Some(group.name.clone()),
                }
            }
        }
    }
}

//! Ad hoc filter arguments supplied per subscription or per search

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{RuleError, compile_pattern};
use crate::services::candidate::ResolvedCandidate;
use crate::services::parser::{build_group_regex, collect_groups};

/// Named resource-type presets. Other keys are used as raw patterns.
pub const RESTYPE_PRESETS: &[(&str, &str)] = &[
    ("BLURAY", r"Blu-?Ray|BD|BDRIP"),
    ("REMUX", r"REMUX"),
    ("DOLBY", r"DOLBY|DOVI|\s+DV$|\s+DV\s+"),
    ("WEB", r"WEB-?DL|WEBRIP"),
    ("HDTV", r"U?HDTV"),
    ("UHD", r"UHD"),
    ("HDR", r"HDR"),
    ("3D", r"3D"),
];

/// Named resolution presets. Other keys are used as raw patterns.
pub const PIX_PRESETS: &[(&str, &str)] = &[
    ("8k", r"8K"),
    ("4k", r"4K|2160P|X2160"),
    ("1080p", r"1080[PIX]|X1080"),
    ("720p", r"720P"),
];

const FACTOR_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterArgs {
    pub restype: Option<String>,
    pub pix: Option<String>,
    pub team: Option<String>,
    /// `"<ul> <dl>"`, each an exact factor or `*`
    pub sp_state: Option<String>,
    pub include: Option<String>,
    pub exclude: Option<String>,
    pub key: Option<String>,
    pub exclude_hit_and_run: bool,
}

impl FilterArgs {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn compile(&self) -> Result<AdvancedFilter, RuleError> {
        let team = compile_labelled("team", &self.team, None)?;
        let team_in_title = match &team {
            Some((label, _)) => Some(build_group_regex(label).map_err(|source| {
                RuleError::Pattern {
                    rule: "team".to_string(),
                    pattern: label.clone(),
                    source,
                }
            })?),
            None => None,
        };

        Ok(AdvancedFilter {
            restype: compile_labelled("restype", &self.restype, Some(RESTYPE_PRESETS))?,
            pix: compile_labelled("pix", &self.pix, Some(PIX_PRESETS))?,
            team,
            team_in_title,
            promotion: self
                .sp_state
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(PromotionState::parse)
                .transpose()?,
            include: compile_labelled("include", &self.include, None)?,
            exclude: compile_labelled("exclude", &self.exclude, None)?,
            key: compile_labelled("key", &self.key, None)?,
            exclude_hit_and_run: self.exclude_hit_and_run,
        })
    }
}

fn preset_pattern(presets: &[(&str, &str)], key: &str) -> String {
    presets
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, pattern)| pattern.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Compile one argument, keeping what the user wrote as its label
fn compile_labelled(
    kind: &str,
    value: &Option<String>,
    presets: Option<&[(&str, &str)]>,
) -> Result<Option<(String, Regex)>, RuleError> {
    let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let pattern = match presets {
        Some(presets) => preset_pattern(presets, value),
        None => value.to_string(),
    };
    compile_pattern(kind, &pattern).map(|re| Some((value.to_string(), re)))
}

/// Exact promotion factors to require; `None` is `*`
#[derive(Debug, Clone, Copy, PartialEq)]
struct PromotionState {
    upload: Option<f64>,
    download: Option<f64>,
}

impl PromotionState {
    fn parse(value: &str) -> Result<Self, RuleError> {
        let invalid = || RuleError::Promotion {
            rule: "sp_state".to_string(),
            value: value.to_string(),
        };
        let token = |t: &str| -> Result<Option<f64>, RuleError> {
            match t {
                "*" => Ok(None),
                t => t.parse().map(Some).map_err(|_| invalid()),
            }
        };
        let mut parts = value.split_whitespace();
        let (Some(ul), Some(dl), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        Ok(Self {
            upload: token(ul)?,
            download: token(dl)?,
        })
    }

    fn allows(&self, upload: Option<f64>, download: Option<f64>) -> bool {
        let factor_ok = |required: Option<f64>, actual: Option<f64>| match (required, actual) {
            (Some(required), Some(actual)) => (required - actual).abs() < FACTOR_EPSILON,
            _ => true,
        };
        factor_ok(self.upload, upload) && factor_ok(self.download, download)
    }
}

/// Why the ad hoc filter turned a release down
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterReject {
    #[error("resource type does not match {0}")]
    ResourceType(String),
    #[error("resolution does not match {0}")]
    Resolution(String),
    #[error("release group does not match {0}")]
    Team(String),
    #[error("promotion {0} not accepted")]
    Promotion(String),
    #[error("title does not include {0}")]
    Include(String),
    #[error("title contains excluded {0}")]
    Exclude(String),
    #[error("title does not match keyword {0}")]
    Keyword(String),
    #[error("hit-and-run release")]
    HitAndRun,
}

/// Compiled [`FilterArgs`]. Every supplied argument must pass.
#[derive(Debug, Clone, Default)]
pub struct AdvancedFilter {
    restype: Option<(String, Regex)>,
    pix: Option<(String, Regex)>,
    team: Option<(String, Regex)>,
    /// Group-table style matcher used when no group was parsed
    team_in_title: Option<Regex>,
    promotion: Option<PromotionState>,
    include: Option<(String, Regex)>,
    exclude: Option<(String, Regex)>,
    key: Option<(String, Regex)>,
    exclude_hit_and_run: bool,
}

impl AdvancedFilter {
    pub fn check(&self, candidate: &ResolvedCandidate) -> Result<(), FilterReject> {
        let parsed = &candidate.parsed;
        let raw = parsed.raw_title.as_str();

        if let Some((label, re)) = &self.restype {
            let edition: Vec<&str> = [&parsed.resource_type, &parsed.resource_effect]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect();
            if edition.is_empty() || !re.is_match(&edition.join(" ")) {
                return Err(FilterReject::ResourceType(label.clone()));
            }
        }

        if let Some((label, re)) = &self.pix
            && !parsed.resolution.as_deref().is_some_and(|r| re.is_match(r))
        {
            return Err(FilterReject::Resolution(label.clone()));
        }

        if let Some((label, re)) = &self.team {
            let ok = match parsed.release_group.as_deref() {
                Some(group) => re.is_match(group),
                None => self
                    .team_in_title
                    .as_ref()
                    .and_then(|title_re| collect_groups(title_re, raw))
                    .is_some(),
            };
            if !ok {
                return Err(FilterReject::Team(label.clone()));
            }
        }

        if let Some(promotion) = &self.promotion
            && !promotion.allows(candidate.upload_factor, candidate.download_factor)
        {
            return Err(FilterReject::Promotion(candidate.promotion_label()));
        }

        if let Some((label, re)) = &self.include
            && !re.is_match(raw)
        {
            return Err(FilterReject::Include(label.clone()));
        }
        if let Some((label, re)) = &self.exclude
            && re.is_match(raw)
        {
            return Err(FilterReject::Exclude(label.clone()));
        }
        if let Some((label, re)) = &self.key
            && !re.is_match(raw)
        {
            return Err(FilterReject::Keyword(label.clone()));
        }

        if self.exclude_hit_and_run && candidate.is_hit_and_run {
            return Err(FilterReject::HitAndRun);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::parser::parse_release;
    use assert_matches::assert_matches;

    fn candidate(title: &str) -> ResolvedCandidate {
        ResolvedCandidate {
            parsed: parse_release(title, None),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_args_pass_everything() {
        let filter = FilterArgs::default().compile().unwrap();
        assert!(FilterArgs::default().is_empty());
        assert_eq!(filter.check(&candidate("Anything.2020")), Ok(()));
    }

    #[test]
    fn test_presets() {
        let filter = FilterArgs {
            restype: Some("BLURAY".to_string()),
            pix: Some("4k".to_string()),
            ..Default::default()
        }
        .compile()
        .unwrap();

        assert_eq!(filter.check(&candidate("Movie.2020.2160p.BluRay.x265-GRP")), Ok(()));
        assert_matches!(
            filter.check(&candidate("Movie.2020.1080p.BluRay.x264-GRP")),
            Err(FilterReject::Resolution(_))
        );
        assert_matches!(
            filter.check(&candidate("Movie.2020.2160p.WEB-DL.x265-GRP")),
            Err(FilterReject::ResourceType(_))
        );
    }

    #[test]
    fn test_team_falls_back_to_title() {
        let filter = FilterArgs {
            team: Some("ZZTEAM".to_string()),
            ..Default::default()
        }
        .compile()
        .unwrap();

        assert_eq!(filter.check(&candidate("[ZZTEAM] Movie 2020 1080p")), Ok(()));
        assert_matches!(
            filter.check(&candidate("Movie.2020.1080p.BluRay-FRDS")),
            Err(FilterReject::Team(_))
        );
    }

    #[test]
    fn test_promotion_state() {
        let filter = FilterArgs {
            sp_state: Some("* 0".to_string()),
            ..Default::default()
        }
        .compile()
        .unwrap();

        let mut release = candidate("Movie.2020.1080p");
        release.upload_factor = Some(2.0);
        release.download_factor = Some(0.0);
        assert_eq!(filter.check(&release), Ok(()));

        release.download_factor = Some(0.5);
        assert_matches!(filter.check(&release), Err(FilterReject::Promotion(_)));

        assert!(
            FilterArgs {
                sp_state: Some("free".to_string()),
                ..Default::default()
            }
            .compile()
            .is_err()
        );
    }

    #[test]
    fn test_keywords_and_hit_and_run() {
        let filter = FilterArgs {
            include: Some("1080p".to_string()),
            exclude: Some("CAM".to_string()),
            exclude_hit_and_run: true,
            ..Default::default()
        }
        .compile()
        .unwrap();

        assert_eq!(filter.check(&candidate("Movie.2020.1080p.WEB-DL")), Ok(()));
        assert_matches!(
            filter.check(&candidate("Movie.2020.1080p.CAM")),
            Err(FilterReject::Exclude(_))
        );
        assert_matches!(
            filter.check(&candidate("Movie.2020.720p.WEB-DL")),
            Err(FilterReject::Include(_))
        );

        let mut release = candidate("Movie.2020.1080p.WEB-DL");
        release.is_hit_and_run = true;
        assert_eq!(filter.check(&release), Err(FilterReject::HitAndRun));
    }
}

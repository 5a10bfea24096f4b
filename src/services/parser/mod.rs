//! Release title parser
//!
//! Turns raw PT/RSS release titles into structured attributes. Handles
//! scene-style and Chinese-site titles like:
//! - "Interstellar.2014.1080p.BluRay.x264-GROUP"
//! - "Some.Show.S02E05.1080p.WEB-DL.x264-GROUP"
//! - "[ANi] 某剧 - 07 [1080P][Baha][WEB-DL]"
//! - "某剧 第二季 第5集 1080p" (with or without a separate subtitle line)
//!
//! Parsing never fails. A title with nothing usable comes back with an empty
//! `normalized_name`, which callers treat as "unidentifiable".

mod numerals;
mod release_groups;
mod scanner;
mod tokens;

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use numerals::parse_cn_number;
pub use release_groups::{build_group_regex, collect_groups, match_release_group};

use crate::services::text_utils::{collapse_whitespace, is_all_cjk};
use scanner::{MEDIA_EXTENSIONS, TitleScan};

/// Kind of media a release (or catalog record) describes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
    #[default]
    Unknown,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Tv => write!(f, "tv"),
            MediaKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Structured attributes extracted from one release title
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRelease {
    pub raw_title: String,
    pub raw_subtitle: Option<String>,
    /// Best-guess clean title; empty means the release could not be identified
    pub normalized_name: String,
    pub cn_name: Option<String>,
    pub en_name: Option<String>,
    pub media_kind: MediaKind,
    pub year: Option<String>,
    pub season_list: Vec<u32>,
    pub episode_list: Vec<u32>,
    /// `x集全` / `全x集` style whole-season packs
    pub is_complete_pack: bool,
    pub part: Option<String>,
    pub resource_type: Option<String>,
    pub resource_effect: Option<String>,
    pub resolution: Option<String>,
    pub video_encode: Option<String>,
    pub audio_encode: Option<String>,
    pub release_group: Option<String>,
    /// Words removed by the configured ignore list
    pub ignored_words: Vec<String>,
    /// `pattern@replacement` pairs that fired
    pub replaced_words: Vec<String>,
}

impl ParsedRelease {
    /// The display name: an all-Chinese name wins, then English, then any Chinese
    pub fn name(&self) -> &str {
        &self.normalized_name
    }

    pub fn is_identified(&self) -> bool {
        !self.normalized_name.is_empty()
    }

    /// `S02`, `S01-S03`, or empty for movies
    pub fn season_string(&self) -> String {
        match (self.season_list.first(), self.season_list.last()) {
            (Some(first), Some(last)) if first != last => format!("S{first:02}-S{last:02}"),
            (Some(first), _) => format!("S{first:02}"),
            _ => String::new(),
        }
    }

    /// `E05`, `E05-E07`, or empty
    pub fn episode_string(&self) -> String {
        match (self.episode_list.first(), self.episode_list.last()) {
            (Some(first), Some(last)) if first != last => format!("E{first:02}-E{last:02}"),
            (Some(first), _) => format!("E{first:02}"),
            _ => String::new(),
        }
    }

    /// `S02 E05`, or whichever half is present
    pub fn season_episode_string(&self) -> String {
        let season = self.season_string();
        let episode = self.episode_string();
        match (season.is_empty(), episode.is_empty()) {
            (false, false) => format!("{season} {episode}"),
            (false, true) => season,
            _ => episode,
        }
    }

    pub fn is_in_season(&self, season: u32) -> bool {
        self.season_list.contains(&season)
    }

    /// Resource type, effect and resolution joined with spaces (`BluRay HDR 2160p`)
    pub fn quality_string(&self) -> String {
        [&self.resource_type, &self.resource_effect, &self.resolution]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Configured word lists applied before tokenizing
#[derive(Debug, Clone, Default)]
pub struct ParserSettings {
    ignored: Option<Regex>,
    replaced: Vec<(Regex, String, String)>,
}

impl ParserSettings {
    /// Compile the ignored-word alternatives and `pattern -> replacement` pairs
    pub fn new(ignored: &[String], replaced: &[(String, String)]) -> Result<Self, regex::Error> {
        let ignored = ignored
            .iter()
            .filter(|w| !w.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>();
        let ignored = if ignored.is_empty() {
            None
        } else {
            Some(Regex::new(&ignored.join("|"))?)
        };
        let replaced = replaced
            .iter()
            .filter(|(pattern, _)| !pattern.trim().is_empty())
            .map(|(pattern, replacement)| {
                Regex::new(pattern).map(|re| (re, pattern.clone(), replacement.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ignored, replaced })
    }
}

static LEADING_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[.+?]").unwrap());
static YEAR_RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\s.]+)(\d{4})-(\d{4})").unwrap());
/// Sizes like `1.5GB` or `700 MiB`; the trailing group keeps `...GBR` style words intact
static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[0-9.]+\s*[MGT]i?B([^A-Za-z]|$)").unwrap());
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}[\s._-]\d{1,2}[\s._-]\d{1,2}").unwrap());
static HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9a-fA-F]{40}|[0-9a-fA-F]{32}|[A-Z2-7]{32})$").unwrap());
static DIY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"D[Ii]Y").unwrap());
static DIY_GROUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-D[Ii]Y@").unwrap());

static CN_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[全第季集话話期]").unwrap());
static CN_SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[第\s]+([0-9一二三四五六七八九十S\-]+)\s*季").unwrap());
static CN_SEASON_ALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)全\s*([0-9一二三四五六七八九十]+)\s*季|([0-9一二三四五六七八九十]+)\s*季全")
        .unwrap()
});
static CN_EPISODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[第\s]+([0-9一二三四五六七八九十EP\-]+)\s*[集话話期]").unwrap());
static CN_EPISODE_ALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)([0-9一二三四五六七八九十]+)\s*集全|全\s*([0-9一二三四五六七八九十]+)\s*[集话話期]",
    )
    .unwrap()
});

/// Broadcaster prefixes, season fragments and site boilerplate that never belong in a name
static NAME_NOISE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)^PTS|^JADE|^AOD|^CHC|^[A-Z]{1,4}TV[\-0-9UVHDK]*",
        r"|HBO$|\s+HBO|\d{1,2}th|\d{1,2}bit|NETFLIX|AMAZON|IMAX|^3D|\s+3D|^BBC\s+|\s+BBC|BBC$|DISNEY\+?|XXX|\s+DC$",
        r"|[第\s共]+[0-9一二三四五六七八九十\-\s]+季",
        r"|[第\s共]+[0-9一二三四五六七八九十\-\s]+[集话話]",
        r"|连载|日剧|美剧|电视剧|动画片|动漫|欧美|西德|日韩|超高清|高清|蓝光|翡翠台|梦幻天堂·龙网|★?\d*月?新番",
        r"|最终季|合集|[多中国英葡法俄日韩德意西印泰台港粤双文语简繁体特效内封官译外挂]+字幕|版本|出品|台版|港版|\w+字幕组",
        r"|未删减版|UNCUT$|UNRATE$|WITH EXTRAS$|RERIP$|SUBBED$|PROPER$|REPACK$|SEASON$|EPISODE$|Complete$|Extended$|Extended Version$",
        r"|S\d{2}\s*-\s*S\d{2}|S\d{2}|\s+S\d{1,2}|EP?\d{2,4}\s*-\s*EP?\d{2,4}|EP?\d{2,4}|\s+EP?\d{1,4}",
        r"|CD[\s.]*[1-9]|DVD[\s.]*[1-9]|DISK[\s.]*[1-9]|DISC[\s.]*[1-9]",
        r"|[248]K|\d{3,4}[PIX]+",
    ))
    .unwrap()
});

/// Release title parser configured with ignored/replaced word lists
#[derive(Debug, Clone, Default)]
pub struct TitleParser {
    settings: ParserSettings,
}

impl TitleParser {
    pub fn new(settings: ParserSettings) -> Self {
        Self { settings }
    }

    /// Parse a raw title plus optional subtitle/description
    pub fn parse(&self, raw_title: &str, raw_subtitle: Option<&str>) -> ParsedRelease {
        let raw_subtitle = raw_subtitle.map(str::trim).filter(|s| !s.is_empty());
        let mut release = ParsedRelease {
            raw_title: raw_title.to_string(),
            raw_subtitle: raw_subtitle.map(str::to_string),
            ..Default::default()
        };

        let trimmed = raw_title.trim();
        if trimmed.is_empty() || is_hash_or_tracker(trimmed) {
            debug!(title = %raw_title, "Title carries no usable name");
            return release;
        }

        let (title, ignored, replaced) = self.apply_word_lists(trimmed);
        release.ignored_words = ignored;
        release.replaced_words = replaced;

        // `05.mkv`: an episode of something we cannot name
        if let Some(episode) = numbered_file_episode(&title) {
            release.media_kind = MediaKind::Tv;
            release.season_list = vec![1];
            release.episode_list = vec![episode];
            return release;
        }

        let file_mode = has_media_extension(&title);
        let cleaned = preprocess(&title);
        let mut scan = TitleScan::run(&cleaned, file_mode);
        scan.finish_file_mode();

        let mut effects = std::mem::take(&mut scan.effects);
        effects.reverse();
        if !effects.is_empty() {
            release.resource_effect = Some(effects.join(" "));
        }
        release.resource_type = scan.source.as_ref().map(|s| s.trim().to_string());
        if let Some(source) = &mut release.resource_type
            && source.contains("BluRay")
            && (raw_subtitle.is_some_and(|s| DIY_RE.is_match(s)) || DIY_GROUP_RE.is_match(&title))
        {
            source.push_str(" DIY");
        }

        let mut complete_pack = false;
        let from_title = apply_chinese_markers(&mut scan, &title, &mut complete_pack);
        if !from_title && let Some(subtitle) = raw_subtitle {
            apply_chinese_markers(&mut scan, subtitle, &mut complete_pack);
        }

        let (raw_cn, raw_en) = (scan.cn_name.clone(), scan.en_name.clone());
        let cn_name = fix_name(&mut scan, raw_cn);
        let en_name = fix_name(&mut scan, raw_en);
        let mut name = pick_name(cn_name.as_deref(), en_name.as_deref());
        if name.is_empty()
            && let Some(subtitle) = raw_subtitle
        {
            // Fall back to whatever name the description line carries
            let mut sub_scan = TitleScan::run(&preprocess(subtitle), false);
            let (raw_cn, raw_en) = (sub_scan.cn_name.clone(), sub_scan.en_name.clone());
            let sub_cn = fix_name(&mut sub_scan, raw_cn);
            let sub_en = fix_name(&mut sub_scan, raw_en);
            name = pick_name(sub_cn.as_deref(), sub_en.as_deref());
        }

        release.cn_name = cn_name;
        release.en_name = en_name;
        release.normalized_name = name;
        release.year = scan.year.clone();
        release.part = scan.part.clone().filter(|p| !p.eq_ignore_ascii_case("PART"));
        release.resolution = scan.resolution.clone();
        release.video_encode = scan.video_encode.clone();
        release.audio_encode = scan.audio_encode.clone();
        release.is_complete_pack = complete_pack;
        release.episode_list = number_range(scan.begin_episode, scan.end_episode, MAX_EPISODE);

        let is_tv = scan.is_tv || !release.episode_list.is_empty();
        if is_tv {
            release.media_kind = MediaKind::Tv;
            release.season_list = number_range(scan.begin_season, scan.end_season, MAX_SEASON);
            if release.season_list.is_empty() {
                release.season_list = vec![1];
            }
        } else if release.normalized_name.is_empty() || is_run_on(&scan, &release) {
            release.media_kind = MediaKind::Unknown;
        } else {
            release.media_kind = MediaKind::Movie;
        }

        release.release_group = match_release_group(&title);

        debug!(
            title = %raw_title,
            name = %release.normalized_name,
            kind = %release.media_kind,
            year = ?release.year,
            season_episode = %release.season_episode_string(),
            resolution = ?release.resolution,
            group = ?release.release_group,
            "Parsed release title"
        );
        release
    }

    fn apply_word_lists(&self, title: &str) -> (String, Vec<String>, Vec<String>) {
        let mut title = title.to_string();
        let mut ignored = Vec::new();
        let mut replaced = Vec::new();

        if let Some(re) = &self.settings.ignored {
            for m in re.find_iter(&title) {
                if !m.as_str().is_empty() && !ignored.iter().any(|w| w == m.as_str()) {
                    ignored.push(m.as_str().to_string());
                }
            }
            if !ignored.is_empty() {
                title = re.replace_all(&title, "").into_owned();
            }
        }
        for (re, pattern, replacement) in &self.settings.replaced {
            if re.is_match(&title) {
                title = re.replace_all(&title, replacement.as_str()).into_owned();
                replaced.push(format!("{pattern}@{replacement}"));
            }
        }
        (title, ignored, replaced)
    }
}

/// Parse with no configured word lists
pub fn parse_release(raw_title: &str, raw_subtitle: Option<&str>) -> ParsedRelease {
    TitleParser::default().parse(raw_title, raw_subtitle)
}

fn preprocess(title: &str) -> String {
    let title = LEADING_BRACKET_RE.replace(title, "");
    let title = YEAR_RANGE_RE.replace_all(&title, "${1}${2}");
    let title = SIZE_RE.replace_all(&title, "${1}");
    DATE_RE.replace_all(&title, "").into_owned()
}

fn is_hash_or_tracker(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower.starts_with("magnet:")
        || lower.contains("://")
        || lower.contains("announce")
        || HASH_RE.is_match(title)
}

fn split_extension(title: &str) -> Option<(&str, &str)> {
    let (stem, ext) = title.rsplit_once('.')?;
    let ext_lower = ext.to_lowercase();
    MEDIA_EXTENSIONS
        .contains(&ext_lower.as_str())
        .then_some((stem, ext))
}

fn has_media_extension(title: &str) -> bool {
    split_extension(title).is_some()
}

fn numbered_file_episode(title: &str) -> Option<u32> {
    let (stem, _) = split_extension(title)?;
    if stem.is_empty() || stem.len() >= 5 || !stem.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// A single token with no technical marker is most likely not a release title at all
fn is_run_on(scan: &TitleScan, release: &ParsedRelease) -> bool {
    scan.token_count <= 1
        && release.year.is_none()
        && release.resolution.is_none()
        && release.resource_type.is_none()
}

/// Largest range end expanded into a list; anything past it keeps only `begin`
const MAX_EPISODE: u32 = 9999;
const MAX_SEASON: u32 = 99;

fn number_range(begin: Option<u32>, end: Option<u32>, max: u32) -> Vec<u32> {
    match (begin, end) {
        (Some(begin), Some(end)) if end > begin && end <= max => (begin..=end).collect(),
        (Some(begin), _) => vec![begin],
        _ => Vec::new(),
    }
}

fn pick_name(cn_name: Option<&str>, en_name: Option<&str>) -> String {
    match (cn_name, en_name) {
        (Some(cn), _) if is_all_cjk(cn) => cn.to_string(),
        (_, Some(en)) => en.to_string(),
        (Some(cn), None) => cn.to_string(),
        (None, None) => String::new(),
    }
}

/// Strip noise from a name candidate; a leftover small number is really an episode
fn fix_name(scan: &mut TitleScan, name: Option<String>) -> Option<String> {
    let name = name?;
    let name = collapse_whitespace(NAME_NOISE_RE.replace_all(&name, "").trim());
    if name.is_empty() {
        return None;
    }
    if name.chars().all(|c| c.is_ascii_digit())
        && let Ok(number) = name.parse::<u32>()
        && number < 1800
        && scan.year.is_none()
        && scan.begin_season.is_none()
        && scan.resolution.is_none()
        && scan.source.is_none()
        && scan.audio_encode.is_none()
        && scan.video_encode.is_none()
    {
        match (scan.begin_episode, scan.end_episode) {
            (None, _) => {
                scan.begin_episode = Some(number);
                scan.is_tv = true;
                return None;
            }
            (Some(begin), end) if number == begin || end.is_some_and(|e| (begin..=e).contains(&number)) => {
                return None;
            }
            _ => {}
        }
    }
    Some(name)
}

/// Split `3`, `二`, `1-3` or `一-三` into a begin/end pair
fn parse_cn_range(text: &str) -> Option<(u32, Option<u32>)> {
    match text.split_once('-') {
        Some((begin, end)) => {
            let begin = parse_cn_number(begin)?;
            let end = if end.trim().is_empty() {
                None
            } else {
                Some(parse_cn_number(end)?)
            };
            Some((begin, end))
        }
        None => parse_cn_number(text).map(|n| (n, None)),
    }
}

/// Apply `第x季` / `第x集` / `x集全` / `全x季` markers; true if a season or episode was set
fn apply_chinese_markers(scan: &mut TitleScan, text: &str, complete_pack: &mut bool) -> bool {
    if !CN_MARKER_RE.is_match(text) {
        return false;
    }
    let mut found = false;

    if let Some(caps) = CN_SEASON_RE.captures(text) {
        let seasons = caps.get(1).map_or("", |m| m.as_str()).to_uppercase().replace('S', "");
        let Some((begin, end)) = parse_cn_range(seasons.trim()) else {
            return found;
        };
        if scan.begin_season.is_none() {
            scan.begin_season = Some(begin);
        }
        if let (Some(current), None, Some(end)) = (scan.begin_season, scan.end_season, end)
            && end != current
        {
            scan.end_season = Some(end);
        }
        scan.is_tv = true;
        found = true;
    }

    if let Some(caps) = CN_EPISODE_RE.captures(text) {
        let episodes = caps
            .get(1)
            .map_or("", |m| m.as_str())
            .to_uppercase()
            .replace(['E', 'P'], "");
        let Some((begin, end)) = parse_cn_range(episodes.trim()) else {
            return found;
        };
        if scan.begin_episode.is_none() {
            scan.begin_episode = Some(begin);
        }
        if let (Some(current), None, Some(end)) = (scan.begin_episode, scan.end_episode, end)
            && end != current
        {
            scan.end_episode = Some(end);
        }
        scan.is_tv = true;
        found = true;
    }

    if CN_EPISODE_ALL_RE.is_match(text) {
        scan.begin_episode = None;
        scan.end_episode = None;
        scan.is_tv = true;
        *complete_pack = true;
    }

    if let Some(caps) = CN_SEASON_ALL_RE.captures(text)
        && scan.begin_season.is_none()
        && scan.begin_episode.is_none()
    {
        let total = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        let Some(total) = parse_cn_number(total) else {
            return found;
        };
        scan.begin_season = Some(1);
        scan.end_season = Some(total);
        scan.is_tv = true;
        found = true;
    }

    found
}

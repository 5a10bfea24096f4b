//! Left-to-right token walk over a release title
//!
//! Each token is offered to a fixed chain of recognisers (part, name, year,
//! resolution, season, episode, source/effect, video, audio). A recogniser
//! that claims the token clears `keep_going` so the rest of the chain is
//! skipped for that token.

use once_cell::sync::Lazy;
use regex::Regex;

use super::tokens::Tokens;
use crate::services::text_utils::contains_cjk;

pub(super) const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "ts", "iso", "rmvb", "avi"];

/// Characters that only ever appear as Chinese season/episode markers
const NAME_SE_WORDS: &[char] = &['共', '第', '季', '集', '话', '話', '期'];

static SEASON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)S(\d{2})|^S(\d{1,2})$|S(\d{1,2})E").unwrap());
static EPISODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)EP?(\d{2,4})|^EP?(\d{1,4})$|S\d{1,2}EP?(\d{1,4})$").unwrap());
static PART_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(PART[0-9ABI]{0,2}|CD[0-9]{0,2}|DVD[0-9]{0,2}|DISK[0-9]{0,2}|DISC[0-9]{0,2})$")
        .unwrap()
});
static SOURCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(BLURAY|HDTV|UHDTV|HDDVD|WEBRIP|DVDRIP|BDRIP|BLU|WEB|BD|HDRip)$").unwrap()
});
static EFFECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(REMUX|UHD|SDR|HDR\d*|DOLBY|DOVI|DV|3D|REPACK)$").unwrap());
static PIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[SBUHD]*(\d{3,4}[PI]+)|\d{3,4}X(\d{3,4})").unwrap());
static PIX_K_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^[248]+K").unwrap());
static VIDEO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([HX]26[45]|AVC|HEVC|VC\d?|MPEG\d?|Xvid|DivX|HDR\d*)$").unwrap()
});
static AUDIO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(DTS\d?|DTSHD|DTSHDMA|Atmos|TrueHD\d?|AC3|\dAudios?|DDP\d?|DD\d?|LPCM\d?|AAC\d?|FLAC\d?|HD\d?|MA\d?)$",
    )
    .unwrap()
});
static ROMAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^M*(C[MD]|D?C{0,3})(X[CL]|L?X{0,3})(I[XV]|V?I{0,3})$").unwrap());
/// Tokens like `国语版` or `中字字幕` never extend a Chinese name
static NAME_NOT_CHINESE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r".*版|.*字幕").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TokenKind {
    #[default]
    None,
    CnName,
    EnName,
    NameSeWords,
    Year,
    Part,
    Pix,
    Season,
    SeasonWord,
    Episode,
    EpisodeWord,
    Source,
    Effect,
    VideoEncode,
    AudioEncode,
}

/// Raw attributes collected by the walk, before name cleanup
#[derive(Debug, Clone, Default)]
pub(super) struct TitleScan {
    pub cn_name: Option<String>,
    pub en_name: Option<String>,
    pub year: Option<String>,
    pub part: Option<String>,
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub effects: Vec<String>,
    pub video_encode: Option<String>,
    pub audio_encode: Option<String>,
    pub begin_season: Option<u32>,
    pub end_season: Option<u32>,
    pub begin_episode: Option<u32>,
    pub end_episode: Option<u32>,
    pub is_tv: bool,
    pub token_count: usize,

    file_mode: bool,
    keep_going: bool,
    stop_name: bool,
    stop_cn_name: bool,
    unknown_name: Option<String>,
    last_kind: TokenKind,
    last_token: String,
}

impl TitleScan {
    /// Walk every token of an already pre-processed title
    pub fn run(title: &str, file_mode: bool) -> Self {
        let mut tokens = Tokens::new(title);
        let mut scan = Self {
            file_mode,
            token_count: tokens.len(),
            ..Default::default()
        };

        while let Some(token) = tokens.next_token() {
            scan.keep_going = true;
            scan.part(&token, &mut tokens);
            if scan.keep_going {
                scan.name(&token);
            }
            if scan.keep_going {
                scan.year(&token);
            }
            if scan.keep_going {
                scan.resolution(&token);
            }
            if scan.keep_going {
                scan.season(&token);
            }
            if scan.keep_going {
                scan.episode(&token);
            }
            if scan.keep_going {
                scan.resource_type(&token);
            }
            if scan.keep_going {
                scan.video_encode(&token);
            }
            if scan.keep_going {
                scan.audio_encode(&token);
            }
        }
        scan
    }

    fn has_name(&self) -> bool {
        self.cn_name.is_some() || self.en_name.is_some()
    }

    fn has_tech_marker(&self) -> bool {
        self.year.is_some()
            || self.resolution.is_some()
            || self.source.is_some()
            || self.begin_season.is_some()
            || self.begin_episode.is_some()
    }

    fn append_en(&mut self, token: &str) {
        match &mut self.en_name {
            Some(name) => {
                name.push(' ');
                name.push_str(token);
            }
            None => self.en_name = Some(token.to_string()),
        }
    }

    fn append_cn(&mut self, token: &str) {
        match &mut self.cn_name {
            Some(name) => {
                name.push(' ');
                name.push_str(token);
            }
            None => self.cn_name = Some(token.to_string()),
        }
    }

    fn claim(&mut self, kind: TokenKind) {
        self.last_kind = kind;
        self.keep_going = false;
        self.stop_name = true;
    }

    fn part(&mut self, token: &str, tokens: &mut Tokens) {
        if !self.has_name() || !self.has_tech_marker() {
            return;
        }
        if !PART_RE.is_match(token) {
            return;
        }
        if self.part.is_none() {
            self.part = Some(token.to_string());
        }
        if let Some(next) = tokens.current() {
            let is_short_number = next.chars().all(|c| c.is_ascii_digit())
                && (next.len() == 1 || (next.len() == 2 && next.starts_with('0')));
            let is_letter = matches!(
                next.to_uppercase().as_str(),
                "A" | "B" | "C" | "I" | "II" | "III"
            );
            if (is_short_number || is_letter)
                && let Some(part) = &mut self.part
            {
                part.push_str(next);
                tokens.next_token();
            }
        }
        self.last_kind = TokenKind::Part;
        self.keep_going = false;
        self.stop_name = false;
    }

    fn name(&mut self, token: &str) {
        // A four-digit number held back in case it was part of the name
        if let Some(unknown) = self.unknown_name.take()
            && self.cn_name.is_none()
        {
            if self.en_name.is_none() {
                self.en_name = Some(unknown);
            } else if self.year.as_deref() != Some(unknown.as_str()) {
                self.append_en(&unknown);
            }
            self.last_kind = TokenKind::EnName;
        }

        if self.stop_name {
            return;
        }
        if token.eq_ignore_ascii_case("AKA") {
            self.keep_going = false;
            self.stop_name = true;
            return;
        }
        if token.chars().count() == 1 && token.chars().all(|c| NAME_SE_WORDS.contains(&c)) {
            self.last_kind = TokenKind::NameSeWords;
            return;
        }
        if token.eq_ignore_ascii_case("SEASON") || token.eq_ignore_ascii_case("EPISODE") {
            self.stop_name = true;
            return;
        }

        if contains_cjk(token) {
            self.last_kind = TokenKind::CnName;
            if self.cn_name.is_none() {
                self.cn_name = Some(token.to_string());
            } else if !self.stop_cn_name {
                if !NAME_NOT_CHINESE_RE.is_match(token) && !token.contains(NAME_SE_WORDS) {
                    self.append_cn(token);
                }
                self.stop_cn_name = true;
            }
            return;
        }

        let is_digit = token.chars().all(|c| c.is_ascii_digit());
        let is_roman = ROMAN_RE.is_match(token);
        if is_digit || is_roman {
            if matches!(
                self.last_kind,
                TokenKind::NameSeWords | TokenKind::SeasonWord | TokenKind::EpisodeWord
            ) {
                return;
            }
            if !self.has_name() {
                if self.unknown_name.is_none() {
                    self.unknown_name = Some(token.to_string());
                }
                return;
            }
            if token.starts_with('0') {
                return;
            }
            // A small number straight after a Chinese name is more likely an episode
            if is_digit
                && self.last_kind == TokenKind::CnName
                && token.parse::<u64>().is_ok_and(|n| n < 1900)
            {
                return;
            }
            if (is_digit && token.len() < 4) || is_roman {
                if self.last_kind == TokenKind::CnName {
                    self.append_cn(token);
                } else if self.last_kind == TokenKind::EnName {
                    self.append_en(token);
                }
                self.keep_going = false;
            } else if is_digit && token.len() == 4 && self.unknown_name.is_none() {
                self.unknown_name = Some(token.to_string());
            }
            return;
        }

        if SEASON_RE.is_match(token)
            || EPISODE_RE.is_match(token)
            || SOURCE_RE.is_match(token)
            || EFFECT_RE.is_match(token)
            || PIX_RE.is_match(token)
        {
            self.stop_name = true;
            return;
        }
        let lower = token.to_lowercase();
        if MEDIA_EXTENSIONS.contains(&lower.as_str()) {
            return;
        }
        self.append_en(token);
        self.last_kind = TokenKind::EnName;
    }

    fn year(&mut self, token: &str) {
        if !self.has_name() || token.len() != 4 || !token.chars().all(|c| c.is_ascii_digit()) {
            return;
        }
        let Ok(year) = token.parse::<u32>() else {
            return;
        };
        if !(1901..2050).contains(&year) {
            return;
        }
        // A second year means the first one belonged to the name
        if let Some(previous) = self.year.take() {
            if self.en_name.is_some() {
                self.append_en(&previous);
            } else if self.cn_name.is_some() {
                self.append_cn(&previous);
            }
        }
        self.year = Some(token.to_string());
        self.claim(TokenKind::Year);
    }

    fn resolution(&mut self, token: &str) {
        if !self.has_name() {
            return;
        }
        if let Some(caps) = PIX_RE.captures(token) {
            self.claim(TokenKind::Pix);
            if self.resolution.is_none()
                && let Some(m) = caps.get(1).or_else(|| caps.get(2))
            {
                let mut pix = m.as_str().to_lowercase();
                if pix.chars().all(|c| c.is_ascii_digit()) {
                    pix.push('p');
                }
                self.resolution = Some(pix);
            }
        } else if let Some(m) = PIX_K_RE.find(token) {
            self.claim(TokenKind::Pix);
            if self.resolution.is_none() {
                self.resolution = Some(m.as_str().to_lowercase());
            }
        }
    }

    fn season(&mut self, token: &str) {
        let mut matched = false;
        for caps in SEASON_RE.captures_iter(token) {
            matched = true;
            let Some(season) = first_number(&caps) else {
                break;
            };
            match self.begin_season {
                None => self.begin_season = Some(season),
                Some(begin) if season > begin => self.end_season = Some(season),
                _ => {}
            }
        }
        if matched {
            self.last_kind = TokenKind::Season;
            self.is_tv = true;
            self.stop_name = true;
            // `S01E02` carries the episode too, so let the episode step see it
            return;
        }

        if token.chars().all(|c| c.is_ascii_digit()) {
            if self.last_kind == TokenKind::SeasonWord
                && self.begin_season.is_none()
                && token.len() < 3
            {
                self.begin_season = token.parse().ok();
                self.claim(TokenKind::Season);
                self.is_tv = true;
            }
        } else if token.eq_ignore_ascii_case("SEASON") && self.begin_season.is_none() {
            self.last_kind = TokenKind::SeasonWord;
        }
    }

    fn episode(&mut self, token: &str) {
        let mut matched = false;
        for caps in EPISODE_RE.captures_iter(token) {
            matched = true;
            let Some(episode) = first_number(&caps) else {
                break;
            };
            match self.begin_episode {
                None => self.begin_episode = Some(episode),
                Some(begin) if episode > begin => self.end_episode = Some(episode),
                _ => {}
            }
        }
        if matched {
            self.claim(TokenKind::Episode);
            self.is_tv = true;
            return;
        }

        if token.chars().all(|c| c.is_ascii_digit()) && !token.is_empty() {
            let Ok(number) = token.parse::<u32>() else {
                return;
            };
            if let Some(begin) = self.begin_episode
                && self.end_episode.is_none()
                && token.len() < 5
                && number > begin
                && self.last_kind == TokenKind::Episode
            {
                // `E13 14`
                self.end_episode = Some(number);
                self.keep_going = false;
                self.is_tv = true;
            } else if self.begin_episode.is_none()
                && (2..4).contains(&token.len())
                && !matches!(self.last_kind, TokenKind::Year | TokenKind::VideoEncode)
                && self.unknown_name.as_deref() != Some(token)
            {
                // Bare `07` after the name
                self.begin_episode = Some(number);
                self.claim(TokenKind::Episode);
                self.is_tv = true;
            } else if self.last_kind == TokenKind::EpisodeWord
                && self.begin_episode.is_none()
                && token.len() < 5
            {
                self.begin_episode = Some(number);
                self.claim(TokenKind::Episode);
                self.is_tv = true;
            }
        } else if token.eq_ignore_ascii_case("EPISODE") {
            self.last_kind = TokenKind::EpisodeWord;
        }
    }

    fn resource_type(&mut self, token: &str) {
        if !self.has_name() {
            return;
        }
        let upper = token.to_uppercase();
        if SOURCE_RE.is_match(token) {
            self.claim(TokenKind::Source);
            if self.source.is_none() {
                self.source = Some(token.to_string());
                self.last_token = upper;
            }
            return;
        }
        if upper == "DL" && self.last_kind == TokenKind::Source && self.last_token == "WEB" {
            self.source = Some("WEB-DL".to_string());
            self.keep_going = false;
            return;
        }
        if upper == "RAY" && self.last_kind == TokenKind::Source && self.last_token == "BLU" {
            self.source = Some("BluRay".to_string());
            self.keep_going = false;
            return;
        }
        if upper == "WEBDL" {
            self.source = Some("WEB-DL".to_string());
            self.keep_going = false;
            return;
        }
        if EFFECT_RE.is_match(token) {
            self.claim(TokenKind::Effect);
            if !self.effects.iter().any(|e| e.eq_ignore_ascii_case(token)) {
                self.effects.push(token.to_string());
            }
            self.last_token = upper;
        }
    }

    fn video_encode(&mut self, token: &str) {
        if !self.has_name() || !self.has_tech_marker() {
            return;
        }
        let upper = token.to_uppercase();
        if VIDEO_RE.is_match(token) {
            self.claim(TokenKind::VideoEncode);
            match self.video_encode.as_deref() {
                None => self.video_encode = Some(token.to_string()),
                Some("10bit") => self.video_encode = Some(format!("{token} 10bit")),
                Some(_) => {}
            }
            self.last_token = upper;
        } else if upper == "H" || upper == "X" {
            self.claim(TokenKind::VideoEncode);
            self.last_token = token.to_string();
        } else if matches!(token, "264" | "265")
            && self.last_kind == TokenKind::VideoEncode
            && (self.last_token.eq_ignore_ascii_case("H") || self.last_token.eq_ignore_ascii_case("X"))
        {
            // `H.264` arrives as `H` then `264`
            self.video_encode = Some(format!("{}{}", self.last_token, token));
            self.keep_going = false;
        } else if token.chars().all(|c| c.is_ascii_digit())
            && self.last_kind == TokenKind::VideoEncode
            && (self.last_token == "VC" || self.last_token == "MPEG")
        {
            self.video_encode = Some(format!("{}{}", self.last_token, token));
            self.keep_going = false;
        } else if upper == "10BIT" {
            self.last_kind = TokenKind::VideoEncode;
            self.keep_going = false;
            self.video_encode = Some(match self.video_encode.take() {
                Some(codec) => format!("{codec} 10bit"),
                None => "10bit".to_string(),
            });
        }
    }

    fn audio_encode(&mut self, token: &str) {
        if !self.has_name() || !self.has_tech_marker() {
            return;
        }
        if AUDIO_RE.is_match(token) {
            self.claim(TokenKind::AudioEncode);
            self.audio_encode = Some(match self.audio_encode.take() {
                None => token.to_string(),
                Some(audio) if audio.eq_ignore_ascii_case("DTS") => format!("DTS-{token}"),
                Some(audio) => format!("{audio} {token}"),
            });
            self.last_token = token.to_uppercase();
        } else if token.chars().all(|c| c.is_ascii_digit())
            && self.last_kind == TokenKind::AudioEncode
            && let Some(audio) = &mut self.audio_encode
        {
            // Channel layouts arrive split: `DDP5` `1` or `TrueHD` `7` `1`
            if !self.last_token.is_empty() && self.last_token.chars().all(|c| c.is_ascii_digit()) {
                audio.push('.');
                audio.push_str(token);
            } else if let Some(last) = audio.chars().last().filter(char::is_ascii_digit) {
                audio.pop();
                audio.push(' ');
                audio.push(last);
                audio.push('.');
                audio.push_str(token);
            } else {
                audio.push(' ');
                audio.push_str(token);
            }
            self.last_token = token.to_string();
        }
    }

    /// Season/episode ranges longer than one step are not trusted for single files
    pub fn finish_file_mode(&mut self) {
        if !self.file_mode {
            return;
        }
        if let (Some(begin), Some(end)) = (self.begin_season, self.end_season)
            && end > begin + 1
        {
            self.end_season = None;
        }
        if let (Some(begin), Some(end)) = (self.begin_episode, self.end_episode)
            && end > begin + 1
        {
            self.end_episode = None;
        }
    }
}

fn first_number(caps: &regex::Captures<'_>) -> Option<u32> {
    caps.iter()
        .skip(1)
        .flatten()
        .find(|m| !m.as_str().is_empty())
        .and_then(|m| m.as_str().parse().ok())
}

//! Known release/subtitle group table
//!
//! Group tags normally follow a `-`, `@`, `[` or `￡` and are terminated by a
//! separator or the end of the title, e.g. `...x265-PuTao`, `...AC3￡cXcY@FRDS`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Group name patterns, grouped loosely by the site that publishes them
const KNOWN_GROUPS: &[&str] = &[
    // PT site official groups
    "FF(?:(?:A|WE)B|CD|E(?:DU|B)|TV)",
    "Audies",
    "AD(?:Audio|E(?:|book)|Music|Web)",
    "BeiTai",
    "Bts(?:CHOOL|HD|PAD|TV)",
    "CarPT",
    "CHD(?:|Bits|PAD|(?:|HK)TV|WEB)",
    "StBOX",
    "OneHD",
    "(?:(?:iNT|(?:HALFC|Mini(?:S|H|FH)D))-|)TLF",
    "(?:DG|GBWE)B",
    "Hares(?:|(?:M|T)V|Web)",
    "HDA(?:pad|rea|TV)",
    "EPiC",
    "HDC(?:|hina|TV)",
    "k9611",
    "D(?:ream|BTV)",
    "(?:HD|QHstudI)o",
    "beAst(?:|TV)",
    "HDH(?:|ome|Pad|TV|WEB)",
    "HDPT(?:|Web)",
    "HDS(?:|ky|TV|Pad|WEB)",
    "AQLJ",
    "HDZ(?:|one)",
    "HHWEB",
    "HTPT",
    "FRDS",
    "Yumi",
    "cXcY",
    "L(?:eague(?:(?:C|H)D|(?:M|T)V|NF)|WEB)",
    "i18n",
    "CiNT",
    "MTeam(?:|TV)",
    "MPAD",
    "Our(?:Bits|TV)",
    "FLTTH",
    "PbK",
    "MGs",
    "iLove(?:HD|TV)",
    "PiGo(?:NF|(?:H|WE)B)",
    "PTer(?:|DIY|Game|(?:M|T)V|WEB)",
    "PTH(?:|Audio|eBook|music|ome|tv|WEB)",
    "PTsbao",
    "OPS",
    "F(?:Fans(?:AIeNcE|BD|D(?:VD|IY)|TV|WEB)|HDMv)",
    "SGXT",
    "PuTao",
    "CMCT(?:|V)",
    "TJUPT",
    "TTG",
    "WiKi",
    "NGB",
    "DoA",
    "(?:ARi|ExRE)N",
    // Common scene/P2P groups
    "B(?:MDru|eyondHD|TN)",
    "C(?:fandora|trlhd|MRG)",
    "DON",
    "EVO",
    "FLUX",
    "HONE(?:|yG)",
    "N(?:oGroup|T(?:b|G))",
    "PandaMoon",
    "SMURF",
    "T(?:EPES|aengoo|rollHD )",
    // Anime fansub groups
    "ANi",
    "HYSUB",
    "KTXP",
    "LoliHouse",
    "MCE",
    "Nekomoe kissaten",
    "(?:Lilith|NC)-Raws",
    "织梦字幕组",
];

static KNOWN_GROUPS_RE: Lazy<Regex> = Lazy::new(|| {
    build_group_regex(&KNOWN_GROUPS.join("|")).unwrap()
});

/// Scene-style fallback: the alphanumeric tag after the last dash
static TRAILING_GROUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-([A-Za-z0-9@]+)(?:\.(?:mp4|mkv|ts|iso|rmvb|avi))?$").unwrap()
});

/// Tails of technical tokens that a trailing dash can split off (`WEB-DL`, `Blu-Ray`)
static NOT_A_GROUP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:DL|RIP|RAY|HD|MA|X|\d+p?|[HX]\.?26[45])$").unwrap()
});

/// Build a matcher for a `|`-separated list of group patterns
pub fn build_group_regex(alternation: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)[-@\[￡]((?:{alternation}))(?:[@.\s\]\[]|$)"
    ))
}

/// All groups matched by `re`, joined with `@` in the order they appear
pub fn collect_groups(re: &Regex, title: &str) -> Option<String> {
    let mut found: Vec<&str> = Vec::new();
    let mut start = 0;
    while start < title.len() {
        let Some(caps) = re.captures_at(title, start) else {
            break;
        };
        let Some(group) = caps.get(1) else {
            break;
        };
        if !found.contains(&group.as_str()) {
            found.push(group.as_str());
        }
        // Resume at the terminator so `a@b` can match both sides
        start = group.end();
    }
    if found.is_empty() {
        None
    } else {
        Some(found.join("@"))
    }
}

/// Extract the release group from a raw title
pub fn match_release_group(title: &str) -> Option<String> {
    if let Some(groups) = collect_groups(&KNOWN_GROUPS_RE, title) {
        return Some(groups);
    }
    TRAILING_GROUP_RE
        .captures(title.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|group| !NOT_A_GROUP_RE.is_match(group))
        .map(str::to_string)
}

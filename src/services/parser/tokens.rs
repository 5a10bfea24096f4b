//! Token cursor over a release title split on separator characters

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters that separate words in scene and PT release titles
static SPLIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.|\s+|\(|\)|\[|]|-|\+|【|】|/|～|;|&|\||#|_|「|」|~").unwrap()
});

/// Forward-only cursor over the non-empty tokens of a title
#[derive(Debug, Clone, Default)]
pub struct Tokens {
    tokens: Vec<String>,
    index: usize,
}

impl Tokens {
    pub fn new(text: &str) -> Self {
        let tokens = SPLIT_RE
            .split(text)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self { tokens, index: 0 }
    }

    /// The token that the next call to [`Tokens::next_token`] will return
    pub fn current(&self) -> Option<&str> {
        self.tokens.get(self.index).map(String::as_str)
    }

    /// Advance and return the token under the cursor
    pub fn next_token(&mut self) -> Option<String> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_separators() {
        let mut tokens = Tokens::new("Some.Show.S02E05.1080p.WEB-DL.x264-GROUP");
        let mut collected = Vec::new();
        while let Some(t) = tokens.next_token() {
            collected.push(t);
        }
        assert_eq!(
            collected,
            vec!["Some", "Show", "S02E05", "1080p", "WEB", "DL", "x264", "GROUP"]
        );
    }

    #[test]
    fn test_fullwidth_brackets_and_empty_runs() {
        let tokens = Tokens::new("【字幕组】  某剧 [01]");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens.current(), Some("字幕组"));
    }

    #[test]
    fn test_run_on_string_is_one_token() {
        let tokens = Tokens::new("abcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(tokens.len(), 1);
    }
}

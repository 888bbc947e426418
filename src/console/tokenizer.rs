use regex::Regex;
use std::sync::OnceLock;

pub const COMMAND_PREFIX: char = '/';

/// Double-quoted run, bare word (ASCII letters, digits, `_` and `-`), or
/// single-quoted run. Backslash escapes keep quotes inside a quoted run but
/// are not unescaped in the token.
const TOKEN_PATTERN: &str = r#""([^"\\]*(?:\\.[^"\\]*)*)"|[A-Za-z0-9_-]+|'([^'\\]*(?:\\.[^'\\]*)*)'"#;

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token regex must compile"))
}

fn whitespace_regex() -> &'static Regex {
    static WS_RE: OnceLock<Regex> = OnceLock::new();
    WS_RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex must compile"))
}

/// Splits a console line into tokens. One leading `/` is stripped and
/// whitespace runs collapse before matching. Characters that match none of
/// the token forms are skipped.
pub fn tokenize(line: &str) -> Vec<String> {
    let stripped = line.strip_prefix(COMMAND_PREFIX).unwrap_or(line);
    let normalized = whitespace_regex().replace_all(stripped, " ");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return Vec::new();
    }

    token_regex()
        .captures_iter(normalized)
        .filter_map(|caps| {
            // An empty quoted run yields the quotes themselves.
            caps.get(1)
                .or_else(|| caps.get(2))
                .filter(|m| !m.as_str().is_empty())
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_parameter_is_one_token() {
        assert_eq!(
            tokenize(r#"/community-post "this is a message""#),
            vec!["community-post", "this is a message"]
        );
        assert_eq!(
            tokenize("/story-fork my-tale 'A New   Branch'"),
            vec!["story-fork", "my-tale", "A New Branch"]
        );
    }

    #[test]
    fn empty_and_prefix_only_lines_have_no_tokens() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("/").is_empty());
        assert!(tokenize("   \t ").is_empty());
        assert!(tokenize("/   ").is_empty());
    }

    #[test]
    fn only_one_prefix_is_stripped() {
        assert_eq!(tokenize("//system-help"), vec!["system-help"]);
    }

    #[test]
    fn stray_punctuation_is_dropped() {
        assert_eq!(
            tokenize("/community-vote upvote, 42!"),
            vec!["community-vote", "upvote", "42"]
        );
    }

    #[test]
    fn bare_words_are_ascii_only() {
        assert_eq!(tokenize("/story-read café"), vec!["story-read", "caf"]);
        assert_eq!(tokenize("/story-search 'café'"), vec!["story-search", "café"]);
        assert_eq!(tokenize("/profile-name naïve_1"), vec!["profile-name", "na", "ve_1"]);
    }

    #[test]
    fn escaped_quotes_stay_escaped() {
        assert_eq!(
            tokenize(r#"/community-post "say \"hi\" now""#),
            vec!["community-post", r#"say \"hi\" now"#]
        );
    }

    #[test]
    fn empty_quotes_yield_literal_quotes() {
        assert_eq!(tokenize(r#"/profile-name """#), vec!["profile-name", r#""""#]);
    }
}

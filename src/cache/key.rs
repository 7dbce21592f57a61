//! Deterministic cache key construction.
//!
//! Keys must be identical for logically-identical requests regardless of
//! parameter insertion order, and bounded in length. Over-long keys fall
//! back to `{type}:{classification}:{hash}` with a 32-bit FNV-1a hash of
//! the joined components rendered in base36.

use crate::models::{QueryKind, SearchParams};

/// Maximum canonical key length before hashing kicks in
const MAX_KEY_LEN: usize = 200;

const LEADING_ARTICLES: [&str; 3] = ["the", "a", "an"];

/// Normalize a query for cache keying and comparison.
///
/// Idempotent: `normalize_query(normalize_query(x)) == normalize_query(x)`.
pub fn normalize_query(raw: &str) -> String {
    let mut s = raw.to_lowercase();

    // Apostrophe variants collapse before punctuation stripping
    s = s.replace(['\u{2018}', '\u{2019}', '\u{02bc}'], "'");

    // Drop parenthetical content ("(unabridged)", "(2nd edition)")
    s = strip_parentheticals(&s);

    // Strip punctuation, keeping word-internal apostrophes out of the key
    s = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let tokens: Vec<&str> = s.split_whitespace().collect();
    let tokens = strip_articles(&tokens);

    tokens.join(" ")
}

fn strip_parentheticals(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn strip_articles<'a>(tokens: &[&'a str]) -> Vec<&'a str> {
    let mut start = 0;
    let mut end = tokens.len();

    // Articles can stack ("The A Team"); strip until none remain so the
    // result is a fixpoint, but never strip the last surviving token
    while end - start > 1 && LEADING_ARTICLES.contains(&tokens[start]) {
        start += 1;
    }
    while end - start > 1 && LEADING_ARTICLES.contains(&tokens[end - 1]) {
        end -= 1;
    }

    tokens[start..end].to_vec()
}

/// Stable parameter string from the fixed allow-list, keys sorted lexically
fn stable_param_string(params: &SearchParams) -> String {
    // Lexical order: maxResults, searchType, showAllEditions, sortBy
    format!(
        "maxResults={}&searchType={}&showAllEditions={}&sortBy={}",
        params.max_results, params.search_type, params.show_all_editions, params.sort_by
    )
}

/// Build the cache key for a request.
///
/// `entry_type` names the cached payload family ("search", "author_works",
/// "book"); `kind` is the query classification.
pub fn build_key(entry_type: &str, kind: QueryKind, query: &str, params: &SearchParams) -> String {
    let normalized = normalize_query(query);
    let param_string = stable_param_string(params);
    let canonical = format!("{entry_type}:{kind}:{normalized}:{param_string}");

    if canonical.len() <= MAX_KEY_LEN {
        return canonical;
    }

    let components = [entry_type, kind.as_str(), normalized.as_str(), &param_string];
    let hash = fnv1a_32(components.join("|").as_bytes());
    format!("{entry_type}:{kind}:{}", to_base36(hash))
}

/// Durable-tier object key for a single normalized identifier
pub fn object_key(entity_type: &str, normalized_identifier: &str) -> String {
    format!("{entity_type}/{normalized_identifier}.json")
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchParams;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize_query("  The  Martian  "), "martian");
        assert_eq!(normalize_query("A Little Life."), "little life");
        assert_eq!(
            normalize_query("Harry Potter (Book 1)"),
            "harry potter"
        );
    }

    #[test]
    fn test_normalize_apostrophes() {
        assert_eq!(
            normalize_query("Ender\u{2019}s Game"),
            normalize_query("Ender's Game")
        );
    }

    #[test]
    fn test_normalize_idempotent() {
        for input in [
            "The Fellowship of the Ring",
            "  A  Wizard of Earthsea (illustrated) ",
            "9780553418026",
            "don\u{2019}t panic: a guide",
            // Stacked articles must strip in one pass
            "The A Team",
            "an an the the",
        ] {
            let once = normalize_query(input);
            assert_eq!(normalize_query(&once), once, "not idempotent: {input}");
        }
    }

    #[test]
    fn test_trailing_article_stripped() {
        assert_eq!(normalize_query("murder on the"), "murder on");
    }

    #[test]
    fn test_stacked_articles_stripped() {
        assert_eq!(normalize_query("The A Team"), "team");
        assert_eq!(normalize_query("a the an end"), "end");
    }

    #[test]
    fn test_single_article_token_survives() {
        // Never strip the whole query away
        assert_eq!(normalize_query("The"), "the");
    }

    #[test]
    fn test_build_key_stable() {
        let params = SearchParams::default();
        let a = build_key("search", QueryKind::Title, "The Martian", &params);
        let b = build_key("search", QueryKind::Title, "the martian!", &params);
        assert_eq!(a, b);
        assert_eq!(a, "search:title:martian:maxResults=20&searchType=mixed&showAllEditions=false&sortBy=relevance");
    }

    #[test]
    fn test_build_key_long_query_hashes() {
        let params = SearchParams::default();
        let long = "word ".repeat(80);
        let key = build_key("search", QueryKind::Mixed, &long, &params);

        assert!(key.len() <= MAX_KEY_LEN);
        assert!(key.starts_with("search:mixed:"));
        // Deterministic
        assert_eq!(key, build_key("search", QueryKind::Mixed, &long, &params));
    }

    #[test]
    fn test_object_key() {
        assert_eq!(
            object_key("book", "9780553418026"),
            "book/9780553418026.json"
        );
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}

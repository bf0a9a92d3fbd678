//! Entity name normalization.
//!
//! Listing sites decorate employer names ("Acme (Seoul office)") and sometimes use
//! legal names the review site does not know. The cache key drops the decoration;
//! the search name additionally maps known aliases.

use std::sync::LazyLock;

use regex::Regex;

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(.*?\)").expect("valid parenthesized-fragment regex"));

/// Listing-site names mapped to the names used by the review site.
const NAME_ALIASES: &[(&str, &str)] = &[
    ("쿠팡", "COUPANG"),
    ("씨제이이엔엠", "CJ ENM"),
    ("씨제이올리브영", "CJ올리브영"),
    ("무신사페이먼츠", "무신사"),
    ("당근서비스", "당근마켓"),
    ("넥슨코리아", "NEXON"),
    ("클래스101", "class101"),
    ("소크라에이아이", "뤼이드"),
    ("케이티밀리의서재", "밀리의서재"),
];

/// Base URL of the public review pages.
pub const REVIEW_BASE_URL: &str = "https://www.teamblind.com/kr/company";

/// Cache and dedup identity for a raw display name.
pub fn normalize_key(raw: &str) -> String {
    PARENTHESIZED.replace_all(raw, "").trim().to_string()
}

/// Name to query the review site with.
pub fn search_name(key: &str) -> String {
    NAME_ALIASES
        .iter()
        .find(|(listed, _)| *listed == key)
        .map(|(_, alias)| alias.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Public review page for an entity key.
pub fn review_url(key: &str) -> String {
    format!("{}/{}/reviews", REVIEW_BASE_URL, urlencoding::encode(&search_name(key)))
}

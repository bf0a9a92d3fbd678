//! Response parsing for the remote lookups.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use super::source::{FetchError, YearlyReport};

static STAR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.star").expect("static 'span.star' CSS selector is valid"));

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

/// Extract the rating from a review page: first number inside `span.star`.
pub fn parse_rating(html: &str) -> Result<f64, FetchError> {
    let document = Html::parse_document(html);
    let element = document
        .select(&STAR_SELECTOR)
        .next()
        .ok_or_else(|| FetchError::Parse("rating element not found".to_string()))?;

    let text = element.text().collect::<Vec<_>>().join(" ");

    let number = NUMBER
        .find(&text)
        .ok_or_else(|| FetchError::Parse(format!("no number in rating element: {:?}", text.trim())))?;

    number
        .as_str()
        .parse::<f64>()
        .map_err(|e| FetchError::Parse(format!("invalid rating {:?}: {}", number.as_str(), e)))
}

/// Extract the hashed registration id from a company-info payload.
///
/// Accepts the hash at the top level or under `company`.
pub fn parse_external_ref(body: &str) -> Result<String, FetchError> {
    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let hash = value
        .get("regNoHash")
        .or_else(|| value.get("company").and_then(|c| c.get("regNoHash")))
        .ok_or_else(|| FetchError::Parse("regNoHash missing".to_string()))?;

    if hash.is_null() {
        return Err(FetchError::NotFound("no registration hash".to_string()));
    }

    match hash.as_str() {
        Some("") => Err(FetchError::NotFound("empty registration hash".to_string())),
        Some(s) => Ok(s.to_string()),
        None => Err(FetchError::Parse(format!("regNoHash is not a string: {}", hash))),
    }
}

/// Extract the yearly report list from a financial payload.
///
/// Accepts `{"data": {"financialReport": [...]}}` or `{"financialReport": [...]}`.
/// An empty list means the entity has no published figures.
pub fn parse_financial_report(body: &str) -> Result<Vec<YearlyReport>, FetchError> {
    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let list = value
        .get("data")
        .and_then(|d| d.get("financialReport"))
        .or_else(|| value.get("financialReport"))
        .ok_or_else(|| FetchError::Parse("financialReport missing".to_string()))?;

    let reports: Vec<YearlyReport> =
        serde_json::from_value(list.clone()).map_err(|e| FetchError::Parse(e.to_string()))?;

    if reports.is_empty() {
        return Err(FetchError::NotFound("financial report is empty".to_string()));
    }
    Ok(reports)
}

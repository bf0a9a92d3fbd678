//! Scripted [`EnrichmentSource`] for tests and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::source::{EnrichmentSource, FetchError, YearlyReport};

/// Score served for names without a script.
pub const DEFAULT_MOCK_SCORE: f64 = 3.5;

/// Render a minimal review page carrying `score`.
pub fn rating_page(score: f64) -> String {
    format!(r#"<html><body><div class="rating"><span class="star">{}</span></div></body></html>"#, score)
}

/// Mock source with per-name scripted responses and call accounting.
///
/// A script is a sequence of results; each call consumes one and the last one
/// repeats forever.
pub struct MockSource {
    pages: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
    default_page: Result<String, FetchError>,
    external_ids: HashMap<String, String>,
    financials: HashMap<String, Vec<YearlyReport>>,
    latency: Duration,
    calls: Mutex<HashMap<String, usize>>,
    external_id_calls: AtomicUsize,
    financial_calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct ActiveCall<'a> {
    active: &'a AtomicUsize,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            default_page: Ok(rating_page(DEFAULT_MOCK_SCORE)),
            external_ids: HashMap::new(),
            financials: HashMap::new(),
            latency: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            external_id_calls: AtomicUsize::new(0),
            financial_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn pages(&self) -> MutexGuard<'_, HashMap<String, VecDeque<Result<String, FetchError>>>> {
        self.pages.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn calls(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn with_rating(self, name: &str, score: f64) -> Self {
        self.with_script(name, vec![Ok(score)])
    }

    pub fn with_failure(self, name: &str, error: FetchError) -> Self {
        self.with_script(name, vec![Err(error)])
    }

    /// Serve a raw page body for `name`.
    pub fn with_page(self, name: &str, body: &str) -> Self {
        self.pages().insert(name.to_string(), VecDeque::from([Ok(body.to_string())]));
        self
    }

    /// Serve the given outcomes for `name` in order.
    pub fn with_script(self, name: &str, script: Vec<Result<f64, FetchError>>) -> Self {
        let script = script.into_iter().map(|r| r.map(rating_page)).collect();
        self.pages().insert(name.to_string(), script);
        self
    }

    pub fn with_external_id(mut self, entity_id: &str, hash: &str) -> Self {
        self.external_ids.insert(entity_id.to_string(), hash.to_string());
        self
    }

    pub fn with_financials(mut self, hash: &str, reports: Vec<YearlyReport>) -> Self {
        self.financials.insert(hash.to_string(), reports);
        self
    }

    /// Delay every rating response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replace the script for `name` on a shared source.
    pub fn set_script(&self, name: &str, script: Vec<Result<f64, FetchError>>) {
        let script = script.into_iter().map(|r| r.map(rating_page)).collect();
        self.pages().insert(name.to_string(), script);
    }

    pub fn rating_calls(&self, name: &str) -> usize {
        self.calls().get(name).copied().unwrap_or(0)
    }

    pub fn total_rating_calls(&self) -> usize {
        self.calls().values().sum()
    }

    pub fn external_id_calls(&self) -> usize {
        self.external_id_calls.load(Ordering::SeqCst)
    }

    pub fn financial_calls(&self) -> usize {
        self.financial_calls.load(Ordering::SeqCst)
    }

    /// Highest number of rating calls observed in progress at once.
    pub fn peak_concurrent(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_page(&self, name: &str) -> Result<String, FetchError> {
        let mut pages = self.pages();
        match pages.get_mut(name) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or_else(|| self.default_page.clone()),
            Some(script) => script.front().cloned().unwrap_or_else(|| self.default_page.clone()),
            None => self.default_page.clone(),
        }
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnrichmentSource for MockSource {
    async fn fetch_rating_page(&self, name: &str) -> Result<String, FetchError> {
        *self.calls().entry(name.to_string()).or_insert(0) += 1;

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveCall { active: &self.active };
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.next_page(name)
    }

    async fn fetch_external_id(&self, entity_id: &str) -> Result<String, FetchError> {
        self.external_id_calls.fetch_add(1, Ordering::SeqCst);
        self.external_ids
            .get(entity_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("no company {}", entity_id)))
    }

    async fn fetch_financial_report(&self, reference: &str) -> Result<Vec<YearlyReport>, FetchError> {
        self.financial_calls.fetch_add(1, Ordering::SeqCst);
        match self.financials.get(reference) {
            Some(reports) if !reports.is_empty() => Ok(reports.clone()),
            _ => Err(FetchError::NotFound(format!("no financial report for {}", reference))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::parse_rating;

    #[tokio::test]
    async fn test_default_page_parses() {
        let source = MockSource::new();
        let page = source.fetch_rating_page("Anyone").await.unwrap();
        assert_eq!(parse_rating(&page).unwrap(), DEFAULT_MOCK_SCORE);
        assert_eq!(source.rating_calls("Anyone"), 1);
    }

    #[tokio::test]
    async fn test_script_last_outcome_repeats() {
        let source = MockSource::new().with_script(
            "Beta",
            vec![Err(FetchError::Forbidden { status: 403 }), Ok(4.0)],
        );

        assert!(source.fetch_rating_page("Beta").await.is_err());
        for _ in 0..3 {
            let page = source.fetch_rating_page("Beta").await.unwrap();
            assert_eq!(parse_rating(&page).unwrap(), 4.0);
        }
        assert_eq!(source.rating_calls("Beta"), 4);
        assert_eq!(source.total_rating_calls(), 4);
    }

    #[tokio::test]
    async fn test_set_script_replaces() {
        let source = MockSource::new().with_failure("Beta", FetchError::Network("reset".into()));
        source.set_script("Beta", vec![Ok(2.5)]);
        let page = source.fetch_rating_page("Beta").await.unwrap();
        assert_eq!(parse_rating(&page).unwrap(), 2.5);
    }

    #[tokio::test]
    async fn test_unscripted_secondary_lookups_are_not_found() {
        let source = MockSource::new();
        assert!(matches!(source.fetch_external_id("1").await, Err(FetchError::NotFound(_))));
        assert!(matches!(source.fetch_financial_report("h").await, Err(FetchError::NotFound(_))));
        assert_eq!(source.external_id_calls(), 1);
        assert_eq!(source.financial_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peak_concurrency_tracking() {
        let source = std::sync::Arc::new(MockSource::new().with_latency(Duration::from_millis(100)));

        let a = tokio::spawn({
            let source = source.clone();
            async move { source.fetch_rating_page("A").await }
        });
        let b = tokio::spawn({
            let source = source.clone();
            async move { source.fetch_rating_page("B").await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(source.peak_concurrent(), 2);
    }
}

//! Remote lookup capability and its failure taxonomy

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::FinancialSummary;

/// Coarse classification of a failed lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Entity has no page or review presence
    NotFound,
    /// Rate limited or blocked by upstream
    Forbidden,
    /// Transport failure or timeout
    Network,
    /// Response arrived but was malformed
    Parse,
}

/// Errors that can occur during a single remote lookup
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden by upstream (status {status})")]
    Forbidden { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::NotFound(_) => FailureKind::NotFound,
            FetchError::Forbidden { .. } => FailureKind::Forbidden,
            FetchError::Network(_) | FetchError::Timeout(_) => FailureKind::Network,
            FetchError::Parse(_) => FailureKind::Parse,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, FetchError::Forbidden { .. })
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind(), FailureKind::NotFound)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Network(e.to_string())
    }
}

/// One year of the financial report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyReport {
    pub year: i32,
    #[serde(default)]
    pub sales_amount: i64,
    #[serde(default)]
    pub operating_income: i64,
    #[serde(default)]
    pub net_income: i64,
}

impl YearlyReport {
    pub fn to_summary(&self) -> FinancialSummary {
        FinancialSummary {
            period_label: self.year.to_string(),
            revenue: self.sales_amount,
            operating_income: self.operating_income,
            net_income: self.net_income,
        }
    }
}

/// Summary of the most recent year (the last element of the report).
pub fn latest_summary(reports: &[YearlyReport]) -> Option<FinancialSummary> {
    reports.last().map(YearlyReport::to_summary)
}

/// Remote capabilities consumed by the pipeline.
///
/// Each call is exactly one request with no internal retry.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// Raw review page for an entity name
    async fn fetch_rating_page(&self, name: &str) -> Result<String, FetchError>;

    /// Resolve a public listing id to the hashed registration id
    async fn fetch_external_id(&self, entity_id: &str) -> Result<String, FetchError>;

    /// Yearly financial figures for a hashed registration id, oldest first
    async fn fetch_financial_report(&self, reference: &str) -> Result<Vec<YearlyReport>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(FetchError::NotFound("x".into()).kind(), FailureKind::NotFound);
        assert_eq!(FetchError::Forbidden { status: 403 }.kind(), FailureKind::Forbidden);
        assert_eq!(FetchError::Network("reset".into()).kind(), FailureKind::Network);
        assert_eq!(FetchError::Timeout(Duration::from_secs(10)).kind(), FailureKind::Network);
        assert_eq!(FetchError::Parse("no star".into()).kind(), FailureKind::Parse);
    }

    #[test]
    fn test_only_not_found_is_terminal() {
        assert!(!FetchError::NotFound("x".into()).is_retryable());
        assert!(FetchError::Forbidden { status: 429 }.is_retryable());
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(FetchError::Parse("x".into()).is_retryable());
    }

    #[test]
    fn test_latest_summary_uses_last_year() {
        let reports = vec![
            YearlyReport {
                year: 2022,
                sales_amount: 10,
                operating_income: 1,
                net_income: 1,
            },
            YearlyReport {
                year: 2023,
                sales_amount: 20,
                operating_income: 2,
                net_income: -1,
            },
        ];

        let summary = latest_summary(&reports).unwrap();
        assert_eq!(summary.period_label, "2023");
        assert_eq!(summary.revenue, 20);
        assert_eq!(summary.net_income, -1);
        assert!(latest_summary(&[]).is_none());
    }

    #[test]
    fn test_yearly_report_deserializes_camel_case() {
        let report: YearlyReport =
            serde_json::from_str(r#"{"year":2024,"salesAmount":5,"operatingIncome":3,"netIncome":2}"#).unwrap();
        assert_eq!(report.year, 2024);
        assert_eq!(report.sales_amount, 5);
    }
}

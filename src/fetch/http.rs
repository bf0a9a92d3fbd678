//! HTTP implementation of [`EnrichmentSource`]
//!
//! Endpoints are URL templates with a single placeholder (`{name}`, `{id}` or
//! `{hash}`) that is filled with the percent-encoded value.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::parse::{parse_external_ref, parse_financial_report};
use super::source::{EnrichmentSource, FetchError, YearlyReport};
use crate::error::{EnrichError, Result};

/// Default review page template
const DEFAULT_RATING_PAGE_URL: &str = "https://www.teamblind.com/kr/company/{name}/reviews";

/// Default company info template
const DEFAULT_COMPANY_INFO_URL: &str = "https://www.wanted.co.kr/api/v4/companies/{id}";

/// Default financial report template
const DEFAULT_FINANCIAL_REPORT_URL: &str = "https://insight.wanted.co.kr/api/company/{hash}";

const DEFAULT_USER_AGENT: &str = concat!("ratelens/", env!("CARGO_PKG_VERSION"));

/// Remote endpoints used by [`HttpSource`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub rating_page_url: String,
    pub company_info_url: String,
    pub financial_report_url: String,
    pub user_agent: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            rating_page_url: DEFAULT_RATING_PAGE_URL.to_string(),
            company_info_url: DEFAULT_COMPANY_INFO_URL.to_string(),
            financial_report_url: DEFAULT_FINANCIAL_REPORT_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Fill a `{placeholder}` in a URL template with an encoded value.
pub fn fill_template(template: &str, placeholder: &str, value: &str) -> String {
    template.replace(&format!("{{{}}}", placeholder), &urlencoding::encode(value))
}

/// Map a non-success HTTP status to a fetch failure.
pub fn classify_status(status: StatusCode, what: &str) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            FetchError::Forbidden { status: status.as_u16() }
        }
        other => FetchError::Network(format!("unexpected status {} for {}", other, what)),
    }
}

pub struct HttpSource {
    client: Client,
    endpoints: EndpointConfig,
}

impl HttpSource {
    pub fn new(endpoints: EndpointConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(endpoints.user_agent.clone())
            .build()
            .map_err(|e| EnrichError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, endpoints })
    }

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    async fn get_text(&self, url: &str, what: &str) -> std::result::Result<String, FetchError> {
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, what));
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl EnrichmentSource for HttpSource {
    async fn fetch_rating_page(&self, name: &str) -> std::result::Result<String, FetchError> {
        let url = fill_template(&self.endpoints.rating_page_url, "name", name);
        self.get_text(&url, name).await
    }

    async fn fetch_external_id(&self, entity_id: &str) -> std::result::Result<String, FetchError> {
        let url = fill_template(&self.endpoints.company_info_url, "id", entity_id);
        let body = self.get_text(&url, entity_id).await?;
        parse_external_ref(&body)
    }

    async fn fetch_financial_report(&self, reference: &str) -> std::result::Result<Vec<YearlyReport>, FetchError> {
        let url = fill_template(&self.endpoints.financial_report_url, "hash", reference);
        let body = self.get_text(&url, reference).await?;
        parse_financial_report(&body)
    }
}

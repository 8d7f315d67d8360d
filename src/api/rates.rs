use super::{get_text, RateSource, RateTable};
use crate::error::InvalidPayload;
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Client for the Open Exchange Rates API.
pub struct OpenExchangeRates {
    client: reqwest::Client,
    latest_url: String,
    historical_url: String,
}

impl OpenExchangeRates {
    /// `historical_url` contains a `{date}` placeholder that is replaced with `YYYY-MM-DD`.
    pub fn new(
        client: reqwest::Client,
        latest_url: impl Into<String>,
        historical_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            latest_url: latest_url.into(),
            historical_url: historical_url.into(),
        }
    }

    async fn fetch(&self, url: &str, api_key: &str) -> Result<RateTable> {
        let url = Url::parse_with_params(url, &[("app_id", api_key)])
            .with_context(|| format!("Invalid rates URL '{url}'"))?;
        let body = get_text(&self.client, url.as_str()).await?;
        parse_rates(&body)
    }
}

#[async_trait::async_trait]
impl RateSource for OpenExchangeRates {
    async fn fetch_latest_rates(&self, api_key: &str) -> Result<RateTable> {
        debug!("Loading latest conversion rates");
        self.fetch(&self.latest_url, api_key).await
    }

    async fn fetch_historical_rates(&self, api_key: &str, date: NaiveDate) -> Result<RateTable> {
        let date = date.format("%Y-%m-%d").to_string();
        debug!("Loading conversion rates for {date}");
        let url = self.historical_url.replace("{date}", &date);
        self.fetch(&url, api_key).await
    }
}

/// Extracts the `rates` object of a response. Entries that are not numbers are skipped.
pub(crate) fn parse_rates(body: &str) -> Result<RateTable> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| InvalidPayload(format!("rates response is not JSON: {e}")))?;
    let rates = value
        .get("rates")
        .and_then(Value::as_object)
        .ok_or_else(|| InvalidPayload("rates response has no rates object".to_string()))?;
    Ok(rates
        .iter()
        .filter_map(|(code, rate)| rate.as_f64().map(|r| (code.clone(), r)))
        .collect())
}

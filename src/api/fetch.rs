use super::{get_text, Fetch};
use crate::error::InvalidPayload;
use crate::Result;
use anyhow::Context;
use serde_json::Value;
use url::Url;

/// Fetches JSON documents relative to the marketplace API base URL.
pub struct HttpFetch {
    client: reqwest::Client,
    base: Url,
}

impl HttpFetch {
    pub fn new(client: reqwest::Client, api_url: &str) -> Result<Self> {
        let mut base = Url::parse(api_url).with_context(|| format!("Invalid API URL '{api_url}'"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    /// Locators such as `item:123.json` would parse as absolute URLs, so they are joined as paths.
    fn url(&self, locator: &str) -> Result<Url> {
        self.base
            .join(&format!("./{}", locator.trim_start_matches('/')))
            .with_context(|| format!("Invalid resource locator '{locator}'"))
    }
}

#[async_trait::async_trait]
impl Fetch for HttpFetch {
    async fn fetch_json(&self, locator: &str) -> Result<Value> {
        let url = self.url(locator)?;
        let body = get_text(&self.client, url.as_str()).await?;
        serde_json::from_str(&body)
            .map_err(|e| InvalidPayload(format!("{locator} is not JSON: {e}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locators_resolve_under_the_base_path() {
        let fetch = HttpFetch::new(reqwest::Client::new(), "https://api.example.com/v1").unwrap();
        assert_eq!(
            fetch.url("item:123.json").unwrap().as_str(),
            "https://api.example.com/v1/item:123.json"
        );
    }
}

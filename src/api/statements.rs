//! Downloads monthly statement CSV files from the marketplace.

use super::{get_text, BatchSource};
use crate::error::InvalidPayload;
use crate::model::{Period, RawRecord};
use crate::Result;
use anyhow::Context;
use std::collections::HashMap;
use tracing::{debug, trace};
use url::Url;

pub struct HttpBatchSource {
    client: reqwest::Client,
    username: String,
    statement_url: String,
    statement_page_url: String,
}

impl HttpBatchSource {
    /// `statement_url` may contain `{username}`, `{month}` and `{year}`. `statement_page_url` may
    /// contain `{username}`.
    pub fn new(
        client: reqwest::Client,
        username: impl Into<String>,
        statement_url: impl Into<String>,
        statement_page_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            username: username.into(),
            statement_url: statement_url.into(),
            statement_page_url: statement_page_url.into(),
        }
    }

    fn batch_url(&self, period: Period) -> String {
        self.statement_url
            .replace("{username}", &self.username)
            .replace("{month}", &period.month().to_string())
            .replace("{year}", &period.year().to_string())
    }
}

#[async_trait::async_trait]
impl BatchSource for HttpBatchSource {
    async fn fetch_period_batch(&self, period: Period) -> Result<Vec<RawRecord>> {
        let url = self.batch_url(period);
        debug!("Downloading statements for {period} from {url}");
        let body = get_text(&self.client, &url).await?;
        parse_statement_csv(&body).with_context(|| format!("Unable to parse statements for {period}"))
    }

    async fn archive_hints(&self) -> Result<Vec<Period>> {
        let url = self.statement_page_url.replace("{username}", &self.username);
        let body = get_text(&self.client, &url).await?;
        Ok(parse_archive_hints(&body, &url))
    }
}

/// Lower-cases a CSV header and replaces its first run of non-alphanumeric characters with `_`,
/// so `Item ID` becomes `item_id`.
pub fn normalize_header(header: &str) -> String {
    let lower = header.trim().to_lowercase();
    let Some(start) = lower.find(|c: char| !c.is_ascii_alphanumeric()) else {
        return lower;
    };
    let rest = &lower[start..];
    let end = rest
        .find(|c: char| c.is_ascii_alphanumeric())
        .map(|i| start + i)
        .unwrap_or(lower.len());
    format!("{}_{}", &lower[..start], &lower[end..])
}

/// Parses a statement CSV file. The header row decides which column holds which field; `date`,
/// `type` and `amount` are required.
pub fn parse_statement_csv(data: &str) -> Result<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data.as_bytes());
    let headers = reader.headers().context("Unable to read the CSV header")?;
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (normalize_header(h), i))
        .collect();
    let required = |name: &str| -> Result<usize> {
        columns
            .get(name)
            .copied()
            .ok_or_else(|| InvalidPayload(format!("statement has no '{name}' column")).into())
    };
    let date = required("date")?;
    let kind = required("type")?;
    let amount = required("amount")?;
    let detail = columns.get("detail").copied();
    let item_id = columns.get("item_id").copied();
    let rate = columns.get("rate").copied();
    let price = columns.get("price").copied();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.context("Unable to read a CSV row")?;
        let field = |i: usize| row.get(i).unwrap_or_default().to_string();
        let optional = |i: Option<usize>| {
            i.and_then(|i| row.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        records.push(RawRecord {
            date: field(date),
            kind: field(kind),
            detail: optional(detail),
            item_id: optional(item_id),
            amount: field(amount),
            rate: optional(rate),
            price: optional(price),
        });
    }
    trace!("Parsed {} statement rows", records.len());
    Ok(records)
}

/// Finds links carrying `month=M&year=Y` query parameters in an HTML page and returns the periods
/// they point at, oldest first and without duplicates.
pub fn parse_archive_hints(html: &str, base: &str) -> Vec<Period> {
    let base = Url::parse(base).ok();
    let mut periods: Vec<Period> = html
        .split("href=\"")
        .skip(1)
        .filter_map(|chunk| chunk.split('"').next())
        .filter_map(|href| {
            let link = match &base {
                Some(base) => base.join(&href.replace("&amp;", "&")).ok()?,
                None => Url::parse(href).ok()?,
            };
            let mut month = None;
            let mut year = None;
            for (key, value) in link.query_pairs() {
                match key.as_ref() {
                    "month" => month = value.parse::<u32>().ok(),
                    "year" => year = value.parse::<i32>().ok(),
                    _ => {}
                }
            }
            Period::new(year?, month?).ok()
        })
        .collect();
    periods.sort();
    periods.dedup();
    periods
}

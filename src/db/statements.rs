//! Operations on the `statements` table, written against the `Store` trait.

use crate::model::{decimal_to_store, Period, RecordKind, StatementRecord, DATE_FORMAT};
use crate::query::{Param, Store};
use crate::Result;
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

const INSERT: &str = "INSERT INTO statements \
    (date, type, detail, item, amount, rate, price, amount_converted) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

const DELETE_PERIOD: &str = "DELETE FROM statements WHERE strftime('%m-%Y', date) = ?";

const UPDATE_CONVERTED: &str =
    "UPDATE statements SET amount_converted = amount * ? WHERE strftime('%m-%Y', date) = ?";

/// What replacing the records of one period did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ReplaceReport {
    pub(crate) deleted: u64,
    pub(crate) inserted: u64,
    /// Rows the store refused. They are logged and skipped.
    pub(crate) failed: u64,
}

fn insert_params(record: &StatementRecord) -> Vec<Param> {
    vec![
        Param::Text(record.occurred_at.format(DATE_FORMAT).to_string()),
        Param::Int(record.kind.code()),
        Param::Text(record.detail.clone()),
        Param::from(record.item_id),
        Param::Real(decimal_to_store(record.amount)),
        Param::from(record.rate.map(decimal_to_store)),
        Param::from(record.price.map(decimal_to_store)),
        Param::Real(decimal_to_store(record.converted_amount)),
    ]
}

/// Deletes every record of `period` and inserts `records` in their place.
///
/// Failing to delete is an error, since inserting on top of the old rows would duplicate them.
/// A row that fails to insert is logged and counted, and the rest of the batch still goes in.
pub(crate) async fn replace_period(
    store: &dyn Store,
    period: Period,
    records: &[StatementRecord],
) -> Result<ReplaceReport> {
    let deleted = store
        .execute(DELETE_PERIOD, &[Param::Text(period.sql_key())])
        .await
        .with_context(|| format!("Unable to clear the records of {period}"))?
        .rows_affected;

    let mut report = ReplaceReport {
        deleted,
        ..ReplaceReport::default()
    };
    for record in records {
        match store.execute(INSERT, &insert_params(record)).await {
            Ok(_) => report.inserted += 1,
            Err(e) => {
                warn!("Skipping a record of {period} dated {}: {e:#}", record.occurred_at);
                report.failed += 1;
            }
        }
    }
    debug!(
        "Replaced {} records of {period} with {}",
        report.deleted, report.inserted
    );
    Ok(report)
}

/// Sets `amount_converted = amount * rate` for every record of `period`. Returns the number of rows
/// touched.
pub(crate) async fn update_converted(store: &dyn Store, period: Period, rate: f64) -> Result<u64> {
    let result = store
        .execute(
            UPDATE_CONVERTED,
            &[Param::Real(rate), Param::Text(period.sql_key())],
        )
        .await
        .with_context(|| format!("Unable to convert the records of {period}"))?;
    Ok(result.rows_affected)
}

async fn min_date(store: &dyn Store, sql: &str, params: &[Param]) -> Result<Option<NaiveDateTime>> {
    let result = store.execute(sql, params).await?;
    let Some(date) = result.first().and_then(|row| row.str("date")) else {
        return Ok(None);
    };
    let parsed = NaiveDateTime::parse_from_str(date, DATE_FORMAT)
        .with_context(|| format!("Stored date '{date}' is malformed"))?;
    Ok(Some(parsed))
}

/// The period of the oldest stored record, `None` when the store is empty.
pub(crate) async fn oldest_period(store: &dyn Store) -> Result<Option<Period>> {
    let oldest = min_date(store, "SELECT MIN(date) AS date FROM statements", &[]).await?;
    Ok(oldest.map(|d| Period::from_date(d.date())))
}

/// The date of the first stored sale.
pub(crate) async fn first_sale(store: &dyn Store) -> Result<Option<NaiveDate>> {
    let first = min_date(
        store,
        "SELECT MIN(date) AS date FROM statements WHERE type = ?",
        &[Param::Int(RecordKind::Sale.code())],
    )
    .await?;
    Ok(first.map(|d| d.date()))
}

pub(crate) async fn count(store: &dyn Store) -> Result<u64> {
    let result = store
        .execute("SELECT COUNT(*) AS total FROM statements", &[])
        .await?;
    let total = result.first().and_then(|row| row.i64("total")).unwrap_or(0);
    Ok(u64::try_from(total).unwrap_or_default())
}

/// Removes every record.
pub(crate) async fn clear(store: &dyn Store) -> Result<u64> {
    let result = store
        .execute("DELETE FROM statements", &[])
        .await
        .context("Unable to clear the statement store")?;
    Ok(result.rows_affected)
}

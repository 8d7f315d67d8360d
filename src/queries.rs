//! The standard derived queries: totals for the whole history, the current month and the current
//! week, and the chart series.

use crate::model::{Period, RecordKind};
use crate::query::{Param, Query, QueryQueue, QueryResult, QuerySpec, Snapshot, Store};
use crate::settings::{
    Settings, CHART_RANGE, CURRENCY, DEFAULT_CHART_RANGE, FIRST_SALE, TODAY, USE_CHART_RANGE,
};
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

const SALE: i64 = RecordKind::Sale.code();
const REFERRAL_CUT: i64 = RecordKind::ReferralCut.code();

const STATS: &str = "SELECT COUNT(*) AS total, SUM(amount) AS totalAmount, \
    SUM(amount_converted) AS totalAmountConverted, SUM(price) AS totalPrice \
    FROM statements WHERE type = ?";

const REF_CUT: &str = "SELECT COUNT(*) AS total, SUM(amount) AS totalAmount, \
    SUM(amount_converted) AS totalAmountConverted \
    FROM statements WHERE type = ?";

const SINCE: &str = " AND date >= ?";

/// Bucketing of the sales chart, chosen from the number of days it covers.
fn bucket_format(days: i64) -> &'static str {
    if days < 50 {
        "%Y-%m-%d"
    } else if days < 250 {
        "%Y-%W"
    } else {
        "%Y-%m"
    }
}

fn midnight(date: NaiveDate) -> String {
    date.format("%Y-%m-%d 00:00:00").to_string()
}

/// The span a chart covers: the last `chart_range` days, or everything since the first sale when
/// the fixed range is turned off and the first sale is known.
#[derive(Debug, Clone, PartialEq)]
struct ChartSpan {
    days: i64,
    since: Option<NaiveDate>,
}

impl ChartSpan {
    fn from_snapshot(s: &Snapshot) -> Self {
        let today = s.date(TODAY);
        let use_range = s.bool(USE_CHART_RANGE).unwrap_or(true);
        if let (false, Some(first), Some(today)) = (use_range, s.date(FIRST_SALE), today) {
            return Self {
                days: (today - first).num_days().max(1),
                since: None,
            };
        }
        let range = s.i64(CHART_RANGE).unwrap_or(DEFAULT_CHART_RANGE).max(1);
        Self {
            days: range,
            since: today.map(|t| t - Duration::days(range - 1)),
        }
    }

    fn condition(&self) -> &'static str {
        if self.since.is_some() {
            SINCE
        } else {
            ""
        }
    }

    fn params(&self) -> Vec<Param> {
        let mut params = vec![Param::Int(SALE)];
        if let Some(since) = self.since {
            params.push(Param::Text(midnight(since)));
        }
        params
    }
}

fn month_start(s: &Snapshot) -> Option<NaiveDate> {
    s.date(TODAY).map(|today| Period::from_date(today).first_day())
}

fn week_start(s: &Snapshot) -> Option<NaiveDate> {
    s.date(TODAY)
        .map(|today| today - Duration::days(i64::from(today.weekday().num_days_from_monday())))
}

/// Totals of one kind of record starting at the date computed by `start`.
fn totals_since(base: &'static str, kind: i64, start: fn(&Snapshot) -> Option<NaiveDate>) -> QuerySpec {
    QuerySpec::dynamic(
        move |_| format!("{base}{SINCE}"),
        move |s| {
            let since = start(s).map(midnight).unwrap_or_default();
            vec![Param::Int(kind), Param::Text(since)]
        },
    )
}

fn chart_sales() -> QuerySpec {
    QuerySpec::dynamic(
        |s| {
            let span = ChartSpan::from_snapshot(s);
            let format = bucket_format(span.days);
            format!(
                "SELECT strftime('{format}', date) AS date, COUNT(*) AS sales, \
                SUM(amount) AS totalAmount, SUM(amount_converted) AS totalAmountConverted \
                FROM statements WHERE type = ?{} GROUP BY strftime('{format}', date)",
                span.condition()
            )
        },
        |s| ChartSpan::from_snapshot(s).params(),
    )
}

fn chart_total() -> QuerySpec {
    QuerySpec::dynamic(
        |s| format!("{STATS}{}", ChartSpan::from_snapshot(s).condition()),
        |s| ChartSpan::from_snapshot(s).params(),
    )
}

fn chart_dispatch() -> QuerySpec {
    QuerySpec::dynamic(
        |s| {
            format!(
                "SELECT item, COUNT(*) AS sales, SUM(amount) AS totalAmount, \
                SUM(amount_converted) AS totalAmountConverted \
                FROM statements WHERE type = ?{} GROUP BY item LIMIT 15",
                ChartSpan::from_snapshot(s).condition()
            )
        },
        |s| ChartSpan::from_snapshot(s).params(),
    )
}

/// Sales counted per `strftime` field, e.g. `%w` for the weekday.
fn chart_sales_by(field: &'static str, alias: &'static str) -> QuerySpec {
    QuerySpec::dynamic(
        move |s| {
            format!(
                "SELECT COUNT(*) AS sales, strftime('{field}', date) AS {alias} \
                FROM statements WHERE type = ?{} GROUP BY strftime('{field}', date)",
                ChartSpan::from_snapshot(s).condition()
            )
        },
        |s| ChartSpan::from_snapshot(s).params(),
    )
}

/// The queries every view of the statements is built from. They share one queue.
#[derive(Debug)]
pub struct StandardQueries {
    pub global_stats: Arc<Query>,
    pub global_ref_cut: Arc<Query>,
    pub month_stats: Arc<Query>,
    pub month_ref_cut: Arc<Query>,
    pub week_stats: Arc<Query>,
    pub week_ref_cut: Arc<Query>,
    pub chart_sales: Arc<Query>,
    pub chart_total: Arc<Query>,
    pub chart_dispatch: Arc<Query>,
    pub chart_week_sales: Arc<Query>,
    pub chart_hour_sales: Arc<Query>,
}

impl StandardQueries {
    pub fn new(
        settings: &Settings,
        queue: &Arc<QueryQueue>,
        store: &Arc<dyn Store>,
        debounce: std::time::Duration,
    ) -> Self {
        let query = |name: &str, spec: QuerySpec, deps: &[&str]| {
            Query::new(
                name,
                spec,
                settings.dependencies(deps),
                Arc::clone(queue),
                Arc::clone(store),
                debounce,
            )
        };
        let dated = [TODAY, CURRENCY];
        let charted = [TODAY, CHART_RANGE, USE_CHART_RANGE, CURRENCY, FIRST_SALE];
        Self {
            global_stats: query(
                "global_stats",
                QuerySpec::fixed(STATS, vec![Param::Int(SALE)]),
                &[CURRENCY],
            ),
            global_ref_cut: query(
                "global_ref_cut",
                QuerySpec::fixed(REF_CUT, vec![Param::Int(REFERRAL_CUT)]),
                &[CURRENCY],
            ),
            month_stats: query("month_stats", totals_since(STATS, SALE, month_start), &dated),
            month_ref_cut: query(
                "month_ref_cut",
                totals_since(REF_CUT, REFERRAL_CUT, month_start),
                &dated,
            ),
            week_stats: query("week_stats", totals_since(STATS, SALE, week_start), &dated),
            week_ref_cut: query(
                "week_ref_cut",
                totals_since(REF_CUT, REFERRAL_CUT, week_start),
                &dated,
            ),
            chart_sales: query("chart_sales", chart_sales(), &charted),
            chart_total: query("chart_total", chart_total(), &charted),
            chart_dispatch: query("chart_dispatch", chart_dispatch(), &charted),
            chart_week_sales: query("chart_week_sales", chart_sales_by("%w", "day"), &charted),
            chart_hour_sales: query("chart_hour_sales", chart_sales_by("%H", "hour"), &charted),
        }
    }

    pub fn all(&self) -> Vec<Arc<Query>> {
        vec![
            self.global_stats.clone(),
            self.global_ref_cut.clone(),
            self.month_stats.clone(),
            self.month_ref_cut.clone(),
            self.week_stats.clone(),
            self.week_ref_cut.clone(),
            self.chart_sales.clone(),
            self.chart_total.clone(),
            self.chart_dispatch.clone(),
            self.chart_week_sales.clone(),
            self.chart_hour_sales.clone(),
        ]
    }
}

/// The single row of a totals query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub count: i64,
    pub amount: Decimal,
    pub converted: Decimal,
    /// Only sales carry a price.
    pub price: Option<Decimal>,
}

impl Totals {
    pub fn from_result(result: &QueryResult) -> Self {
        let Some(row) = result.first() else {
            return Self::default();
        };
        Self {
            count: row.i64("total").unwrap_or_default(),
            amount: row.decimal("totalAmount").unwrap_or_default(),
            converted: row.decimal("totalAmountConverted").unwrap_or_default(),
            price: row.decimal("totalPrice"),
        }
    }
}

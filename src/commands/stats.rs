use crate::commands::Out;
use crate::currency::BASE_CURRENCY;
use crate::db::statements;
use crate::library::Library;
use crate::model::format_currency_amount;
use crate::queries::Totals;
use crate::query::Query;
use crate::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    /// The currency the `display` amounts are in.
    pub currency: String,
    pub stored: u64,
    pub all_time: Span,
    pub month: Span,
    pub week: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct Span {
    pub sales: Totals,
    pub referral_cuts: Totals,
    /// Sales plus referral cuts in the display currency.
    pub display: Decimal,
}

async fn span(sales: &Arc<Query>, cuts: &Arc<Query>, converted: bool) -> Result<Span> {
    let sales = Totals::from_result(&*sales.result().await?);
    let referral_cuts = Totals::from_result(&*cuts.result().await?);
    let display = if converted {
        sales.converted + referral_cuts.converted
    } else {
        sales.amount + referral_cuts.amount
    };
    Ok(Span {
        sales,
        referral_cuts,
        display,
    })
}

/// Totals of sales and referral cuts for all time, the current month and the current week.
pub async fn stats(library: &Library) -> Result<Out<Stats>> {
    let settings = library.settings();
    let currency = settings.currency.get();
    // Converted amounts are only meaningful in the currency they were converted to.
    let converted = currency != BASE_CURRENCY
        && settings.currency_alt.get().as_deref() == Some(currency.as_str());
    let currency = if converted {
        currency
    } else {
        BASE_CURRENCY.to_string()
    };

    let q = library.queries();
    let stats = Stats {
        stored: statements::count(library.store().as_ref()).await?,
        all_time: span(&q.global_stats, &q.global_ref_cut, converted).await?,
        month: span(&q.month_stats, &q.month_ref_cut, converted).await?,
        week: span(&q.week_stats, &q.week_ref_cut, converted).await?,
        currency,
    };

    let line = |label: &str, span: &Span| {
        format!(
            "{label}: {} sales, {}",
            span.sales.count,
            format_currency_amount(&stats.currency, span.display, 2)
        )
    };
    let message = [
        format!("{} statements stored", stats.stored),
        line("All time", &stats.all_time),
        line("This month", &stats.month),
        line("This week", &stats.week),
    ]
    .join("\n");
    Ok(Out::new(message, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_stats_after_sync() {
        let env = TestEnv::new().await;
        let library = env.library();
        library.sync(false).await.unwrap();

        let out = stats(&library).await.unwrap();
        let stats = out.structure().unwrap();
        assert_eq!(stats.currency, "USD");
        assert_eq!(stats.stored, 8);
        assert_eq!(stats.all_time.sales.count, 8);
        assert_eq!(stats.all_time.display, Decimal::from(80));
        // 2024-02-20: three February sales on the 1st to the 3rd, none this week.
        assert_eq!(stats.month.sales.count, 3);
        assert_eq!(stats.week.sales.count, 0);
        assert_eq!(stats.week.display, Decimal::ZERO);
        assert!(out.message().contains("All time: 8 sales"));
    }

    #[tokio::test]
    async fn test_stats_in_the_alternate_currency() {
        let env = TestEnv::new().await;
        let library = env.library();
        library.sync(false).await.unwrap();
        library.settings().oer_key.set(Some("secret".into()), false);
        library.set_alt_currency("EUR").await;

        // Displaying a currency that is not the converted one falls back to dollars.
        library.settings().currency.set("GBP".into(), false);
        let out = stats(&library).await.unwrap();
        assert_eq!(out.structure().unwrap().currency, "USD");
        assert_eq!(out.structure().unwrap().all_time.display, Decimal::from(80));

        library.settings().currency.set("EUR".into(), false);
        let out = stats(&library).await.unwrap();
        let stats = out.structure().unwrap();
        assert_eq!(stats.currency, "EUR");
        assert_eq!(stats.all_time.display, Decimal::from(72));
        assert_eq!(stats.month.display, Decimal::from(27));
    }
}

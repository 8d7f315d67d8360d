use crate::backfill::BackfillOutcome;
use crate::commands::Out;
use crate::currency::{self, BASE_CURRENCY};
use crate::library::Library;
use crate::model::Period;
use crate::Result;
use anyhow::{bail, ensure};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CurrencySummary {
    pub currency: String,
    pub currency_alt: Option<String>,
    pub current_rate: Option<Decimal>,
    pub last_finalized: Option<Period>,
}

impl CurrencySummary {
    fn of(library: &Library) -> Self {
        let settings = library.settings();
        Self {
            currency: settings.currency.get(),
            currency_alt: settings.currency_alt.get(),
            current_rate: settings.currency_current_rate.get(),
            last_finalized: settings.last_finalized.get(),
        }
    }
}

/// Converts every stored amount to `code` and displays amounts in it, or goes back to the
/// statement currency when `code` is `None`.
pub async fn currency(library: &Library, code: Option<&str>) -> Result<Out<CurrencySummary>> {
    let settings = library.settings();
    let Some(code) = code.map(|c| c.trim().to_uppercase()) else {
        settings.currency.set(BASE_CURRENCY.to_string(), false);
        library.rates().refresh_current_rate().await;
        return Ok(Out::new(
            format!("Amounts are displayed in {BASE_CURRENCY}"),
            CurrencySummary::of(library),
        ));
    };
    let Some(known) = currency::find(&code) else {
        bail!("'{code}' is not a supported currency");
    };
    if code != BASE_CURRENCY {
        ensure!(
            settings.oer_key.get().is_some(),
            "Converting to {code} needs exchange rates, set an Open Exchange Rates app id with \
            `statsync rates-key` first"
        );
    }

    match library.set_alt_currency(&code).await {
        BackfillOutcome::Superseded => {
            return Ok(format!("The conversion to {code} was replaced by a newer one").into())
        }
        BackfillOutcome::Completed(_) | BackfillOutcome::Unchanged(_) => {}
    }
    settings.currency.set(code.clone(), false);
    library.rates().refresh_current_rate().await;
    Ok(Out::new(
        format!("Amounts are converted to and displayed in {} ({code})", known.name),
        CurrencySummary::of(library),
    ))
}

/// Stores the Open Exchange Rates app id.
pub async fn rates_key(library: &Library, key: &str) -> Result<Out<CurrencySummary>> {
    let key = key.trim();
    ensure!(!key.is_empty(), "The app id must not be empty");
    library.settings().oer_key.set(Some(key.to_string()), false);
    library.rates().refresh_current_rate().await;
    Ok(Out::new(
        "Stored the Open Exchange Rates app id",
        CurrencySummary::of(library),
    ))
}

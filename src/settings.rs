//! The catalogue of settings the library works with.

use crate::clock::Clock;
use crate::currency::BASE_CURRENCY;
use crate::model::Period;
use crate::persist::Persistence;
use crate::setting::{Dependency, Setting};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;

pub const TODAY: &str = "today";
pub const CHART_RANGE: &str = "chart_range";
pub const USE_CHART_RANGE: &str = "use_chart_range";
pub const CURRENCY: &str = "currency";
pub const CURRENCY_ALT: &str = "currency_alt";
pub const CURRENCY_CURRENT_RATE: &str = "currency_current_rate";
pub const OER_KEY: &str = "oer_key";
pub const CONVERT_DAY: &str = "convert_day";
pub const LAST_FINALIZED: &str = "last_finalized";
pub const AUTO_REFRESH: &str = "auto_refresh";
pub const AUTO_REFRESH_DELAY_MS: &str = "auto_refresh_delay_ms";
pub const FIRST_SALE: &str = "first_sale";

/// Days shown by the charts when a fixed range is in use.
pub const DEFAULT_CHART_RANGE: i64 = 30;
/// Day of the month after a period whose historical rate finalizes that period.
pub const DEFAULT_CONVERT_DAY: u32 = 15;
pub const DEFAULT_AUTO_REFRESH_DELAY_MS: u64 = 15 * 60 * 1000;

#[derive(Debug)]
pub struct Settings {
    /// The current date of the reference clock. Kept up to date by the clock ticker.
    pub today: Arc<Setting<NaiveDate>>,
    pub chart_range: Arc<Setting<i64>>,
    pub use_chart_range: Arc<Setting<bool>>,
    /// The currency amounts are displayed in.
    pub currency: Arc<Setting<String>>,
    /// The target of the conversion backfill, if any.
    pub currency_alt: Arc<Setting<Option<String>>>,
    /// The live rate of `currency`, refreshed with the latest rates.
    pub currency_current_rate: Arc<Setting<Option<Decimal>>>,
    /// Open Exchange Rates app id.
    pub oer_key: Arc<Setting<Option<String>>>,
    pub convert_day: Arc<Setting<u32>>,
    /// The latest period whose converted amounts use a final rate.
    pub last_finalized: Arc<Setting<Option<Period>>>,
    pub auto_refresh: Arc<Setting<bool>>,
    pub auto_refresh_delay_ms: Arc<Setting<u64>>,
    pub first_sale: Arc<Setting<Option<NaiveDate>>>,
}

impl Settings {
    pub fn new(persistence: Arc<dyn Persistence>, clock: &dyn Clock) -> Self {
        let p = || Arc::clone(&persistence);
        Self {
            today: Arc::new(Setting::transient(TODAY, clock.today())),
            chart_range: Arc::new(Setting::new(CHART_RANGE, DEFAULT_CHART_RANGE, p())),
            use_chart_range: Arc::new(Setting::new(USE_CHART_RANGE, true, p())),
            currency: Arc::new(Setting::new(CURRENCY, BASE_CURRENCY.to_string(), p())),
            currency_alt: Arc::new(Setting::new(CURRENCY_ALT, None, p())),
            currency_current_rate: Arc::new(Setting::transient(CURRENCY_CURRENT_RATE, None)),
            oer_key: Arc::new(Setting::new(OER_KEY, None, p())),
            convert_day: Arc::new(Setting::new(CONVERT_DAY, DEFAULT_CONVERT_DAY, p())),
            last_finalized: Arc::new(Setting::new(LAST_FINALIZED, None, p())),
            auto_refresh: Arc::new(Setting::new(AUTO_REFRESH, false, p())),
            auto_refresh_delay_ms: Arc::new(Setting::new(
                AUTO_REFRESH_DELAY_MS,
                DEFAULT_AUTO_REFRESH_DELAY_MS,
                p(),
            )),
            first_sale: Arc::new(Setting::transient(FIRST_SALE, None)),
        }
    }

    /// Puts every setting back to its default, except `today`, which always follows the clock.
    pub fn reset_all(&self) {
        self.chart_range.reset();
        self.use_chart_range.reset();
        self.currency.reset();
        self.currency_alt.reset();
        self.currency_current_rate.reset();
        self.oer_key.reset();
        self.convert_day.reset();
        self.last_finalized.reset();
        self.auto_refresh.reset();
        self.auto_refresh_delay_ms.reset();
        self.first_sale.reset();
    }

    /// The settings as query dependencies, looked up by name.
    pub fn dependency(&self, name: &str) -> Option<Arc<dyn Dependency>> {
        let dependency: Arc<dyn Dependency> = match name {
            TODAY => self.today.clone(),
            CHART_RANGE => self.chart_range.clone(),
            USE_CHART_RANGE => self.use_chart_range.clone(),
            CURRENCY => self.currency.clone(),
            CURRENCY_ALT => self.currency_alt.clone(),
            CURRENCY_CURRENT_RATE => self.currency_current_rate.clone(),
            OER_KEY => self.oer_key.clone(),
            CONVERT_DAY => self.convert_day.clone(),
            LAST_FINALIZED => self.last_finalized.clone(),
            AUTO_REFRESH => self.auto_refresh.clone(),
            AUTO_REFRESH_DELAY_MS => self.auto_refresh_delay_ms.clone(),
            FIRST_SALE => self.first_sale.clone(),
            _ => return None,
        };
        Some(dependency)
    }

    /// Several dependencies at once. Unknown names are skipped.
    pub fn dependencies(&self, names: &[&str]) -> Vec<Arc<dyn Dependency>> {
        names.iter().filter_map(|name| self.dependency(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::persist::{MemoryPersistence, OPTIONS};

    fn clock() -> FixedClock {
        FixedClock::new(
            NaiveDate::from_ymd_opt(2024, 2, 20)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_defaults_and_persistence() {
        let persistence: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());
        let settings = Settings::new(persistence.clone(), &clock());
        assert_eq!(settings.today.get(), NaiveDate::from_ymd_opt(2024, 2, 20).unwrap());
        assert_eq!(settings.currency.get(), "USD");
        assert_eq!(settings.convert_day.get(), 15);
        assert_eq!(settings.last_finalized.get(), None);

        let jan = Period::new(2024, 1).unwrap();
        settings.currency_alt.set(Some("EUR".to_string()), false);
        settings.last_finalized.set(Some(jan), false);
        settings.first_sale.set(NaiveDate::from_ymd_opt(2024, 1, 1), false);

        // Cacheable settings come back, transient ones do not.
        let reopened = Settings::new(persistence.clone(), &clock());
        assert_eq!(reopened.currency_alt.get().as_deref(), Some("EUR"));
        assert_eq!(reopened.last_finalized.get(), Some(jan));
        assert_eq!(reopened.first_sale.get(), None);

        reopened.reset_all();
        assert_eq!(reopened.currency_alt.get(), None);
        assert!(persistence.get_object(OPTIONS).unwrap().is_empty());
    }

    #[test]
    fn test_dependency_lookup() {
        let settings = Settings::new(Arc::new(MemoryPersistence::new()), &clock());
        let deps = settings.dependencies(&[TODAY, CURRENCY, "nope"]);
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].name(), TODAY);
        assert_eq!(deps[1].json_value(), serde_json::json!("USD"));
    }
}

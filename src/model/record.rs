use crate::model::amount::{parse_amount, parse_optional_amount};
use crate::Result;
use anyhow::Context;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// The timestamp layout used by the statement files and by the `date` column of the store.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The kind of a statement line. The store holds the integer `code`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Sale,
    Withdrawal,
    ReferralCut,
    Deposit,
    Purchase,
    Refund,
    #[default]
    Other,
}

serde_plain::derive_display_from_serialize!(RecordKind);
serde_plain::derive_fromstr_from_deserialize!(RecordKind);

impl RecordKind {
    pub const fn code(&self) -> i64 {
        match self {
            RecordKind::Other => 0,
            RecordKind::Sale => 1,
            RecordKind::Withdrawal => 2,
            RecordKind::ReferralCut => 3,
            RecordKind::Deposit => 4,
            RecordKind::Purchase => 5,
            RecordKind::Refund => 6,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => RecordKind::Sale,
            2 => RecordKind::Withdrawal,
            3 => RecordKind::ReferralCut,
            4 => RecordKind::Deposit,
            5 => RecordKind::Purchase,
            6 => RecordKind::Refund,
            _ => RecordKind::Other,
        }
    }

    /// Maps a type label from a statement file. Unknown labels become `Other`.
    pub fn from_label(label: &str) -> Self {
        label.trim().parse().unwrap_or(RecordKind::Other)
    }
}

/// One line of a statement as delivered by the batch source, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub date: String,
    pub kind: String,
    pub detail: Option<String>,
    pub item_id: Option<String>,
    pub amount: String,
    pub rate: Option<String>,
    pub price: Option<String>,
}

/// One financial event in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub occurred_at: NaiveDateTime,
    pub kind: RecordKind,
    pub detail: String,
    pub item_id: Option<i64>,
    pub amount: Decimal,
    pub rate: Option<Decimal>,
    pub price: Option<Decimal>,
    pub converted_amount: Decimal,
}

impl StatementRecord {
    /// Interprets a raw statement line. The timestamp is cut to its first 19 characters (time zone
    /// suffixes are dropped), sales lose their detail text, numbers that do not parse count as zero
    /// and the converted amount starts out equal to the amount.
    pub fn from_raw(raw: &RawRecord) -> Result<Self> {
        let date: String = raw.date.trim().chars().take(19).collect();
        let occurred_at = NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
            .with_context(|| format!("Invalid statement date '{}'", raw.date))?;
        let kind = RecordKind::from_label(&raw.kind);
        let detail = match kind {
            RecordKind::Sale => String::new(),
            _ => raw.detail.clone().unwrap_or_default(),
        };
        let item_id = raw
            .item_id
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok());
        let amount = parse_amount(&raw.amount).unwrap_or_else(|e| {
            trace!("Unparsable amount '{}' treated as zero: {e}", raw.amount);
            Decimal::ZERO
        });
        Ok(Self {
            occurred_at,
            kind,
            detail,
            item_id,
            amount,
            rate: raw.rate.as_deref().and_then(parse_optional_amount),
            price: raw.price.as_deref().and_then(parse_optional_amount),
            converted_amount: amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn raw(kind: &str, amount: &str) -> RawRecord {
        RawRecord {
            date: "2024-01-05 10:11:12 +1000".to_string(),
            kind: kind.to_string(),
            detail: Some("Payout".to_string()),
            item_id: Some("12345".to_string()),
            amount: amount.to_string(),
            rate: Some("70.0".to_string()),
            price: Some("".to_string()),
        }
    }

    #[test]
    fn test_kind_codes() {
        for kind in [
            RecordKind::Sale,
            RecordKind::Withdrawal,
            RecordKind::ReferralCut,
            RecordKind::Deposit,
            RecordKind::Purchase,
            RecordKind::Refund,
            RecordKind::Other,
        ] {
            assert_eq!(RecordKind::from_code(kind.code()), kind);
        }
        assert_eq!(RecordKind::from_code(42), RecordKind::Other);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(RecordKind::from_label("referral_cut"), RecordKind::ReferralCut);
        assert_eq!(RecordKind::from_label("bonus"), RecordKind::Other);
        assert_eq!(RecordKind::Sale.to_string(), "sale");
    }

    #[test]
    fn test_from_raw_sale() {
        let record = StatementRecord::from_raw(&raw("sale", "12.60")).unwrap();
        assert_eq!(record.kind, RecordKind::Sale);
        assert_eq!(record.detail, "");
        assert_eq!(record.item_id, Some(12345));
        assert_eq!(record.amount, Decimal::from_str("12.60").unwrap());
        assert_eq!(record.converted_amount, record.amount);
        assert_eq!(record.rate, Some(Decimal::from_str("70.0").unwrap()));
        assert_eq!(record.price, None);
        assert_eq!(
            record.occurred_at.format(DATE_FORMAT).to_string(),
            "2024-01-05 10:11:12"
        );
    }

    #[test]
    fn test_from_raw_keeps_detail_for_other_kinds() {
        let record = StatementRecord::from_raw(&raw("withdrawal", "-100")).unwrap();
        assert_eq!(record.detail, "Payout");
    }

    #[test]
    fn test_from_raw_unparsable_amount_is_zero() {
        let record = StatementRecord::from_raw(&raw("sale", "???")).unwrap();
        assert_eq!(record.amount, Decimal::ZERO);
    }

    #[test]
    fn test_from_raw_bad_date() {
        let mut r = raw("sale", "1");
        r.date = "yesterday".to_string();
        assert!(StatementRecord::from_raw(&r).is_err());
    }
}

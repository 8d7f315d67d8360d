//! Parsing and display of money values.
//!
//! Statement files carry plain decimal strings, sometimes with a leading dollar sign or thousands
//! separators. Internally every amount is a `Decimal`.

use crate::currency;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Decimal places kept when a floating point value read from the store becomes a `Decimal`.
pub const STORE_SCALE: u32 = 6;

/// An error that can occur when parsing strings into `Decimal` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Parses `-$1,234.50`, `1234.5`, `$12` and friends. An empty string is zero.
///
/// ```
/// # use statsync::model::parse_amount;
/// # use rust_decimal::Decimal;
/// # use std::str::FromStr;
/// assert_eq!(parse_amount("-$1,234.50").unwrap(), Decimal::from_str("-1234.50").unwrap());
/// assert_eq!(parse_amount("").unwrap(), Decimal::ZERO);
/// ```
pub fn parse_amount(s: &str) -> Result<Decimal, AmountError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let (negative, rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let rest = rest.strip_prefix('$').unwrap_or(rest).replace(',', "");
    let value = Decimal::from_str(&rest).map_err(AmountError)?;
    Ok(if negative { -value } else { value })
}

/// Like `parse_amount` but yields `None` for blank or unparsable input.
pub fn parse_optional_amount(s: &str) -> Option<Decimal> {
    if s.trim().is_empty() {
        return None;
    }
    parse_amount(s).ok()
}

/// Converts a floating point value coming out of the store into a `Decimal`.
pub fn decimal_from_store(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .unwrap_or_default()
        .round_dp(STORE_SCALE)
        .normalize()
}

/// Converts a `Decimal` into the floating point representation the store uses.
pub fn decimal_to_store(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// Formats `amount` with thousands separators and the symbol of `currency`, e.g. `€1,234.50`.
/// Currencies without a known symbol are written with their code: `1,234 XAF`.
pub fn format_currency_amount(currency: &str, amount: Decimal, decimals: usize) -> String {
    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    let pattern = format!(",.{decimals}");
    let number = format_num::format_num!(&pattern, amount.abs().to_f64().unwrap_or_default());
    match currency::symbol(currency) {
        Some(symbol) => format!("{sign}{symbol}{number}"),
        None => format!("{sign}{number} {currency}"),
    }
}

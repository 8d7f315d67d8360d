//! Types that represent the core data model, such as `StatementRecord` and `Period`.
mod amount;
mod period;
mod record;

pub use amount::{
    decimal_from_store, decimal_to_store, format_currency_amount, parse_amount,
    parse_optional_amount, AmountError,
};
pub use period::Period;
pub use record::{RawRecord, RecordKind, StatementRecord, DATE_FORMAT};

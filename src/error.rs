use std::fmt::{Display, Formatter};

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// A remote payload that arrived but could not be understood, e.g. a rates response without a
/// `rates` object. It is retried like any other remote failure but logged separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPayload(pub String);

impl Display for InvalidPayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid payload: {}", self.0)
    }
}

impl std::error::Error for InvalidPayload {}

/// Returns `true` if `e`, or anything in its chain, is an `InvalidPayload`.
pub(crate) fn is_invalid_payload(e: &Error) -> bool {
    e.chain().any(|cause| cause.downcast_ref::<InvalidPayload>().is_some())
}

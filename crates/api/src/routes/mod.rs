pub mod cart;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod vendor;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path identifier, rejecting malformed values with 400.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("INVALID_ID", format!("Invalid {what}: {raw}")))
}

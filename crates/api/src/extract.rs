//! Actor identity extractors.
//!
//! Authentication happens upstream; the gateway forwards the caller's id in
//! a header and these extractors only check that it is present and well
//! formed.

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use domain::{CustomerId, VendorId};

use crate::error::ApiError;

pub const CUSTOMER_HEADER: &str = "x-customer-id";
pub const VENDOR_HEADER: &str = "x-vendor-id";
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// The calling customer.
#[derive(Debug, Clone, Copy)]
pub struct Customer(pub CustomerId);

/// The calling vendor.
#[derive(Debug, Clone, Copy)]
pub struct Vendor(pub VendorId);

fn identity<T: FromStr>(parts: &Parts, header: &'static str) -> Result<T, ApiError> {
    let value = parts
        .headers
        .get(header)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {header} header")))?;
    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("malformed {header} header")))
}

impl<S: Send + Sync> FromRequestParts<S> for Customer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity(parts, CUSTOMER_HEADER).map(Customer)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Vendor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity(parts, VENDOR_HEADER).map(Vendor)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(header: Option<(&str, &str)>) -> Parts {
        let mut builder = Request::builder().uri("/cart");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn reads_customer_header() {
        let id = CustomerId::new();
        let mut parts = parts(Some((CUSTOMER_HEADER, &id.to_string())));
        let Customer(found) = Customer::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(found, id);
    }

    #[tokio::test]
    async fn missing_or_malformed_is_unauthorized() {
        let mut missing = parts(None);
        assert!(matches!(
            Vendor::from_request_parts(&mut missing, &()).await,
            Err(ApiError::Unauthorized(_))
        ));

        let mut malformed = parts(Some((VENDOR_HEADER, "vendor-42")));
        assert!(matches!(
            Vendor::from_request_parts(&mut malformed, &()).await,
            Err(ApiError::Unauthorized(_))
        ));
    }
}

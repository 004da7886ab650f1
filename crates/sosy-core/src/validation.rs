//! # Validation Module
//!
//! Checks applied before anything is written to a queue.
//!
//! ## Usage
//! ```rust,no_run
//! use sosy_core::validation::{validate_endpoint, validate_identity};
//!
//! validate_endpoint("/sales").unwrap();
//! validate_identity(12, 7).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::StockTakeCount;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest endpoint accepted into the offline queue.
pub const MAX_ENDPOINT_LENGTH: usize = 2048;

/// Validates an endpoint for a deferred request.
///
/// ## Rules
/// - Must not be empty
/// - At most 2048 characters
/// - Either a path starting with `/` or an absolute `http(s)://` URL
///
/// ## Example
/// ```rust
/// use sosy_core::validation::validate_endpoint;
///
/// assert!(validate_endpoint("/invoices/4").is_ok());
/// assert!(validate_endpoint("https://api.sosy.app/sales").is_ok());
/// assert!(validate_endpoint("").is_err());
/// assert!(validate_endpoint("ftp://host/x").is_err());
/// ```
pub fn validate_endpoint(url: &str) -> ValidationResult<()> {
    let url = url.trim();

    if url.is_empty() {
        return Err(ValidationError::required("url"));
    }

    if url.len() > MAX_ENDPOINT_LENGTH {
        return Err(ValidationError::TooLong {
            field: "url".to_string(),
            max: MAX_ENDPOINT_LENGTH,
        });
    }

    if !(url.starts_with('/') || url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::invalid_format(
            "url",
            "must be a path starting with '/' or an http(s) URL",
        ));
    }

    Ok(())
}

/// Validates the identity used to open a realtime session.
pub fn validate_identity(business_id: i64, user_id: i64) -> ValidationResult<()> {
    if business_id <= 0 {
        return Err(ValidationError::must_be_positive("business_id"));
    }
    if user_id <= 0 {
        return Err(ValidationError::must_be_positive("user_id"));
    }
    Ok(())
}

/// Validates a device identifier.
///
/// ```rust
/// use sosy_core::validation::validate_device_id;
///
/// assert!(validate_device_id("device_1700000000000_k3j9x0a1b").is_ok());
/// assert!(validate_device_id("  ").is_err());
/// ```
pub fn validate_device_id(device_id: &str) -> ValidationResult<()> {
    let device_id = device_id.trim();

    if device_id.is_empty() {
        return Err(ValidationError::required("device_id"));
    }

    if device_id.len() > 128 {
        return Err(ValidationError::TooLong {
            field: "device_id".to_string(),
            max: 128,
        });
    }

    if device_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::invalid_format(
            "device_id",
            "must not contain whitespace",
        ));
    }

    Ok(())
}

/// Validates one stock-take count.
pub fn validate_stock_count(count: &StockTakeCount) -> ValidationResult<()> {
    if count.session_id <= 0 {
        return Err(ValidationError::must_be_positive("session_id"));
    }
    if count.product_id <= 0 {
        return Err(ValidationError::must_be_positive("product_id"));
    }
    if !count.counted_qty.is_finite() {
        return Err(ValidationError::invalid_format(
            "counted_qty",
            "must be a finite number",
        ));
    }
    if count.counted_qty < 0.0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "counted_qty".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(session_id: i64, product_id: i64, counted_qty: f64) -> StockTakeCount {
        StockTakeCount {
            session_id,
            product_id,
            counted_qty,
            notes: None,
        }
    }

    #[test]
    fn test_endpoint_length_limit() {
        let long = format!("/{}", "a".repeat(MAX_ENDPOINT_LENGTH));
        assert!(matches!(
            validate_endpoint(&long),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn test_endpoint_rejects_relative_without_slash() {
        assert!(validate_endpoint("sales").is_err());
    }

    #[test]
    fn test_identity() {
        assert!(validate_identity(1, 1).is_ok());
        assert!(validate_identity(0, 1).is_err());
        assert!(validate_identity(1, -3).is_err());
    }

    #[test]
    fn test_stock_counts() {
        assert!(validate_stock_count(&count(1, 2, 0.0)).is_ok());
        assert!(validate_stock_count(&count(1, 2, 12.5)).is_ok());
        assert!(validate_stock_count(&count(0, 2, 1.0)).is_err());
        assert!(validate_stock_count(&count(1, 0, 1.0)).is_err());
        assert!(matches!(
            validate_stock_count(&count(1, 2, -1.0)),
            Err(ValidationError::MustNotBeNegative { .. })
        ));
        assert!(validate_stock_count(&count(1, 2, f64::NAN)).is_err());
    }

    #[test]
    fn test_device_id_whitespace() {
        assert!(validate_device_id("device 1").is_err());
    }
}

//! Order admission rules.
//!
//! Every rule is evaluated; the result lists all violations in rule order
//! (productId, quantity, price). The product reference is checked against the
//! [`ProductOracle`], bounded by an explicit lookup timeout. A lookup that
//! times out counts as unreachable, and unreachable counts as invalid.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clients::{ProductLookup, ProductOracle};
use crate::order::Order;

/// Numeric bounds for order fields.
pub mod limits {
    /// Quantities must be strictly below this value.
    pub const MAX_QUANTITY_EXCLUSIVE: u32 = 1_000_000;
    /// Total significant digits allowed in a price.
    pub const PRICE_PRECISION: u32 = 18;
    /// Fractional digits allowed in a price.
    pub const PRICE_SCALE: u32 = 2;
}

/// Field paths reported in failures.
pub mod fields {
    pub const PRODUCT_ID: &str = "productId";
    pub const QUANTITY: &str = "quantity";
    pub const PRICE: &str = "price";
}

/// Error constants for validation failures.
pub mod errmsg {
    pub const INVALID_PRODUCT_ID: &str = "Invalid ProductId";
    pub const PRODUCT_ID_EMPTY: &str = "'productId' must not be empty.";
    pub const QUANTITY_EMPTY: &str = "'quantity' must not be empty.";
    pub const QUANTITY_NOT_POSITIVE: &str = "'quantity' must be greater than '0'.";
    pub const QUANTITY_TOO_LARGE: &str = "'quantity' must be less than '1000000'.";
    pub const PRICE_EMPTY: &str = "'price' must not be empty.";
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Field path, e.g. `quantity`.
    pub field: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl ValidationFailure {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    failures: Vec<ValidationFailure>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }

    /// Failures on a single field, in rule order.
    pub fn failures_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationFailure> {
        self.failures.iter().filter(move |f| f.field == field)
    }

    pub fn has_failure(&self, field: &str) -> bool {
        self.failures_for(field).next().is_some()
    }

    fn push(&mut self, failure: ValidationFailure) {
        self.failures.push(failure);
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "valid");
        }
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", failure.field, failure.message)?;
        }
        Ok(())
    }
}

/// Validates order candidates.
#[derive(Clone)]
pub struct OrderValidator {
    oracle: Arc<dyn ProductOracle>,
    lookup_timeout: Duration,
}

impl OrderValidator {
    pub fn new(oracle: Arc<dyn ProductOracle>, lookup_timeout: Duration) -> Self {
        Self {
            oracle,
            lookup_timeout,
        }
    }

    /// Validate a candidate; all rules run, none short-circuits.
    #[tracing::instrument(name = "order.validate", skip_all, fields(order_id = %order.id))]
    pub async fn validate(&self, order: &Order) -> ValidationResult {
        let mut result = ValidationResult::default();

        for failure in self.check_product(order.product_id).await {
            result.push(failure);
        }
        for failure in check_quantity(order.quantity) {
            result.push(failure);
        }
        for failure in check_price(order.price) {
            result.push(failure);
        }

        debug!(valid = result.is_valid(), failures = result.failures.len(), "Validated order");
        result
    }

    async fn check_product(&self, product_id: Uuid) -> Vec<ValidationFailure> {
        if product_id.is_nil() {
            // A nil id never resolves; skip the remote call
            return vec![
                ValidationFailure::new(fields::PRODUCT_ID, errmsg::PRODUCT_ID_EMPTY),
                ValidationFailure::new(fields::PRODUCT_ID, errmsg::INVALID_PRODUCT_ID),
            ];
        }

        let lookup = match tokio::time::timeout(self.lookup_timeout, self.oracle.resolve(product_id))
            .await
        {
            Ok(lookup) => lookup,
            Err(_) => {
                warn!(
                    product_id = %product_id,
                    timeout_ms = %self.lookup_timeout.as_millis(),
                    "Product lookup timed out"
                );
                ProductLookup::Unreachable("lookup timed out".to_string())
            }
        };

        match lookup {
            ProductLookup::Found(_) => Vec::new(),
            ProductLookup::NotFound => {
                debug!(product_id = %product_id, "Product not found");
                vec![ValidationFailure::new(fields::PRODUCT_ID, errmsg::INVALID_PRODUCT_ID)]
            }
            ProductLookup::Unreachable(reason) => {
                warn!(product_id = %product_id, reason = %reason, "Product service unreachable, rejecting order");
                vec![ValidationFailure::new(fields::PRODUCT_ID, errmsg::INVALID_PRODUCT_ID)]
            }
        }
    }
}

/// Quantity must be non-zero and in `(0, MAX_QUANTITY_EXCLUSIVE)`.
pub fn check_quantity(quantity: u32) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    if quantity == 0 {
        failures.push(ValidationFailure::new(fields::QUANTITY, errmsg::QUANTITY_EMPTY));
        failures.push(ValidationFailure::new(fields::QUANTITY, errmsg::QUANTITY_NOT_POSITIVE));
    }
    if quantity >= limits::MAX_QUANTITY_EXCLUSIVE {
        failures.push(ValidationFailure::new(fields::QUANTITY, errmsg::QUANTITY_TOO_LARGE));
    }
    failures
}

/// Price must be non-zero and fit `NUMERIC(18, 2)` without rounding.
pub fn check_price(price: Decimal) -> Vec<ValidationFailure> {
    let mut failures = Vec::new();
    if price.is_zero() {
        failures.push(ValidationFailure::new(fields::PRICE, errmsg::PRICE_EMPTY));
    }

    let scale = price.scale();
    let digits = total_digits(price);
    let integer_digits = digits.saturating_sub(scale);
    if scale > limits::PRICE_SCALE
        || integer_digits > limits::PRICE_PRECISION - limits::PRICE_SCALE
    {
        failures.push(ValidationFailure::new(
            fields::PRICE,
            format!(
                "'price' must not be more than {} digits in total, with allowance for {} decimals. {} digits and {} decimals were found.",
                limits::PRICE_PRECISION,
                limits::PRICE_SCALE,
                digits,
                scale
            ),
        ));
    }
    failures
}

/// Significant digits including trailing fractional zeros (`0.05` has 2).
fn total_digits(value: Decimal) -> u32 {
    let mut mantissa = value.mantissa().unsigned_abs();
    let mut digits = 0;
    while mantissa > 0 {
        mantissa /= 10;
        digits += 1;
    }
    digits.max(value.scale()).max(1)
}

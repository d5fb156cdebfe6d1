//! Customer/base price conversion for the two-tier pricing model.
//!
//! Ratios are percentages: `20` means a 20% markup over base cost.

use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::errors::PricingError;

/// Supported ratio range. Inputs outside it are clamped, not rejected; the
/// clamping is observable through [`ClampedRatio::was_clamped`].
pub const MIN_RATIO_PERCENT: i64 = -50;
pub const MAX_RATIO_PERCENT: i64 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClampedRatio {
    pub value: Decimal,
    pub was_clamped: bool,
}

/// Clamp a raw ratio into the supported range. Out-of-range input is logged
/// and flagged on the return value so callers and tests can observe it.
pub fn clamp_ratio(raw: Decimal) -> ClampedRatio {
    let min = Decimal::from(MIN_RATIO_PERCENT);
    let max = Decimal::from(MAX_RATIO_PERCENT);

    if raw < min {
        warn!(event_name = "pricing.ratio_clamped", raw = %raw, clamped = %min, "price ratio below supported range");
        return ClampedRatio { value: min, was_clamped: true };
    }
    if raw > max {
        warn!(event_name = "pricing.ratio_clamped", raw = %raw, clamped = %max, "price ratio above supported range");
        return ClampedRatio { value: max, was_clamped: true };
    }

    ClampedRatio { value: raw, was_clamped: false }
}

/// Round to currency precision, half away from zero.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `base * (1 + ratio/100)`, rounded to 2 decimal places.
pub fn to_customer_price(base: Decimal, ratio_percent: Decimal) -> Result<Decimal, PricingError> {
    if base.is_sign_negative() && !base.is_zero() {
        return Err(PricingError::InvalidInput(format!("base price must not be negative: {base}")));
    }

    let ratio = clamp_ratio(ratio_percent).value;
    let factor = Decimal::ONE + ratio / Decimal::ONE_HUNDRED;
    Ok(round_currency(base * factor))
}

/// Inverse of [`to_customer_price`]: `customer / (1 + ratio/100)`.
pub fn to_base_price(customer: Decimal, ratio_percent: Decimal) -> Result<Decimal, PricingError> {
    if customer.is_sign_negative() && !customer.is_zero() {
        return Err(PricingError::InvalidInput(format!(
            "customer price must not be negative: {customer}"
        )));
    }
    // Checked before clamping: -100 must surface as a domain error, not get
    // silently pulled back into range.
    if ratio_percent == Decimal::from(-100) {
        return Err(PricingError::RatioDividesByZero);
    }

    let ratio = clamp_ratio(ratio_percent).value;
    let factor = Decimal::ONE + ratio / Decimal::ONE_HUNDRED;
    let Some(base) = customer.checked_div(factor) else {
        return Err(PricingError::RatioDividesByZero);
    };
    Ok(round_currency(base))
}

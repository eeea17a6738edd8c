//! Checks and rounding for the money amounts sent by clients.

use crate::Error;

/// Round `value` to two decimal places, e.g. for percentages and totals.
pub(crate) fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Check that the amount in `field` is a finite number greater than zero.
///
/// # Errors
///
/// Returns an [Error::InvalidInput] naming `field` otherwise.
pub(crate) fn positive_amount(field: &str, value: f64) -> Result<f64, Error> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "{field} must be a number greater than zero"
        )))
    }
}

/// Check that the amount in `field` is a finite number that is zero or more.
///
/// # Errors
///
/// Returns an [Error::InvalidInput] naming `field` otherwise.
pub(crate) fn non_negative_amount(field: &str, value: f64) -> Result<f64, Error> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "{field} must be a number of at least zero"
        )))
    }
}

/// Check that the amount in `field` has no more than two decimal places.
///
/// # Errors
///
/// Returns an [Error::InvalidInput] naming `field` if the amount has fractions of a cent.
pub(crate) fn whole_cents(field: &str, value: f64) -> Result<f64, Error> {
    let cents = value * 100.0;

    // Allow for the binary representation of decimal cents, e.g. 0.1 * 100.0.
    if (cents - cents.round()).abs() <= 1e-6 {
        Ok(value)
    } else {
        Err(Error::InvalidInput(format!(
            "{field} must not have more than two decimal places"
        )))
    }
}

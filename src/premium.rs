use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::config::{PERCENT_SCALE, RATIO_SCALE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PremiumError {
    #[error("invalid premium input: a={a_price} h={h_price} fx={fx_rate}")]
    InvalidInput {
        a_price: Decimal,
        h_price: Decimal,
        fx_rate: Decimal,
    },
}

/// Round half away from zero, i.e. classic "round half up" on magnitudes.
pub fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// `((h * fx) - a) / a * 100`, ratio kept to 6 places, percent to 4.
/// All three inputs must be strictly positive.
pub fn checked_premium_rate(
    a_price: Decimal,
    h_price: Decimal,
    fx_rate: Decimal,
) -> Result<Decimal, PremiumError> {
    let invalid = || PremiumError::InvalidInput { a_price, h_price, fx_rate };
    if a_price <= Decimal::ZERO || h_price <= Decimal::ZERO || fx_rate <= Decimal::ZERO {
        return Err(invalid());
    }
    // Out-of-range vendor values overflow the 96-bit mantissa.
    let ratio = h_price
        .checked_mul(fx_rate)
        .and_then(|h_in_a_currency| h_in_a_currency.checked_sub(a_price))
        .and_then(|diff| diff.checked_div(a_price))
        .ok_or_else(invalid)?;
    let percent = round_half_up(ratio, RATIO_SCALE)
        .checked_mul(dec!(100))
        .ok_or_else(invalid)?;
    Ok(round_half_up(percent, PERCENT_SCALE))
}

/// Sentinel form: returns zero instead of an error on bad input.
pub fn premium_rate(a_price: Decimal, h_price: Decimal, fx_rate: Decimal) -> Decimal {
    checked_premium_rate(a_price, h_price, fx_rate).unwrap_or(Decimal::ZERO)
}

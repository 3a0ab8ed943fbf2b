use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::PERCENT_SCALE;
use crate::premium::round_half_up;
use crate::types::{DailyStat, PremiumSample};

pub const P95: Decimal = dec!(0.95);
pub const P5: Decimal = dec!(0.05);

/// Percentile over an ascending slice.
///
/// `pos = p * (n - 1)`; an integral position returns that element as-is,
/// otherwise the two neighbours are interpolated and rounded half-up.
pub fn percentile(sorted: &[Decimal], p: Decimal) -> Option<Decimal> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let pos = p * Decimal::from(n - 1);
            let lower = pos.floor();
            let upper = pos.ceil();
            let lo = sorted[lower.to_usize()?.min(n - 1)];
            if lower == upper {
                return Some(lo);
            }
            let hi = sorted[upper.to_usize()?.min(n - 1)];
            Some(round_half_up(lo + (hi - lo) * (pos - lower), PERCENT_SCALE))
        }
    }
}

/// Summarize one stock-day. `None` when there are no samples.
pub fn compute_daily_stat(
    stock_code: &str,
    trade_date: NaiveDate,
    samples: &[PremiumSample],
) -> Option<DailyStat> {
    let mut ordered: Vec<&PremiumSample> = samples.iter().collect();
    ordered.sort_by_key(|s| s.captured_at);

    let open = ordered.first()?.premium_percent;
    let close = ordered.last()?.premium_percent;

    let mut values: Vec<Decimal> = ordered.iter().map(|s| s.premium_percent).collect();
    values.sort();

    let n = values.len();
    let sum: Decimal = values.iter().sum();

    Some(DailyStat {
        stock_code: stock_code.to_string(),
        trade_date,
        open_premium: open,
        close_premium: close,
        max_premium: values[n - 1],
        min_premium: values[0],
        avg_premium: round_half_up(sum / Decimal::from(n), PERCENT_SCALE),
        p95_premium: percentile(&values, P95)?,
        p5_premium: percentile(&values, P5)?,
        sample_count: u32::try_from(n).ok()?,
    })
}

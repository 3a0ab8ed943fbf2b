//! Decoder for the vendor's positional quote text.
//!
//! A response is one or more lines shaped like
//! `v_sh601318="1~Ping An~601318~45.67~45.20~45.30~...";`. Fields are `~`
//! separated and addressed by fixed 0-based position. Every index the
//! decoder depends on lives in [`field`]; a vendor layout change means
//! editing those constants and bumping [`QUOTE_SCHEMA_VERSION`].

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::config::PERCENT_SCALE;
use crate::premium::round_half_up;
use crate::types::{CaptureTick, Market, PriceSnapshot};

pub const QUOTE_SCHEMA_VERSION: u32 = 1;

/// Source tag stamped on every snapshot decoded by this module.
pub const QUOTE_SOURCE: &str = "tencent";

/// Records with fewer fields than this are never quotes.
pub const MIN_FIELDS: usize = 10;

pub mod field {
    pub const CURRENT: usize = 3;
    pub const PREV_CLOSE: usize = 4;
    pub const OPEN: usize = 5;
    pub const HIGH: usize = 33;
    pub const LOW: usize = 34;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuoteError {
    #[error("malformed quote: {0}")]
    MalformedQuote(String),
}

fn malformed(msg: impl Into<String>) -> QuoteError {
    QuoteError::MalformedQuote(msg.into())
}

/// Returns the text between the first and last double quote of the first
/// assignment line.
fn quoted_payload(raw: &str) -> Result<&str, QuoteError> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| l.contains('='))
        .ok_or_else(|| malformed("no '=' assignment in response"))?;

    let (_, rhs) = line.split_once('=').unwrap_or((line, ""));
    let start = rhs.find('"');
    let end = rhs.rfind('"');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&rhs[s + 1..e]),
        _ => Err(malformed("assignment has no quoted payload")),
    }
}

fn decimal_at(fields: &[&str], idx: usize, name: &str) -> Result<Decimal, QuoteError> {
    let raw = fields
        .get(idx)
        .ok_or_else(|| malformed(format!("missing {name} at field {idx} ({} fields)", fields.len())))?;
    Decimal::from_str(raw.trim())
        .map_err(|_| malformed(format!("{name} at field {idx} is not a decimal: '{raw}'")))
}

/// Day change in percent. Unset when there is no positive previous close or
/// the arithmetic leaves the representable range.
fn change_percent(current: Decimal, prev_close: Decimal) -> Option<Decimal> {
    if prev_close <= Decimal::ZERO {
        return None;
    }
    let pct = current
        .checked_sub(prev_close)?
        .checked_div(prev_close)?
        .checked_mul(dec!(100))?;
    Some(round_half_up(pct, PERCENT_SCALE))
}

/// Decode a single-symbol quote response into a snapshot stamped with `tick`.
pub fn parse_quote(
    raw: &str,
    symbol: &str,
    market: Market,
    tick: &CaptureTick,
) -> Result<PriceSnapshot, QuoteError> {
    let payload = quoted_payload(raw)?;
    let fields: Vec<&str> = payload.split('~').collect();
    if fields.len() < MIN_FIELDS {
        return Err(malformed(format!(
            "expected at least {MIN_FIELDS} fields, got {}",
            fields.len()
        )));
    }

    let current = decimal_at(&fields, field::CURRENT, "current")?;
    let prev_close = decimal_at(&fields, field::PREV_CLOSE, "prev_close")?;
    let open = decimal_at(&fields, field::OPEN, "open")?;
    let high = decimal_at(&fields, field::HIGH, "high")?;
    let low = decimal_at(&fields, field::LOW, "low")?;

    let change_percent = change_percent(current, prev_close);

    Ok(PriceSnapshot {
        symbol: symbol.to_string(),
        market,
        current,
        open,
        high,
        low,
        prev_close,
        change_percent,
        captured_at: tick.captured_at,
        trade_date: tick.trade_date,
        source: QUOTE_SOURCE.to_string(),
    })
}

/// Decode `KEY="<decimal>";`. The rate must be strictly positive.
pub fn parse_fx_rate(raw: &str) -> Result<Decimal, QuoteError> {
    let payload = quoted_payload(raw)?;
    // Some responses carry trailing `~`-separated metadata after the rate.
    let first = payload.split('~').next().unwrap_or("").trim();
    let rate = Decimal::from_str(first)
        .map_err(|_| malformed(format!("fx rate is not a decimal: '{first}'")))?;
    if rate <= Decimal::ZERO {
        return Err(malformed(format!("fx rate must be positive, got {rate}")));
    }
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn tick() -> CaptureTick {
        CaptureTick {
            captured_at: Utc.with_ymd_and_hms(2024, 3, 5, 2, 0, 0).unwrap(),
            trade_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        }
    }

    /// Builds a vendor line with `n` fields; price positions filled in when present.
    fn quote_line(key: &str, n: usize, current: &str, prev: &str) -> String {
        let mut fields: Vec<String> = (0..n).map(|i| format!("x{i}")).collect();
        let mut set = |idx: usize, v: &str| {
            if idx < n {
                fields[idx] = v.to_string();
            }
        };
        set(0, "1");
        set(1, "PING AN");
        set(2, "601318");
        set(field::CURRENT, current);
        set(field::PREV_CLOSE, prev);
        set(field::OPEN, "45.3000");
        set(field::HIGH, "46.1000");
        set(field::LOW, "45.0100");
        format!("{key}=\"{}\";\n", fields.join("~"))
    }

    #[test]
    fn parses_full_record() {
        let raw = quote_line("v_sh601318", 88, "45.6700", "45.2000");
        let snap = parse_quote(&raw, "601318", Market::A, &tick()).unwrap();
        assert_eq!(snap.current, dec!(45.67));
        assert_eq!(snap.prev_close, dec!(45.20));
        assert_eq!(snap.open, dec!(45.30));
        assert_eq!(snap.high, dec!(46.10));
        assert_eq!(snap.low, dec!(45.01));
        assert_eq!(snap.market, Market::A);
        assert_eq!(snap.symbol, "601318");
        assert_eq!(snap.source, QUOTE_SOURCE);
        assert_eq!(snap.trade_date, tick().trade_date);
        // (45.67 - 45.20) / 45.20 * 100 = 1.03982.. -> 1.0398
        assert_eq!(snap.change_percent, Some(dec!(1.0398)));
    }

    #[test]
    fn keeps_four_fractional_digits() {
        let raw = quote_line("v_hk02318", 40, "38.1235", "38.0000");
        let snap = parse_quote(&raw, "02318", Market::H, &tick()).unwrap();
        assert_eq!(snap.current.to_string(), "38.1235");
    }

    #[test]
    fn zero_prev_close_leaves_change_unset() {
        let raw = quote_line("v_sz000001", 40, "12.3400", "0.00");
        let snap = parse_quote(&raw, "000001", Market::A, &tick()).unwrap();
        assert_eq!(snap.change_percent, None);
    }

    #[test]
    fn oversized_price_leaves_change_unset() {
        let raw = quote_line("v_hk02318", 40, "79228162514264337593543950", "0.001");
        let snap = parse_quote(&raw, "02318", Market::H, &tick()).unwrap();
        assert_eq!(snap.current, dec!(79228162514264337593543950));
        assert_eq!(snap.change_percent, None);
    }

    #[test]
    fn fewer_than_ten_fields_is_malformed() {
        let raw = "v_sh601318=\"1~PING AN~601318~45.67~45.20~45.30~0~0~0\";";
        let err = parse_quote(raw, "601318", Market::A, &tick()).unwrap_err();
        assert!(matches!(err, QuoteError::MalformedQuote(ref m) if m.contains("at least 10")));
    }

    #[test]
    fn record_without_high_low_is_rejected_not_truncated() {
        // 34 fields: index 33 present, index 34 missing.
        let raw = quote_line("v_sh601318", 34, "45.67", "45.20");
        let err = parse_quote(&raw, "601318", Market::A, &tick()).unwrap_err();
        assert!(matches!(err, QuoteError::MalformedQuote(ref m) if m.contains("low")));
    }

    #[test]
    fn exactly_thirty_five_fields_is_enough() {
        let raw = quote_line("v_sh601318", 35, "45.67", "45.20");
        assert!(parse_quote(&raw, "601318", Market::A, &tick()).is_ok());
    }

    #[test]
    fn missing_assignment_or_quotes_is_malformed() {
        for raw in ["", "pv_none_match", "v_sh601318=1~2~3;", "v_sh601318=\";"] {
            assert!(
                matches!(parse_quote(raw, "601318", Market::A, &tick()), Err(QuoteError::MalformedQuote(_))),
                "input {raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn non_numeric_price_is_malformed() {
        let raw = quote_line("v_sh601318", 40, "-", "45.20");
        let err = parse_quote(&raw, "601318", Market::A, &tick()).unwrap_err();
        assert!(matches!(err, QuoteError::MalformedQuote(ref m) if m.contains("current")));
    }

    #[test]
    fn uses_first_assignment_line() {
        let raw = format!(
            "{}{}",
            quote_line("v_sh601318", 40, "45.67", "45.20"),
            quote_line("v_sh601939", 40, "7.01", "7.00")
        );
        let snap = parse_quote(&raw, "601318", Market::A, &tick()).unwrap();
        assert_eq!(snap.current, dec!(45.67));
    }

    #[test]
    fn parses_fx_rate() {
        assert_eq!(parse_fx_rate("v_r_hkdcny=\"0.9123\";").unwrap(), dec!(0.9123));
        assert_eq!(parse_fx_rate("r_hkdcny=\"0.91235~2024-03-05\";\n").unwrap(), dec!(0.91235));
    }

    #[test]
    fn rejects_bad_fx_rate() {
        assert!(parse_fx_rate("v_r_hkdcny=\"\";").is_err());
        assert!(parse_fx_rate("v_r_hkdcny=\"0\";").is_err());
        assert!(parse_fx_rate("v_r_hkdcny=\"-0.9\";").is_err());
        assert!(parse_fx_rate("pv_none_match=1;").is_err());
    }
}

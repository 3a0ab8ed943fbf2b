use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    /// Mainland listing (Shanghai / Shenzhen).
    A,
    /// Hong Kong listing.
    H,
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Market::A => "A",
            Market::H => "H",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// One cross-listed company: its A-share code and the paired H-share code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradedPair {
    pub a_code: String,
    pub h_code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Time series rows
// ---------------------------------------------------------------------------

/// The logical collection instant shared by every record written in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTick {
    pub captured_at: DateTime<Utc>,
    /// Exchange-local calendar date of `captured_at`.
    pub trade_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub market: Market,
    pub current: Decimal,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub prev_close: Decimal,
    /// Unset when the previous close is zero.
    pub change_percent: Option<Decimal>,
    pub captured_at: DateTime<Utc>,
    pub trade_date: NaiveDate,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FxSource {
    Manual,
    Fetched,
}

impl std::fmt::Display for FxSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FxSource::Manual => write!(f, "manual"),
            FxSource::Fetched => write!(f, "fetched"),
        }
    }
}

impl std::str::FromStr for FxSource {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(FxSource::Manual),
            "fetched" => Ok(FxSource::Fetched),
            other => Err(AppError::Decode(format!("unknown fx source '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxRateSample {
    pub currency_pair: String,
    /// Always > 0; see [`FxRateSample::new`].
    pub rate: Decimal,
    pub captured_at: DateTime<Utc>,
    pub trade_date: NaiveDate,
    pub source: FxSource,
}

impl FxRateSample {
    pub fn new(
        currency_pair: &str,
        rate: Decimal,
        tick: &CaptureTick,
        source: FxSource,
    ) -> Result<Self, AppError> {
        if rate <= Decimal::ZERO {
            return Err(AppError::InvalidInput(format!(
                "fx rate for {currency_pair} must be positive, got {rate}"
            )));
        }
        Ok(Self {
            currency_pair: currency_pair.to_string(),
            rate,
            captured_at: tick.captured_at,
            trade_date: tick.trade_date,
            source,
        })
    }
}

/// Derived from one A snapshot, one H snapshot and one FX rate of the same tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PremiumSample {
    pub a_code: String,
    pub a_price: Decimal,
    pub h_price: Decimal,
    pub fx_rate: Decimal,
    pub premium_percent: Decimal,
    pub captured_at: DateTime<Utc>,
    pub trade_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyStat {
    pub stock_code: String,
    pub trade_date: NaiveDate,
    pub open_premium: Decimal,
    pub close_premium: Decimal,
    pub max_premium: Decimal,
    pub min_premium: Decimal,
    pub avg_premium: Decimal,
    pub p95_premium: Decimal,
    pub p5_premium: Decimal,
    pub sample_count: u32,
}

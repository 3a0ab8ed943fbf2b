//! Database row types for the tables in `migrations/`.
//! Decimal columns come back as TEXT and are parsed into domain types here.
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::AppError;
use crate::types::{DailyStat, FxRateSample, FxSource, PremiumSample, TradedPair};

fn dec(col: &str, raw: &str) -> Result<Decimal, AppError> {
    Decimal::from_str(raw).map_err(|e| AppError::Decode(format!("{col}='{raw}': {e}")))
}

#[derive(Debug, sqlx::FromRow)]
pub struct TradedPairRow {
    pub a_code: String,
    pub h_code: String,
    pub name: String,
    pub enabled: bool,
}

impl From<TradedPairRow> for TradedPair {
    fn from(r: TradedPairRow) -> Self {
        TradedPair {
            a_code: r.a_code,
            h_code: r.h_code,
            name: r.name,
            enabled: r.enabled,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct FxRateRow {
    pub currency_pair: String,
    pub rate: String,
    pub captured_at: DateTime<Utc>,
    pub trade_date: NaiveDate,
    pub source: String,
}

impl TryFrom<FxRateRow> for FxRateSample {
    type Error = AppError;

    fn try_from(r: FxRateRow) -> Result<Self, Self::Error> {
        Ok(FxRateSample {
            rate: dec("rate", &r.rate)?,
            source: FxSource::from_str(&r.source)?,
            currency_pair: r.currency_pair,
            captured_at: r.captured_at,
            trade_date: r.trade_date,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct PremiumSampleRow {
    pub a_code: String,
    pub a_price: String,
    pub h_price: String,
    pub fx_rate: String,
    pub premium_percent: String,
    pub captured_at: DateTime<Utc>,
    pub trade_date: NaiveDate,
}

impl TryFrom<PremiumSampleRow> for PremiumSample {
    type Error = AppError;

    fn try_from(r: PremiumSampleRow) -> Result<Self, Self::Error> {
        Ok(PremiumSample {
            a_price: dec("a_price", &r.a_price)?,
            h_price: dec("h_price", &r.h_price)?,
            fx_rate: dec("fx_rate", &r.fx_rate)?,
            premium_percent: dec("premium_percent", &r.premium_percent)?,
            a_code: r.a_code,
            captured_at: r.captured_at,
            trade_date: r.trade_date,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DailyStatRow {
    pub stock_code: String,
    pub trade_date: NaiveDate,
    pub open_premium: String,
    pub close_premium: String,
    pub max_premium: String,
    pub min_premium: String,
    pub avg_premium: String,
    pub p95_premium: String,
    pub p5_premium: String,
    pub sample_count: i64,
}

impl TryFrom<DailyStatRow> for DailyStat {
    type Error = AppError;

    fn try_from(r: DailyStatRow) -> Result<Self, Self::Error> {
        Ok(DailyStat {
            open_premium: dec("open_premium", &r.open_premium)?,
            close_premium: dec("close_premium", &r.close_premium)?,
            max_premium: dec("max_premium", &r.max_premium)?,
            min_premium: dec("min_premium", &r.min_premium)?,
            avg_premium: dec("avg_premium", &r.avg_premium)?,
            p95_premium: dec("p95_premium", &r.p95_premium)?,
            p5_premium: dec("p5_premium", &r.p5_premium)?,
            sample_count: u32::try_from(r.sample_count)
                .map_err(|_| AppError::Decode(format!("sample_count={}", r.sample_count)))?,
            stock_code: r.stock_code,
            trade_date: r.trade_date,
        })
    }
}

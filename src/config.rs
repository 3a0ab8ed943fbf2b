use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::{AppError, Result};

pub const QUOTE_BASE_URL: &str = "https://qt.gtimg.cn/q=";

/// Currency pair used to convert H-share prices into the A-share currency.
pub const FX_PAIR: &str = "HKDCNY";

/// Both exchanges quote in UTC+8 local time.
pub const MARKET_TZ: &str = "Asia/Shanghai";

/// Per-request timeout for quote and FX fetches (milliseconds).
pub const QUOTE_TIMEOUT_MS: u64 = 5_000;

/// Collection cadence during trading windows (seconds).
pub const COLLECT_INTERVAL_SECS: u64 = 30;

/// Upper bound on pairs fetched concurrently within one collection run.
pub const COLLECT_CONCURRENCY: usize = 4;

/// Local time after which today's daily stats are built (after the HK close).
pub const DAILY_STATS_AT: &str = "16:30";

/// Local time after which the previous day's stats are rebuilt.
pub const BACKFILL_AT: &str = "09:00";

/// Decimal places kept for premium and aggregate percents.
pub const PERCENT_SCALE: u32 = 4;

/// Decimal places kept for the intermediate premium ratio.
pub const RATIO_SCALE: u32 = 6;

#[derive(Debug, Clone)]
pub struct Config {
    pub quote_base_url: String,
    pub quote_timeout_ms: u64,
    pub fx_pair: String,
    pub market_tz: Tz,
    pub log_level: String,
    pub db_path: String,
    pub collect_interval_secs: u64,
    /// Max pairs in flight per run (COLLECT_CONCURRENCY). 1 = strictly sequential.
    pub collect_concurrency: usize,
    /// Local time today's aggregation becomes due (DAILY_STATS_AT, HH:MM)
    pub daily_stats_at: NaiveTime,
    /// Local time the prior-day backfill becomes due (BACKFILL_AT, HH:MM)
    pub backfill_at: NaiveTime,
    /// Optional JSON file replacing the built-in A/H seed table (PAIR_SEED_PATH).
    pub pair_seed_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            quote_base_url: std::env::var("QUOTE_BASE_URL")
                .unwrap_or_else(|_| QUOTE_BASE_URL.to_string()),
            quote_timeout_ms: std::env::var("QUOTE_TIMEOUT_MS")
                .unwrap_or_else(|_| QUOTE_TIMEOUT_MS.to_string())
                .parse::<u64>()
                .map_err(|_| AppError::Config("QUOTE_TIMEOUT_MS must be an integer".to_string()))?,
            fx_pair: std::env::var("FX_PAIR").unwrap_or_else(|_| FX_PAIR.to_string()),
            market_tz: parse_tz(
                &std::env::var("MARKET_TZ").unwrap_or_else(|_| MARKET_TZ.to_string()),
            )?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "premium.db".to_string()),
            collect_interval_secs: parse_positive(
                "COLLECT_INTERVAL_SECS",
                &std::env::var("COLLECT_INTERVAL_SECS")
                    .unwrap_or_else(|_| COLLECT_INTERVAL_SECS.to_string()),
            )?,
            collect_concurrency: parse_positive(
                "COLLECT_CONCURRENCY",
                &std::env::var("COLLECT_CONCURRENCY")
                    .unwrap_or_else(|_| COLLECT_CONCURRENCY.to_string()),
            )?,
            daily_stats_at: parse_hhmm(
                "DAILY_STATS_AT",
                &std::env::var("DAILY_STATS_AT").unwrap_or_else(|_| DAILY_STATS_AT.to_string()),
            )?,
            backfill_at: parse_hhmm(
                "BACKFILL_AT",
                &std::env::var("BACKFILL_AT").unwrap_or_else(|_| BACKFILL_AT.to_string()),
            )?,
            pair_seed_path: std::env::var("PAIR_SEED_PATH")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| AppError::Config(format!("MARKET_TZ '{name}' is not a known timezone: {e}")))
}

fn parse_positive<T>(var: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    value
        .trim()
        .parse::<T>()
        .ok()
        .filter(|n| *n > T::default())
        .ok_or_else(|| AppError::Config(format!("{var} must be a positive integer, got '{value}'")))
}

fn parse_hhmm(var: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| AppError::Config(format!("{var} must be HH:MM, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schedule_times() {
        let t = parse_hhmm("DAILY_STATS_AT", "16:30").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(16, 30, 0).unwrap());
        assert!(parse_hhmm("DAILY_STATS_AT", "4pm").is_err());
    }

    #[test]
    fn counts_must_be_positive_integers() {
        assert_eq!(parse_positive::<usize>("COLLECT_CONCURRENCY", "8").unwrap(), 8);
        assert_eq!(parse_positive::<u64>("COLLECT_INTERVAL_SECS", " 30 ").unwrap(), 30);
        for bad in ["0", "-2", "four", ""] {
            assert!(
                matches!(parse_positive::<usize>("COLLECT_CONCURRENCY", bad), Err(AppError::Config(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn default_timezone_is_known() {
        assert!(parse_tz(MARKET_TZ).is_ok());
        assert!(parse_tz("Mars/Olympus").is_err());
    }
}

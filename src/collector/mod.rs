pub mod pipeline;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::error::AppError;
use crate::types::{FxSource, Market};

pub use pipeline::CollectionPipeline;

/// Conditions that abort a whole collection run.
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("no FX rate for {pair}: fetch failed and no stored rate exists")]
    FxUnavailable { pair: String },

    #[error("stock {0} is not a tracked pair")]
    UnknownStock(String),

    #[error(transparent)]
    Store(#[from] AppError),
}

/// Why a single pair produced no premium sample in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoData { market: Market, symbol: String },
    InvalidInput(String),
    PersistenceFailure(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoData { market, symbol } => write!(f, "no data for {market} {symbol}"),
            SkipReason::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            SkipReason::PersistenceFailure(msg) => write!(f, "persistence failure: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPair {
    pub a_code: String,
    pub reason: SkipReason,
}

/// Outcome of one `collect_all` invocation.
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub captured_at: DateTime<Utc>,
    pub trade_date: NaiveDate,
    pub fx_rate: Decimal,
    pub fx_source: FxSource,
    pub attempted: usize,
    pub succeeded: usize,
    /// Sorted by A-share code.
    pub skipped: Vec<SkippedPair>,
}

impl CollectionReport {
    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}

pub mod models;
pub mod store;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{DailyStat, FxRateSample, PremiumSample, PriceSnapshot, TradedPair};

pub use store::SqliteStore;

/// Persistence the collector and aggregator write through.
#[async_trait]
pub trait PremiumStore: Send + Sync {
    async fn upsert_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()>;

    async fn upsert_premium_sample(&self, sample: &PremiumSample) -> Result<()>;

    /// Both legs and the derived sample, all-or-nothing.
    async fn record_collection(
        &self,
        a: &PriceSnapshot,
        h: &PriceSnapshot,
        sample: &PremiumSample,
    ) -> Result<()>;

    /// Samples for one stock-day, oldest first.
    async fn query_premium_samples(&self, stock_code: &str, date: NaiveDate) -> Result<Vec<PremiumSample>>;

    async fn upsert_daily_stat(&self, stat: &DailyStat) -> Result<()>;

    async fn insert_fx_sample(&self, sample: &FxRateSample) -> Result<()>;
}

/// Reference data maintained outside the core.
#[async_trait]
pub trait PairRegistry: Send + Sync {
    async fn list_tracked_pairs(&self) -> Result<Vec<TradedPair>>;

    /// Most recent sample by capture time, whatever its source.
    async fn latest_fx_rate(&self, currency_pair: &str) -> Result<Option<FxRateSample>>;
}

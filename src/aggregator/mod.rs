pub mod daily_stats;

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::db::{PairRegistry, PremiumStore};
use crate::error::AppError;
use crate::guard::InFlight;
use crate::types::DailyStat;

pub use daily_stats::compute_daily_stat;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("aggregation for {stock} on {date} is already running")]
    AlreadyRunning { stock: String, date: NaiveDate },

    #[error(transparent)]
    Store(#[from] AppError),
}

/// Counts from one `aggregate_all` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateSummary {
    pub written: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Turns a day's premium samples into one upserted `DailyStat` per stock.
#[derive(Clone)]
pub struct DailyAggregator {
    store: Arc<dyn PremiumStore>,
    registry: Arc<dyn PairRegistry>,
    inflight: InFlight<(String, NaiveDate)>,
}

impl DailyAggregator {
    pub fn new(store: Arc<dyn PremiumStore>, registry: Arc<dyn PairRegistry>) -> Self {
        Self {
            store,
            registry,
            inflight: InFlight::new(),
        }
    }

    /// Recompute and upsert the stat for one stock-day. Days without
    /// samples yield `Ok(None)` and write nothing.
    pub async fn aggregate(
        &self,
        stock_code: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyStat>, AggregateError> {
        let Some(_permit) = self.inflight.try_enter((stock_code.to_string(), date)) else {
            return Err(AggregateError::AlreadyRunning {
                stock: stock_code.to_string(),
                date,
            });
        };

        let samples = self.store.query_premium_samples(stock_code, date).await?;
        let Some(stat) = compute_daily_stat(stock_code, date, &samples) else {
            debug!(stock = stock_code, %date, "no premium samples, nothing to aggregate");
            return Ok(None);
        };

        self.store.upsert_daily_stat(&stat).await?;
        debug!(
            stock = stock_code,
            %date,
            samples = stat.sample_count,
            avg = %stat.avg_premium,
            "daily stat written"
        );
        Ok(Some(stat))
    }

    /// Aggregate every tracked pair (or only `stock`) for `date`.
    /// One stock failing does not stop the rest.
    pub async fn aggregate_all(
        &self,
        date: NaiveDate,
        stock: Option<&str>,
    ) -> Result<AggregateSummary, AggregateError> {
        let pairs = self.registry.list_tracked_pairs().await?;
        let mut summary = AggregateSummary::default();

        for pair in pairs.iter().filter(|p| stock.map_or(true, |s| p.a_code == s)) {
            match self.aggregate(&pair.a_code, date).await {
                Ok(Some(_)) => summary.written += 1,
                Ok(None) => summary.empty += 1,
                Err(AggregateError::AlreadyRunning { .. }) => {
                    warn!(stock = %pair.a_code, %date, "aggregation already running, skipped");
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(stock = %pair.a_code, %date, "aggregation failed: {e}");
                    summary.failed += 1;
                }
            }
        }

        info!(
            %date,
            written = summary.written,
            empty = summary.empty,
            failed = summary.failed,
            "daily aggregation finished"
        );
        Ok(summary)
    }
}

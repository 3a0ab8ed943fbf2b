use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::aggregator::DailyAggregator;
use crate::collector::CollectionPipeline;
use crate::config::Config;
use crate::guard::InFlight;
use crate::session::{is_weekday, SessionEvaluator};

const COLLECT_RUN: &str = "collect";

/// Which trade dates need a daily aggregation at a given local time.
///
/// Today's stats become due at `daily_at`; the previous day's backfill at
/// `backfill_at`. Each fires at most once per local date and only on
/// weekdays. A backfill whose previous day fell on a weekend is consumed
/// without producing a date.
#[derive(Debug, Clone)]
pub struct DailyPlan {
    daily_at: NaiveTime,
    backfill_at: NaiveTime,
    last_daily: Option<NaiveDate>,
    last_backfill: Option<NaiveDate>,
}

impl DailyPlan {
    pub fn new(daily_at: NaiveTime, backfill_at: NaiveTime) -> Self {
        Self {
            daily_at,
            backfill_at,
            last_daily: None,
            last_backfill: None,
        }
    }

    pub fn due(&mut self, local: NaiveDateTime) -> Vec<NaiveDate> {
        let today = local.date();
        let mut dates = Vec::new();
        if !is_weekday(today) {
            return dates;
        }

        if local.time() >= self.backfill_at && self.last_backfill != Some(today) {
            self.last_backfill = Some(today);
            match today.pred_opt() {
                Some(prev) if is_weekday(prev) => dates.push(prev),
                _ => debug!(%today, "previous day was not a trading day, no backfill"),
            }
        }

        if local.time() >= self.daily_at && self.last_daily != Some(today) {
            self.last_daily = Some(today);
            dates.push(today);
        }
        dates
    }
}

/// Periodic driver for collection and daily aggregation.
pub struct Scheduler {
    pipeline: Arc<CollectionPipeline>,
    aggregator: DailyAggregator,
    sessions: SessionEvaluator,
    period: Duration,
    run_token: InFlight<&'static str>,
    plan: DailyPlan,
}

impl Scheduler {
    pub fn new(pipeline: Arc<CollectionPipeline>, aggregator: DailyAggregator, cfg: &Config) -> Self {
        Self {
            pipeline,
            aggregator,
            sessions: SessionEvaluator::new(cfg.market_tz),
            period: Duration::from_secs(cfg.collect_interval_secs),
            run_token: InFlight::new(),
            plan: DailyPlan::new(cfg.daily_stats_at, cfg.backfill_at),
        }
    }

    pub async fn run(mut self) {
        info!(period_secs = self.period.as_secs(), "Scheduler started");
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let now = Utc::now();
            self.spawn_collection(now);

            for date in self.plan.due(self.sessions.local(now)) {
                let aggregator = self.aggregator.clone();
                tokio::spawn(async move {
                    if let Err(e) = aggregator.aggregate_all(date, None).await {
                        error!(%date, "Daily aggregation failed: {e}");
                    }
                });
            }
        }
    }

    /// Start a collection run unless the previous one is still going.
    /// Returns whether a run was spawned.
    fn spawn_collection(&self, now: DateTime<Utc>) -> bool {
        let Some(permit) = self.run_token.try_enter(COLLECT_RUN) else {
            warn!("previous collection run still in progress, skipping tick");
            return false;
        };
        let pipeline = Arc::clone(&self.pipeline);
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = pipeline.collect_if_trading_time(now).await {
                error!("Collection run failed: {e}");
            }
        });
        true
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::collector::{CollectionError, CollectionReport, SkipReason, SkippedPair};
use crate::db::{PairRegistry, PremiumStore};
use crate::premium::checked_premium_rate;
use crate::quote::QuoteSource;
use crate::session::SessionEvaluator;
use crate::types::{CaptureTick, FxRateSample, FxSource, Market, PremiumSample, TradedPair};

/// Fetch → compute → persist for every tracked A/H pair.
pub struct CollectionPipeline {
    source: Arc<dyn QuoteSource>,
    store: Arc<dyn PremiumStore>,
    registry: Arc<dyn PairRegistry>,
    sessions: SessionEvaluator,
    fx_pair: String,
    concurrency: usize,
}

impl CollectionPipeline {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        store: Arc<dyn PremiumStore>,
        registry: Arc<dyn PairRegistry>,
        sessions: SessionEvaluator,
        fx_pair: String,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            store,
            registry,
            sessions,
            fx_pair,
            concurrency: concurrency.max(1),
        }
    }

    /// Collect only while at least one leg's market is trading.
    pub async fn collect_if_trading_time(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<CollectionReport>, CollectionError> {
        if !self.sessions.any_open_at(now) {
            debug!(local = %self.sessions.local(now), "markets closed, skipping collection");
            return Ok(None);
        }
        debug!(
            a_open = self.sessions.is_open_at(Market::A, now),
            h_open = self.sessions.is_open_at(Market::H, now),
            "session open, collecting"
        );
        self.run_collection(now, None).await.map(Some)
    }

    /// Collect every tracked pair, or just `stock` when given.
    pub async fn run_collection(
        &self,
        now: DateTime<Utc>,
        stock: Option<&str>,
    ) -> Result<CollectionReport, CollectionError> {
        let mut pairs = self.registry.list_tracked_pairs().await?;
        if let Some(code) = stock {
            pairs.retain(|p| p.a_code == code);
            if pairs.is_empty() {
                return Err(CollectionError::UnknownStock(code.to_string()));
            }
        }
        self.collect_all(&pairs, &self.fx_pair, now).await
    }

    pub async fn collect_all(
        &self,
        pairs: &[TradedPair],
        fx_pair: &str,
        now: DateTime<Utc>,
    ) -> Result<CollectionReport, CollectionError> {
        let tick = self.sessions.tick(now);
        let (fx_rate, fx_source) = self.resolve_fx_rate(fx_pair, &tick).await?;

        let outcomes: Vec<(String, Result<(), SkipReason>)> = stream::iter(pairs.to_vec())
            .map(|pair| async move {
                let outcome = self.collect_pair(&pair, fx_rate, &tick).await;
                (pair.a_code, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let attempted = outcomes.len();
        let mut skipped: Vec<SkippedPair> = outcomes
            .into_iter()
            .filter_map(|(a_code, outcome)| outcome.err().map(|reason| SkippedPair { a_code, reason }))
            .collect();
        skipped.sort_by(|x, y| x.a_code.cmp(&y.a_code));

        for s in &skipped {
            warn!(stock = %s.a_code, reason = %s.reason, "pair skipped");
        }

        let report = CollectionReport {
            captured_at: tick.captured_at,
            trade_date: tick.trade_date,
            fx_rate,
            fx_source,
            attempted,
            succeeded: attempted - skipped.len(),
            skipped,
        };
        info!(
            succeeded = report.succeeded,
            attempted = report.attempted,
            fx_rate = %report.fx_rate,
            fx_source = %report.fx_source,
            "collection run finished"
        );
        Ok(report)
    }

    /// Fetched rate first (and recorded), else the latest stored sample.
    async fn resolve_fx_rate(
        &self,
        pair: &str,
        tick: &CaptureTick,
    ) -> Result<(Decimal, FxSource), CollectionError> {
        if let Some(rate) = self.source.fetch_fx_rate(pair).await {
            match FxRateSample::new(pair, rate, tick, FxSource::Fetched) {
                Ok(sample) => {
                    if let Err(e) = self.store.insert_fx_sample(&sample).await {
                        warn!(pair, "failed to record fetched FX rate: {e}");
                    }
                    return Ok((rate, FxSource::Fetched));
                }
                Err(e) => warn!(pair, "ignoring fetched FX rate: {e}"),
            }
        }

        match self.registry.latest_fx_rate(pair).await? {
            Some(stored) => {
                info!(
                    pair,
                    rate = %stored.rate,
                    source = %stored.source,
                    captured_at = %stored.captured_at,
                    "FX fetch failed, using latest stored rate"
                );
                Ok((stored.rate, stored.source))
            }
            None => Err(CollectionError::FxUnavailable { pair: pair.to_string() }),
        }
    }

    async fn collect_pair(
        &self,
        pair: &TradedPair,
        fx_rate: Decimal,
        tick: &CaptureTick,
    ) -> Result<(), SkipReason> {
        let no_data = |market: Market| SkipReason::NoData {
            market,
            symbol: match market {
                Market::A => pair.a_code.clone(),
                Market::H => pair.h_code.clone(),
            },
        };

        let a = self
            .source
            .fetch_price(&pair.a_code, Market::A, tick)
            .await
            .ok_or_else(|| no_data(Market::A))?;
        let h = self
            .source
            .fetch_price(&pair.h_code, Market::H, tick)
            .await
            .ok_or_else(|| no_data(Market::H))?;

        let premium_percent = checked_premium_rate(a.current, h.current, fx_rate)
            .map_err(|e| SkipReason::InvalidInput(e.to_string()))?;

        let sample = PremiumSample {
            a_code: pair.a_code.clone(),
            a_price: a.current,
            h_price: h.current,
            fx_rate,
            premium_percent,
            captured_at: tick.captured_at,
            trade_date: tick.trade_date,
        };
        self.store
            .record_collection(&a, &h, &sample)
            .await
            .map_err(|e| SkipReason::PersistenceFailure(e.to_string()))?;

        debug!(stock = %pair.a_code, premium = %premium_percent, "premium recorded");
        Ok(())
    }
}

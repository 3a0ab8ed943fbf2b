use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{Sqlite, SqlitePool};
use tracing::info;

use crate::db::models::{DailyStatRow, FxRateRow, PremiumSampleRow, TradedPairRow};
use crate::db::{PairRegistry, PremiumStore};
use crate::error::Result;
use crate::types::{DailyStat, FxRateSample, PremiumSample, PriceSnapshot, TradedPair};

/// SQLite-backed implementation of both persistence traits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and apply migrations.
    pub async fn open(db_path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{db_path}?mode=rwc")).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database ready at {db_path}");
        Ok(Self::new(pool))
    }

    /// Single-connection in-memory database; every connection to `:memory:`
    /// would otherwise see its own empty schema.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert pairs that are not registered yet. Returns how many were added.
    pub async fn seed_pairs(&self, pairs: &[TradedPair]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut added = 0;
        for p in pairs {
            let res = sqlx::query(
                r#"
                INSERT OR IGNORE INTO traded_pairs (a_code, h_code, name, enabled)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&p.a_code)
            .bind(&p.h_code)
            .bind(&p.name)
            .bind(p.enabled)
            .execute(&mut *tx)
            .await?;
            added += res.rows_affected();
        }
        tx.commit().await?;
        Ok(added)
    }

    /// Daily stats of every stock with `from <= trade_date <= to`, ordered by
    /// date then stock.
    pub async fn daily_stats_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyStat>> {
        let rows = sqlx::query_as::<_, DailyStatRow>(
            r#"
            SELECT stock_code, trade_date, open_premium, close_premium, max_premium,
                   min_premium, avg_premium, p95_premium, p5_premium, sample_count
            FROM daily_stats
            WHERE trade_date >= ? AND trade_date <= ?
            ORDER BY trade_date ASC, stock_code ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DailyStat::try_from).collect()
    }

    /// Most recent daily stats for one stock, newest first.
    pub async fn recent_daily_stats(&self, stock_code: &str, limit: u32) -> Result<Vec<DailyStat>> {
        let rows = sqlx::query_as::<_, DailyStatRow>(
            r#"
            SELECT stock_code, trade_date, open_premium, close_premium, max_premium,
                   min_premium, avg_premium, p95_premium, p5_premium, sample_count
            FROM daily_stats
            WHERE stock_code = ?
            ORDER BY trade_date DESC
            LIMIT ?
            "#,
        )
        .bind(stock_code)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DailyStat::try_from).collect()
    }

    #[cfg(test)]
    pub async fn daily_stat(&self, stock_code: &str, date: NaiveDate) -> Result<Option<DailyStat>> {
        let row = sqlx::query_as::<_, DailyStatRow>(
            r#"
            SELECT stock_code, trade_date, open_premium, close_premium, max_premium,
                   min_premium, avg_premium, p95_premium, p5_premium, sample_count
            FROM daily_stats
            WHERE stock_code = ? AND trade_date = ?
            "#,
        )
        .bind(stock_code)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;
        row.map(DailyStat::try_from).transpose()
    }
}

async fn write_snapshot<'e, E>(exec: E, s: &PriceSnapshot) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO price_snapshots (
            symbol, market, current_price, open_price, high_price, low_price,
            prev_close, change_percent, captured_at, trade_date, source
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(symbol, market, captured_at) DO UPDATE SET
            current_price = excluded.current_price,
            open_price = excluded.open_price,
            high_price = excluded.high_price,
            low_price = excluded.low_price,
            prev_close = excluded.prev_close,
            change_percent = excluded.change_percent,
            trade_date = excluded.trade_date,
            source = excluded.source
        "#,
    )
    .bind(&s.symbol)
    .bind(s.market.to_string())
    .bind(s.current.to_string())
    .bind(s.open.to_string())
    .bind(s.high.to_string())
    .bind(s.low.to_string())
    .bind(s.prev_close.to_string())
    .bind(s.change_percent.map(|d| d.to_string()))
    .bind(s.captured_at)
    .bind(s.trade_date)
    .bind(&s.source)
    .execute(exec)
    .await?;
    Ok(())
}

async fn write_sample<'e, E>(exec: E, s: &PremiumSample) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO premium_samples (
            a_code, a_price, h_price, fx_rate, premium_percent, captured_at, trade_date
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(a_code, trade_date, captured_at) DO UPDATE SET
            a_price = excluded.a_price,
            h_price = excluded.h_price,
            fx_rate = excluded.fx_rate,
            premium_percent = excluded.premium_percent
        "#,
    )
    .bind(&s.a_code)
    .bind(s.a_price.to_string())
    .bind(s.h_price.to_string())
    .bind(s.fx_rate.to_string())
    .bind(s.premium_percent.to_string())
    .bind(s.captured_at)
    .bind(s.trade_date)
    .execute(exec)
    .await?;
    Ok(())
}

#[async_trait]
impl PremiumStore for SqliteStore {
    async fn upsert_price_snapshot(&self, snapshot: &PriceSnapshot) -> Result<()> {
        write_snapshot(&self.pool, snapshot).await
    }

    async fn upsert_premium_sample(&self, sample: &PremiumSample) -> Result<()> {
        write_sample(&self.pool, sample).await
    }

    async fn record_collection(
        &self,
        a: &PriceSnapshot,
        h: &PriceSnapshot,
        sample: &PremiumSample,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_snapshot(&mut *tx, a).await?;
        write_snapshot(&mut *tx, h).await?;
        write_sample(&mut *tx, sample).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query_premium_samples(&self, stock_code: &str, date: NaiveDate) -> Result<Vec<PremiumSample>> {
        let rows = sqlx::query_as::<_, PremiumSampleRow>(
            r#"
            SELECT a_code, a_price, h_price, fx_rate, premium_percent, captured_at, trade_date
            FROM premium_samples
            WHERE a_code = ? AND trade_date = ?
            ORDER BY captured_at ASC, id ASC
            "#,
        )
        .bind(stock_code)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PremiumSample::try_from).collect()
    }

    async fn upsert_daily_stat(&self, stat: &DailyStat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_stats (
                stock_code, trade_date, open_premium, close_premium, max_premium,
                min_premium, avg_premium, p95_premium, p5_premium, sample_count, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(stock_code, trade_date) DO UPDATE SET
                open_premium = excluded.open_premium,
                close_premium = excluded.close_premium,
                max_premium = excluded.max_premium,
                min_premium = excluded.min_premium,
                avg_premium = excluded.avg_premium,
                p95_premium = excluded.p95_premium,
                p5_premium = excluded.p5_premium,
                sample_count = excluded.sample_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&stat.stock_code)
        .bind(stat.trade_date)
        .bind(stat.open_premium.to_string())
        .bind(stat.close_premium.to_string())
        .bind(stat.max_premium.to_string())
        .bind(stat.min_premium.to_string())
        .bind(stat.avg_premium.to_string())
        .bind(stat.p95_premium.to_string())
        .bind(stat.p5_premium.to_string())
        .bind(i64::from(stat.sample_count))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_fx_sample(&self, sample: &FxRateSample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO fx_rate_samples (currency_pair, rate, captured_at, trade_date, source)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&sample.currency_pair)
        .bind(sample.rate.to_string())
        .bind(sample.captured_at)
        .bind(sample.trade_date)
        .bind(sample.source.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PairRegistry for SqliteStore {
    async fn list_tracked_pairs(&self) -> Result<Vec<TradedPair>> {
        let rows = sqlx::query_as::<_, TradedPairRow>(
            r#"
            SELECT a_code, h_code, name, enabled
            FROM traded_pairs
            WHERE enabled = 1
            ORDER BY a_code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TradedPair::from).collect())
    }

    async fn latest_fx_rate(&self, currency_pair: &str) -> Result<Option<FxRateSample>> {
        let row = sqlx::query_as::<_, FxRateRow>(
            r#"
            SELECT currency_pair, rate, captured_at, trade_date, source
            FROM fx_rate_samples
            WHERE currency_pair = ?
            ORDER BY captured_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(currency_pair)
        .fetch_optional(&self.pool)
        .await?;
        row.map(FxRateSample::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Datelike, TimeZone};
    use rust_decimal_macros::dec;

    use crate::types::{CaptureTick, FxSource, Market};

    fn ts(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn snapshot(symbol: &str, market: Market, price: rust_decimal::Decimal) -> PriceSnapshot {
        PriceSnapshot {
            symbol: symbol.to_string(),
            market,
            current: price,
            open: price,
            high: price,
            low: price,
            prev_close: price,
            change_percent: None,
            captured_at: ts(2, 0),
            trade_date: day(),
            source: "test".to_string(),
        }
    }

    fn sample(code: &str, at: DateTime<Utc>, premium: rust_decimal::Decimal) -> PremiumSample {
        PremiumSample {
            a_code: code.to_string(),
            a_price: dec!(10),
            h_price: dec!(12),
            fx_rate: dec!(0.9),
            premium_percent: premium,
            captured_at: at,
            trade_date: day(),
        }
    }

    async fn count(store: &SqliteStore, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(store.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn record_collection_writes_all_three_rows() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = snapshot("601318", Market::A, dec!(45.67));
        let h = snapshot("02318", Market::H, dec!(38.12));
        let s = sample("601318", ts(2, 0), dec!(5.8824));

        store.record_collection(&a, &h, &s).await.unwrap();

        assert_eq!(count(&store, "price_snapshots").await, 2);
        assert_eq!(count(&store, "premium_samples").await, 1);
        let back = store.query_premium_samples("601318", day()).await.unwrap();
        assert_eq!(back, vec![s]);
    }

    #[tokio::test]
    async fn samples_come_back_in_capture_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_premium_sample(&sample("601318", ts(3, 0), dec!(2))).await.unwrap();
        store.upsert_premium_sample(&sample("601318", ts(1, 30), dec!(1))).await.unwrap();
        store.upsert_premium_sample(&sample("601939", ts(2, 0), dec!(9))).await.unwrap();

        let rows = store.query_premium_samples("601318", day()).await.unwrap();
        let premiums: Vec<_> = rows.iter().map(|r| r.premium_percent).collect();
        assert_eq!(premiums, vec![dec!(1), dec!(2)]);
    }

    #[tokio::test]
    async fn latest_fx_rate_is_latest_by_capture_time() {
        let store = SqliteStore::in_memory().await.unwrap();
        let tick = |h| CaptureTick { captured_at: ts(h, 0), trade_date: day() };

        store
            .insert_fx_sample(&FxRateSample::new("HKDCNY", dec!(0.91), &tick(3), FxSource::Manual).unwrap())
            .await
            .unwrap();
        store
            .insert_fx_sample(&FxRateSample::new("HKDCNY", dec!(0.90), &tick(1), FxSource::Fetched).unwrap())
            .await
            .unwrap();

        let latest = store.latest_fx_rate("HKDCNY").await.unwrap().unwrap();
        assert_eq!(latest.rate, dec!(0.91));
        assert_eq!(latest.source, FxSource::Manual);
        assert!(store.latest_fx_rate("USDCNY").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn seeding_is_insert_or_ignore() {
        let store = SqliteStore::in_memory().await.unwrap();
        let pairs = vec![
            TradedPair { a_code: "601318".into(), h_code: "02318".into(), name: "Ping An".into(), enabled: true },
            TradedPair { a_code: "601939".into(), h_code: "00939".into(), name: "CCB".into(), enabled: false },
        ];
        assert_eq!(store.seed_pairs(&pairs).await.unwrap(), 2);
        assert_eq!(store.seed_pairs(&pairs).await.unwrap(), 0);

        let tracked = store.list_tracked_pairs().await.unwrap();
        assert_eq!(tracked.len(), 1, "disabled pairs are not tracked");
        assert_eq!(tracked[0].a_code, "601318");
    }

    #[tokio::test]
    async fn recent_daily_stats_newest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        for d in 4..=6 {
            let stat = DailyStat {
                stock_code: "601318".to_string(),
                trade_date: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
                open_premium: dec!(1),
                close_premium: dec!(2),
                max_premium: dec!(3),
                min_premium: dec!(0.5),
                avg_premium: dec!(1.5),
                p95_premium: dec!(2.9),
                p5_premium: dec!(0.6),
                sample_count: 10,
            };
            store.upsert_daily_stat(&stat).await.unwrap();
        }

        let recent = store.recent_daily_stats("601318", 2).await.unwrap();
        let dates: Vec<_> = recent.iter().map(|s| s.trade_date.day()).collect();
        assert_eq!(dates, vec![6, 5]);
        assert!(store.recent_daily_stats("601939", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_collection_is_all_or_nothing() {
        let store = SqliteStore::in_memory().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_samples BEFORE INSERT ON premium_samples
             BEGIN SELECT RAISE(ABORT, 'sample rejected'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let a = snapshot("601318", Market::A, dec!(45.67));
        let h = snapshot("02318", Market::H, dec!(38.12));
        let s = sample("601318", ts(2, 0), dec!(5.8824));

        assert!(store.record_collection(&a, &h, &s).await.is_err());
        assert_eq!(count(&store, "price_snapshots").await, 0, "snapshots must roll back with the sample");
        assert_eq!(count(&store, "premium_samples").await, 0);
    }

    #[tokio::test]
    async fn daily_stats_between_spans_all_stocks() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (code, d) in [("601939", 4), ("601318", 5), ("601939", 5), ("601318", 7)] {
            let stat = DailyStat {
                stock_code: code.to_string(),
                trade_date: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
                open_premium: dec!(1),
                close_premium: dec!(1),
                max_premium: dec!(1),
                min_premium: dec!(1),
                avg_premium: dec!(1),
                p95_premium: dec!(1),
                p5_premium: dec!(1),
                sample_count: 1,
            };
            store.upsert_daily_stat(&stat).await.unwrap();
        }

        let from = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let rows = store.daily_stats_between(from, to).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|s| (s.stock_code.as_str(), s.trade_date.day())).collect();
        assert_eq!(keys, vec![("601939", 4), ("601318", 5), ("601939", 5)]);
    }
}

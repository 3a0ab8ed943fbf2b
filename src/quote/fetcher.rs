use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::quote::parser::{parse_fx_rate, parse_quote};
use crate::types::{CaptureTick, Market, PriceSnapshot};

/// Where the collector gets prices from. Implementations never fail loudly:
/// every problem collapses to `None` after being logged.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_price(&self, code: &str, market: Market, tick: &CaptureTick) -> Option<PriceSnapshot>;

    async fn fetch_fx_rate(&self, pair: &str) -> Option<Decimal>;
}

/// Vendor symbol for a raw exchange code.
/// Shanghai A-shares start with `6` → `sh601318`; other A-shares → `sz000002`;
/// H-shares → `hk02318`.
pub fn vendor_symbol(code: &str, market: Market) -> String {
    let code = code.trim();
    match market {
        Market::A if code.starts_with('6') => format!("sh{code}"),
        Market::A => format!("sz{code}"),
        Market::H => format!("hk{code}"),
    }
}

/// `HKDCNY` → `r_hkdcny`.
pub fn fx_symbol(pair: &str) -> String {
    format!("r_{}", pair.trim().to_lowercase())
}

/// HTTP client for the vendor quote endpoint.
pub struct QuoteFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl QuoteFetcher {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.quote_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.quote_base_url.clone(),
        })
    }

    /// GET `<base_url><symbol>` and return the body, or `None` on any failure.
    async fn get_text(&self, symbol: &str) -> Option<String> {
        let url = format!("{}{}", self.base_url, symbol);
        debug!(%url, "quote request");

        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                let kind = if e.is_timeout() { "timeout" } else { "request" };
                warn!(symbol, kind, "quote fetch failed: {e}");
                return None;
            }
        };
        let resp = match resp.error_for_status() {
            Ok(r) => r,
            Err(e) => {
                warn!(symbol, "quote endpoint returned error status: {e}");
                return None;
            }
        };
        match resp.text().await {
            Ok(body) if !body.trim().is_empty() => Some(body),
            Ok(_) => {
                warn!(symbol, "quote endpoint returned an empty body");
                None
            }
            Err(e) => {
                warn!(symbol, "failed to read quote body: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl QuoteSource for QuoteFetcher {
    async fn fetch_price(&self, code: &str, market: Market, tick: &CaptureTick) -> Option<PriceSnapshot> {
        let symbol = vendor_symbol(code, market);
        let body = self.get_text(&symbol).await?;
        match parse_quote(&body, code, market, tick) {
            Ok(snap) => Some(snap),
            Err(e) => {
                warn!(%symbol, %market, "discarding quote: {e}");
                None
            }
        }
    }

    async fn fetch_fx_rate(&self, pair: &str) -> Option<Decimal> {
        let symbol = fx_symbol(pair);
        let body = self.get_text(&symbol).await?;
        match parse_fx_rate(&body) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!(%symbol, "discarding fx rate: {e}");
                None
            }
        }
    }
}

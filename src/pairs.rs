//! Built-in A/H code mapping, loaded into the registry by `seed-pairs`.

use tracing::info;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::TradedPair;

/// `(a_code, h_code, name)`
pub const SEED_PAIRS: &[(&str, &str, &str)] = &[
    ("601398", "01398", "ICBC"),
    ("601939", "00939", "China Construction Bank"),
    ("601288", "01288", "Agricultural Bank of China"),
    ("601988", "03988", "Bank of China"),
    ("601328", "03328", "Bank of Communications"),
    ("600036", "03968", "China Merchants Bank"),
    ("601318", "02318", "Ping An Insurance"),
    ("601628", "02628", "China Life Insurance"),
    ("601088", "01088", "China Shenhua Energy"),
    ("600028", "00386", "Sinopec"),
    ("601857", "00857", "PetroChina"),
    ("601186", "01186", "China Railway Construction"),
    ("601766", "01766", "CRRC"),
    ("600585", "00914", "Anhui Conch Cement"),
];

pub fn builtin_pairs() -> Vec<TradedPair> {
    SEED_PAIRS
        .iter()
        .map(|&(a, h, name)| TradedPair {
            a_code: a.to_string(),
            h_code: h.to_string(),
            name: name.to_string(),
            enabled: true,
        })
        .collect()
}

/// Pairs to seed: the JSON file at `PAIR_SEED_PATH` when set, otherwise the
/// built-in table.
pub fn load_seed(cfg: &Config) -> Result<Vec<TradedPair>> {
    match &cfg.pair_seed_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let pairs = parse_seed_json(&raw)?;
            info!("Loaded {} pairs from {path}", pairs.len());
            Ok(pairs)
        }
        None => Ok(builtin_pairs()),
    }
}

fn parse_seed_json(raw: &str) -> Result<Vec<TradedPair>> {
    let pairs: Vec<TradedPair> = serde_json::from_str(raw)?;
    if let Some(bad) = pairs
        .iter()
        .find(|p| p.a_code.trim().is_empty() || p.h_code.trim().is_empty())
    {
        return Err(AppError::InvalidInput(format!(
            "seed entry with empty code: a='{}' h='{}'",
            bad.a_code, bad.h_code
        )));
    }
    Ok(pairs)
}

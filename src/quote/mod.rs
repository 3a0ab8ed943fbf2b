pub mod fetcher;
pub mod parser;

pub use fetcher::{QuoteFetcher, QuoteSource};

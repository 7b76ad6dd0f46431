//! Feed ingestion: fetching, parsing, date normalization and aggregation.
//!
//! | Stage | Module | Notes |
//! |-------|--------|-------|
//! | Fetch | [`fetcher`] | Header fallback, deny-list, retry with backoff |
//! | Dates | [`dates`] | RFC 822 / ISO 8601 / bare dates to UTC |
//! | Parse | [`parser`] | Strict XML strategies, [`lenient`] fallback |
//! | Aggregate | [`aggregator`] | Window filter, de-duplication, stats |
//! | Diagnose | [`diagnostics`] | Per-feed health report |

pub mod aggregator;
pub mod dates;
pub mod diagnostics;
pub mod fetcher;
pub mod lenient;
pub mod parser;
pub mod xml;

pub use aggregator::{Aggregation, Aggregator};
pub use fetcher::{FeedFetcher, FetchConfig, FetchError};

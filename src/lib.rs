//! # Options Scanner - Unusual Options Volume
//!
//! Scans the full option chains of a set of underlyings and reports every
//! contract whose session volume meets a threshold, annotated with
//! Black-Scholes Greeks.
//!
//! ## Key Components
//!
//! - **Data Fetching**: `OptionsDataSource` seam, Yahoo Finance client, chain normalization
//! - **Black-Scholes**: Price, Greeks and IV solver
//! - **Scanner**: Bounded worker pool with per-symbol timeouts and cancellation
//! - **Cache**: Single-flight TTL cache of completed scans
//!
//! ## Usage
//!
//! ```rust,no_run
//! use options_scanner::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> ScannerResult<()> {
//! let config = ScannerConfig::default();
//! let source = Arc::new(YahooClient::new(Duration::from_secs(10))?);
//! let scanner = Scanner::new(source, config)?;
//!
//! let result = scanner.scan(&["AAPL", "TSLA"], 100).await?;
//! for contract in &result.contracts {
//!     println!("{} {} {} vol={}", contract.symbol, contract.strike, contract.option_type, contract.volume);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## What This Does NOT Do
//!
//! - Place orders or track positions
//! - Stream quotes (data is pulled per scan)
//! - Price American early exercise (European model only)

pub mod config;
pub mod core;
pub mod data;
pub mod models;
pub mod scan;

/// Prelude with commonly used types
pub mod prelude {
    pub use crate::config::ScannerConfig;

    // Core types
    pub use crate::core::{
        Clock, Contract, FailureKind, Greeks, IvSource, ManualClock, OptionQuote, OptionType,
        PriceAndGreeks, ScannerError, ScannerResult, SymbolChain, SystemClock,
    };

    // Data
    pub use crate::data::{
        ChainFetcher, OptionsDataSource, ScanCache, SourceChain, SourceQuote, StubSource,
        YahooClient,
    };

    // Models
    pub use crate::models::{implied_volatility, price as bs_price, price_and_greeks};

    // Scanning
    pub use crate::scan::{
        BroadcastProgress, ExpiryFilter, NoProgress, ProgressEvent, ProgressSink, ScanRequest,
        ScanResult, ScanSummary, Scanner, Sentiment, SymbolFlow, SymbolOutcome,
    };
}

// Re-export main types at crate root
pub use crate::core::{ScannerError, ScannerResult};
pub use crate::scan::{ScanRequest, ScanResult, Scanner};

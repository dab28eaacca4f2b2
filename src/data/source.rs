//! External options data source
//!
//! The scanner talks to market data only through [`OptionsDataSource`]. Records
//! crossing this seam are loosely typed (everything optional, signed counts,
//! IV in the source's own unit); the chain fetcher turns them into
//! [`OptionQuote`](crate::core::OptionQuote)s.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::ScannerResult;

/// Unit the source reports implied volatility in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvUnit {
    /// 0.35 = 35%
    Fraction,
    /// 35.0 = 35%
    Percent,
}

/// One contract as reported by a data source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceQuote {
    pub contract_symbol: Option<String>,
    pub strike: Option<f64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last_price: Option<f64>,
    pub implied_volatility: Option<f64>,
}

impl SourceQuote {
    pub fn new(strike: f64) -> Self {
        Self {
            strike: Some(strike),
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: i64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_open_interest(mut self, open_interest: i64) -> Self {
        self.open_interest = Some(open_interest);
        self
    }

    pub fn with_iv(mut self, iv: f64) -> Self {
        self.implied_volatility = Some(iv);
        self
    }

    pub fn with_quote(mut self, bid: f64, ask: f64, last: f64) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self.last_price = Some(last);
        self
    }
}

/// Calls and puts for one expiration as reported by a data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceChain {
    pub expiration: NaiveDate,
    pub iv_unit: IvUnit,
    pub calls: Vec<SourceQuote>,
    pub puts: Vec<SourceQuote>,
}

impl SourceChain {
    pub fn new(expiration: NaiveDate) -> Self {
        Self {
            expiration,
            iv_unit: IvUnit::Fraction,
            calls: Vec::new(),
            puts: Vec::new(),
        }
    }

    pub fn with_call(mut self, quote: SourceQuote) -> Self {
        self.calls.push(quote);
        self
    }

    pub fn with_put(mut self, quote: SourceQuote) -> Self {
        self.puts.push(quote);
        self
    }
}

/// Market data collaborator.
///
/// Implementations report a symbol with no options market as
/// `ScannerError::DataUnavailable` and transport or parse failures as
/// `ScannerError::Upstream`.
#[async_trait]
pub trait OptionsDataSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Current price of the underlying, `None` if the source has none
    async fn spot_price(&self, symbol: &str) -> ScannerResult<Option<f64>>;

    /// Every expiration currently listed
    async fn expirations(&self, symbol: &str) -> ScannerResult<Vec<NaiveDate>>;

    /// Chain for one listed expiration
    async fn chain(&self, symbol: &str, expiration: NaiveDate) -> ScannerResult<SourceChain>;
}

//! Normalized option quotes
//!
//! Market data for one contract as it leaves the chain fetcher, before any
//! pricing. Upstream field names and units never appear past this point.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::option::OptionType;

/// Option market quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Contract symbol (exchange-specific)
    pub contract_symbol: Option<String>,
    /// Strike price as reported; pricing rejects a non-positive one
    pub strike: f64,
    /// Option type (Call/Put)
    pub option_type: OptionType,
    /// Contracts traded this session
    pub volume: u64,
    /// Open interest
    pub open_interest: u64,
    /// Bid price
    pub bid: Option<f64>,
    /// Ask price, never below bid when both are present
    pub ask: Option<f64>,
    /// Last traded price
    pub last: Option<f64>,
    /// Implied volatility as a fraction (0.35 = 35%)
    pub implied_vol: Option<f64>,
}

impl OptionQuote {
    pub fn new(strike: f64, option_type: OptionType) -> Self {
        Self {
            contract_symbol: None,
            strike,
            option_type,
            volume: 0,
            open_interest: 0,
            bid: None,
            ask: None,
            last: None,
            implied_vol: None,
        }
    }

    /// Mid price from bid/ask
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if ask > 0.0 => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Get the best available price (mid > last)
    pub fn best_price(&self) -> Option<f64> {
        self.mid().or(self.last).filter(|p| *p > 0.0)
    }

    /// Bid-ask spread
    pub fn spread(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        }
    }

    /// Liquidity in 0..=1, the mean of three parts: ln(1 + volume) / 10,
    /// ln(1 + open interest) / 10 and 1 - spread / last (zero without a
    /// two-sided market). A missing or zero last price divides by one.
    pub fn liquidity_score(&self) -> f64 {
        let volume_score = (self.volume as f64).ln_1p() / 10.0;
        let oi_score = (self.open_interest as f64).ln_1p() / 10.0;
        let spread_score = self
            .spread()
            .map(|spread| {
                let last = self.last.filter(|p| *p > 0.0).unwrap_or(1.0);
                (1.0 - spread / last).max(0.0)
            })
            .unwrap_or(0.0);

        ((volume_score + oi_score + spread_score) / 3.0).clamp(0.0, 1.0)
    }

    /// Usable upstream IV, if any
    pub fn usable_iv(&self) -> Option<f64> {
        self.implied_vol.filter(|iv| iv.is_finite() && *iv > 0.0)
    }
}

/// Quotes for a single expiration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpirationChain {
    /// Expiry date
    pub expiration: NaiveDate,
    /// Calls and puts, in upstream order
    pub quotes: Vec<OptionQuote>,
}

impl ExpirationChain {
    pub fn new(expiration: NaiveDate) -> Self {
        Self {
            expiration,
            quotes: Vec::new(),
        }
    }
}

/// Everything fetched for one symbol: spot plus every listed expiration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolChain {
    /// Underlying symbol
    pub symbol: String,
    /// Spot price resolved at fetch time, always positive
    pub spot: f64,
    /// Loaded chains, sorted by expiration
    pub expirations: Vec<ExpirationChain>,
    /// Listed expirations whose chain could not be loaded
    pub failed_expirations: Vec<NaiveDate>,
    /// Timestamp
    pub fetched_at: DateTime<Utc>,
}

impl SymbolChain {
    pub fn new(symbol: impl Into<String>, spot: f64, fetched_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            spot,
            expirations: Vec::new(),
            failed_expirations: Vec::new(),
            fetched_at,
        }
    }

    /// Add a chain
    pub fn add_chain(&mut self, chain: ExpirationChain) {
        self.expirations.push(chain);
        self.expirations.sort_by_key(|c| c.expiration);
    }

    /// Total number of quotes
    pub fn total_quotes(&self) -> usize {
        self.expirations.iter().map(|c| c.quotes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_prices() {
        let mut quote = OptionQuote::new(500.0, OptionType::Call);
        assert_eq!(quote.best_price(), None);

        quote.last = Some(10.2);
        assert_eq!(quote.best_price(), Some(10.2));

        quote.bid = Some(10.0);
        quote.ask = Some(10.5);
        assert!((quote.best_price().unwrap() - 10.25).abs() < 1e-12);
        assert!((quote.spread().unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_liquidity_score() {
        let mut quote = OptionQuote::new(100.0, OptionType::Call);
        assert_eq!(quote.liquidity_score(), 0.0);

        quote.volume = 1000;
        quote.open_interest = 5000;
        quote.bid = Some(1.9);
        quote.ask = Some(2.1);
        quote.last = Some(2.0);
        let expected = (1001f64.ln() / 10.0 + 5001f64.ln() / 10.0 + 0.9) / 3.0;
        assert!((quote.liquidity_score() - expected).abs() < 1e-12);

        // One-sided market scores no spread component
        quote.ask = None;
        let one_sided = quote.liquidity_score();
        assert!((one_sided - (expected - 0.3)).abs() < 1e-12);

        // Spread wider than the last price floors at zero
        quote.bid = Some(0.0);
        quote.ask = Some(5.0);
        assert!((quote.liquidity_score() - one_sided).abs() < 1e-12);
    }

    #[test]
    fn test_usable_iv() {
        let mut quote = OptionQuote::new(100.0, OptionType::Put);
        assert_eq!(quote.usable_iv(), None);
        quote.implied_vol = Some(0.0);
        assert_eq!(quote.usable_iv(), None);
        quote.implied_vol = Some(f64::NAN);
        assert_eq!(quote.usable_iv(), None);
        quote.implied_vol = Some(0.42);
        assert_eq!(quote.usable_iv(), Some(0.42));
    }

    #[test]
    fn test_chain_sorted_by_expiration() {
        let mut chain = SymbolChain::new("AAPL", 190.0, Utc::now());
        let late = NaiveDate::from_ymd_opt(2026, 12, 18).unwrap();
        let early = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();

        let mut c1 = ExpirationChain::new(late);
        c1.quotes.push(OptionQuote::new(190.0, OptionType::Call));
        let mut c2 = ExpirationChain::new(early);
        c2.quotes.push(OptionQuote::new(190.0, OptionType::Put));
        c2.quotes.push(OptionQuote::new(195.0, OptionType::Call));

        chain.add_chain(c1);
        chain.add_chain(c2);

        assert_eq!(chain.expirations[0].expiration, early);
        assert_eq!(chain.total_quotes(), 3);
    }
}

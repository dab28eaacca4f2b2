//! Scanned contract records
//!
//! A `Contract` is an `OptionQuote` annotated with model output at scan time.
//! Greeks are always derived here, never taken from upstream.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::greeks::{Greeks, PriceAndGreeks};
use super::option::OptionType;
use super::quote::OptionQuote;

/// Where the volatility used for pricing came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvSource {
    /// Reported by the data source
    Upstream,
    /// Solved from the contract's market price
    Solved,
    /// Neither available; priced at intrinsic with zero Greeks
    Missing,
}

/// One option instrument at one strike/expiration/type, with analytics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: String,
    pub contract_symbol: Option<String>,
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub volume: u64,
    pub open_interest: u64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    /// Volatility used for pricing, as a fraction
    pub implied_vol: f64,
    pub iv_source: IvSource,
    /// Spot price of the underlying used for pricing
    pub underlying_price: f64,
    pub theoretical_price: f64,
    pub greeks: Greeks,
    pub days_to_expiry: u32,
    /// strike / spot
    pub moneyness: f64,
    pub intrinsic_value: f64,
    /// last - intrinsic
    pub time_value: Option<f64>,
    /// volume / max(open interest, 1)
    pub volume_oi_ratio: f64,
    /// See [`OptionQuote::liquidity_score`]
    pub liquidity_score: f64,
}

impl Contract {
    /// Annotate a quote with pricing output
    #[allow(clippy::too_many_arguments)]
    pub fn from_quote(
        symbol: &str,
        expiration: NaiveDate,
        quote: &OptionQuote,
        spot: f64,
        implied_vol: f64,
        iv_source: IvSource,
        priced: PriceAndGreeks,
        days_to_expiry: u32,
    ) -> Self {
        let intrinsic_value = quote.option_type.intrinsic(spot, quote.strike);
        Self {
            symbol: symbol.to_string(),
            contract_symbol: quote.contract_symbol.clone(),
            expiration,
            strike: quote.strike,
            option_type: quote.option_type,
            volume: quote.volume,
            open_interest: quote.open_interest,
            bid: quote.bid,
            ask: quote.ask,
            last: quote.last,
            implied_vol,
            iv_source,
            underlying_price: spot,
            theoretical_price: priced.price,
            greeks: priced.greeks,
            days_to_expiry,
            moneyness: quote.strike / spot,
            intrinsic_value,
            time_value: quote.last.map(|last| last - intrinsic_value),
            volume_oi_ratio: quote.volume as f64 / quote.open_interest.max(1) as f64,
            liquidity_score: quote.liquidity_score(),
        }
    }

    pub fn is_call(&self) -> bool {
        self.option_type.is_call()
    }

    /// Result ordering: volume descending, then symbol, expiration, strike
    /// ascending, calls before puts.
    pub fn scan_order(&self, other: &Self) -> Ordering {
        other
            .volume
            .cmp(&self.volume)
            .then_with(|| self.symbol.cmp(&other.symbol))
            .then_with(|| self.expiration.cmp(&other.expiration))
            .then_with(|| self.strike.total_cmp(&other.strike))
            .then_with(|| self.option_type.cmp(&other.option_type))
    }
}

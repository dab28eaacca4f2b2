//! Chain fetcher
//!
//! Resolves spot, enumerates every listed expiration and loads each chain
//! from an [`OptionsDataSource`], normalizing records into [`OptionQuote`]s.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

use super::source::{IvUnit, OptionsDataSource, SourceChain, SourceQuote};
use crate::core::{
    Clock, ExpirationChain, OptionQuote, OptionType, ScannerError, ScannerResult, SymbolChain,
};

/// Expiration chains requested concurrently per symbol
const EXPIRATION_CONCURRENCY: usize = 4;

pub struct ChainFetcher {
    source: Arc<dyn OptionsDataSource>,
    clock: Arc<dyn Clock>,
}

impl ChainFetcher {
    pub fn new(source: Arc<dyn OptionsDataSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    /// Fetch spot and every listed expiration for a symbol
    pub async fn fetch_chain(&self, symbol: &str) -> ScannerResult<SymbolChain> {
        self.fetch_chain_where(symbol, |_| true).await
    }

    /// Fetch spot and the listed expirations accepted by `keep`.
    ///
    /// A chain that fails to load is logged and recorded in
    /// `failed_expirations`; the symbol only fails if every chain does.
    pub async fn fetch_chain_where<F>(&self, symbol: &str, keep: F) -> ScannerResult<SymbolChain>
    where
        F: Fn(NaiveDate) -> bool,
    {
        let spot = self.resolve_spot(symbol).await?;

        let mut listed = self.source.expirations(symbol).await?;
        if listed.is_empty() {
            return Err(ScannerError::data_unavailable(symbol, "no listed expirations"));
        }
        listed.sort();
        listed.dedup();

        let wanted: Vec<NaiveDate> = listed.into_iter().filter(|d| keep(*d)).collect();
        let mut chain = SymbolChain::new(symbol, spot, self.clock.now());

        let loaded: Vec<(NaiveDate, ScannerResult<SourceChain>)> = stream::iter(wanted)
            .map(|expiration| async move {
                (expiration, self.source.chain(symbol, expiration).await)
            })
            .buffered(EXPIRATION_CONCURRENCY)
            .collect()
            .await;

        let mut first_error = None;
        for (expiration, result) in loaded {
            match result {
                Ok(raw) => chain.add_chain(normalize_chain(symbol, expiration, raw)),
                Err(e) => {
                    tracing::warn!("Failed to get chain for {} {}: {}", symbol, expiration, e);
                    chain.failed_expirations.push(expiration);
                    first_error.get_or_insert(e);
                }
            }
        }

        if chain.expirations.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        tracing::debug!(
            "Fetched {} quotes across {} expirations for {} from {}",
            chain.total_quotes(),
            chain.expirations.len(),
            symbol,
            self.source.name()
        );
        Ok(chain)
    }

    async fn resolve_spot(&self, symbol: &str) -> ScannerResult<f64> {
        match self.source.spot_price(symbol).await? {
            Some(spot) if spot.is_finite() && spot > 0.0 => Ok(spot),
            Some(spot) => Err(ScannerError::data_unavailable(
                symbol,
                format!("unusable spot price {}", spot),
            )),
            None => Err(ScannerError::data_unavailable(symbol, "no spot price")),
        }
    }
}

/// Convert one source chain into internal quotes.
///
/// Records without a strike are dropped. A strike that is present but not
/// positive is kept as-is and rejected when the contract is priced. Missing
/// or negative counts become zero, unusable prices become `None`, a crossed
/// bid/ask pair is discarded and IV is converted to a fraction.
pub fn normalize_chain(symbol: &str, expiration: NaiveDate, raw: SourceChain) -> ExpirationChain {
    if raw.expiration != expiration {
        tracing::debug!(
            "{}: source labelled chain {} as {}",
            symbol,
            expiration,
            raw.expiration
        );
    }

    let mut chain = ExpirationChain::new(expiration);
    let mut dropped = 0usize;

    let tagged = raw
        .calls
        .into_iter()
        .map(|q| (q, OptionType::Call))
        .chain(raw.puts.into_iter().map(|q| (q, OptionType::Put)));

    for (quote, option_type) in tagged {
        match normalize_quote(quote, option_type, raw.iv_unit) {
            Some(q) => chain.quotes.push(q),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!("{} {}: dropped {} records without a strike", symbol, expiration, dropped);
    }
    chain
}

fn normalize_quote(raw: SourceQuote, option_type: OptionType, iv_unit: IvUnit) -> Option<OptionQuote> {
    let strike = raw.strike?;

    let mut quote = OptionQuote::new(strike, option_type);
    quote.contract_symbol = raw.contract_symbol;
    quote.volume = count(raw.volume);
    quote.open_interest = count(raw.open_interest);
    quote.bid = price(raw.bid);
    quote.ask = price(raw.ask);
    quote.last = price(raw.last_price);

    if let (Some(bid), Some(ask)) = (quote.bid, quote.ask) {
        if bid > ask {
            quote.bid = None;
            quote.ask = None;
        }
    }

    quote.implied_vol = raw
        .implied_volatility
        .filter(|iv| iv.is_finite() && *iv >= 0.0)
        .map(|iv| match iv_unit {
            IvUnit::Fraction => iv,
            IvUnit::Percent => iv / 100.0,
        });

    Some(quote)
}

fn count(value: Option<i64>) -> u64 {
    value.map(|v| v.max(0) as u64).unwrap_or(0)
}

fn price(value: Option<f64>) -> Option<f64> {
    value.filter(|p| p.is_finite() && *p >= 0.0)
}

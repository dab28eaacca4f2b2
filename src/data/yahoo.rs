//! Yahoo Finance data source
//!
//! Fetches free delayed options data through Yahoo Finance's unofficial
//! options endpoint.
//!
//! Note: Yahoo Finance data is delayed ~15 minutes and intended for
//! personal use.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::source::{IvUnit, OptionsDataSource, SourceChain, SourceQuote};
use crate::core::{ScannerError, ScannerResult};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v7/finance";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Yahoo Finance API client
pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
}

impl YahooClient {
    /// Client with a per-request timeout
    pub fn new(request_timeout: Duration) -> ScannerResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, request_timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, request_timeout: Duration) -> ScannerResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ScannerError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, symbol: &str, url: &str) -> ScannerResult<T> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(ScannerError::data_unavailable(symbol, "unknown symbol"));
            }
            s => return Err(ScannerError::upstream(format!("{} returned {}", url, s))),
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn quote_price(&self, symbol: &str) -> ScannerResult<Option<f64>> {
        let url = format!("{}/quote?symbols={}", self.base_url, symbol);
        let response: YahooQuoteResponse = self.get_json(symbol, &url).await?;

        Ok(response
            .quote_response
            .result
            .first()
            .and_then(YahooQuoteData::price))
    }

    async fn options_page(&self, symbol: &str, date: Option<i64>) -> ScannerResult<YahooOptionChainData> {
        let url = match date {
            Some(ts) => format!("{}/options/{}?date={}", self.base_url, symbol, ts),
            None => format!("{}/options/{}", self.base_url, symbol),
        };

        let response: YahooOptionsResponse = self.get_json(symbol, &url).await?;
        if let Some(error) = response.option_chain.error {
            return Err(ScannerError::upstream(format!("{}: {}", symbol, error)));
        }

        response
            .option_chain
            .result
            .into_iter()
            .next()
            .ok_or_else(|| ScannerError::data_unavailable(symbol, "no options data returned"))
    }
}

#[async_trait]
impl OptionsDataSource for YahooClient {
    fn name(&self) -> &str {
        "yahoo"
    }

    /// Quote endpoint first, then the quote embedded in the options page
    async fn spot_price(&self, symbol: &str) -> ScannerResult<Option<f64>> {
        match self.quote_price(symbol).await {
            Ok(Some(price)) => return Ok(Some(price)),
            Ok(None) => tracing::debug!("{}: no price from quote endpoint, using options page", symbol),
            Err(e) => tracing::warn!("{}: quote endpoint failed ({}), using options page", symbol, e),
        }

        let page = self.options_page(symbol, None).await?;
        Ok(page.quote.as_ref().and_then(YahooQuoteData::price))
    }

    async fn expirations(&self, symbol: &str) -> ScannerResult<Vec<NaiveDate>> {
        let page = self.options_page(symbol, None).await?;

        Ok(page
            .expiration_dates
            .iter()
            .filter_map(|&ts| DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()))
            .collect())
    }

    async fn chain(&self, symbol: &str, expiration: NaiveDate) -> ScannerResult<SourceChain> {
        // Yahoo keys chains by midnight UTC of the expiration date
        let ts = expiration
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .ok_or_else(|| ScannerError::invalid_input(format!("bad expiration {}", expiration)))?;

        let page = self.options_page(symbol, Some(ts)).await?;
        Ok(convert_chain(expiration, page))
    }
}

fn convert_chain(expiration: NaiveDate, page: YahooOptionChainData) -> SourceChain {
    let mut chain = SourceChain::new(expiration);
    chain.iv_unit = IvUnit::Fraction;

    if let Some(options) = page.options.into_iter().next() {
        chain.calls = options.calls.into_iter().map(convert_quote).collect();
        chain.puts = options.puts.into_iter().map(convert_quote).collect();
    }
    chain
}

fn convert_quote(data: YahooOptionData) -> SourceQuote {
    SourceQuote {
        contract_symbol: data.contract_symbol,
        strike: data.strike,
        volume: data.volume,
        open_interest: data.open_interest,
        bid: data.bid,
        ask: data.ask,
        last_price: data.last_price,
        implied_volatility: data.implied_volatility,
    }
}

// Yahoo Finance API response structures

#[derive(Debug, Deserialize)]
struct YahooQuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: YahooQuoteResult,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteResult {
    #[serde(default)]
    result: Vec<YahooQuoteData>,
}

#[derive(Debug, Deserialize)]
struct YahooQuoteData {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    #[serde(rename = "regularMarketPreviousClose")]
    regular_market_previous_close: Option<f64>,
}

impl YahooQuoteData {
    /// Market price, else the previous close
    fn price(&self) -> Option<f64> {
        let usable = |p: &f64| p.is_finite() && *p > 0.0;
        self.regular_market_price
            .filter(usable)
            .or(self.regular_market_previous_close.filter(usable))
    }
}

#[derive(Debug, Deserialize)]
struct YahooOptionsResponse {
    #[serde(rename = "optionChain")]
    option_chain: YahooOptionChain,
}

#[derive(Debug, Deserialize)]
struct YahooOptionChain {
    #[serde(default)]
    result: Vec<YahooOptionChainData>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct YahooOptionChainData {
    #[serde(rename = "expirationDates", default)]
    expiration_dates: Vec<i64>,
    quote: Option<YahooQuoteData>,
    #[serde(default)]
    options: Vec<YahooOptions>,
}

#[derive(Debug, Deserialize)]
struct YahooOptions {
    #[serde(default)]
    calls: Vec<YahooOptionData>,
    #[serde(default)]
    puts: Vec<YahooOptionData>,
}

#[derive(Debug, Deserialize)]
struct YahooOptionData {
    #[serde(rename = "contractSymbol")]
    contract_symbol: Option<String>,
    strike: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    #[serde(rename = "lastPrice")]
    last_price: Option<f64>,
    volume: Option<i64>,
    #[serde(rename = "openInterest")]
    open_interest: Option<i64>,
    #[serde(rename = "impliedVolatility")]
    implied_volatility: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "optionChain": {
            "result": [{
                "underlyingSymbol": "AAPL",
                "expirationDates": [1774224000, 1776384000],
                "quote": {"regularMarketPrice": 190.12},
                "options": [{
                    "expirationDate": 1774224000,
                    "calls": [{
                        "contractSymbol": "AAPL260320C00190000",
                        "strike": 190.0,
                        "lastPrice": 4.1,
                        "bid": 4.0,
                        "ask": 4.2,
                        "volume": 1520,
                        "openInterest": 8801,
                        "impliedVolatility": 0.2841
                    }],
                    "puts": [{
                        "contractSymbol": "AAPL260320P00180000",
                        "strike": 180.0,
                        "lastPrice": 1.05,
                        "openInterest": 412,
                        "impliedVolatility": 0.31
                    }]
                }]
            }],
            "error": null
        }
    }"#;

    #[test]
    fn test_parse_options_page() {
        let response: YahooOptionsResponse = serde_json::from_str(SAMPLE).unwrap();
        let page = response.option_chain.result.into_iter().next().unwrap();
        assert_eq!(page.expiration_dates.len(), 2);
        assert_eq!(page.quote.as_ref().and_then(YahooQuoteData::price), Some(190.12));

        let expiration = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        let chain = convert_chain(expiration, page);
        assert_eq!(chain.calls.len(), 1);
        assert_eq!(chain.puts.len(), 1);
        assert_eq!(chain.calls[0].volume, Some(1520));
        assert_eq!(chain.puts[0].volume, None);
        assert_eq!(chain.iv_unit, IvUnit::Fraction);
    }

    #[test]
    fn test_quote_price_falls_back_to_previous_close() {
        let json = r#"{"quoteResponse": {"result": [
            {"regularMarketPrice": null, "regularMarketPreviousClose": 188.5}
        ]}}"#;
        let response: YahooQuoteResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.quote_response.result[0].price(), Some(188.5));

        let page: YahooOptionChainData = serde_json::from_str(
            r#"{"expirationDates": [], "quote": {"regularMarketPrice": 0.0}}"#,
        )
        .unwrap();
        assert_eq!(page.quote.as_ref().and_then(YahooQuoteData::price), None);

        let bare: YahooOptionChainData = serde_json::from_str(r#"{"expirationDates": []}"#).unwrap();
        assert!(bare.quote.is_none());
    }

    #[test]
    #[ignore] // Requires network
    fn test_live_expirations() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let client = YahooClient::new(Duration::from_secs(10)).unwrap();
        let expiries = rt.block_on(client.expirations("SPY")).unwrap();

        assert!(!expiries.is_empty());
        println!("SPY expiries: {:?}", expiries);
    }
}

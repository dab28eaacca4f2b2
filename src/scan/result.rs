//! Scan results and summary statistics

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::request::{ExpiryFilter, ScanRequest};
use crate::core::{Contract, FailureKind, OptionQuote, OptionType, ScannerError, ScannerResult};

/// Call score at or above which flow reads bullish
const BULLISH_SCORE: f64 = 60.0;
/// Call score at or below which flow reads bearish
const BEARISH_SCORE: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Bullish,
    Neutral,
    Bearish,
}

/// Strikes reported in `most_active_strikes`
const MOST_ACTIVE_STRIKES: usize = 10;
/// Contracts reported in `unusual_activity`
const UNUSUAL_LIMIT: usize = 20;
/// Volume percentile a contract must reach to count as unusual
const UNUSUAL_PERCENTILE: f64 = 95.0;
/// Volume a contract must exceed to count as unusual
const UNUSUAL_MIN_VOLUME: u64 = 100;

/// Combined call and put volume at one strike, across expirations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeActivity {
    pub strike: f64,
    pub call_volume: u64,
    pub put_volume: u64,
    pub volume: u64,
}

/// A contract trading far above the rest of its chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnusualActivity {
    pub expiration: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub volume: u64,
    pub open_interest: u64,
    pub last: Option<f64>,
    /// volume / max(open interest, 1)
    pub volume_oi_ratio: f64,
}

/// Chain-wide call/put activity for one symbol, before threshold filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFlow {
    pub spot: f64,
    pub call_volume: u64,
    pub put_volume: u64,
    pub call_open_interest: u64,
    pub put_open_interest: u64,
    /// put volume / call volume, `None` without call volume
    pub put_call_ratio: Option<f64>,
    /// Share of volume in calls, 0..=100
    pub sentiment_score: f64,
    pub sentiment: Sentiment,
    /// Listed strike at which option holders collect least at expiry,
    /// `None` without open interest
    pub max_pain: Option<f64>,
    /// Busiest strikes by combined volume, at most ten
    pub most_active_strikes: Vec<StrikeActivity>,
    /// Contracts at or above the chain's 95th volume percentile and over
    /// 100 contracts, busiest first, at most twenty
    pub unusual_activity: Vec<UnusualActivity>,
    pub expirations_scanned: usize,
    pub failed_expirations: Vec<NaiveDate>,
}

/// Strike as a map key
#[derive(Debug, Clone, Copy)]
struct StrikeKey(f64);

impl PartialEq for StrikeKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for StrikeKey {}

impl PartialOrd for StrikeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StrikeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct StrikeTally {
    call_volume: u64,
    put_volume: u64,
    call_open_interest: u64,
    put_open_interest: u64,
}

/// Running tally behind a [`SymbolFlow`]
#[derive(Debug, Default)]
pub struct FlowTally {
    call_volume: u64,
    put_volume: u64,
    call_open_interest: u64,
    put_open_interest: u64,
    strikes: BTreeMap<StrikeKey, StrikeTally>,
    traded: Vec<UnusualActivity>,
}

impl FlowTally {
    pub fn add(&mut self, expiration: NaiveDate, quote: &OptionQuote) {
        let at_strike = self.strikes.entry(StrikeKey(quote.strike)).or_default();
        match quote.option_type {
            OptionType::Call => {
                self.call_volume += quote.volume;
                self.call_open_interest += quote.open_interest;
                at_strike.call_volume += quote.volume;
                at_strike.call_open_interest += quote.open_interest;
            }
            OptionType::Put => {
                self.put_volume += quote.volume;
                self.put_open_interest += quote.open_interest;
                at_strike.put_volume += quote.volume;
                at_strike.put_open_interest += quote.open_interest;
            }
        }

        if quote.volume > 0 {
            self.traded.push(UnusualActivity {
                expiration,
                strike: quote.strike,
                option_type: quote.option_type,
                volume: quote.volume,
                open_interest: quote.open_interest,
                last: quote.last,
                volume_oi_ratio: quote.volume as f64 / quote.open_interest.max(1) as f64,
            });
        }
    }

    pub fn finish(self, spot: f64, expirations_scanned: usize, failed_expirations: Vec<NaiveDate>) -> SymbolFlow {
        let total = self.call_volume + self.put_volume;
        let sentiment_score = if total == 0 {
            50.0
        } else {
            100.0 * self.call_volume as f64 / total as f64
        };
        let sentiment = if sentiment_score >= BULLISH_SCORE {
            Sentiment::Bullish
        } else if sentiment_score <= BEARISH_SCORE {
            Sentiment::Bearish
        } else {
            Sentiment::Neutral
        };

        SymbolFlow {
            spot,
            call_volume: self.call_volume,
            put_volume: self.put_volume,
            call_open_interest: self.call_open_interest,
            put_open_interest: self.put_open_interest,
            put_call_ratio: (self.call_volume > 0)
                .then(|| self.put_volume as f64 / self.call_volume as f64),
            sentiment_score,
            sentiment,
            max_pain: self.max_pain(),
            most_active_strikes: self.most_active_strikes(),
            unusual_activity: unusual_activity(self.traded),
            expirations_scanned,
            failed_expirations,
        }
    }

    /// Lowest listed strike minimizing the total in-the-money value of open
    /// interest if the underlying settled there
    fn max_pain(&self) -> Option<f64> {
        if self.call_open_interest + self.put_open_interest == 0 {
            return None;
        }

        let payout = |settle: f64| -> f64 {
            self.strikes
                .iter()
                .map(|(StrikeKey(strike), t)| {
                    t.call_open_interest as f64 * (settle - strike).max(0.0)
                        + t.put_open_interest as f64 * (strike - settle).max(0.0)
                })
                .sum()
        };

        let mut best: Option<(f64, f64)> = None;
        for StrikeKey(settle) in self.strikes.keys() {
            let pain = payout(*settle);
            if best.map_or(true, |(_, least)| pain < least) {
                best = Some((*settle, pain));
            }
        }
        best.map(|(strike, _)| strike)
    }

    /// Volume descending, then strike ascending. Untraded strikes are left out.
    fn most_active_strikes(&self) -> Vec<StrikeActivity> {
        let mut active: Vec<StrikeActivity> = self
            .strikes
            .iter()
            .map(|(StrikeKey(strike), t)| StrikeActivity {
                strike: *strike,
                call_volume: t.call_volume,
                put_volume: t.put_volume,
                volume: t.call_volume + t.put_volume,
            })
            .filter(|a| a.volume > 0)
            .collect();

        // Stable sort keeps ascending strikes among equal volumes
        active.sort_by(|a, b| b.volume.cmp(&a.volume));
        active.truncate(MOST_ACTIVE_STRIKES);
        active
    }
}

fn unusual_activity(mut traded: Vec<UnusualActivity>) -> Vec<UnusualActivity> {
    let mut volumes: Vec<u64> = traded.iter().map(|t| t.volume).collect();
    volumes.sort_unstable();
    let Some(cutoff) = percentile(&volumes, UNUSUAL_PERCENTILE) else {
        return Vec::new();
    };

    traded.retain(|t| t.volume as f64 >= cutoff && t.volume > UNUSUAL_MIN_VOLUME);
    traded.sort_by(|a, b| {
        b.volume
            .cmp(&a.volume)
            .then_with(|| a.expiration.cmp(&b.expiration))
            .then_with(|| a.strike.total_cmp(&b.strike))
            .then_with(|| a.option_type.cmp(&b.option_type))
    });
    traded.truncate(UNUSUAL_LIMIT);
    traded
}

/// Percentile of sorted values, interpolating linearly between ranks
fn percentile(sorted: &[u64], pct: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = pct / 100.0 * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let weight = rank - lo as f64;
    Some(sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * weight)
}

/// How one symbol's scan ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolOutcome {
    Scanned(SymbolFlow),
    Failed { kind: FailureKind, message: String },
}

/// Per-symbol line of the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    /// Contracts retained (zero for a failed symbol)
    pub contracts: usize,
    /// Volume of retained contracts
    pub volume: u64,
    pub outcome: SymbolOutcome,
}

impl SymbolSummary {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, SymbolOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total_contracts: usize,
    pub total_volume: u64,
    pub call_count: usize,
    pub put_count: usize,
    pub call_volume: u64,
    pub put_volume: u64,
    pub volume_threshold: u64,
    pub expiry_filter: ExpiryFilter,
    /// Every requested symbol, failed ones included
    pub symbols: BTreeMap<String, SymbolSummary>,
    pub computed_at: DateTime<Utc>,
}

impl ScanSummary {
    /// Retained contract count per symbol
    pub fn contracts_per_symbol(&self) -> BTreeMap<&str, usize> {
        self.symbols
            .iter()
            .map(|(symbol, s)| (symbol.as_str(), s.contracts))
            .collect()
    }

    pub fn failed_symbols(&self) -> Vec<&str> {
        self.symbols
            .iter()
            .filter(|(_, s)| s.is_failed())
            .map(|(symbol, _)| symbol.as_str())
            .collect()
    }
}

/// Contracts passing the threshold, ordered by [`Contract::scan_order`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub contracts: Vec<Contract>,
    pub summary: ScanSummary,
}

impl ScanResult {
    pub fn contracts_for<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a Contract> + 'a {
        self.contracts.iter().filter(move |c| c.symbol == symbol)
    }
}

/// Collects per-symbol outcomes as they complete
#[derive(Debug)]
pub struct ScanAccumulator {
    volume_threshold: u64,
    expiry_filter: ExpiryFilter,
    contracts: Vec<Contract>,
    symbols: BTreeMap<String, SymbolSummary>,
}

impl ScanAccumulator {
    pub fn new(request: &ScanRequest) -> Self {
        Self {
            volume_threshold: request.volume_threshold(),
            expiry_filter: request.expiry_filter(),
            contracts: Vec::new(),
            symbols: BTreeMap::new(),
        }
    }

    pub fn add_scanned(&mut self, symbol: &str, contracts: Vec<Contract>, flow: SymbolFlow) {
        let summary = SymbolSummary {
            contracts: contracts.len(),
            volume: contracts.iter().map(|c| c.volume).sum(),
            outcome: SymbolOutcome::Scanned(flow),
        };
        self.symbols.insert(symbol.to_string(), summary);
        self.contracts.extend(contracts);
    }

    pub fn add_failed(&mut self, symbol: &str, error: &ScannerError) {
        let summary = SymbolSummary {
            contracts: 0,
            volume: 0,
            outcome: SymbolOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        };
        self.symbols.insert(symbol.to_string(), summary);
    }

    pub fn succeeded(&self) -> usize {
        self.symbols.values().filter(|s| !s.is_failed()).count()
    }

    /// Sort and total. Fails with `ScanFailed` when no symbol succeeded.
    pub fn finish(mut self, computed_at: DateTime<Utc>) -> ScannerResult<ScanResult> {
        if self.succeeded() == 0 {
            let failures = self
                .symbols
                .iter()
                .filter_map(|(symbol, s)| match &s.outcome {
                    SymbolOutcome::Failed { message, .. } => Some((symbol.clone(), message.clone())),
                    SymbolOutcome::Scanned(_) => None,
                })
                .collect();
            return Err(ScannerError::ScanFailed { failures });
        }

        self.contracts.sort_by(Contract::scan_order);

        let (calls, puts): (Vec<&Contract>, Vec<&Contract>) =
            self.contracts.iter().partition(|c| c.is_call());

        let summary = ScanSummary {
            total_contracts: self.contracts.len(),
            total_volume: self.contracts.iter().map(|c| c.volume).sum(),
            call_count: calls.len(),
            put_count: puts.len(),
            call_volume: calls.iter().map(|c| c.volume).sum(),
            put_volume: puts.iter().map(|c| c.volume).sum(),
            volume_threshold: self.volume_threshold,
            expiry_filter: self.expiry_filter,
            symbols: self.symbols,
            computed_at,
        };

        Ok(ScanResult {
            contracts: self.contracts,
            summary,
        })
    }
}

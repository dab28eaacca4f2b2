//! Scan orchestrator
//!
//! Fans a request out over a fixed pool of worker tasks, one queued task per
//! symbol. Each worker fetches the symbol's full chain under a timeout,
//! prices every quote and keeps those meeting the volume threshold. Results
//! reach a single collector over a channel; the scan is assembled only after
//! every worker has joined.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::progress::{BroadcastProgress, NoProgress, ProgressEvent, ProgressSink, SymbolProgress};
use super::request::{ExpiryFilter, Fingerprint, ScanRequest};
use super::result::{FlowTally, ScanAccumulator, ScanResult, SymbolFlow};
use crate::config::ScannerConfig;
use crate::core::{
    days_to_expiry, time_to_expiry_years, Clock, Contract, IvSource, OptionQuote, ScannerError,
    ScannerResult, SymbolChain, SystemClock,
};
use crate::data::{ChainFetcher, OptionsDataSource};
use crate::models::{implied_volatility, price_and_greeks};

/// Runs scans against one data source
pub struct Scanner {
    source: Arc<dyn OptionsDataSource>,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressSink>,
    config: ScannerConfig,
    next_scan_id: AtomicU64,
    next_token_id: AtomicU64,
    /// Token of the latest scan per request fingerprint
    running: Mutex<HashMap<Fingerprint, (u64, CancellationToken)>>,
}

impl Scanner {
    pub fn new(source: Arc<dyn OptionsDataSource>, config: ScannerConfig) -> ScannerResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            clock: Arc::new(SystemClock),
            progress: Arc::new(NoProgress),
            config,
            next_scan_id: AtomicU64::new(1),
            next_token_id: AtomicU64::new(1),
            running: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Publish progress to a broadcast channel sized by
    /// `config.progress_capacity`, returned for subscribing
    pub fn with_broadcast_progress(self) -> (Self, BroadcastProgress) {
        let progress = BroadcastProgress::new(self.config.progress_capacity);
        (self.with_progress(Arc::new(progress.clone())), progress)
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Token for a new scan of `request`. Cancels the token of an earlier
    /// scan of the same request, so the new scan supersedes it. Scans of
    /// other requests are left running.
    pub fn begin_scan(&self, request: &ScanRequest) -> CancellationToken {
        self.register(request).1
    }

    fn register(&self, request: &ScanRequest) -> (u64, CancellationToken) {
        let id = self.next_token_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.fingerprint(), (id, token.clone()));

        if let Some((_, previous)) = previous {
            if !previous.is_cancelled() {
                tracing::debug!("Superseding previous scan of {}", request.fingerprint());
                previous.cancel();
            }
        }
        (id, token)
    }

    /// Forget token `id` once its scan is over, unless a newer scan replaced it
    fn release(&self, request: &ScanRequest, id: u64) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let key = request.fingerprint();
        if running.get(&key).is_some_and(|(current, _)| *current == id) {
            running.remove(&key);
        }
    }

    /// Query entry point: symbols and a minimum volume
    pub async fn scan<S: AsRef<str>>(&self, symbols: &[S], min_volume: i64) -> ScannerResult<ScanResult> {
        if min_volume < 0 {
            return Err(ScannerError::invalid_input(format!(
                "volume threshold must be non-negative, got {}",
                min_volume
            )));
        }
        let request = ScanRequest::new(symbols, min_volume as u64)?;
        self.run_scan(&request).await
    }

    /// Run a scan that supersedes a running scan of the same request
    pub async fn run_scan(&self, request: &ScanRequest) -> ScannerResult<ScanResult> {
        let (id, cancel) = self.register(request);
        let result = self.run_scan_with_cancel(request, cancel).await;
        self.release(request, id);
        result
    }

    /// Run a scan that stops when `cancel` fires.
    ///
    /// Per-symbol failures are folded into the summary. Fails with
    /// `InvalidInput` before fetching anything, `ScanFailed` when no symbol
    /// succeeded, or `Cancelled`.
    pub async fn run_scan_with_cancel(
        &self,
        request: &ScanRequest,
        cancel: CancellationToken,
    ) -> ScannerResult<ScanResult> {
        let total = request.symbols().len();
        if total > self.config.max_symbols {
            return Err(ScannerError::invalid_input(format!(
                "{} symbols requested, at most {} allowed",
                total, self.config.max_symbols
            )));
        }

        let scan_id = self.next_scan_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "Scan {} started: {} symbols, threshold {}, expirations {}",
            scan_id,
            total,
            request.volume_threshold(),
            request.expiry_filter()
        );
        self.progress.publish(ProgressEvent::Started { scan_id, total });

        let outcome = self.execute(scan_id, request, &cancel).await;

        match &outcome {
            Ok(result) => {
                tracing::info!(
                    "Scan {} finished: {} contracts, volume {}",
                    scan_id,
                    result.summary.total_contracts,
                    result.summary.total_volume
                );
                self.progress.publish(ProgressEvent::Finished {
                    scan_id,
                    result: Arc::new(result.clone()),
                });
            }
            Err(e) => {
                tracing::warn!("Scan {} failed: {}", scan_id, e);
                self.progress.publish(ProgressEvent::Failed {
                    scan_id,
                    error: e.clone(),
                });
            }
        }
        outcome
    }

    async fn execute(
        &self,
        scan_id: u64,
        request: &ScanRequest,
        cancel: &CancellationToken,
    ) -> ScannerResult<ScanResult> {
        let total = request.symbols().len();
        let context = Arc::new(SymbolScanner {
            fetcher: ChainFetcher::new(self.source.clone(), self.clock.clone()),
            clock: self.clock.clone(),
            risk_free_rate: self.config.risk_free_rate,
            volume_threshold: request.volume_threshold(),
            expiry_filter: request.expiry_filter(),
            timeout: self.config.symbol_timeout(),
        });

        let queue = Arc::new(Mutex::new(
            request.symbols().iter().cloned().collect::<VecDeque<_>>(),
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let workers = self.config.workers.min(total).max(1);
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = queue.clone();
            let tx = tx.clone();
            let context = context.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                while let Some(symbol) = next_symbol(&queue) {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        outcome = context.scan(&symbol) => outcome,
                    };
                    if tx.send((symbol, outcome)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut acc = ScanAccumulator::new(request);
        let mut completed = 0;
        while let Some((symbol, outcome)) = rx.recv().await {
            completed += 1;
            let status = match outcome {
                Ok(SymbolScan { contracts, flow }) => {
                    let status = SymbolProgress::Scanned {
                        contracts: contracts.len(),
                    };
                    acc.add_scanned(&symbol, contracts, flow);
                    status
                }
                Err(e) => {
                    tracing::warn!("{}: {}", symbol, e);
                    acc.add_failed(&symbol, &e);
                    SymbolProgress::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };

            self.progress.publish(ProgressEvent::SymbolCompleted {
                scan_id,
                index: completed,
                total,
                symbol,
                status,
            });
        }

        for handle in handles {
            if let Err(e) = handle.await {
                return Err(ScannerError::upstream(format!("scan worker failed: {}", e)));
            }
        }

        if cancel.is_cancelled() {
            tracing::info!("Scan {} cancelled after {} of {} symbols", scan_id, completed, total);
            return Err(ScannerError::Cancelled);
        }

        acc.finish(self.clock.now())
    }
}

fn next_symbol(queue: &Mutex<VecDeque<String>>) -> Option<String> {
    queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
}

/// What one symbol contributes to a scan
struct SymbolScan {
    contracts: Vec<Contract>,
    flow: SymbolFlow,
}

/// Per-scan state shared by the workers
struct SymbolScanner {
    fetcher: ChainFetcher,
    clock: Arc<dyn Clock>,
    risk_free_rate: f64,
    volume_threshold: u64,
    expiry_filter: ExpiryFilter,
    timeout: Duration,
}

impl SymbolScanner {
    async fn scan(&self, symbol: &str) -> ScannerResult<SymbolScan> {
        let now = self.clock.now();
        let filter = self.expiry_filter;
        let fetch = self.fetcher.fetch_chain_where(symbol, |expiration| {
            time_to_expiry_years(now, expiration).is_some() && filter.allows(now, expiration)
        });

        let chain = tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| ScannerError::Timeout {
                symbol: symbol.to_string(),
                secs: self.timeout.as_secs(),
            })??;

        self.price_chain(&chain, now)
    }

    /// Price every quote, keep those meeting the threshold
    fn price_chain(&self, chain: &SymbolChain, now: DateTime<Utc>) -> ScannerResult<SymbolScan> {
        let mut tally = FlowTally::default();
        let mut contracts = Vec::new();
        let mut scanned = 0;

        for expiration_chain in &chain.expirations {
            let expiration = expiration_chain.expiration;
            let Some(time) = time_to_expiry_years(now, expiration) else {
                tracing::debug!("{}: skipping expired {}", chain.symbol, expiration);
                continue;
            };
            let days = days_to_expiry(now, expiration);
            scanned += 1;

            for quote in &expiration_chain.quotes {
                let contract = self.price_quote(&chain.symbol, expiration, quote, chain.spot, time, days)?;
                tally.add(expiration, quote);
                if contract.volume >= self.volume_threshold {
                    contracts.push(contract);
                }
            }
        }

        Ok(SymbolScan {
            contracts,
            flow: tally.finish(chain.spot, scanned, chain.failed_expirations.clone()),
        })
    }

    fn price_quote(
        &self,
        symbol: &str,
        expiration: NaiveDate,
        quote: &OptionQuote,
        spot: f64,
        time: f64,
        days: u32,
    ) -> ScannerResult<Contract> {
        let (vol, iv_source) = self.resolve_vol(quote, spot, time);

        // Bad inputs here mean bad upstream data
        let priced = price_and_greeks(spot, quote.strike, time, self.risk_free_rate, vol, quote.option_type)
            .map_err(|e| {
                ScannerError::upstream(format!(
                    "{} {} {} {}: {}",
                    symbol, expiration, quote.strike, quote.option_type, e
                ))
            })?;

        Ok(Contract::from_quote(
            symbol, expiration, quote, spot, vol, iv_source, priced, days,
        ))
    }

    /// Upstream IV if usable, else solved from the market price, else zero
    fn resolve_vol(&self, quote: &OptionQuote, spot: f64, time: f64) -> (f64, IvSource) {
        if let Some(iv) = quote.usable_iv() {
            return (iv, IvSource::Upstream);
        }

        quote
            .best_price()
            .and_then(|market| {
                implied_volatility(market, spot, quote.strike, time, self.risk_free_rate, quote.option_type).ok()
            })
            .map(|iv| (iv, IvSource::Solved))
            .unwrap_or((0.0, IvSource::Missing))
    }
}

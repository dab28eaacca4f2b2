//! Options Scanner CLI
//!
//! Scans option chains for contracts trading at or above a volume threshold
//! and prints them with their Greeks.
//!
//! Usage: options-scan AAPL,TSLA,NVDA 500 --within-days 45

use clap::Parser;
use options_scanner::prelude::*;
use options_scanner::scan::{parse_threshold, SymbolProgress};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "options-scan", about = "Scan option chains for unusual volume")]
struct Args {
    /// Comma-separated tickers, e.g. AAPL,TSLA
    symbols: String,

    /// Minimum contract volume (inclusive)
    #[arg(allow_hyphen_values = true)]
    threshold: Option<String>,

    /// Risk-free rate used for pricing
    #[arg(long)]
    rate: Option<f64>,

    /// Concurrent symbol workers
    #[arg(long)]
    workers: Option<usize>,

    /// Per-symbol fetch timeout
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Only expirations at most this many days out
    #[arg(long)]
    within_days: Option<u32>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Log progress details
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                ScannerError::InvalidInput(_) | ScannerError::Config(_) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> ScannerResult<()> {
    let mut config = match &args.config {
        Some(path) => ScannerConfig::from_file(path)?,
        None => ScannerConfig::default(),
    };
    if let Some(rate) = args.rate {
        config.risk_free_rate = rate;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(secs) = args.timeout_secs {
        config.symbol_timeout_secs = secs;
    }
    config.validate()?;

    let threshold = match &args.threshold {
        Some(text) => parse_threshold(text)?,
        None => config.default_volume_threshold,
    };
    let mut request = ScanRequest::new(args.symbols.split(','), threshold)?;
    if let Some(days) = args.within_days {
        request = request.with_expiry_filter(ExpiryFilter::WithinDays(days));
    }

    let source = Arc::new(YahooClient::new(config.symbol_timeout())?);
    let (scanner, progress) = Scanner::new(source, config.clone())?.with_broadcast_progress();
    let scanner = Arc::new(scanner);
    let cache = ScanCache::new(config.cache_ttl(), Arc::new(SystemClock));

    let mut events = progress.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let done = event.is_terminal();
                    print_progress(event);
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => eprintln!("({} progress updates skipped)", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = scanner.begin_scan(&request);
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Cancelling...");
                cancel.cancel();
            }
        });
    }

    println!(
        "Scanning {} (volume >= {}, expirations: {})...",
        request.symbols().join(", "),
        request.volume_threshold(),
        request.expiry_filter()
    );

    let result = {
        let scanner = scanner.clone();
        let req = request.clone();
        cache
            .get_or_compute(&request, move || async move {
                scanner.run_scan_with_cancel(&req, cancel).await
            })
            .await?
    };
    // Finished has been published, so the printer is draining
    let _ = printer.await;

    if args.json {
        let json = serde_json::to_string_pretty(&*result)
            .map_err(|e| ScannerError::upstream(format!("cannot encode result: {}", e)))?;
        println!("{}", json);
    } else {
        print_report(&result);
    }
    Ok(())
}

fn print_progress(event: ProgressEvent) {
    if let ProgressEvent::SymbolCompleted {
        index,
        total,
        symbol,
        status,
        ..
    } = event
    {
        match status {
            SymbolProgress::Scanned { contracts } => {
                eprintln!("[{}/{}] {} ({} contracts)", index, total, symbol, contracts)
            }
            SymbolProgress::Failed { message, .. } => {
                eprintln!("[{}/{}] {} failed: {}", index, total, symbol, message)
            }
        }
    }
}

fn print_report(result: &ScanResult) {
    let summary = &result.summary;

    for (symbol, line) in &summary.symbols {
        match &line.outcome {
            SymbolOutcome::Failed { kind, message } => {
                println!("\n{}: no results ({:?}) - {}", symbol, kind, message);
            }
            SymbolOutcome::Scanned(flow) => {
                print_flow(symbol, flow);
                if line.contracts == 0 {
                    println!("  No contracts at or above {}", summary.volume_threshold);
                } else {
                    print_table(result.contracts_for(symbol));
                }
            }
        }
    }

    println!("\n--- Totals ---");
    println!("  Contracts: {} ({} calls, {} puts)", summary.total_contracts, summary.call_count, summary.put_count);
    println!(
        "  Volume:    {} ({} calls, {} puts)",
        summary.total_volume, summary.call_volume, summary.put_volume
    );
    let failed = summary.failed_symbols();
    if !failed.is_empty() {
        println!("  Failed:    {}", failed.join(", "));
    }
    println!("  As of:     {}", summary.computed_at.format("%Y-%m-%d %H:%M:%S UTC"));
}

fn print_flow(symbol: &str, flow: &SymbolFlow) {
    let ratio = flow
        .put_call_ratio
        .map(|r| format!("{:.2}", r))
        .unwrap_or_else(|| "-".to_string());

    println!(
        "\n{} @ ${:.2}  calls {} / puts {}  P/C {}  {:?} ({:.1})",
        symbol, flow.spot, flow.call_volume, flow.put_volume, ratio, flow.sentiment, flow.sentiment_score
    );
    if let Some(max_pain) = flow.max_pain {
        println!("  Max pain ${:.2}", max_pain);
    }
    if !flow.most_active_strikes.is_empty() {
        let strikes: Vec<String> = flow
            .most_active_strikes
            .iter()
            .take(5)
            .map(|a| format!("{:.2} ({})", a.strike, a.volume))
            .collect();
        println!("  Most active strikes: {}", strikes.join(", "));
    }
    for u in &flow.unusual_activity {
        println!(
            "  Unusual: {} {:.2} {} vol {} OI {} ({:.1}x)",
            u.expiration, u.strike, u.option_type, u.volume, u.open_interest, u.volume_oi_ratio
        );
    }
    if !flow.failed_expirations.is_empty() {
        println!("  Skipped {} expirations that failed to load", flow.failed_expirations.len());
    }
}

fn print_table<'a>(contracts: impl Iterator<Item = &'a Contract>) {
    println!(
        "  {:<10} {:>8} {:<4} {:>8} {:>8} {:>7} {:>7} {:>7} {:>6} {:>7} {:>7} {:>7} {:>7} {:>7}",
        "Exp", "Strike", "Type", "Volume", "OI", "Bid", "Ask", "Last", "IV", "Δ", "Γ", "Θ", "Vega", "ρ"
    );
    for c in contracts {
        let g = &c.greeks;
        println!(
            "  {:<10} {:>8.2} {:<4} {:>8} {:>8} {:>7} {:>7} {:>7} {:>5.1}% {:>7.3} {:>7.4} {:>7.3} {:>7.3} {:>7.3}",
            c.expiration.to_string(),
            c.strike,
            c.option_type.to_string(),
            c.volume,
            c.open_interest,
            money(c.bid),
            money(c.ask),
            money(c.last),
            c.implied_vol * 100.0,
            g.delta,
            g.gamma,
            g.theta,
            g.vega,
            g.rho
        );
    }
}

fn money(price: Option<f64>) -> String {
    price.map(|p| format!("{:.2}", p)).unwrap_or_else(|| "-".to_string())
}

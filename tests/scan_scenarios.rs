//! End-to-end scans against the in-memory source

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use options_scanner::prelude::*;
use options_scanner::scan::{SymbolProgress, DEFAULT_VOLUME_THRESHOLD};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
}

fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, 17).unwrap()
}

fn scanner_over(source: Arc<StubSource>, clock: Arc<ManualClock>) -> Scanner {
    Scanner::new(source, ScannerConfig::default())
        .unwrap()
        .with_clock(clock)
}

fn aapl_tsla() -> StubSource {
    StubSource::new()
        .with_symbol(
            "AAPL",
            190.0,
            vec![SourceChain::new(expiry()).with_call(
                SourceQuote::new(195.0)
                    .with_volume(150)
                    .with_open_interest(1200)
                    .with_iv(0.28)
                    .with_quote(3.1, 3.3, 3.2),
            )],
        )
        .with_symbol(
            "TSLA",
            250.0,
            vec![SourceChain::new(expiry()).with_put(
                SourceQuote::new(240.0)
                    .with_volume(50)
                    .with_open_interest(900)
                    .with_iv(0.55),
            )],
        )
}

#[tokio::test]
async fn test_end_to_end_filters_by_volume() {
    let clock = Arc::new(ManualClock::new(now()));
    let scanner = scanner_over(Arc::new(aapl_tsla()), clock);

    let result = scanner.scan(&["AAPL", "TSLA"], 100).await.unwrap();

    assert_eq!(result.contracts.len(), 1);
    let c = &result.contracts[0];
    assert_eq!(c.symbol, "AAPL");
    assert_eq!(c.option_type, OptionType::Call);
    assert_eq!(c.volume, 150);
    assert!(c.greeks.delta > 0.0 && c.greeks.delta < 1.0);
    assert!(c.greeks.gamma > 0.0);
    assert_eq!(c.iv_source, IvSource::Upstream);

    let s = &result.summary;
    assert_eq!(s.total_volume, 150);
    assert_eq!(s.call_count, 1);
    assert_eq!(s.put_count, 0);
    assert_eq!(s.contracts_per_symbol()["TSLA"], 0);
    assert!(s.failed_symbols().is_empty());
}

#[tokio::test]
async fn test_unknown_symbol_fails_scan() {
    let scanner = scanner_over(Arc::new(StubSource::new()), Arc::new(ManualClock::new(now())));

    match scanner.scan(&["ZZZZ"], DEFAULT_VOLUME_THRESHOLD as i64).await {
        Err(ScannerError::ScanFailed { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "ZZZZ");
        }
        other => panic!("expected ScanFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_partial_failure_keeps_successes() {
    let source = aapl_tsla().with_failure("TSLA", ScannerError::upstream("connection reset"));
    let scanner = scanner_over(Arc::new(source), Arc::new(ManualClock::new(now())));

    let result = scanner.scan(&["TSLA", "AAPL"], 0).await.unwrap();

    assert!(result.contracts.iter().all(|c| c.symbol == "AAPL"));
    assert_eq!(result.summary.failed_symbols(), vec!["TSLA"]);
    match &result.summary.symbols["TSLA"].outcome {
        SymbolOutcome::Failed { kind, .. } => assert_eq!(*kind, FailureKind::Upstream),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_spot_is_data_unavailable() {
    let source = aapl_tsla().with_chains_no_spot("NOSPOT", vec![SourceChain::new(expiry())]);
    let scanner = scanner_over(Arc::new(source), Arc::new(ManualClock::new(now())));

    let result = scanner.scan(&["AAPL", "NOSPOT"], 0).await.unwrap();
    match &result.summary.symbols["NOSPOT"].outcome {
        SymbolOutcome::Failed { kind, .. } => assert_eq!(*kind, FailureKind::DataUnavailable),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_order_is_deterministic() {
    let chains = |base: i64| {
        vec![
            SourceChain::new(expiry())
                .with_call(SourceQuote::new(100.0).with_volume(base).with_iv(0.3))
                .with_put(SourceQuote::new(100.0).with_volume(base).with_iv(0.3))
                .with_call(SourceQuote::new(90.0).with_volume(base * 2).with_iv(0.3)),
            SourceChain::new(NaiveDate::from_ymd_opt(2026, 3, 20).unwrap())
                .with_call(SourceQuote::new(100.0).with_volume(base).with_iv(0.3)),
        ]
    };
    let source = Arc::new(
        StubSource::new()
            .with_symbol("MSFT", 100.0, chains(300))
            .with_symbol("AMD", 100.0, chains(300))
            .with_symbol("NVDA", 100.0, chains(150)),
    );
    let clock = Arc::new(ManualClock::new(now()));

    let a = scanner_over(source.clone(), clock.clone())
        .scan(&["NVDA", "MSFT", "AMD"], 100)
        .await
        .unwrap();
    let b = scanner_over(source, clock)
        .scan(&["amd", "AMD", "nvda", "msft"], 100)
        .await
        .unwrap();

    assert_eq!(a.contracts, b.contracts);

    let march = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
    let keys: Vec<_> = a
        .contracts
        .iter()
        .take(5)
        .map(|c| (c.symbol.as_str(), c.volume, c.expiration, c.strike, c.option_type))
        .collect();
    assert_eq!(
        keys,
        vec![
            ("AMD", 600, expiry(), 90.0, OptionType::Call),
            ("MSFT", 600, expiry(), 90.0, OptionType::Call),
            ("AMD", 300, march, 100.0, OptionType::Call),
            ("AMD", 300, expiry(), 100.0, OptionType::Call),
            ("AMD", 300, expiry(), 100.0, OptionType::Put),
        ]
    );
}

#[tokio::test]
async fn test_every_contract_meets_threshold() {
    let volumes = [0, 1, 49, 50, 51, 500, 10_000];
    let mut chain = SourceChain::new(expiry());
    for (i, v) in volumes.iter().enumerate() {
        chain = chain.with_call(SourceQuote::new(100.0 + i as f64).with_volume(*v).with_iv(0.3));
    }
    let source = Arc::new(StubSource::new().with_symbol("SPY", 100.0, vec![chain]));
    let scanner = scanner_over(source, Arc::new(ManualClock::new(now())));

    for threshold in [0, 1, 50, 51, 10_000, 10_001] {
        let result = scanner.scan(&["SPY"], threshold).await.unwrap();
        let expected = volumes.iter().filter(|v| **v >= threshold).count();
        assert_eq!(result.contracts.len(), expected, "threshold {}", threshold);
        assert!(result.contracts.iter().all(|c| c.volume as i64 >= threshold));
    }
}

#[tokio::test]
async fn test_cache_reuses_result_until_ttl() {
    let source = Arc::new(aapl_tsla());
    let clock = Arc::new(ManualClock::new(now()));
    let scanner = Arc::new(scanner_over(source.clone(), clock.clone()));
    let cache = ScanCache::new(Duration::from_secs(300), clock.clone());
    let request = ScanRequest::new(["AAPL", "TSLA"], 100).unwrap();

    let run = |request: ScanRequest| {
        let scanner = scanner.clone();
        move || async move { scanner.run_scan(&request).await }
    };

    let first = cache.get_or_compute(&request, run(request.clone())).await.unwrap();
    assert_eq!(source.fetch_count(), 2);

    let reordered = ScanRequest::new(["TSLA", "AAPL"], 100).unwrap();
    let second = cache.get_or_compute(&reordered, run(reordered.clone())).await.unwrap();
    assert_eq!(source.fetch_count(), 2);
    assert_eq!(first, second);

    clock.advance(chrono::Duration::minutes(5));
    cache.get_or_compute(&request, run(request.clone())).await.unwrap();
    assert_eq!(source.fetch_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_scan_is_not_cached() {
    let source = Arc::new(aapl_tsla().with_delay("AAPL", Duration::from_secs(5)));
    let clock = Arc::new(ManualClock::new(now()));
    let scanner = Arc::new(scanner_over(source.clone(), clock.clone()));
    let cache = ScanCache::new(Duration::from_secs(300), clock);
    let request = ScanRequest::new(["AAPL", "TSLA"], 100).unwrap();

    let cancel = scanner.begin_scan(&request);
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let outcome = {
        let scanner = scanner.clone();
        let req = request.clone();
        cache
            .get_or_compute(&request, move || async move {
                scanner.run_scan_with_cancel(&req, cancel).await
            })
            .await
    };
    assert_eq!(outcome.unwrap_err(), ScannerError::Cancelled);
    assert!(cache.is_empty());
    assert!(cache.get(&request).is_none());
}

#[tokio::test]
async fn test_progress_reports_every_symbol() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let events = events.clone();
        move |event: ProgressEvent| events.lock().unwrap().push(event)
    };

    let source = aapl_tsla();
    let scanner = Scanner::new(Arc::new(source), ScannerConfig::default())
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(now())))
        .with_progress(Arc::new(sink));

    scanner.scan(&["AAPL", "TSLA", "ZZZZ"], 100).await.unwrap();

    let events = events.lock().unwrap();
    assert!(matches!(events.first(), Some(ProgressEvent::Started { total: 3, .. })));
    assert!(matches!(events.last(), Some(ProgressEvent::Finished { .. })));

    let mut indices = Vec::new();
    let mut symbols = Vec::new();
    for event in events.iter() {
        if let ProgressEvent::SymbolCompleted {
            index,
            total,
            symbol,
            status,
            ..
        } = event
        {
            assert_eq!(*total, 3);
            indices.push(*index);
            symbols.push(symbol.clone());
            if symbol == "ZZZZ" {
                assert!(matches!(status, SymbolProgress::Failed { .. }));
            }
        }
    }
    indices.sort();
    symbols.sort();
    assert_eq!(indices, vec![1, 2, 3]);
    assert_eq!(symbols, vec!["AAPL", "TSLA", "ZZZZ"]);
}

#[tokio::test]
async fn test_broadcast_progress_subscriber() {
    let progress = BroadcastProgress::new(16);
    let mut rx = progress.subscribe();

    let scanner = Scanner::new(Arc::new(aapl_tsla()), ScannerConfig::default())
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(now())))
        .with_progress(Arc::new(progress));

    let result = scanner.scan(&["AAPL"], 100).await.unwrap();

    let mut terminal = None;
    while let Ok(event) = rx.try_recv() {
        if event.is_terminal() {
            terminal = Some(event);
        }
    }
    match terminal {
        Some(ProgressEvent::Finished { result: published, .. }) => assert_eq!(*published, result),
        other => panic!("expected Finished, got {:?}", other),
    }
}

#[tokio::test]
async fn test_expiry_filter_limits_expirations() {
    let far = NaiveDate::from_ymd_opt(2026, 12, 18).unwrap();
    let source = Arc::new(StubSource::new().with_symbol(
        "AAPL",
        190.0,
        vec![
            SourceChain::new(expiry()).with_call(SourceQuote::new(190.0).with_volume(500).with_iv(0.3)),
            SourceChain::new(far).with_call(SourceQuote::new(190.0).with_volume(500).with_iv(0.3)),
        ],
    ));
    let scanner = scanner_over(source.clone(), Arc::new(ManualClock::new(now())));

    let request = ScanRequest::new(["AAPL"], 100)
        .unwrap()
        .with_expiry_filter(ExpiryFilter::WithinDays(60));
    let result = scanner.run_scan(&request).await.unwrap();

    assert_eq!(result.contracts.len(), 1);
    assert_eq!(result.contracts[0].expiration, expiry());
    assert_eq!(source.chain_request_count(), 1);
}

//! Behavior-driven tests for admission control under concurrent load.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferroshare_core::{
    ApiError, ClientBuilder, ClientConfig, ConcurrencyConfig, ConcurrencyLimiter, HttpResponse,
    Params, RetryConfig,
};
use support::{ScriptedHttpClient, STOCK_BASIC_ONE_ROW};
use tokio::sync::Semaphore;

fn limiter(max_concurrent: usize, min_interval: Duration) -> ConcurrencyLimiter {
    ConcurrencyLimiter::new(ConcurrencyConfig {
        max_concurrent,
        min_interval,
    })
}

// =============================================================================
// Concurrency: Slot Bound
// =============================================================================

#[tokio::test]
async fn when_many_operations_are_submitted_at_most_max_run_at_once() {
    // Given: A limiter admitting two operations and six blocked submissions
    let limiter = limiter(2, Duration::ZERO);
    let gate = Arc::new(Semaphore::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let limiter = limiter.clone();
        let gate = Arc::clone(&gate);
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            limiter
                .execute(|| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let permit = gate.acquire().await.map_err(|e| {
                        ApiError::unknown("gate closed").with_cause(e)
                    })?;
                    permit.forget();
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ApiError>(())
                })
                .await
        }));
    }

    // When: The first two are admitted and the gate opens for everyone
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(limiter.in_flight(), 2);
    assert_eq!(running.load(Ordering::SeqCst), 2);
    gate.add_permits(6);

    // Then: Every operation completes and the peak never exceeded the bound
    for handle in handles {
        handle.await.expect("task joins").expect("operation succeeds");
    }
    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert_eq!(limiter.in_flight(), 0);
}

#[tokio::test]
async fn when_a_slot_frees_waiters_are_admitted_in_arrival_order() {
    // Given: A single-slot limiter held by the test
    let limiter = limiter(1, Duration::ZERO);
    let held = limiter.acquire().await.expect("first slot");
    let order = Arc::new(Mutex::new(Vec::new()));

    // When: A, B and C queue up in that order
    let mut handles = Vec::new();
    for name in ["A", "B", "C"] {
        let limiter = limiter.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            limiter
                .execute(|| async move {
                    order.lock().expect("order lock").push(name);
                    Ok::<_, ApiError>(())
                })
                .await
        }));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    drop(held);

    // Then: They run in FIFO order
    for handle in handles {
        handle.await.expect("task joins").expect("operation succeeds");
    }
    assert_eq!(*order.lock().expect("order lock"), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn when_operation_is_cancelled_its_slot_is_returned() {
    // Given: A single-slot limiter running a never-ending operation
    let limiter = limiter(1, Duration::ZERO);
    let stuck = {
        let limiter = limiter.clone();
        tokio::spawn(async move {
            limiter
                .execute(|| async {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Ok::<_, ApiError>(())
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(limiter.in_flight(), 1);

    // When: The caller abandons it
    stuck.abort();
    let _ = stuck.await;

    // Then: The next operation is admitted
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        limiter.execute(|| async { Ok::<_, ApiError>(7) }),
    )
    .await
    .expect("slot was released");
    assert_eq!(result.expect("operation succeeds"), 7);
}

// =============================================================================
// Concurrency: Start Spacing
// =============================================================================

#[tokio::test]
async fn when_queries_start_together_network_calls_are_spaced() {
    // Given: A client allowing parallel calls but spacing starts by 100ms
    let http = ScriptedHttpClient::replying([HttpResponse::ok_json(STOCK_BASIC_ONE_ROW)]);
    let config = ClientConfig {
        retry: RetryConfig::no_retry(),
        concurrency: ConcurrencyConfig {
            max_concurrent: 4,
            min_interval: Duration::from_millis(100),
        },
        ..ClientConfig::new("test-token")
    };
    let client = ClientBuilder::new(config)
        .with_http_client(http.clone())
        .build()
        .expect("valid config");

    // When: Three distinct queries are issued at once
    let (a, b, c) = tokio::join!(
        client.query("daily", Params::new().with("ts_code", "000001.SZ"), None),
        client.query("daily", Params::new().with("ts_code", "600000.SH"), None),
        client.query("daily", Params::new().with("ts_code", "000002.SZ"), None)
    );
    a.expect("ok");
    b.expect("ok");
    c.expect("ok");

    // Then: Consecutive network starts are at least the interval apart
    let mut times = http.call_times();
    times.sort();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(90),
            "starts only {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test]
async fn when_clients_are_cloned_they_share_one_budget() {
    // Given: A single-slot client and a clone of it
    let http = ScriptedHttpClient::with_delay(
        [Ok(HttpResponse::ok_json(STOCK_BASIC_ONE_ROW))],
        Duration::from_millis(60),
    );
    let config = ClientConfig {
        retry: RetryConfig::no_retry(),
        concurrency: ConcurrencyConfig {
            max_concurrent: 1,
            min_interval: Duration::ZERO,
        },
        ..ClientConfig::new("test-token")
    };
    let client = ClientBuilder::new(config)
        .with_http_client(http.clone())
        .build()
        .expect("valid config");
    let clone = client.clone();

    // When: Both issue a query at the same time
    let (first, second) = tokio::join!(
        client.query("daily", Params::new(), None),
        clone.query("daily", Params::new(), None)
    );
    first.expect("ok");
    second.expect("ok");

    // Then: The second call started only after the first finished
    let times = http.call_times();
    assert_eq!(times.len(), 2);
    let gap = if times[1] > times[0] {
        times[1] - times[0]
    } else {
        times[0] - times[1]
    };
    assert!(gap >= Duration::from_millis(55), "calls overlapped: {gap:?}");
}

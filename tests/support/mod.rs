#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ferroshare_core::{HttpClient, HttpError, HttpRequest, HttpResponse};

pub const STOCK_BASIC_ONE_ROW: &str = r#"{
    "code": 0,
    "msg": "",
    "data": {
        "fields": ["ts_code", "symbol", "name", "list_status"],
        "items": [["000001.SZ", "000001", "Ping An Bank", "L"]]
    }
}"#;

pub const DAILY_TWO_ROWS: &str = r#"{
    "code": 0,
    "msg": "",
    "data": {
        "fields": ["ts_code", "close"],
        "items": [["000001.SZ", 10.5], ["600000.SH", 7.25]]
    }
}"#;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Replays scripted outcomes in order; the last outcome repeats once the script runs out.
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Instant, HttpRequest)>>,
}

impl ScriptedHttpClient {
    pub fn new(outcomes: impl IntoIterator<Item = Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Self::with_delay(outcomes, Duration::ZERO)
    }

    pub fn replying(responses: impl IntoIterator<Item = HttpResponse>) -> Arc<Self> {
        Self::new(responses.into_iter().map(Ok))
    }

    pub fn with_delay(
        outcomes: impl IntoIterator<Item = Result<HttpResponse, HttpError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            delay,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn last_body(&self) -> Option<serde_json::Value> {
        self.requests
            .lock()
            .expect("requests lock")
            .last()
            .and_then(|(_, request)| request.body.as_deref())
            .and_then(|body| serde_json::from_str(body).ok())
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push((Instant::now(), request));

        let outcome = {
            let mut script = self.script.lock().expect("script lock");
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            outcome.unwrap_or_else(|| Err(HttpError::new("script exhausted")))
        })
    }
}

//! Integration tests for the push webhook and the reconciliation pipeline.
//!
//! Each test spins up an Axum server on a random port backed by in-memory
//! mail and ledger fakes, posts real Pub/Sub envelopes over HTTP, and checks
//! what the pipeline did with them.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use inbox_ledger::config::RelayConfig;
use inbox_ledger::error::{FetchError, LedgerError};
use inbox_ledger::pipeline::spawn_pipeline;
use inbox_ledger::pipeline::types::{CursorWindow, MailMessage, MessageAdded};
use inbox_ledger::providers::{LedgerCells, MailSource};
use inbox_ledger::webhook::webhook_routes;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const BANK: &str = "Bank Alerts <alerts@bank.example.com>";

/// Scripted mailbox that also records how the pipeline queried it.
#[derive(Default)]
struct FakeMailbox {
    history: HashMap<(u64, u64), Vec<MessageAdded>>,
    messages: HashMap<String, MailMessage>,
    /// Artificial latency on history calls, to widen overlap windows.
    delay: Duration,
    windows: Mutex<Vec<CursorWindow>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeMailbox {
    fn history(mut self, previous: u64, current: u64, ids: &[&str]) -> Self {
        self.history.insert(
            (previous, current),
            ids.iter().map(|id| MessageAdded::new(*id)).collect(),
        );
        self
    }

    fn message(mut self, id: &str, from: &str, subject: &str, body: &str) -> Self {
        let msg = MailMessage::new(id)
            .with_header("From", from)
            .with_header("Subject", subject)
            .with_text_part(body);
        self.messages.insert(id.to_string(), msg);
        self
    }

    fn windows(&self) -> Vec<CursorWindow> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSource for FakeMailbox {
    async fn fetch_history_delta(
        &self,
        window: CursorWindow,
    ) -> Result<Vec<MessageAdded>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.windows.lock().unwrap().push(window);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(self
            .history
            .get(&(window.previous.0, window.current.0))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_message(&self, id: &str) -> Result<MailMessage, FetchError> {
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.to_string()))
    }
}

/// Spreadsheet cells keyed by `sheet!cell`.
#[derive(Default)]
struct FakeLedger {
    cells: Mutex<HashMap<String, String>>,
}

impl FakeLedger {
    fn total(&self, cell: &str) -> Decimal {
        self.cells
            .lock()
            .unwrap()
            .get(&format!("Ledger!{cell}"))
            .and_then(|v| Decimal::from_str(v).ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerCells for FakeLedger {
    async fn read_cell(&self, sheet: &str, cell: &str) -> Result<Option<String>, LedgerError> {
        Ok(self.cells.lock().unwrap().get(&format!("{sheet}!{cell}")).cloned())
    }

    async fn write_cell(&self, sheet: &str, cell: &str, value: Decimal) -> Result<(), LedgerError> {
        self.cells
            .lock()
            .unwrap()
            .insert(format!("{sheet}!{cell}"), value.to_string());
        Ok(())
    }
}

fn test_config() -> RelayConfig {
    let env: HashMap<&str, &str> = HashMap::from([
        ("EXPECTED_SENDER", "alerts@bank.example.com"),
        ("LEDGER_SPREADSHEET_ID", "sheet-123"),
        ("LEDGER_SHEET_NAME", "Ledger"),
        ("LEDGER_DEBIT_CELL", "B2"),
        ("LEDGER_CREDIT_CELL", "C2"),
        ("GOOGLE_CLIENT_ID", "client"),
        ("GOOGLE_CLIENT_SECRET", "secret"),
        ("GOOGLE_REFRESH_TOKEN", "refresh"),
    ]);
    RelayConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap()
}

/// Start the webhook on a random port, return its base URL.
async fn start_server(mail: Arc<FakeMailbox>, ledger: Arc<FakeLedger>) -> String {
    let (sequencer, _worker) = spawn_pipeline(&test_config(), mail, ledger);
    let app = webhook_routes(sequencer);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

fn envelope(history_id: u64) -> Value {
    let data = STANDARD.encode(format!(
        r#"{{"emailAddress":"me@example.com","historyId":{history_id}}}"#
    ));
    serde_json::json!({
        "message": {
            "data": data,
            "messageId": history_id.to_string(),
            "publishTime": "2026-03-01T09:30:00Z"
        },
        "subscription": "projects/test/subscriptions/gmail-push"
    })
}

async fn notify(client: &reqwest::Client, base: &str, history_id: u64) -> (u16, Value) {
    let resp = client
        .post(format!("{base}/webhook"))
        .json(&envelope(history_id))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// Poll until `check` holds.
async fn wait_until(check: impl Fn() -> bool) {
    timeout(TEST_TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn notifications_accumulate_into_ledger() {
    let mail = Arc::new(
        FakeMailbox::default()
            .history(100, 105, &["m1", "m2", "m3"])
            .history(105, 110, &["m1", "m4"])
            .message("m1", BANK, "Debit alert", "INR 1,250.50 spent at ACME")
            .message("m2", BANK, "Credit alert", "INR 300.00 received")
            .message("m3", "someone@else.example", "Debit", "INR 999.00")
            .message("m4", BANK, "Debit alert", "INR 49.50 spent at CAFE"),
    );
    let ledger = Arc::new(FakeLedger::default());
    let base = start_server(Arc::clone(&mail), Arc::clone(&ledger)).await;
    let client = reqwest::Client::new();

    for cursor in [100, 105, 110] {
        let (status, body) = notify(&client, &base, cursor).await;
        assert_eq!(status, 200);
        assert_eq!(body, serde_json::json!({"status": "success"}));
    }

    wait_until(|| mail.windows().len() == 2).await;
    wait_until(|| ledger.total("B2") == Decimal::new(130000, 2)).await;

    assert_eq!(ledger.total("B2"), Decimal::new(130000, 2));
    assert_eq!(ledger.total("C2"), Decimal::new(30000, 2));
}

#[tokio::test]
async fn concurrent_notifications_are_sequenced() {
    const N: u64 = 25;

    let mail = Arc::new(FakeMailbox {
        delay: Duration::from_millis(5),
        ..FakeMailbox::default()
    });
    let ledger = Arc::new(FakeLedger::default());
    let base = start_server(Arc::clone(&mail), ledger).await;
    let client = reqwest::Client::new();

    let posts = (1..=N).map(|cursor| {
        let client = client.clone();
        let base = base.clone();
        async move { notify(&client, &base, cursor * 10).await }
    });
    let results = futures::future::join_all(posts).await;
    assert!(results.iter().all(|(status, _)| *status == 200));

    wait_until(|| mail.windows().len() == (N - 1) as usize).await;
    // Nothing beyond the N-1 windows shows up later.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let windows = mail.windows();
    assert_eq!(windows.len(), (N - 1) as usize);
    assert_eq!(mail.max_in_flight.load(Ordering::SeqCst), 1);

    // Each window starts where the previous one ended.
    for pair in windows.windows(2) {
        assert_eq!(pair[0].current, pair[1].previous);
    }

    // Every posted cursor appears exactly once along the chain.
    let mut cursors: Vec<u64> = std::iter::once(windows[0].previous.0)
        .chain(windows.iter().map(|w| w.current.0))
        .collect();
    cursors.sort_unstable();
    let expected: Vec<u64> = (1..=N).map(|c| c * 10).collect();
    assert_eq!(cursors, expected);
}

#[tokio::test]
async fn rejected_payloads_do_not_advance_the_cursor() {
    let mail = Arc::new(FakeMailbox::default());
    let ledger = Arc::new(FakeLedger::default());
    let base = start_server(Arc::clone(&mail), ledger).await;
    let client = reqwest::Client::new();

    notify(&client, &base, 1).await;

    let resp = client
        .post(format!("{base}/webhook"))
        .json(&serde_json::json!({"message": {"data": "!!not-base64!!"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid data");

    let resp = client
        .post(format!("{base}/webhook"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "invalid request");

    notify(&client, &base, 2).await;
    wait_until(|| !mail.windows().is_empty()).await;

    let windows = mail.windows();
    assert_eq!(windows.len(), 1);
    assert_eq!((windows[0].previous.0, windows[0].current.0), (1, 2));
}

#[tokio::test]
async fn health_endpoint_responds() {
    let base = start_server(
        Arc::new(FakeMailbox::default()),
        Arc::new(FakeLedger::default()),
    )
    .await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

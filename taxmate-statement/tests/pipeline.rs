use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use taxmate_core::{PipelineEvent, TerminalEvent};
use taxmate_statement::error::{
    MSG_FETCH_FAILED, MSG_GENERIC, MSG_NO_CREDITS, MSG_OVERLOADED, MSG_TIMEOUT,
};
use taxmate_statement::{
    AnalyserSettings, DocumentStore, ExtractError, GenerateRequest, GenerativeClient, RetryPolicy,
    StagingError, StatementAnalyser, UploadedFile,
};

fn pdf_with_pages(n: usize) -> Vec<u8> {
    let mut raw = format!("%PDF-1.4\n1 0 obj\n<< /Type /Pages /Kids [] /Count {n} >>\nendobj\n");
    for i in 0..n {
        raw.push_str(&format!("{} 0 obj\n<< /Type /Page /Parent 1 0 R >>\nendobj\n", i + 2));
    }
    raw.push_str("%%EOF\n");
    raw.into_bytes()
}

/// Scripted reply for one page range. Each call pops the next entry; the last
/// one repeats.
type Script = Vec<Result<String, (u16, &'static str)>>;

#[derive(Default)]
struct FakeClient {
    scripts: Mutex<HashMap<usize, Script>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    uploads: AtomicUsize,
    deletes: AtomicUsize,
    fail_upload: bool,
    delay: Option<Duration>,
}

impl FakeClient {
    fn with(scripts: Vec<(usize, Script)>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Default::default()
        }
    }
}

fn start_page(prompt: &str) -> usize {
    let rest = prompt.split("Pages to process: ").nth(1).unwrap();
    rest.split(' ').next().unwrap().parse().unwrap()
}

impl GenerativeClient for FakeClient {
    async fn upload(&self, path: &Path, display_name: &str, mime_type: &str) -> Result<UploadedFile, ExtractError> {
        assert!(path.exists());
        assert_eq!(mime_type, "application/pdf");
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload {
            return Err(ExtractError::Status {
                status: 503,
                message: "UNAVAILABLE".into(),
            });
        }
        Ok(UploadedFile {
            name: "files/test123".into(),
            uri: format!("https://files.test/{display_name}"),
            mime_type: mime_type.into(),
        })
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay.unwrap_or(Duration::from_millis(5))).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let start = start_page(&request.prompt);
        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.get_mut(&start).expect("unscripted range");
            if script.len() > 1 { script.remove(0) } else { script[0].clone() }
        };
        reply.map_err(|(status, message)| ExtractError::Status {
            status,
            message: message.into(),
        })
    }

    async fn delete_file(&self, _file: &UploadedFile) -> Result<(), ExtractError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeStore {
    bytes: Option<Vec<u8>>,
    releases: AtomicUsize,
}

impl FakeStore {
    fn serving(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Some(bytes),
            releases: AtomicUsize::new(0),
        }
    }

    fn broken() -> Self {
        Self {
            bytes: None,
            releases: AtomicUsize::new(0),
        }
    }
}

impl DocumentStore for FakeStore {
    async fn fetch(&self, _location: &str) -> Result<Vec<u8>, StagingError> {
        self.bytes.clone().ok_or(StagingError::Status { status: 404 })
    }

    async fn release(&self, _location: &str) -> Result<(), StagingError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn settings() -> AnalyserSettings {
    AnalyserSettings {
        retry: RetryPolicy {
            max_retries: 3,
            backoff_step: Duration::from_millis(1),
        },
        ..Default::default()
    }
}

fn ok(json: &str) -> Result<String, (u16, &'static str)> {
    Ok(json.to_string())
}

const LOCATION: &str = "https://store.test/uploads/march.pdf";

async fn run(
    client: FakeClient,
    store: FakeStore,
) -> (TerminalEvent, Vec<(usize, usize)>, FakeClient, FakeStore) {
    let seen = Mutex::new(Vec::new());
    let sink = |c: usize, t: usize| seen.lock().unwrap().push((c, t));
    let analyser = StatementAnalyser::new(client, store, settings());
    let outcome = analyser.analyse(LOCATION, &sink).await;
    let progress = seen.into_inner().unwrap();
    let (client, store) = analyser.into_parts();
    (outcome, progress, client, store)
}

#[tokio::test]
async fn test_six_page_statement() {
    let client = FakeClient::with(vec![
        (
            1,
            vec![ok(r#"{"accountName":"ADA OKAFOR","accountNumber":"0123456789","bankName":"GTBank",
                "transactions":[{"date":"02/01/2026","description":"SALARY  JAN","amount":"₦250,000.00","balance":300000}]}"#)],
        ),
        (
            3,
            vec![ok(r#"```json
{"accountName":"","transactions":[{"date":"15/01/2026","description":"TRF FROM BOLA","amount":12500.5,"balance":"N/A"}]}
```"#)],
        ),
        (
            5,
            vec![ok(r#"{"transactions":[{"date":"03/01/2026","description":"REVERSAL","amount":"1,000"},
                {"date":"","description":"NO DATE","amount":10}]}"#)],
        ),
    ]);
    let store = FakeStore::serving(pdf_with_pages(6));

    let (outcome, progress, client, store) = run(client, store).await;

    let TerminalEvent::Result(data) = outcome else {
        panic!("expected result, got {outcome:?}");
    };
    assert_eq!(data.account_name, "ADA OKAFOR");
    assert_eq!(data.bank_name, "GTBank");
    assert_eq!(data.transactions.len(), 3);
    assert_eq!(data.transactions[0].description, "SALARY JAN");
    assert_eq!(data.transactions[1].description, "REVERSAL");
    assert_eq!(data.transactions[2].balance, None);
    assert_eq!(data.start_date, "02/01/2026");
    assert_eq!(data.end_date, "15/01/2026");
    assert!((data.total_credits - 263_500.5).abs() < 1e-6);

    assert_eq!(progress.first(), Some(&(0, 6)));
    assert_eq!(progress.last(), Some(&(6, 6)));
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert!(progress.iter().all(|&(_, t)| t == 6));

    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    assert!(client.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(client.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(store.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_not_a_bank_statement() {
    let client = FakeClient::with(vec![
        (1, vec![ok(r#"{"isNotBankStatement":true,"transactions":[]}"#)]),
        (3, vec![ok(r#"{"transactions":[{"date":"01/01/2026","description":"X","amount":5}]}"#)]),
    ]);
    let (outcome, _, client, store) = run(client, FakeStore::serving(pdf_with_pages(3))).await;

    assert_eq!(
        outcome,
        TerminalEvent::Error(
            "The document you uploaded does not appear to be a valid bank statement.".into()
        )
    );
    assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(store.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let client = FakeClient::with(vec![(
        1,
        vec![
            Err((503, "The model is overloaded")),
            Err((429, "RESOURCE_EXHAUSTED")),
            ok(r#"{"transactions":[{"date":"01/01/2026","description":"POS REFUND","amount":"750"}]}"#),
        ],
    )]);
    let (outcome, progress, client, _) = run(client, FakeStore::serving(pdf_with_pages(2))).await;

    let TerminalEvent::Result(data) = outcome else {
        panic!("expected result, got {outcome:?}");
    };
    assert_eq!(data.total_credits, 750.0);
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    assert_eq!(progress, vec![(0, 2), (1, 2), (2, 2)]);
}

#[tokio::test]
async fn test_exhausted_retries_report_kind() {
    let client = FakeClient::with(vec![(1, vec![Err((503, "UNAVAILABLE"))])]);
    let (outcome, _, client, store) = run(client, FakeStore::serving(pdf_with_pages(1))).await;

    assert_eq!(outcome, TerminalEvent::Error(MSG_OVERLOADED.into()));
    assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    assert_eq!(store.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fatal_failure_is_generic() {
    let client = FakeClient::with(vec![(1, vec![Err((400, "API key not valid"))])]);
    let (outcome, _, client, store) = run(client, FakeStore::serving(pdf_with_pages(2))).await;

    assert_eq!(outcome, TerminalEvent::Error(MSG_GENERIC.into()));
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(store.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_credits_found() {
    let client = FakeClient::with(vec![(
        1,
        vec![ok(r#"{"accountName":"ADA OKAFOR","transactions":[{"date":"01/01/2026","description":"ZERO","amount":0}]}"#)],
    )]);
    let (outcome, _, _, _) = run(client, FakeStore::serving(pdf_with_pages(2))).await;

    assert_eq!(outcome, TerminalEvent::Error(MSG_NO_CREDITS.into()));
}

#[tokio::test]
async fn test_fetch_failure_still_releases() {
    let (outcome, progress, client, store) = run(FakeClient::default(), FakeStore::broken()).await;

    assert_eq!(outcome, TerminalEvent::Error(MSG_FETCH_FAILED.into()));
    assert!(progress.is_empty());
    assert_eq!(client.uploads.load(Ordering::SeqCst), 0);
    assert_eq!(client.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(store.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upload_failure_skips_extraction() {
    let client = FakeClient {
        fail_upload: true,
        ..Default::default()
    };
    let (outcome, progress, client, store) = run(client, FakeStore::serving(pdf_with_pages(4))).await;

    assert_eq!(outcome, TerminalEvent::Error(MSG_OVERLOADED.into()));
    assert_eq!(progress, vec![(0, 4)]);
    assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    assert_eq!(client.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(store.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_channel_ends_with_one_terminal_event() {
    let client = FakeClient::with(vec![(
        1,
        vec![ok(r#"{"transactions":[{"date":"01/01/2026","description":"SALARY","amount":"100"}]}"#)],
    )]);
    let analyser = StatementAnalyser::new(client, FakeStore::serving(pdf_with_pages(2)), settings());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    analyser.analyse_into(LOCATION, tx).await;

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    assert_eq!(events[0], PipelineEvent::progress(0, 2));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(matches!(events.last(), Some(PipelineEvent::Result { .. })));
}

#[tokio::test]
async fn test_run_budget_ends_stalled_extraction() {
    let client = FakeClient {
        delay: Some(Duration::from_secs(30)),
        ..FakeClient::with(vec![(1, vec![ok(r#"{"transactions":[]}"#)])])
    };
    let analyser = StatementAnalyser::new(
        client,
        FakeStore::serving(pdf_with_pages(4)),
        AnalyserSettings {
            run_timeout: Duration::from_millis(50),
            ..settings()
        },
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let started = std::time::Instant::now();
    analyser.analyse_into(LOCATION, tx).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(
        events.last(),
        Some(&PipelineEvent::Error {
            error: MSG_TIMEOUT.to_string()
        })
    );

    let (client, store) = analyser.into_parts();
    assert_eq!(client.uploads.load(Ordering::SeqCst), 1);
    assert_eq!(client.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(store.releases.load(Ordering::SeqCst), 1);
}

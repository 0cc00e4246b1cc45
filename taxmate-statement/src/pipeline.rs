//! End-to-end statement analysis.
//!
//! One run moves through: fetch staged document, partition, announce
//! progress, stage a temp copy and upload it, extract with bounded
//! concurrency, aggregate. Whatever happens, the provider upload, the temp
//! copy and the staged object are released before the terminal event is
//! returned.

use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::sync::mpsc;

use taxmate_core::{aggregate, AggregateResult, ExtractionJob, PipelineEvent, RawChunkResult, TerminalEvent};
use taxmate_ingest::{partition, Document, DEFAULT_CHUNK_SIZE};

use crate::client::{GenerativeClient, UploadedFile, PDF_MIME};
use crate::error::PipelineError;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::retry::{with_retry, RetryPolicy};
use crate::scheduler::{run_bounded, DEFAULT_CONCURRENCY};
use crate::staging::DocumentStore;
use crate::worker::extract_chunk;

pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_DISPLAY_NAME: &str = "statement.pdf";

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyserSettings {
    pub chunk_size: usize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub temperature: f32,
    /// Wall-clock budget for one run, cleanup excluded.
    pub run_timeout: Duration,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            temperature: DEFAULT_TEMPERATURE,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

/// Resources a run has acquired and must give back.
#[derive(Default)]
struct Staged {
    temp: Option<NamedTempFile>,
    upload: Option<UploadedFile>,
}

pub struct StatementAnalyser<C, S> {
    client: C,
    store: S,
    settings: AnalyserSettings,
}

impl<C: GenerativeClient, S: DocumentStore> StatementAnalyser<C, S> {
    pub fn new(client: C, store: S, settings: AnalyserSettings) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    pub fn into_parts(self) -> (C, S) {
        (self.client, self.store)
    }

    /// Analyse the document staged at `location`, reporting page progress to
    /// `on_progress`. Always returns exactly one terminal outcome.
    pub async fn analyse(&self, location: &str, on_progress: ProgressSink<'_>) -> TerminalEvent {
        let mut staged = Staged::default();
        let budget = self.settings.run_timeout;
        let outcome = tokio::time::timeout(budget, self.run(location, on_progress, &mut staged))
            .await
            .unwrap_or_else(|_| Err(PipelineError::TimedOut(budget)));
        self.cleanup(location, staged).await;

        match outcome {
            Ok(data) => {
                tracing::info!(
                    transactions = data.transactions.len(),
                    total_credits = data.total_credits,
                    "statement analysed"
                );
                TerminalEvent::Result(data)
            }
            Err(e) => {
                tracing::error!(error = %e, "statement analysis failed");
                TerminalEvent::Error(e.user_message())
            }
        }
    }

    /// Like [`analyse`](Self::analyse), but forwards every event (progress and
    /// terminal) into `tx`. A closed receiver does not stop the run.
    pub async fn analyse_into(&self, location: &str, tx: mpsc::UnboundedSender<PipelineEvent>) {
        let sink = |current: usize, total: usize| {
            let _ = tx.send(PipelineEvent::progress(current, total));
        };
        let terminal = self.analyse(location, &sink).await;
        let _ = tx.send(terminal.into());
    }

    async fn run(
        &self,
        location: &str,
        on_progress: ProgressSink<'_>,
        staged: &mut Staged,
    ) -> Result<AggregateResult, PipelineError> {
        let bytes = self.store.fetch(location).await?;
        let document = Document::from_bytes(bytes)?;

        let total = document.page_count();
        let ranges = partition(total, self.settings.chunk_size);
        tracing::info!(
            pages = total,
            chunks = ranges.len(),
            source = ?document.page_count_source(),
            "partitioned statement"
        );

        let reporter = ProgressReporter::new(total, on_progress);
        reporter.start();

        let temp = tempfile::Builder::new()
            .prefix("statement-")
            .suffix(".pdf")
            .tempfile()?;
        tokio::fs::write(temp.path(), document.bytes()).await?;
        let temp_path = temp.path().to_path_buf();
        staged.temp = Some(temp);

        let file = self
            .client
            .upload(&temp_path, display_name(location), PDF_MIME)
            .await
            .map_err(PipelineError::Upload)?;
        staged.upload = Some(file.clone());

        let jobs: Vec<ExtractionJob> = ranges.into_iter().map(ExtractionJob::new).collect();
        let chunks = run_bounded(
            jobs,
            self.settings.concurrency,
            |job| self.extract_with_retry(&file, job),
            |job| reporter.advance(job.range.page_count()),
        )
        .await?;

        let result = aggregate(&chunks)?;
        if result.transactions.is_empty() {
            return Err(PipelineError::NoCreditTransactions);
        }
        Ok(result)
    }

    async fn extract_with_retry(
        &self,
        file: &UploadedFile,
        job: ExtractionJob,
    ) -> Result<RawChunkResult, PipelineError> {
        let label = job.range.to_string();
        with_retry(&self.settings.retry, &label, || {
            extract_chunk(&self.client, file, &job, self.settings.temperature)
        })
        .await
        .map_err(|failure| PipelineError::Extraction {
            range: job.range,
            failure,
        })
    }

    async fn cleanup(&self, location: &str, staged: Staged) {
        if let Some(file) = staged.upload {
            if let Err(e) = self.client.delete_file(&file).await {
                tracing::warn!(error = %e, name = %file.name, "failed to delete uploaded document");
            }
        }
        if let Some(temp) = staged.temp {
            if let Err(e) = temp.close() {
                tracing::warn!(error = %e, "failed to remove temporary copy");
            }
        }
        if let Err(e) = self.store.release(location).await {
            tracing::error!(error = %e, "failed to release staged document");
        }
    }
}

/// Last path segment of a URL or path, without any query string.
fn display_name(location: &str) -> &str {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    path.rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_DISPLAY_NAME)
}

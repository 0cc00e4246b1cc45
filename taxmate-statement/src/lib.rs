//! taxmate-statement: credit extraction from PDF bank statements using a
//! generative-text service, with bounded concurrency, retries and progress
//! streaming.

pub mod client;
pub mod error;
pub mod gemini;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod retry;
pub mod scheduler;
pub mod staging;
pub mod worker;

pub use client::{GenerateRequest, GenerativeClient, UploadedFile, PDF_MIME};
pub use error::{classify, ChunkFailure, ExtractError, FailureKind, PipelineError, StagingError};
pub use gemini::{GeminiClient, GeminiConfig};
pub use pipeline::{AnalyserSettings, StatementAnalyser};
pub use progress::{ProgressReporter, ProgressSink};
pub use retry::RetryPolicy;
pub use scheduler::run_bounded;
pub use staging::{BlobStore, DocumentStore, LocalStore, Prefetched};
pub use worker::{extract_chunk, parse_chunk_response};

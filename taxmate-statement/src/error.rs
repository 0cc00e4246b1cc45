//! Failure taxonomy for statement extraction.
//!
//! The generative service gives us no typed error model, only HTTP statuses
//! and message text. [`classify`] is the one place that inspects those; all
//! retry decisions dispatch on the resulting [`FailureKind`].

use thiserror::Error;

use taxmate_core::{AggregateError, PageRange};
use taxmate_ingest::IngestError;

pub const MSG_RATE_LIMITED: &str =
    "The AI service is currently reaching its limit. Please wait about 30 seconds and try again.";
pub const MSG_OVERLOADED: &str =
    "The AI service is currently busy processing many requests. Please try again in about 10 seconds.";
pub const MSG_TIMEOUT: &str =
    "The request took too long to complete. Please try again or upload a shorter statement.";
pub const MSG_NO_CREDITS: &str = "I couldn't find any credit transactions in the document provided. Please confirm that it is a bank statement and try again.";
pub const MSG_FETCH_FAILED: &str = "Failed to fetch the uploaded file for analysis.";
pub const MSG_GENERIC: &str = "Something went wrong while processing your document. Please try again.";

/// What a single call to the generative service can fail with.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {message}")]
    Transport { message: String, timeout: bool },

    #[error("Invalid JSON response from AI: {0}")]
    InvalidJson(String),

    #[error("{0}")]
    Other(String),
}

impl ExtractError {
    pub fn transport(e: &reqwest::Error) -> Self {
        ExtractError::Transport {
            message: e.to_string(),
            timeout: e.is_timeout(),
        }
    }
}

/// Coarse classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    RateLimited,
    Overloaded,
    Timeout,
    MalformedResponse,
    NetworkError,
    Fatal,
}

impl FailureKind {
    /// Everything but `Fatal` is worth another attempt.
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::Fatal)
    }

    fn user_message(self) -> &'static str {
        match self {
            FailureKind::RateLimited => MSG_RATE_LIMITED,
            FailureKind::Overloaded => MSG_OVERLOADED,
            FailureKind::Timeout => MSG_TIMEOUT,
            _ => MSG_GENERIC,
        }
    }
}

/// Map a provider failure onto a [`FailureKind`].
pub fn classify(err: &ExtractError) -> FailureKind {
    match err {
        ExtractError::Status { status: 429, .. } => FailureKind::RateLimited,
        ExtractError::Status { status: 503, .. } => FailureKind::Overloaded,
        ExtractError::Status { status: 504, .. } => FailureKind::Timeout,
        ExtractError::Status { message, .. } => classify_message(message),
        ExtractError::Transport { timeout: true, .. } => FailureKind::Timeout,
        ExtractError::Transport { .. } => FailureKind::NetworkError,
        ExtractError::InvalidJson(_) => FailureKind::MalformedResponse,
        ExtractError::Other(message) => classify_message(message),
    }
}

fn classify_message(message: &str) -> FailureKind {
    let msg = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

    if has(&["429", "rate limit", "resource_exhausted"]) {
        FailureKind::RateLimited
    } else if has(&["503", "overloaded", "unavailable"]) {
        FailureKind::Overloaded
    } else if has(&["504", "deadline"]) {
        FailureKind::Timeout
    } else if msg.contains("json") {
        FailureKind::MalformedResponse
    } else if has(&["fetch failed", "sending request", "econnreset", "etimedout", "network"]) {
        FailureKind::NetworkError
    } else {
        FailureKind::Fatal
    }
}

/// Raised by the retry controller when a job cannot be completed.
#[derive(Debug, Error)]
#[error("{kind:?} after {attempts} attempt(s): {source}")]
pub struct ChunkFailure {
    pub kind: FailureKind,
    pub attempts: u32,
    pub source: ExtractError,
}

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staged document request returned HTTP {status}")]
    Status { status: u16 },

    #[error("staged document is too large: {0} bytes")]
    TooLarge(u64),

    #[error("object store token is not configured")]
    MissingToken,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Top-level failure of one analysis run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch staged document: {0}")]
    Staging(#[from] StagingError),

    #[error("unreadable document: {0}")]
    Ingest(#[from] IngestError),

    #[error("failed to write temporary copy: {0}")]
    TempFile(#[from] std::io::Error),

    #[error("document upload failed: {0}")]
    Upload(ExtractError),

    #[error("extraction failed for {range}: {failure}")]
    Extraction { range: PageRange, failure: ChunkFailure },

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("no credit transactions found")]
    NoCreditTransactions,

    #[error("run exceeded its {0:?} budget")]
    TimedOut(std::time::Duration),
}

impl PipelineError {
    /// The message safe to show an end user. Provider detail never leaks.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Aggregate(e) => e.to_string(),
            PipelineError::NoCreditTransactions => MSG_NO_CREDITS.to_string(),
            PipelineError::Staging(_) => MSG_FETCH_FAILED.to_string(),
            PipelineError::TimedOut(_) => MSG_TIMEOUT.to_string(),
            PipelineError::Extraction { failure, .. } => failure.kind.user_message().to_string(),
            PipelineError::Upload(e) => classify(e).user_message().to_string(),
            PipelineError::Ingest(_) | PipelineError::TempFile(_) => MSG_GENERIC.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, message: &str) -> ExtractError {
        ExtractError::Status {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(classify(&status(429, "")), FailureKind::RateLimited);
        assert_eq!(classify(&status(503, "")), FailureKind::Overloaded);
        assert_eq!(classify(&status(504, "")), FailureKind::Timeout);
        assert_eq!(classify(&status(401, "API key not valid")), FailureKind::Fatal);
        assert_eq!(classify(&status(403, "PERMISSION_DENIED")), FailureKind::Fatal);
    }

    #[test]
    fn test_status_message_signals() {
        assert_eq!(classify(&status(500, "DEADLINE_EXCEEDED")), FailureKind::Timeout);
        assert_eq!(classify(&status(500, "The model is overloaded")), FailureKind::Overloaded);
    }

    #[test]
    fn test_transport_and_json() {
        let t = ExtractError::Transport {
            message: "connection reset".into(),
            timeout: false,
        };
        assert_eq!(classify(&t), FailureKind::NetworkError);
        let t = ExtractError::Transport {
            message: "operation timed out".into(),
            timeout: true,
        };
        assert_eq!(classify(&t), FailureKind::Timeout);
        assert_eq!(
            classify(&ExtractError::InvalidJson("eof".into())),
            FailureKind::MalformedResponse
        );
    }

    #[test]
    fn test_free_text_messages() {
        let kind = |m: &str| classify(&ExtractError::Other(m.to_string()));
        assert_eq!(kind("read ECONNRESET"), FailureKind::NetworkError);
        assert_eq!(kind("fetch failed"), FailureKind::NetworkError);
        assert_eq!(kind("Unexpected token in JSON"), FailureKind::MalformedResponse);
        assert_eq!(kind("document is not a bank statement"), FailureKind::Fatal);
        assert!(!kind("quota exceeded for project").is_retryable());
    }

    #[test]
    fn test_user_messages_do_not_leak_detail() {
        let failure = ChunkFailure {
            kind: FailureKind::Fatal,
            attempts: 1,
            source: status(401, "API key sk-secret not valid"),
        };
        let err = PipelineError::Extraction {
            range: PageRange::new(1, 2, 0),
            failure,
        };
        assert_eq!(err.user_message(), MSG_GENERIC);

        let err = PipelineError::Upload(status(429, "quota"));
        assert_eq!(err.user_message(), MSG_RATE_LIMITED);

        let err = PipelineError::Aggregate(AggregateError::NotABankStatement);
        assert!(err.user_message().contains("not appear to be a valid bank statement"));

        assert_eq!(PipelineError::NoCreditTransactions.user_message(), MSG_NO_CREDITS);

        let err = PipelineError::TimedOut(std::time::Duration::from_secs(300));
        assert_eq!(err.user_message(), MSG_TIMEOUT);
    }
}

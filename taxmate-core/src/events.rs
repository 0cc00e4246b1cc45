//! Events streamed to the caller while a statement is analysed.
//!
//! Serialised one JSON object per line:
//! `{"type":"progress","current":2,"total":6}`,
//! `{"type":"result","data":{...}}`, `{"type":"error","error":"..."}`.

use serde::{Deserialize, Serialize};

use crate::statement::AggregateResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PipelineEvent {
    Progress { current: usize, total: usize },
    Result { data: AggregateResult },
    Error { error: String },
}

impl PipelineEvent {
    pub fn progress(current: usize, total: usize) -> Self {
        PipelineEvent::Progress { current, total }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Progress { .. })
    }

    /// Encode as a single NDJSON record, trailing newline included.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// The single outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalEvent {
    Result(AggregateResult),
    Error(String),
}

impl From<TerminalEvent> for PipelineEvent {
    fn from(ev: TerminalEvent) -> Self {
        match ev {
            TerminalEvent::Result(data) => PipelineEvent::Result { data },
            TerminalEvent::Error(error) => PipelineEvent::Error { error },
        }
    }
}

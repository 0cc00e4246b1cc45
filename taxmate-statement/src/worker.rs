//! Extraction worker: one provider call for one page range.

use once_cell::sync::Lazy;
use regex::Regex;

use taxmate_core::{ExtractionJob, RawChunkResult};

use crate::client::{GenerateRequest, GenerativeClient, UploadedFile};
use crate::error::ExtractError;
use crate::prompt::{task_prompt, SYSTEM_INSTRUCTION};

static OUTERMOST_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Ask the provider for the credits on `job`'s pages of `file`.
pub async fn extract_chunk<C: GenerativeClient>(
    client: &C,
    file: &UploadedFile,
    job: &ExtractionJob,
    temperature: f32,
) -> Result<RawChunkResult, ExtractError> {
    let request = GenerateRequest {
        system_instruction: SYSTEM_INSTRUCTION,
        prompt: task_prompt(job),
        file,
        temperature,
        json_output: true,
    };

    let text = client.generate(&request).await?;
    let chunk = parse_chunk_response(&text)?;

    tracing::debug!(
        range = %job.range,
        transactions = chunk.transactions.len(),
        not_statement = chunk.is_not_bank_statement,
        "chunk extracted"
    );
    Ok(chunk)
}

/// Decode a provider reply. Falls back to the outermost `{...}` span when the
/// model wraps its JSON in prose or code fences.
pub fn parse_chunk_response(text: &str) -> Result<RawChunkResult, ExtractError> {
    let text = text.trim();
    match serde_json::from_str(text) {
        Ok(chunk) => Ok(chunk),
        Err(first) => {
            let span = OUTERMOST_OBJECT
                .find(text)
                .ok_or_else(|| ExtractError::InvalidJson(first.to_string()))?;
            serde_json::from_str(span.as_str()).map_err(|e| ExtractError::InvalidJson(e.to_string()))
        }
    }
}

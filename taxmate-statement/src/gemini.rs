//! Google Gemini REST client (File API + `generateContent`).

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use crate::client::{GenerateRequest, GenerativeClient, UploadedFile};
use crate::error::ExtractError;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-3-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Applied to every request; PDF extraction can take minutes.
    pub request_timeout: Duration,
}

pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, ExtractError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ExtractError::transport(&e))?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    Text(&'a str),
    FileData {
        #[serde(rename = "fileUri")]
        file_uri: &'a str,
        #[serde(rename = "mimeType")]
        mime_type: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct FileEnvelope {
    file: FileResource,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    name: String,
    uri: String,
    mime_type: Option<String>,
}

/// Turn a non-2xx response into [`ExtractError::Status`], keeping the
/// provider's own error status and message when the body carries them.
async fn status_error(resp: reqwest::Response) -> ExtractError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ExtractError::Status {
        status,
        message: error_message(&body),
    }
}

/// `"{status} {message}"` from a `{"error": {...}}` body, else the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let err = v.get("error")?;
            let code = err.get("status").and_then(Value::as_str).unwrap_or_default();
            let msg = err.get("message").and_then(Value::as_str).unwrap_or_default();
            Some(format!("{code} {msg}").trim().to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

/// A failure while reading a response body. Timeouts stay timeouts so they
/// classify the same as a timed-out request.
fn body_error(e: reqwest::Error, what: &str) -> ExtractError {
    if e.is_timeout() {
        ExtractError::transport(&e)
    } else {
        ExtractError::InvalidJson(format!("{what}: {e}"))
    }
}

impl GenerativeClient for GeminiClient {
    async fn upload(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> Result<UploadedFile, ExtractError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ExtractError::Other(format!("read {}: {e}", path.display())))?;

        // Resumable protocol: start a session, then upload and finalize in one go.
        let mut headers = HeaderMap::new();
        headers.insert("X-Goog-Upload-Protocol", HeaderValue::from_static("resumable"));
        headers.insert("X-Goog-Upload-Command", HeaderValue::from_static("start"));
        headers.insert("X-Goog-Upload-Header-Content-Length", HeaderValue::from(bytes.len()));
        headers.insert(
            "X-Goog-Upload-Header-Content-Type",
            HeaderValue::from_str(mime_type).map_err(|e| ExtractError::Other(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let start = self
            .http
            .post(self.url("upload/v1beta/files"))
            .header(API_KEY_HEADER, &self.config.api_key)
            .headers(headers)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| ExtractError::transport(&e))?;

        if !start.status().is_success() {
            return Err(status_error(start).await);
        }

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ExtractError::Other("upload session returned no upload URL".into()))?;

        let finish = self
            .http
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ExtractError::transport(&e))?;

        if !finish.status().is_success() {
            return Err(status_error(finish).await);
        }

        let envelope: FileEnvelope = finish
            .json()
            .await
            .map_err(|e| body_error(e, "upload response"))?;

        tracing::debug!(name = %envelope.file.name, "uploaded document");

        Ok(UploadedFile {
            name: envelope.file.name,
            uri: envelope.file.uri,
            mime_type: envelope.file.mime_type.unwrap_or_else(|| mime_type.to_string()),
        })
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, ExtractError> {
        let body = GenerateBody {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text(request.system_instruction)],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![
                    Part::FileData {
                        file_uri: &request.file.uri,
                        mime_type: &request.file.mime_type,
                    },
                    Part::Text(&request.prompt),
                ],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                response_mime_type: request.json_output.then_some("application/json"),
            },
        };

        let resp = self
            .http
            .post(self.url(&format!("v1beta/models/{}:generateContent", self.config.model)))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::transport(&e))?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let out: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| body_error(e, "generateContent response"))?;

        let text = out
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        Ok(text)
    }

    async fn delete_file(&self, file: &UploadedFile) -> Result<(), ExtractError> {
        let resp = self
            .http
            .delete(self.url(&format!("v1beta/{}", file.name)))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(|e| ExtractError::transport(&e))?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        Ok(())
    }
}

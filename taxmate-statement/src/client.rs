//! Seam between the pipeline and the generative-text service.

use std::future::Future;
use std::path::Path;

use crate::error::ExtractError;

pub const PDF_MIME: &str = "application/pdf";

/// A document uploaded to the provider's file store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Provider resource name, e.g. `files/abc123`; used for deletion.
    pub name: String,
    /// URI referenced from generation requests.
    pub uri: String,
    pub mime_type: String,
}

/// One structured-output request against an uploaded document.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub system_instruction: &'a str,
    pub prompt: String,
    pub file: &'a UploadedFile,
    pub temperature: f32,
    /// Ask for `application/json` output.
    pub json_output: bool,
}

/// Generative-text service used for extraction.
///
/// Constructed once per process and handed to the pipeline, so tests can
/// substitute their own implementation.
pub trait GenerativeClient: Send + Sync {
    fn upload(
        &self,
        path: &Path,
        display_name: &str,
        mime_type: &str,
    ) -> impl Future<Output = Result<UploadedFile, ExtractError>> + Send;

    /// Returns the text of the model's reply.
    fn generate(
        &self,
        request: &GenerateRequest<'_>,
    ) -> impl Future<Output = Result<String, ExtractError>> + Send;

    fn delete_file(&self, file: &UploadedFile) -> impl Future<Output = Result<(), ExtractError>> + Send;
}

//! PDF documents and page counting.
//!
//! Counting is two-tier: lopdf parses the page tree; if that fails the raw
//! bytes are scanned for page-tree markers. A malformed PDF should still
//! reach extraction, so neither failure is fatal and the floor is one page.

use lopdf::Document as PdfDocument;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use thiserror::Error;

static PAGES_COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s-u)/Type\s*/Pages\b.*?/Count\s+(\d+)").unwrap());
static PAGE_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)/Type\s*/Page\b").unwrap());

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("document is empty")]
    Empty,
}

/// How the page count of a [`Document`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCountSource {
    /// Parsed from the page tree.
    PageTree,
    /// Estimated from `/Type /Pages` or `/Type /Page` markers.
    Structural,
    /// Nothing usable was found.
    Default,
}

/// An inbound statement: raw bytes plus a derived page count.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
    page_count: usize,
    page_count_source: PageCountSource,
}

impl Document {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::Empty);
        }
        let (page_count, page_count_source) = count_pages(&bytes);
        Ok(Self {
            bytes,
            page_count,
            page_count_source,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn page_count_source(&self) -> PageCountSource {
        self.page_count_source
    }
}

/// Determine the number of pages in `bytes`. Never returns zero.
pub fn count_pages(bytes: &[u8]) -> (usize, PageCountSource) {
    match PdfDocument::load_mem(bytes) {
        Ok(doc) => {
            let n = doc.get_pages().len();
            if n > 0 {
                return (n, PageCountSource::PageTree);
            }
            tracing::debug!("page tree parsed but empty; scanning raw bytes");
        }
        Err(e) => {
            tracing::warn!(error = %e, "PDF parse failed; estimating page count from raw bytes");
        }
    }

    match structural_page_estimate(bytes) {
        0 => (1, PageCountSource::Default),
        n => (n, PageCountSource::Structural),
    }
}

/// Smallest plausible size of one page when no page objects are visible.
const MIN_BYTES_PER_PAGE: usize = 256;

/// Estimate pages by pattern-matching the raw byte stream.
///
/// Takes the `/Count` of the last `/Type /Pages` node (the root is usually
/// written last by incremental writers), but never more than the document
/// can hold: the number of `/Type /Page` objects when there are any, else
/// one page per [`MIN_BYTES_PER_PAGE`] bytes.
pub fn structural_page_estimate(bytes: &[u8]) -> usize {
    let declared = PAGES_COUNT
        .captures_iter(bytes)
        .filter_map(|caps| {
            std::str::from_utf8(&caps[1])
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
        })
        .last()
        .unwrap_or(0);

    let page_objects = PAGE_OBJECT.find_iter(bytes).count();
    let bound = if page_objects > 0 {
        page_objects
    } else {
        bytes.len() / MIN_BYTES_PER_PAGE
    };

    if declared > bound {
        tracing::warn!(declared, bound, "declared page count exceeds document size; clamping");
        return bound;
    }
    if declared > 0 {
        return declared;
    }
    page_objects
}

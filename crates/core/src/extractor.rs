use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

pub trait PdfExtractor: Send + Sync {
    /// Returns the concatenated text of every readable page, in page order.
    ///
    /// Failing pages are skipped; only a document that cannot be opened is an error.
    fn extract_text(&self, path: &Path) -> Result<String, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut text = String::new();
        let mut skipped = 0usize;
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(page_text) => text.push_str(&page_text),
                Err(error) => {
                    skipped += 1;
                    warn!(
                        path = %path.display(),
                        page = page_no,
                        error = %error,
                        "skipping unreadable page"
                    );
                }
            }
        }

        debug!(path = %path.display(), chars = text.len(), skipped, "extracted pdf text");
        Ok(text)
    }
}

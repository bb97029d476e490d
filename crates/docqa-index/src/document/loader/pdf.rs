use std::pin::Pin;

use super::super::{Document, DocumentError, DocumentLoader, DocumentMetadata};

/// Extracts text page by page; blank pages are skipped and the rest carry a 1-based `page`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(
        &self,
        source: &str,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let source = source.to_owned();
        Box::pin(async move {
            let pages = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_from_mem_by_pages(&bytes)
                    .map_err(|e| DocumentError::Pdf(e.to_string()))
            })
            .await
            // pdf-extract panics on some malformed inputs
            .map_err(|e| DocumentError::Pdf(format!("extraction aborted: {e}")))??;

            let docs: Vec<Document> = pages
                .into_iter()
                .enumerate()
                .filter(|(_, text)| !text.trim().is_empty())
                .map(|(i, content)| {
                    let mut metadata = DocumentMetadata::new(source.clone(), "application/pdf");
                    metadata.extra.insert("page".into(), (i + 1).to_string());
                    Document { content, metadata }
                })
                .collect();

            tracing::debug!(source = %source, pages = docs.len(), "extracted PDF text");
            Ok(docs)
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    fn content_types(&self) -> &[&str] {
        &["application/pdf"]
    }
}

use std::path::Path;
use std::pin::Pin;

use super::super::{Document, DocumentError, DocumentLoader, DocumentMetadata};

/// Plain text and markdown. Invalid UTF-8 sequences are replaced, not rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn load(
        &self,
        source: &str,
        bytes: Vec<u8>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>>
    {
        let source = source.to_owned();
        Box::pin(async move {
            let ext = Path::new(&source)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_ascii_lowercase();

            let content_type = match ext.as_str() {
                "md" | "markdown" => "text/markdown",
                _ => "text/plain",
            };

            let content = match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            };

            Ok(vec![Document {
                content,
                metadata: DocumentMetadata::new(source, content_type),
            }])
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }

    fn content_types(&self) -> &[&str] {
        &["text/plain", "text/markdown"]
    }
}

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub source: String,
    pub content_type: String,
    pub extra: HashMap<String, String>,
}

impl DocumentMetadata {
    #[must_use]
    pub fn new(source: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content_type: content_type.into(),
            extra: HashMap::new(),
        }
    }

    /// 1-based page number, when the loader knows it.
    #[must_use]
    pub fn page(&self) -> Option<u32> {
        self.extra.get("page").and_then(|p| p.parse().ok())
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub chunk_index: usize,
    /// Byte offset of the chunk in its document's text.
    pub start: usize,
    pub end: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_parses_extra() {
        let mut meta = DocumentMetadata::new("a.pdf", "application/pdf");
        assert_eq!(meta.page(), None);
        meta.extra.insert("page".into(), "3".into());
        assert_eq!(meta.page(), Some(3));
        meta.extra.insert("page".into(), "x".into());
        assert_eq!(meta.page(), None);
    }
}

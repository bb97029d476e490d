mod pdf;
mod text;

use std::path::Path;

pub use pdf::PdfLoader;
pub use text::TextLoader;

use super::{DocumentError, DocumentLoader};

/// Pick a loader by content type, falling back to the filename extension.
///
/// # Errors
///
/// Returns [`DocumentError::UnsupportedFormat`] when neither matches a known format.
pub fn loader_for(
    filename: &str,
    content_type: Option<&str>,
) -> Result<Box<dyn DocumentLoader>, DocumentError> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let mut loaders: Vec<Box<dyn DocumentLoader>> =
        vec![Box::new(PdfLoader), Box::new(TextLoader)];

    let by_mime = mime
        .as_deref()
        .and_then(|m| loaders.iter().position(|l| l.content_types().contains(&m)));
    let by_ext = || {
        ext.as_deref().and_then(|e| {
            loaders
                .iter()
                .position(|l| l.supported_extensions().contains(&e))
        })
    };
    if let Some(i) = by_mime.or_else(by_ext) {
        return Ok(loaders.swap_remove(i));
    }

    Err(DocumentError::UnsupportedFormat(
        mime.or(ext).unwrap_or_else(|| filename.to_owned()),
    ))
}

/// Read a local file for ingestion, refusing anything above `max_size` bytes.
///
/// # Errors
///
/// Returns an error if the file cannot be read or exceeds `max_size`.
pub async fn read_file(path: &Path, max_size: u64) -> Result<Vec<u8>, DocumentError> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > max_size {
        return Err(DocumentError::FileTooLarge(meta.len()));
    }
    Ok(tokio::fs::read(path).await?)
}

//! Hand-edited base document loading.

use std::path::Path;

use tracing::{debug, error};

use promsync_core::document::Document;

/// Load the base document.
///
/// A missing or empty file yields the default document. Read and parse
/// errors are logged and also yield the default, so a broken base file never
/// blocks reconciliation of the generated jobs.
pub async fn load_base_config(path: &Path) -> Document {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No base config");
            return Document::default();
        }
        Err(e) => {
            error!(path = %path.display(), %e, "Failed to read base config");
            return Document::default();
        }
    };

    parse_base_config(&raw).unwrap_or_else(|e| {
        error!(path = %path.display(), %e, "Failed to parse base config");
        Document::default()
    })
}

/// Parse base document bytes. Blank input is the default document.
pub fn parse_base_config(raw: &[u8]) -> Result<Document, serde_yaml::Error> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Document::default());
    }
    let doc: Option<Document> = serde_yaml::from_slice(raw)?;
    Ok(doc.unwrap_or_default())
}

//! Document conversion adapter. Grounded on
//! `documents/tasks.py::docling_convert_task`, which hands a PDF to
//! `docling.document_converter.DocumentConverter` and then calls
//! `export_to_markdown`/`export_to_text`/`export_to_doctags`/`export_to_dict`
//! on the result. Running real ML inference in-process is out of scope, so
//! the engine is an opaque trait; [`MockConversionEngine`] backs tests with
//! a deterministic structured document derived from the input's digest.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("page limit exceeded: document has more pages than the {0} allowed")]
    PageLimitExceeded(u32),
    #[error("file too large to convert: {0} bytes")]
    FileTooLarge(u64),
    #[error("conversion engine failed: {0}")]
    EngineFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub page_count: u32,
    pub text: String,
    pub markdown: String,
    pub doctags: String,
    /// Opaque JSON tree, stood in for `export_to_dict()`'s full structure.
    pub docling_json: serde_json::Value,
}

impl StructuredDocument {
    pub fn export_to_markdown(&self) -> &str {
        &self.markdown
    }

    pub fn export_to_text(&self) -> &str {
        &self.text
    }

    pub fn export_to_doctags(&self) -> &str {
        &self.doctags
    }

    pub fn export_to_dict(&self) -> &serde_json::Value {
        &self.docling_json
    }
}

#[derive(Debug, Clone)]
pub struct ConversionLimits {
    pub max_num_pages: u32,
    pub max_file_size_bytes: u64,
}

#[async_trait]
pub trait ConversionEngine: Send + Sync {
    async fn convert(
        &self,
        path: &Path,
        limits: &ConversionLimits,
    ) -> Result<StructuredDocument, ConvertError>;
}

/// Deterministic stand-in used by tests and by any deployment that hasn't
/// wired a real engine: derives a page count and body text from the input
/// file's size so output is reproducible without a model.
pub struct MockConversionEngine;

#[async_trait]
impl ConversionEngine for MockConversionEngine {
    async fn convert(
        &self,
        path: &Path,
        limits: &ConversionLimits,
    ) -> Result<StructuredDocument, ConvertError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ConvertError::EngineFailed(e.to_string()))?;
        let size = metadata.len();
        if size > limits.max_file_size_bytes {
            return Err(ConvertError::FileTooLarge(size));
        }

        let page_count = ((size / 4096).max(1)) as u32;
        if page_count > limits.max_num_pages {
            return Err(ConvertError::PageLimitExceeded(limits.max_num_pages));
        }

        let text = format!("mock extracted text for {} pages", page_count);
        Ok(StructuredDocument {
            page_count,
            text: text.clone(),
            markdown: format!("# Document\n\n{text}\n"),
            doctags: format!("<doctag><text>{text}</text></doctag>"),
            docling_json: serde_json::json!({ "page_count": page_count, "body": text }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn converts_within_limits() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 8192]).unwrap();

        let engine = MockConversionEngine;
        let limits = ConversionLimits { max_num_pages: 10, max_file_size_bytes: 1_000_000 };
        let doc = engine.convert(file.path(), &limits).await.unwrap();
        assert_eq!(doc.page_count, 2);
        assert!(doc.export_to_markdown().contains("Document"));
    }

    #[tokio::test]
    async fn rejects_documents_over_the_page_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; 40960]).unwrap();

        let engine = MockConversionEngine;
        let limits = ConversionLimits { max_num_pages: 2, max_file_size_bytes: 1_000_000 };
        let err = engine.convert(file.path(), &limits).await.unwrap_err();
        assert!(matches!(err, ConvertError::PageLimitExceeded(2)));
    }
}

//! Artifact export, grounded on `documents/tasks.py::export_artifacts_task`
//! and `_write_bytes_atomic`. Only `markdown`/`text`/`doctags` render a real
//! body pulled straight off the [`StructuredDocument`]; `chunks_json` and
//! `figures_zip` are structurally valid placeholders since real chunking
//! and VLM figure extraction are out of scope (`documents.md`'s
//! Non-goals: no OCR or ML inference in-process).

use crate::docling::StructuredDocument;
use crate::domain::ArtifactKind;

pub fn render(kind: ArtifactKind, doc: &StructuredDocument) -> Vec<u8> {
    match kind {
        ArtifactKind::DoclingJson => serde_json::to_vec_pretty(doc.export_to_dict())
            .expect("StructuredDocument JSON always serializes"),
        ArtifactKind::Markdown => doc.export_to_markdown().as_bytes().to_vec(),
        ArtifactKind::Text => doc.export_to_text().as_bytes().to_vec(),
        ArtifactKind::Doctags => doc.export_to_doctags().as_bytes().to_vec(),
        ArtifactKind::ChunksJson => {
            let chunks = serde_json::json!([{ "text": doc.export_to_text(), "index": 0 }]);
            serde_json::to_vec(&chunks).expect("chunk placeholder always serializes")
        }
        ArtifactKind::FiguresZip => empty_zip_central_directory(),
    }
}

/// A structurally valid, empty ZIP archive: just the end-of-central-directory
/// record. Real figure extraction needs the VLM pipeline this crate doesn't
/// run; this keeps the artifact byte-valid for any downstream ZIP reader.
fn empty_zip_central_directory() -> Vec<u8> {
    vec![0x50, 0x4B, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> StructuredDocument {
        StructuredDocument {
            page_count: 1,
            text: "hello".into(),
            markdown: "# hello".into(),
            doctags: "<doctag/>".into(),
            docling_json: serde_json::json!({ "page_count": 1 }),
        }
    }

    #[test]
    fn markdown_export_is_the_raw_body() {
        assert_eq!(render(ArtifactKind::Markdown, &doc()), b"# hello");
    }

    #[test]
    fn figures_zip_is_a_valid_empty_archive() {
        let bytes = render(ArtifactKind::FiguresZip, &doc());
        assert_eq!(&bytes[0..4], &[0x50, 0x4B, 0x05, 0x06]);
    }
}

//! Document loading for each supported format, alone and through directory ingest.

mod common;

use std::fs;
use std::io::Write;
use std::sync::Arc;

use common::{router, test_config, MockBackend};
use tempfile::TempDir;
use wallo::extract::{extract_file, extract_text, load_file, DocumentType};
use wallo::index::RagIndex;
use wallo::Error;

/// Minimal single-page PDF showing `phrase`, with a correct xref table.
fn minimal_pdf_with_phrase(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

/// Minimal docx with one `<w:p>` per paragraph.
fn minimal_docx(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[test]
fn docx_paragraphs_are_separated() {
    let bytes = minimal_docx(&["office test phrase", "second paragraph"]);
    let text = extract_text(&bytes, DocumentType::Docx).unwrap();
    assert_eq!(text, "office test phrase\n\nsecond paragraph");
}

#[test]
fn pdf_text_layer_or_extraction_failure() {
    let bytes = minimal_pdf_with_phrase("spec test phrase");
    // pdf-extract may not decode a hand-built font; either outcome is a
    // well-formed answer, never a panic or an empty success.
    match extract_text(&bytes, DocumentType::Pdf) {
        Ok(text) => assert!(text.contains("spec test phrase"), "got {:?}", text),
        Err(e) => assert!(matches!(e, Error::ExtractionFailed(_)), "got {:?}", e),
    }
}

#[test]
fn unknown_discriminator_is_unsupported() {
    assert!(matches!(
        DocumentType::parse("rtf"),
        Err(Error::UnsupportedFormat(_))
    ));
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slides.pptx");
    fs::write(&path, b"whatever").unwrap();
    assert!(matches!(extract_file(&path), Err(Error::UnsupportedFormat(_))));
}

#[test]
fn empty_file_yields_empty_text() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.docx");
    fs::write(&path, b"").unwrap();
    assert_eq!(extract_file(&path).unwrap(), "");
}

#[tokio::test]
async fn load_file_runs_off_the_async_thread() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.md");
    fs::write(&path, "\u{feff}# Title\n\nbody").unwrap();
    assert_eq!(load_file(path).await.unwrap(), "# Title\n\nbody");

    let missing = dir.path().join("missing.txt");
    assert!(matches!(load_file(missing).await, Err(Error::ExtractionFailed(_))));
}

#[tokio::test]
async fn directory_ingest_skips_unreadable_files() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir_all(docs.join("nested")).unwrap();
    fs::write(docs.join("a.md"), "markdown about otters").unwrap();
    fs::write(docs.join("nested").join("b.docx"), minimal_docx(&["docx about compilers"])).unwrap();
    fs::write(docs.join("broken.txt"), [0xffu8, 0xfe, 0x00, 0xc3]).unwrap();
    fs::write(docs.join("bad.pdf"), b"%PDF-1.4\nthis is not really a pdf\n").unwrap();
    fs::write(docs.join("photo.png"), [0x89u8, b'P', b'N', b'G']).unwrap();

    let config = Arc::new(test_config(dir.path()));
    let index = RagIndex::open(&config.rag, router(Arc::clone(&config), MockBackend::new()))
        .await
        .unwrap();
    let report = index.ingest_path(&docs).await.unwrap();

    assert_eq!(report.files, 2);
    assert_eq!(report.chunks, 2);
    let mut skipped: Vec<String> = report
        .skipped
        .iter()
        .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    skipped.sort();
    assert_eq!(skipped, vec!["bad.pdf".to_string(), "broken.txt".to_string()]);
    assert_eq!(index.sources().await.len(), 2);

    let hits = index.query("compilers", 1).await.unwrap().hits;
    assert!(hits[0].chunk.source_path.ends_with("b.docx"));
}

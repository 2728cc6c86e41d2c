//! Document extraction and chunking on real PDF and DOCX bytes.

use std::io::Write;

use rag_relay::extract::{extract_text, ExtractError};
use rag_relay::ingest::prepare_chunks;

/// Single-page PDF drawing `phrase` in Helvetica, with a correct xref table.
fn pdf_with_text(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", phrase);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >> stream\n{}\nendstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}

fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{}</w:body></w:document>",
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("[Content_Types].xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<?xml version=\"1.0\"?><Types/>").unwrap();
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[test]
fn test_pdf_pages_are_marked() {
    let text = extract_text(&pdf_with_text("ownership and borrowing"), "guide.pdf").unwrap();
    assert!(text.starts_with("[Page 1]\n"), "got {:?}", text);
    assert!(text.contains("ownership and borrowing"));
}

#[test]
fn test_docx_paragraphs_become_lines() {
    let bytes = docx_with_paragraphs(&["First paragraph.", "Second paragraph."]);
    let text = extract_text(&bytes, "Notes.DOCX").unwrap();
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines, vec!["First paragraph.", "Second paragraph."]);
}

#[test]
fn test_docx_without_document_xml_fails() {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<x/>").unwrap();
        zip.finish().unwrap();
    }
    let err = extract_text(&buf, "broken.docx").unwrap_err();
    assert!(matches!(err, ExtractError::Docx(_)));
}

#[test]
fn test_unsupported_extension() {
    let err = extract_text(b"a,b,c", "table.csv").unwrap_err();
    assert!(matches!(err, ExtractError::Unsupported(_)));
}

#[test]
fn test_pdf_chunks_carry_page() {
    let phrase = "Lifetimes describe how long references stay valid in a program";
    let chunks = prepare_chunks(&pdf_with_text(phrase), "lifetimes.pdf", 512, 100).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].page, Some(1));
    assert!(chunks[0].text.contains("Lifetimes"));
}

#[test]
fn test_docx_chunks() {
    let long = "Cargo builds Rust projects and manages their dependencies. ".repeat(20);
    let bytes = docx_with_paragraphs(&[&long, &long]);
    let chunks = prepare_chunks(&bytes, "cargo.docx", 300, 50).unwrap();
    assert!(chunks.len() > 3);
    assert!(chunks.iter().all(|c| c.page.is_none()));
    for pair in chunks.windows(2) {
        assert_eq!(pair[1].start, pair[0].start + 250);
    }
}

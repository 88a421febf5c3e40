//! Best-effort text extraction for uploaded documents.
//!
//! Dispatches on the declared MIME type and returns plain UTF-8 text.
//! Extraction never fails: every internal error degrades to an empty result,
//! and an empty or whitespace-only result is replaced by a fixed sentinel so
//! downstream chunking always has something to index.
//!
//! PDF extraction is deliberately heuristic — it scans uncompressed content
//! streams for `Tj`/`TJ` show-text operators and misses compressed or
//! font-remapped content. That is a documented limitation of this system,
//! not a correctness bug.

use anyhow::{bail, Result};
use std::io::Read;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_CSV: &str = "text/csv";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// The ingestion allow-list. Anything else is rejected before storage.
pub const SUPPORTED_MIME_TYPES: [&str; 4] = [MIME_TEXT, MIME_CSV, MIME_PDF, MIME_DOCX];

/// Substituted when extraction yields nothing usable.
pub const EXTRACTION_FALLBACK: &str = "No text content could be extracted from this document.";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

pub fn is_supported_mime_type(mime_type: &str) -> bool {
    SUPPORTED_MIME_TYPES.contains(&mime_type)
}

/// Extracts plain text from raw document bytes. Never fails; unsupported
/// types and unreadable content degrade to the sentinel string.
pub fn extract_text(bytes: &[u8], mime_type: &str) -> String {
    let text = match mime_type {
        MIME_TEXT | MIME_CSV => String::from_utf8_lossy(bytes).into_owned(),
        MIME_PDF => extract_pdf(bytes),
        MIME_DOCX => extract_docx(bytes).unwrap_or_default(),
        _ => String::new(),
    };

    if text.trim().is_empty() {
        EXTRACTION_FALLBACK.to_string()
    } else {
        text
    }
}

// ============ PDF ============

/// Heuristic PDF text extraction.
///
/// Scans `stream`…`endstream` segments and collects `(…)` string literals
/// that precede a `Tj` operator plus `[…]`-grouped literals that precede a
/// `TJ` operator, joined with single spaces. Escaped newlines are
/// normalized and whitespace is collapsed.
fn extract_pdf(bytes: &[u8]) -> String {
    // Latin-1 view: every byte maps to one char, keeping offsets stable.
    let text: String = bytes.iter().map(|&b| b as char).collect();

    let mut parts: Vec<String> = Vec::new();
    let mut rest = text.as_str();
    while let Some(pos) = rest.find("stream") {
        let after = &rest[pos + "stream".len()..];
        // A content stream starts after the EOL that follows the keyword;
        // anything else (e.g. the tail of "endstream") is skipped.
        let body = if let Some(stripped) = after.strip_prefix("\r\n") {
            stripped
        } else if let Some(stripped) = after.strip_prefix('\n') {
            stripped
        } else {
            rest = after;
            continue;
        };
        let Some(end) = body.find("endstream") else {
            break;
        };
        collect_show_text_ops(&body[..end], &mut parts);
        rest = &body[end + "endstream".len()..];
    }

    let joined = parts.join(" ").replace("\\n", "\n");
    collapse_whitespace(&joined)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Walks one content stream and pushes the text operands of `Tj` and `TJ`.
fn collect_show_text_ops(content: &str, parts: &mut Vec<String>) {
    let chars: Vec<char> = content.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '(' => {
                let (literal, next) = read_string_literal(&chars, i);
                let op = skip_pdf_whitespace(&chars, next);
                if op_is(&chars, op, 'T', 'j') {
                    parts.push(literal);
                    i = op + 2;
                } else {
                    i = next;
                }
            }
            '[' => {
                if let Some(close) = find_array_close(&chars, i) {
                    let op = skip_pdf_whitespace(&chars, close + 1);
                    if op_is(&chars, op, 'T', 'J') {
                        let mut run = String::new();
                        let mut k = i + 1;
                        while k < close {
                            if chars[k] == '(' {
                                let (literal, next) = read_string_literal(&chars, k);
                                run.push_str(&literal);
                                k = next;
                            } else {
                                k += 1;
                            }
                        }
                        parts.push(run);
                        i = op + 2;
                        continue;
                    }
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
}

/// Reads a `(…)` literal starting at `open`. Backslash escapes are kept
/// verbatim (escape normalization happens after joining). Returns the
/// literal body and the index just past the closing paren.
fn read_string_literal(chars: &[char], open: usize) -> (String, usize) {
    let mut literal = String::new();
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                literal.push('\\');
                literal.push(chars[i + 1]);
                i += 2;
            }
            ')' => return (literal, i + 1),
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }
    (literal, i)
}

/// Finds the `]` closing the array opened at `open`, skipping over string
/// literals so a `]` inside text does not end the array early.
fn find_array_close(chars: &[char], open: usize) -> Option<usize> {
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '(' => {
                let (_, next) = read_string_literal(chars, i);
                i = next;
            }
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn skip_pdf_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn op_is(chars: &[char], i: usize, a: char, b: char) -> bool {
    i + 1 < chars.len() && chars[i] == a && chars[i + 1] == b
}

// ============ DOCX ============

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut doc_xml = Vec::new();
    {
        let entry = archive.by_name("word/document.xml")?;
        entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut doc_xml)?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            bail!("word/document.xml exceeds size limit");
        }
    }
    extract_text_runs(&doc_xml)
}

/// Concatenates the inner text of every `<w:t>` text-run element with
/// single spaces.
fn extract_text_runs(xml: &[u8]) -> Result<String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        let run = te.unescape().unwrap_or_default();
                        if !out.is_empty() && !run.is_empty() {
                            out.push(' ');
                        }
                        out.push_str(run.as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("malformed document XML: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn plain_text_passes_through_verbatim() {
        let text = "hello, world\nsecond line";
        assert_eq!(extract_text(text.as_bytes(), MIME_TEXT), text);
        assert_eq!(extract_text(text.as_bytes(), MIME_CSV), text);
    }

    #[test]
    fn unsupported_type_yields_sentinel() {
        assert_eq!(
            extract_text(b"\x00\x01\x02", "application/octet-stream"),
            EXTRACTION_FALLBACK
        );
    }

    #[test]
    fn empty_input_yields_sentinel() {
        assert_eq!(extract_text(b"", MIME_TEXT), EXTRACTION_FALLBACK);
        assert_eq!(extract_text(b"   \n\t ", MIME_TEXT), EXTRACTION_FALLBACK);
    }

    #[test]
    fn pdf_show_text_operators_are_collected() {
        let pdf = b"%PDF-1.4\n4 0 obj << /Length 44 >> stream\nBT /F1 12 Tf (Hello) Tj (world) Tj ET\nendstream endobj\n";
        assert_eq!(extract_text(pdf, MIME_PDF), "Hello world");
    }

    #[test]
    fn pdf_show_text_array_operator_is_collected() {
        let pdf = b"stream\nBT [(spl)(it)] TJ ET\nendstream";
        assert_eq!(extract_text(pdf, MIME_PDF), "split");
    }

    #[test]
    fn pdf_escaped_newlines_are_normalized() {
        let pdf = b"stream\n(line one\\nline two) Tj\nendstream";
        assert_eq!(extract_text(pdf, MIME_PDF), "line one line two");
    }

    #[test]
    fn pdf_literals_without_show_operator_are_ignored() {
        let pdf = b"stream\n(not shown) Td (shown) Tj\nendstream";
        assert_eq!(extract_text(pdf, MIME_PDF), "shown");
    }

    #[test]
    fn invalid_pdf_degrades_to_sentinel() {
        assert_eq!(extract_text(b"not a pdf", MIME_PDF), EXTRACTION_FALLBACK);
    }

    fn minimal_docx(document_xml: &str) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn docx_text_runs_are_joined_with_spaces() {
        let docx = minimal_docx(
            r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>Employee</w:t></w:r><w:r><w:t>handbook</w:t></w:r></w:p></w:body></w:document>"#,
        );
        assert_eq!(extract_text(&docx, MIME_DOCX), "Employee handbook");
    }

    #[test]
    fn invalid_zip_degrades_to_sentinel() {
        assert_eq!(extract_text(b"not a zip", MIME_DOCX), EXTRACTION_FALLBACK);
    }
}

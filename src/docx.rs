use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use color_eyre::{eyre::Context, Result};
use xml::reader::{EventReader, XmlEvent};
use zip::ZipArchive;

use crate::ingest::DocumentExtractor;

const DOCUMENT_PART: &str = "word/document.xml";
const WORDML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Reads paragraph text out of Word (`.docx`) files.
#[derive(Debug, Default)]
pub struct DocxExtractor;

impl DocumentExtractor for DocxExtractor {
    fn paragraphs(&self, path: &Path) -> Result<Vec<String>> {
        let file = File::open(path).wrap_err_with(|| format!("Failed to open {}", path.display()))?;
        paragraphs(BufReader::new(file))
    }
}

pub fn paragraphs<R: Read + Seek>(reader: R) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(reader).wrap_err("Not a .docx archive")?;
    let part = archive
        .by_name(DOCUMENT_PART)
        .wrap_err_with(|| format!("Missing {DOCUMENT_PART}"))?;
    body_paragraphs(BufReader::new(part))
}

/// Text of every top-level body paragraph, in document order.
///
/// Paragraphs inside tables are skipped, as are paragraphs nested inside
/// another paragraph (text boxes). Runs contribute their `w:t` text, `w:tab`
/// becomes a tab and `w:br`/`w:cr` a line break.
fn body_paragraphs<R: Read>(xml: R) -> Result<Vec<String>> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut table_depth = 0usize;
    let mut paragraph_depth = 0usize;
    let mut run_depth = 0usize;
    let mut in_text = false;

    for event in EventReader::new(xml) {
        match event.wrap_err("Malformed document.xml")? {
            XmlEvent::StartElement { name, .. } if name.namespace.as_deref() == Some(WORDML_NS) => {
                let collecting = table_depth == 0 && paragraph_depth == 1;
                match name.local_name.as_str() {
                    "tbl" => table_depth += 1,
                    "p" => {
                        paragraph_depth += 1;
                        if paragraph_depth == 1 {
                            current.clear();
                        }
                    }
                    "r" => run_depth += 1,
                    "t" => in_text = true,
                    "tab" if collecting && run_depth > 0 => current.push('\t'),
                    "br" | "cr" if collecting && run_depth > 0 => current.push('\n'),
                    _ => {}
                }
            }
            XmlEvent::EndElement { name } if name.namespace.as_deref() == Some(WORDML_NS) => {
                match name.local_name.as_str() {
                    "tbl" => table_depth = table_depth.saturating_sub(1),
                    "p" => {
                        if paragraph_depth == 1 && table_depth == 0 {
                            paragraphs.push(std::mem::take(&mut current));
                        }
                        paragraph_depth = paragraph_depth.saturating_sub(1);
                    }
                    "r" => run_depth = run_depth.saturating_sub(1),
                    "t" => in_text = false,
                    _ => {}
                }
            }
            XmlEvent::Characters(text) | XmlEvent::Whitespace(text)
                if in_text && table_depth == 0 && paragraph_depth == 1 =>
            {
                current.push_str(&text);
            }
            _ => {}
        }
    }
    Ok(paragraphs)
}

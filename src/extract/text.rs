use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Parser, TagEnd};
use regex::Regex;
use zip::ZipArchive;

use crate::utils::extension_lowercase;

static PARAGRAPH_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"</w:p>|<w:br\s*/>|<w:cr\s*/>").unwrap());
static TAB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:tab\s*/>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());

const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteFormat {
    Text,
    Markdown,
    Docx,
    Pdf,
}

impl NoteFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match extension_lowercase(path)?.as_str() {
            "txt" => Some(NoteFormat::Text),
            "md" => Some(NoteFormat::Markdown),
            "docx" => Some(NoteFormat::Docx),
            "pdf" => Some(NoteFormat::Pdf),
            _ => None,
        }
    }
}

/// Extract plain text from a supported note file.
pub async fn extract_text(path: &Path) -> Result<String> {
    let Some(format) = NoteFormat::from_path(path) else {
        bail!("Unsupported file type: {}", path.display());
    };

    match format {
        NoteFormat::Text => read_text_file(path),
        NoteFormat::Markdown => Ok(flatten_markdown(&read_text_file(path)?)),
        NoteFormat::Docx => read_docx(path),
        NoteFormat::Pdf => read_pdf(path.to_path_buf()).await,
    }
}

/// UTF-8 first, Latin-1 for anything that isn't.
fn read_text_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => Ok(err.into_bytes().iter().map(|&b| b as char).collect()),
    }
}

pub fn flatten_markdown(md: &str) -> String {
    let mut out = String::with_capacity(md.len());

    for event in Parser::new(md) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph)
            | Event::End(TagEnd::Heading(_))
            | Event::End(TagEnd::Item)
            | Event::End(TagEnd::CodeBlock)
            | Event::End(TagEnd::BlockQuote(_)) => {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::Rule => out.push('\n'),
            _ => {}
        }
    }

    out.trim_end().to_string()
}

fn read_docx(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("Failed to read {} as a zip archive", path.display()))?;
    let mut entry = zip
        .by_name(DOCX_BODY)
        .with_context(|| format!("{} has no {DOCX_BODY}", path.display()))?;

    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .with_context(|| format!("Failed to read {DOCX_BODY} from {}", path.display()))?;

    Ok(docx_xml_to_text(&xml))
}

pub fn docx_xml_to_text(xml: &str) -> String {
    let with_breaks = PARAGRAPH_END_RE.replace_all(xml, "\n");
    let with_tabs = TAB_RE.replace_all(&with_breaks, "\t");
    let stripped = TAG_RE.replace_all(&with_tabs, "");
    let decoded = decode_html_entities(&stripped);

    decoded
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn read_pdf(path: PathBuf) -> Result<String> {
    let display = path.display().to_string();
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
        .await
        .context("PDF extraction task failed")?
        .with_context(|| format!("Failed to extract text from {display}"))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(
            NoteFormat::from_path(Path::new("a/B.MD")),
            Some(NoteFormat::Markdown)
        );
        assert_eq!(
            NoteFormat::from_path(Path::new("notes.Pdf")),
            Some(NoteFormat::Pdf)
        );
        assert_eq!(NoteFormat::from_path(Path::new("image.png")), None);
        assert_eq!(NoteFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn markdown_is_flattened() {
        let md = "# Cells\n\nMitosis is **cell division**.\n\n- one\n- two\n\n```\ncode\n```\n";
        assert_eq!(
            flatten_markdown(md),
            "Cells\nMitosis is cell division.\none\ntwo\ncode"
        );
    }

    #[test]
    fn docx_xml_keeps_paragraphs_and_decodes_entities() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Cells &amp; tissues</w:t></w:r></w:p><w:p></w:p><w:p><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t></w:r></w:p></w:body></w:document>"#;
        assert_eq!(docx_xml_to_text(xml), "Cells & tissues\nA\tB");
    }

    #[tokio::test]
    async fn latin1_text_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("old.txt");
        std::fs::write(&path, [b'c', b'a', b'f', 0xE9]).unwrap();
        assert_eq!(extract_text(&path).await.unwrap(), "café");
    }

    #[tokio::test]
    async fn docx_archive_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.docx");
        let file = File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(DOCX_BODY, zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(b"<w:p><w:t>First</w:t></w:p><w:p><w:t>Second</w:t></w:p>")
            .unwrap();
        zip.finish().unwrap();

        assert_eq!(extract_text(&path).await.unwrap(), "First\nSecond");
    }

    #[tokio::test]
    async fn unsupported_and_missing_files_error() {
        assert!(extract_text(Path::new("photo.jpg")).await.is_err());
        assert!(extract_text(Path::new("/definitely/missing.txt")).await.is_err());
    }
}

//! Raw text extraction from PDF and DOCX files

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::io::Read;
use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

/// Document formats the ingestion pipeline understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Classify a file by its extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Docx => "DOCX",
        }
    }
}

/// Converts a document on disk into plain text
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path, kind: DocumentKind) -> Result<String>;
}

/// Extractor backed by `pdftotext` for PDFs and the DOCX XML body for Word files
#[derive(Debug, Clone)]
pub struct SystemExtractor {
    pdftotext: String,
}

impl Default for SystemExtractor {
    fn default() -> Self {
        Self {
            pdftotext: "pdftotext".to_string(),
        }
    }
}

impl SystemExtractor {
    /// Use a specific `pdftotext` binary
    pub fn with_pdftotext(binary: impl Into<String>) -> Self {
        Self {
            pdftotext: binary.into(),
        }
    }

    fn extract_pdf(&self, path: &Path) -> Result<String> {
        let output = Command::new(&self.pdftotext)
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .with_context(|| format!("failed to run {} (is poppler installed?)", self.pdftotext))?;

        if !output.status.success() {
            bail!(
                "{} failed: {}",
                self.pdftotext,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn extract_docx(&self, path: &Path) -> Result<String> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        let mut archive = zip::ZipArchive::new(file).context("failed to open DOCX as ZIP archive")?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .context("DOCX has no word/document.xml")?
            .read_to_string(&mut xml)
            .context("failed to read word/document.xml")?;

        Ok(docx_xml_to_text(&xml))
    }
}

impl TextExtractor for SystemExtractor {
    fn extract(&self, path: &Path, kind: DocumentKind) -> Result<String> {
        match kind {
            DocumentKind::Pdf => self.extract_pdf(path),
            DocumentKind::Docx => self.extract_docx(path),
        }
    }
}

fn paragraph_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<w:p[\s>].*?</w:p>").expect("valid paragraph regex"))
}

fn run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:tab\s*/>").expect("valid run regex")
    })
}

/// Flatten a WordprocessingML body into text, one line per non-empty paragraph
pub fn docx_xml_to_text(xml: &str) -> String {
    paragraph_regex()
        .find_iter(xml)
        .map(|paragraph| {
            run_regex()
                .captures_iter(paragraph.as_str())
                .map(|run| match run.get(1) {
                    Some(text) => unescape_xml(text.as_str()),
                    None => "\t".to_string(),
                })
                .collect::<String>()
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|lt|gt|quot|apos|amp);")
            .expect("valid entity regex")
    })
}

/// Decode named and numeric character references; unknown ones are kept as-is
fn unescape_xml(text: &str) -> String {
    entity_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let code = match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => name[1..].parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

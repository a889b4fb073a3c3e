//! Text extraction: turn a PDF on disk into metadata plus per-page text.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while parsing. Every pdfium call runs on the blocking
//! pool so Tokio worker threads stay free for synthesis requests.
//!
//! Before pdfium sees the file we check that it exists, is readable and
//! starts with the `%PDF` magic, so callers get a precise error instead of
//! a generic parse failure.

use crate::error::Pdf2AudioError;
use crate::model::{count_words, DocumentMetadata, Page};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Metadata and pages of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub metadata: DocumentMetadata,
    pub pages: Vec<Page>,
}

/// Source of page text. The supervisor only talks to this trait.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, Pdf2AudioError>;

    /// Document metadata only. Defaults to a full extraction.
    async fn metadata(&self, path: &Path) -> Result<DocumentMetadata, Pdf2AudioError> {
        Ok(self.extract(path).await?.metadata)
    }
}

/// Extracts text with pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    password: Option<String>,
}

impl PdfiumExtractor {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl Extractor for PdfiumExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedDocument, Pdf2AudioError> {
        preflight(path)?;

        let path = path.to_path_buf();
        let password = self.password.clone();
        let doc = tokio::task::spawn_blocking(move || extract_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| Pdf2AudioError::Internal(format!("Extraction task panicked: {}", e)))??;

        info!(
            "Extracted {} pages ({} words)",
            doc.pages.len(),
            doc.pages.iter().map(|p| p.word_count).sum::<usize>()
        );
        Ok(doc)
    }

    async fn metadata(&self, path: &Path) -> Result<DocumentMetadata, Pdf2AudioError> {
        preflight(path)?;

        let path = path.to_path_buf();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || -> Result<DocumentMetadata, Pdf2AudioError> {
            let pdfium = bind_pdfium()?;
            let document = open_document(&pdfium, &path, password.as_deref())?;
            let page_count = document.pages().len() as usize;
            Ok(read_metadata(&document, page_count))
        })
        .await
        .map_err(|e| Pdf2AudioError::Internal(format!("Metadata task panicked: {}", e)))?
    }
}

/// Hands back a document that was prepared up front, ignoring the path.
///
/// Useful when text comes from somewhere other than a PDF file.
#[derive(Debug, Clone)]
pub struct PreparedExtractor {
    document: ExtractedDocument,
}

impl PreparedExtractor {
    pub fn new(document: ExtractedDocument) -> Self {
        Self { document }
    }

    /// Build from raw page texts, numbering pages from 1.
    pub fn from_texts<I, S>(metadata: DocumentMetadata, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages: Vec<Page> = texts
            .into_iter()
            .enumerate()
            .map(|(i, t)| Page::new(i + 1, t))
            .collect();
        let metadata = DocumentMetadata {
            page_count: pages.len(),
            ..metadata
        };
        Self::new(ExtractedDocument { metadata, pages })
    }
}

#[async_trait]
impl Extractor for PreparedExtractor {
    async fn extract(&self, _path: &Path) -> Result<ExtractedDocument, Pdf2AudioError> {
        if self.document.pages.is_empty() {
            return Err(Pdf2AudioError::EmptyDocument {
                path: PathBuf::from("<prepared>"),
            });
        }
        Ok(self.document.clone())
    }
}

/// Validate existence, read permission and PDF magic bytes.
pub fn preflight(path: &Path) -> Result<(), Pdf2AudioError> {
    if !path.exists() {
        return Err(Pdf2AudioError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(Pdf2AudioError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2AudioError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2AudioError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Preflight ok: {}", path.display());
    Ok(())
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the system.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2AudioError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path)
            .map_err(|e| Pdf2AudioError::PdfiumBindingFailed(format!("{path}: {e:?}")))?,
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| Pdf2AudioError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn extract_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<ExtractedDocument, Pdf2AudioError> {
    let pdfium = bind_pdfium()?;

    let document = open_document(&pdfium, pdf_path, password)?;

    let page_count = document.pages().len() as usize;
    if page_count == 0 {
        return Err(Pdf2AudioError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }

    let metadata = read_metadata(&document, page_count);

    let mut pages = Vec::with_capacity(page_count);
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map(|t| t.all())
            .map_err(|e| Pdf2AudioError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("page {}: {:?}", idx + 1, e),
            })?;
        let text = text.trim().to_string();

        let mut has_images = false;
        let mut sizes: Vec<f32> = Vec::new();
        for object in page.objects().iter() {
            if object.as_image_object().is_some() {
                has_images = true;
            } else if let Some(text_obj) = object.as_text_object() {
                sizes.push(round_size(text_obj.unscaled_font_size().value));
            }
        }

        let page = Page {
            number: idx + 1,
            word_count: count_words(&text),
            text,
            has_images,
            font_sizes: distinct_sizes(sizes),
        };
        debug!(
            "Page {}: {} words, {} font sizes, images={}",
            page.number,
            page.word_count,
            page.font_sizes.len(),
            page.has_images
        );
        pages.push(page);
    }

    Ok(ExtractedDocument { metadata, pages })
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, Pdf2AudioError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                Pdf2AudioError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                Pdf2AudioError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            Pdf2AudioError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}

fn read_metadata(document: &PdfDocument<'_>, page_count: usize) -> DocumentMetadata {
    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count,
    }
}

fn round_size(size: f32) -> f32 {
    (size * 10.0).round() / 10.0
}

fn distinct_sizes(mut sizes: Vec<f32>) -> Vec<f32> {
    sizes.retain(|s| s.is_finite() && *s > 0.0);
    sizes.sort_by(|a, b| a.total_cmp(b));
    sizes.dedup();
    sizes
}

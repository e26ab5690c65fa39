//! E-book packaging
//!
//! [`BookAssembler`] is the seam between the pipeline and whatever writes the final
//! artifact. [`EpubAssembler`] writes an EPUB with one XHTML document per section.

use async_trait::async_trait;
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EPUB generation failed: {0}")]
    Epub(String),

    #[error("Assembly task failed: {0}")]
    Worker(String),
}

/// Book-level metadata
#[derive(Debug, Clone, PartialEq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    pub description: String,
}

/// One section of the book, in reading order
#[derive(Debug, Clone, PartialEq)]
pub struct BookSection {
    pub title: String,
    /// Plain text; blank lines separate paragraphs
    pub content: String,
}

/// Writes a finished book to `output`
#[async_trait]
pub trait BookAssembler: Send + Sync {
    /// Returns the path actually written
    async fn assemble(
        &self,
        metadata: &BookMetadata,
        sections: &[BookSection],
        output: &Path,
    ) -> Result<PathBuf, AssemblyError>;
}

/// EPUB writer backed by `epub-builder`
#[derive(Debug, Clone)]
pub struct EpubAssembler {
    /// Prepend a generated table of contents page
    pub inline_toc: bool,
}

impl Default for EpubAssembler {
    fn default() -> Self {
        Self { inline_toc: true }
    }
}

impl EpubAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn build(
        metadata: &BookMetadata,
        sections: &[BookSection],
        out: impl Write,
        inline_toc: bool,
    ) -> Result<(), AssemblyError> {
        let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(epub_error)?).map_err(epub_error)?;
        builder.metadata("title", metadata.title.as_str()).map_err(epub_error)?;
        builder.metadata("author", metadata.author.as_str()).map_err(epub_error)?;
        if !metadata.description.is_empty() {
            builder
                .metadata("description", metadata.description.as_str())
                .map_err(epub_error)?;
        }
        if inline_toc {
            builder.inline_toc();
        }

        for (index, section) in sections.iter().enumerate() {
            let body = section_xhtml(section);
            builder
                .add_content(
                    EpubContent::new(format!("chapter_{}.xhtml", index + 1), body.as_bytes())
                        .title(section.title.as_str())
                        .reftype(ReferenceType::Text),
                )
                .map_err(epub_error)?;
        }

        builder.generate(out).map_err(epub_error)
    }
}

fn epub_error(e: impl std::fmt::Display) -> AssemblyError {
    AssemblyError::Epub(e.to_string())
}

#[async_trait]
impl BookAssembler for EpubAssembler {
    async fn assemble(
        &self,
        metadata: &BookMetadata,
        sections: &[BookSection],
        output: &Path,
    ) -> Result<PathBuf, AssemblyError> {
        let metadata = metadata.clone();
        let sections = sections.to_vec();
        let output = output.to_path_buf();
        let inline_toc = self.inline_toc;
        let section_count = sections.len();

        let written = tokio::task::spawn_blocking(move || -> Result<PathBuf, AssemblyError> {
            let dir = match output.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;

            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            Self::build(&metadata, &sections, tmp.as_file_mut(), inline_toc)?;
            tmp.as_file_mut().flush()?;
            tmp.as_file().sync_all()?;
            tmp.persist(&output).map_err(|e| AssemblyError::Io(e.error))?;
            Ok(output)
        })
        .await
        .map_err(|e| AssemblyError::Worker(e.to_string()))??;

        info!(path = %written.display(), sections = section_count, "E-book written");
        Ok(written)
    }
}

/// File-name friendly form of a title
///
/// Lowercase ASCII alphanumerics joined by single dashes; `book` when nothing is left.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(80);
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "book".to_string()
    } else {
        slug
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn section_xhtml(section: &BookSection) -> String {
    let title = escape_xml(&section.title);
    let mut body = String::new();
    for paragraph in section.content.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        body.push_str("<p>");
        body.push_str(&escape_xml(paragraph).replace('\n', "<br/>"));
        body.push_str("</p>\n");
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
         <head><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n"
    )
}

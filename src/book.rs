//! Book sources for the CLI driver.
//!
//! A book arrives either as a ready-made JSON payload (pages already split)
//! or as a plain-text / EPUB file that is flattened to text and paginated
//! for the active device profile.

use crate::offline::OfflineBookPayload;
use crate::pagination;
use anyhow::{Context, Result, bail};
use epub::doc::EpubDoc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormat {
    Json,
    Text,
    Epub,
}

impl BookFormat {
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Json),
            "txt" => Some(Self::Text),
            "epub" => Some(Self::Epub),
            _ => None,
        }
    }
}

/// Load `path` as a book, paginating text sources at `chars_per_page`.
pub fn load_book(path: &Path, chars_per_page: usize) -> Result<OfflineBookPayload> {
    let format = BookFormat::detect(path)
        .with_context(|| format!("Unsupported book format: {}", path.display()))?;
    let payload = match format {
        BookFormat::Json => load_json_payload(path)?,
        BookFormat::Text => {
            info!(path = %path.display(), "Loading plain text book");
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            paginated_payload(path, &text, chars_per_page)?
        }
        BookFormat::Epub => {
            let text = load_epub_text(path)?;
            paginated_payload(path, &text, chars_per_page)?
        }
    };
    info!(
        book_id = %payload.book_id,
        pages = payload.pages.len(),
        media = payload.media.len(),
        "Loaded book"
    );
    Ok(payload)
}

fn load_json_payload(path: &Path) -> Result<OfflineBookPayload> {
    info!(path = %path.display(), "Loading book payload");
    let data =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let payload: OfflineBookPayload = serde_json::from_str(&data)
        .with_context(|| format!("Invalid book payload in {}", path.display()))?;
    if payload.book_id.is_empty() || payload.book_id.contains('/') {
        bail!("Book id {:?} is not usable as a cache key", payload.book_id);
    }
    if payload.pages.is_empty() {
        bail!("Book payload {} has no pages", path.display());
    }
    Ok(payload)
}

fn paginated_payload(path: &Path, text: &str, chars_per_page: usize) -> Result<OfflineBookPayload> {
    if text.trim().is_empty() {
        bail!("No textual content found in {}", path.display());
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let title = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("book")
        .to_string();
    Ok(OfflineBookPayload {
        book_id: book_id_for(&bytes),
        title,
        pages: pagination::paginate(text, chars_per_page),
        media: Vec::new(),
    })
}

/// Stable id derived from the file contents.
pub fn book_id_for(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}

fn load_epub_text(path: &Path) -> Result<String> {
    info!(path = %path.display(), "Loading EPUB content");
    let mut doc =
        EpubDoc::new(path).with_context(|| format!("Failed to open EPUB at {}", path.display()))?;

    let mut combined = String::new();
    let mut chapters = 0usize;
    loop {
        if let Some((chapter, _mime)) = doc.get_current_str() {
            chapters += 1;
            // Wide width so html2text does not hard-wrap lines.
            let plain = match html2text::from_read(chapter.as_bytes(), 10_000) {
                Ok(clean) => clean,
                Err(err) => {
                    warn!(chapter = chapters, "html2text failed: {err}");
                    chapter
                }
            };
            debug!(chapter = chapters, chars = plain.len(), "Parsed chapter");
            if !combined.is_empty() {
                combined.push_str("\n\n");
            }
            combined.push_str(&plain);
        }
        if !doc.go_next() {
            break;
        }
    }
    info!(chapters, total_chars = combined.len(), "Finished loading EPUB content");
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_formats_case_insensitively() {
        assert_eq!(BookFormat::detect(Path::new("a/b.JSON")), Some(BookFormat::Json));
        assert_eq!(BookFormat::detect(Path::new("b.txt")), Some(BookFormat::Text));
        assert_eq!(BookFormat::detect(Path::new("c.epub")), Some(BookFormat::Epub));
        assert_eq!(BookFormat::detect(Path::new("d.pdf")), None);
        assert_eq!(BookFormat::detect(Path::new("noext")), None);
    }

    #[test]
    fn text_books_are_paginated_with_a_content_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        fs::write(&path, "first paragraph\n\nsecond paragraph\n\nthird").expect("write");

        let book = load_book(&path, 20).expect("load");
        assert_eq!(book.title, "notes");
        assert_eq!(book.pages, vec!["first paragraph", "second paragraph", "third"]);
        assert_eq!(book.book_id.len(), 16);
        assert_eq!(book.book_id, load_book(&path, 20).expect("reload").book_id);
    }

    #[test]
    fn json_payloads_keep_their_pages_and_media() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bio.json");
        fs::write(
            &path,
            r#"{"book_id":"bio-101","title":"Biology","pages":["a","b"],"media":["https://cdn.example/fig1.png"]}"#,
        )
        .expect("write");

        let book = load_book(&path, 1_000).expect("load");
        assert_eq!(book.book_id, "bio-101");
        assert_eq!(book.total_pages(), 2);
        assert_eq!(book.media.len(), 1);
    }

    #[test]
    fn rejects_empty_payloads_and_slashy_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let empty = dir.path().join("empty.json");
        fs::write(&empty, r#"{"book_id":"x","title":"X","pages":[]}"#).expect("write");
        assert!(load_book(&empty, 100).is_err());

        let slashy = dir.path().join("slashy.json");
        fs::write(&slashy, r#"{"book_id":"a/b","title":"X","pages":["p"]}"#).expect("write");
        assert!(load_book(&slashy, 100).is_err());

        let blank = dir.path().join("blank.txt");
        fs::write(&blank, "   \n").expect("write");
        assert!(load_book(&blank, 100).is_err());
    }
}

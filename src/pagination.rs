//! Text pagination.
//!
//! Page size is approximated as a character budget derived from the device
//! profile: larger fonts and narrower devices fit fewer characters on a page.

use crate::profile::{DeviceType, ScalingConfig};

/// Smallest page the budget will ever produce, in characters.
pub const MIN_PAGE_CHARS: usize = 400;
/// Largest page the budget will ever produce, in characters.
pub const MAX_PAGE_CHARS: usize = 6_000;

const REFERENCE_FONT_SIZE: f32 = 16.0;

/// Characters per line and lines per page at the reference font size.
fn reference_layout(device: DeviceType) -> (f32, f32) {
    match device {
        DeviceType::Mobile => (40.0, 20.0),
        DeviceType::Tablet => (60.0, 26.0),
        DeviceType::Desktop => (80.0, 30.0),
    }
}

/// Characters that fit on one page for the given profile.
pub fn page_budget(profile: &ScalingConfig) -> usize {
    let (line_chars, page_lines) = reference_layout(profile.device);
    let ratio = REFERENCE_FONT_SIZE / profile.font_size.max(1) as f32;
    let chars_per_line = (line_chars * ratio).round().max(1.0);
    let lines_per_page = (page_lines * ratio).round().max(1.0);
    ((chars_per_line * lines_per_page) as usize).clamp(MIN_PAGE_CHARS, MAX_PAGE_CHARS)
}

/// Split `text` into pages of at most `chars_per_page` characters, breaking on
/// paragraph boundaries. A paragraph longer than a page is split on word
/// boundaries. Always returns at least one page.
pub fn paginate(text: &str, chars_per_page: usize) -> Vec<String> {
    let budget = chars_per_page.max(1);
    let mut pages = Vec::new();
    let mut current = String::new();

    for paragraph in split_paragraphs(text) {
        for chunk in split_long(&paragraph, budget) {
            let needed = if current.is_empty() {
                chunk.chars().count()
            } else {
                current.chars().count() + 2 + chunk.chars().count()
            };
            if !current.is_empty() && needed > budget {
                pages.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&chunk);
        }
    }

    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    pages
}

fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                paragraphs.push(lines.join("\n"));
                lines.clear();
            }
        } else {
            lines.push(line.trim_end());
        }
    }
    if !lines.is_empty() {
        paragraphs.push(lines.join("\n"));
    }
    paragraphs
}

fn split_long(paragraph: &str, budget: usize) -> Vec<String> {
    if paragraph.chars().count() <= budget {
        return vec![paragraph.to_string()];
    }
    let mut chunks = Vec::new();
    let mut chunk = String::new();
    let mut chunk_len = 0usize;
    for word in paragraph.split_whitespace() {
        let word_len = word.chars().count();
        if chunk_len > 0 && chunk_len + 1 + word_len > budget {
            chunks.push(std::mem::take(&mut chunk));
            chunk_len = 0;
        }
        if chunk_len > 0 {
            chunk.push(' ');
            chunk_len += 1;
        }
        chunk.push_str(word);
        chunk_len += word_len;
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

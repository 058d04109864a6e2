//! PDF text extraction with page skipping.
//!
//! Wraps lopdf for per-page text extraction so cover pages and
//! back-matter can be dropped before analysis. Handles the failure
//! modes that matter here:
//! - missing/corrupt files
//! - skip ranges that would drop the whole document
//! - scanned/image-only pages (extract to nothing; the caller decides
//!   whether an empty result is an error)
//!
//! The input path is a temp file owned by this call: it is deleted on
//! both success and failure, so a failed extraction never leaves the
//! upload behind on disk.

use crate::error::{Error, Result};
use crate::text;
use std::path::Path;

/// Cleaned text plus its word count.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub word_count: usize,
}

/// Extract text from the PDF at `path`, skipping `skip_first` pages at
/// the start and `skip_last` at the end. Deletes the file afterward
/// regardless of outcome.
pub fn process_pdf(path: &Path, skip_first: usize, skip_last: usize) -> Result<ExtractedText> {
    if !path.exists() {
        return Err(Error::Extraction(format!("file not found: {}", path.display())));
    }

    let result = extract(path, skip_first, skip_last);

    // The temp file is consumed here even when extraction failed;
    // a deletion failure is logged but never masks the primary error.
    if let Err(e) = std::fs::remove_file(path) {
        eprintln!("[Pdf] Failed to delete temp file {}: {}", path.display(), e);
    }

    result
}

fn extract(path: &Path, skip_first: usize, skip_last: usize) -> Result<ExtractedText> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| Error::Extraction(format!("failed to load PDF: {}", e)))?;

    let total_pages = doc.get_pages().len();
    println!("[Pdf] {} pages in {}", total_pages, path.display());

    let (start, end) = page_range(total_pages, skip_first, skip_last)?;
    println!("[Pdf] Processing pages {} to {}", start, end);

    let mut full_text = String::new();
    for page in start..=end {
        // A page that fails to decode yields no text, not an error;
        // emptiness is judged over the whole document by the caller.
        let page_text = doc.extract_text(&[page as u32]).unwrap_or_default();
        full_text.push_str(&page_text);
        full_text.push_str("\n\n");
    }

    let cleaned = text::clean(&full_text);
    let word_count = text::word_count(&cleaned);

    Ok(ExtractedText { text: cleaned, word_count })
}

/// Inclusive 1-indexed page range after skipping. Rejects skip counts
/// that would leave no pages; exactly one remaining page is allowed.
/// Skip values come straight from form fields, so the sum must not be
/// allowed to overflow past the validation.
fn page_range(total_pages: usize, skip_first: usize, skip_last: usize) -> Result<(usize, usize)> {
    let remaining = skip_first
        .checked_add(skip_last)
        .filter(|skipped| *skipped < total_pages);
    if remaining.is_none() {
        return Err(Error::Extraction(format!(
            "cannot skip {} + {} pages of a {}-page document",
            skip_first, skip_last, total_pages
        )));
    }
    // skip_first < total_pages here, so neither expression can wrap.
    let start = (skip_first + 1).min(total_pages);
    let end = (total_pages - skip_last).max(1);
    Ok((start, end))
}

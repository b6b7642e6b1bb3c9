//! Filesystem-safe names
//!
//! Case titles come straight from the listing page and routinely contain `/`,
//! `:` and quotes. These helpers turn them into names that are safe on every
//! platform the archive is copied to.

/// Longest document filename produced, in UTF-8 bytes, including `.pdf`.
///
/// Leaves room under the common 255-byte name limit for the temporary
/// `.{name}.XXXXXX.part` sibling written during a download.
pub const MAX_FILENAME_BYTES: usize = 180;

const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Replace reserved punctuation and control characters with `_` and trim
/// surrounding whitespace and dots.
///
/// Idempotent: a sanitized component sanitizes to itself.
pub fn sanitize_component(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    replaced
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// Sanitize a complete file name, keeping its extension untouched.
///
/// Never truncates, so it can be applied to names produced by
/// [`document_filename`] without changing them.
pub fn sanitize_file_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}.{}", sanitize_component(stem), sanitize_component(ext))
        }
        _ => sanitize_component(name),
    }
}

/// `{case_number}_{case_title}.pdf`, sanitized and capped at
/// [`MAX_FILENAME_BYTES`]. Only the title is shortened, on a character
/// boundary.
pub fn document_filename(case_number: &str, case_title: &str) -> String {
    let number = sanitize_component(case_number);
    let title = sanitize_component(case_title);
    let fixed = number.len() + "_".len() + ".pdf".len();
    let budget = MAX_FILENAME_BYTES.saturating_sub(fixed);

    let title = if title.len() > budget {
        truncate_to_bytes(&title, budget)
            .trim_end_matches(|c: char| c.is_whitespace() || c == '.')
            .to_string()
    } else {
        title
    };

    if title.is_empty() {
        format!("{number}.pdf")
    } else {
        format!("{number}_{title}.pdf")
    }
}

/// Longest prefix of `text` that fits in `max` bytes without splitting a character.
fn truncate_to_bytes(text: &str, max: usize) -> &str {
    let mut end = max.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Name of the information sheet saved next to a case's documents.
pub fn info_sheet_filename(case_number: &str) -> String {
    format!("{}_info.html", sanitize_component(case_number))
}

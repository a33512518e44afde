//! Deterministic text normalization and content hashing
//!
//! Normalization turns a fetched terms document (plain text or HTML) into a
//! canonical line-oriented text so that cosmetic changes (markup, spacing,
//! line endings) never register as substantive changes. The content hash is
//! a pure function of the normalized text.

use crate::error::{MonitorError, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn html_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<(!doctype|html|head|body|div|p|br|span|a|h[1-6]|section|article|ul|ol|li|table)\b")
            .expect("valid built-in pattern")
    })
}

fn hidden_blocks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<!--.*?-->")
            .expect("valid built-in pattern")
    })
}

fn block_tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|td|th|table|section|article|header|footer|main|blockquote)\b[^>]*>",
        )
        .expect("valid built-in pattern")
    })
}

fn any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid built-in pattern"))
}

/// Normalize raw document bytes into canonical text
///
/// Fails with `Normalization` if the bytes are not UTF-8 text, look like
/// binary data, or normalize to nothing.
pub fn normalize(raw: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        MonitorError::Normalization(format!("content is not valid UTF-8: {}", e))
    })?;

    if text.contains('\0') {
        return Err(MonitorError::Normalization(
            "content contains binary data".to_string(),
        ));
    }

    let text = text.trim_start_matches('\u{feff}');
    let text = if html_marker().is_match(text) {
        strip_html(text)
    } else {
        text.to_string()
    };

    let normalized = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if normalized.is_empty() {
        return Err(MonitorError::Normalization(
            "document is empty after normalization".to_string(),
        ));
    }

    Ok(normalized)
}

fn strip_html(html: &str) -> String {
    let text = hidden_blocks().replace_all(html, "");
    let text = block_tags().replace_all(&text, "\n");
    let text = any_tag().replace_all(&text, "");
    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    // &amp; last so "&amp;lt;" decodes to "&lt;", not "<"
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// SHA-256 of normalized content, as a lower-case hex string
pub fn content_hash(normalized: &str) -> String {
    digest_hex(normalized.as_bytes())
}

/// SHA-256 of raw bytes, as a lower-case hex string
pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{result:x}")
}

/// Normalize raw bytes and hash the result
pub fn normalize_and_hash(raw: &[u8]) -> Result<(String, String)> {
    let normalized = normalize(raw)?;
    let hash = content_hash(&normalized);
    Ok((normalized, hash))
}

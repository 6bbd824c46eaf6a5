//! Content fingerprinting and storage key derivation.
//!
//! The cache key component is a SHA-256 digest of the subject-photo
//! reference string (URL or inline token), never of image bytes - two
//! different URLs pointing at the same bytes are cache-distinct.

use sha2::{Digest, Sha256};

const MAX_SHOP_SEGMENT_LEN: usize = 63;

/// SHA-256 hex digest of the subject-photo reference string.
pub fn fingerprint(reference: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sanitizes a shop domain into an object-key-safe segment: lowercase, runs
/// of characters outside `[a-z0-9._-]` collapsed to a single `-`, trimmed of
/// leading/trailing `-`, truncated to a bounded length.
pub fn sanitize_shop_domain(shop_domain: &str) -> String {
    let mut out = String::with_capacity(shop_domain.len());
    let mut pending_dash = false;

    for ch in shop_domain.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '.' | '_' | '-') {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }

    let trimmed = out.trim_matches('-');
    trimmed.chars().take(MAX_SHOP_SEGMENT_LEN).collect()
}

/// Maps a content type to a file extension via substring match; anything
/// unrecognized falls back to jpg.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    if content_type.contains("png") {
        "png"
    } else if content_type.contains("webp") {
        "webp"
    } else if content_type.contains("gif") {
        "gif"
    } else if content_type.contains("avif") {
        "avif"
    } else {
        "jpg"
    }
}

/// Deterministic storage key for a persisted try-on result:
/// `{sanitized-shop-domain}/{job_id}/result/image.{ext}`.
pub fn result_key(shop_domain: &str, job_id: &str, content_type: &str) -> String {
    format!(
        "{}/{}/result/image.{}",
        sanitize_shop_domain(shop_domain),
        job_id,
        extension_for_content_type(content_type)
    )
}

//! ETag normalization.
//!
//! Repositories quote ETags (`"abc123"`) and sometimes mark them weak
//! (`W/"abc123"`). Internally we always compare/store the bare validator so
//! that an ETag read back from a GET can be sent straight back on a
//! conditional PUT/DELETE via `If-Match`.

/// Strip RFC 7232 quoting and a leading weak-validator marker from a raw
/// `ETag` or `If-Match` header value.
///
/// ```ignore
/// assert_eq!(normalize(r#""abc123""#), "abc123");
/// assert_eq!(normalize(r#"W/"abc123""#), "abc123");
/// ```
pub(crate) fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_owned()
}

/// Re-quote a bare validator for use in an `If-Match` header.
pub(crate) fn quote(etag: &str) -> String {
    format!("\"{etag}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_quotes() {
        assert_eq!(normalize("\"abc123\""), "abc123");
    }

    #[test]
    fn normalize_strips_weak_marker_and_quotes() {
        assert_eq!(normalize("W/\"abc123\""), "abc123");
    }

    #[test]
    fn normalize_passes_through_bare_value() {
        assert_eq!(normalize("abc123"), "abc123");
    }

    #[test]
    fn quote_wraps_in_quotes() {
        assert_eq!(quote("abc123"), "\"abc123\"");
    }
}

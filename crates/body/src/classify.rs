//! Text-vs-binary classification (§4.C step 3).

const BINARY_PREFIXES: &[&str] = &["image/", "video/", "audio/"];
const BINARY_EXACT: &[&str] = &[
    "application/pdf",
    "application/zip",
    "application/octet-stream",
    "application/x-binary",
    "application/x-msdownload",
    "application/x-executable",
];

const TEXT_EXACT: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-javascript",
    "application/ecmascript",
    "application/x-www-form-urlencoded",
];

/// `true` if `content_type` unambiguously names a binary media type.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let base = strip_parameters(content_type);
    BINARY_PREFIXES.iter().any(|p| base.starts_with(p)) || BINARY_EXACT.contains(&base)
}

/// `true` if `content_type` unambiguously names a text media type.
pub fn is_text_content_type(content_type: &str) -> bool {
    let base = strip_parameters(content_type);
    base.starts_with("text/") || TEXT_EXACT.contains(&base)
}

fn strip_parameters(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
}

/// Sample up to `sample_len` bytes; binary iff the fraction of bytes
/// outside the "printable-ish" range exceeds `threshold` (§4.C step 3,
/// heuristic for unclassified content types).
pub fn heuristic_is_binary(data: &[u8], sample_len: usize, threshold: f64) -> bool {
    if data.is_empty() {
        return false;
    }
    let sample = &data[..data.len().min(sample_len)];
    let suspect = sample
        .iter()
        .filter(|&&b| (b < 32 && b != 9 && b != 10 && b != 13) || b > 126)
        .count();
    (suspect as f64 / sample.len() as f64) > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_binary_prefixes() {
        assert!(is_binary_content_type("image/png"));
        assert!(is_binary_content_type("video/mp4"));
        assert!(is_binary_content_type("audio/ogg"));
        assert!(is_binary_content_type("application/octet-stream"));
    }

    #[test]
    fn classifies_known_text_types() {
        assert!(is_text_content_type("text/plain"));
        assert!(is_text_content_type("application/json"));
        assert!(is_text_content_type("application/json; charset=utf-8"));
    }

    #[test]
    fn heuristic_respects_threshold() {
        let mostly_text = b"hello world, this is plain text with one \x01 byte".to_vec();
        assert!(!heuristic_is_binary(&mostly_text, 512, 0.30));

        let mostly_binary: Vec<u8> = (0u8..=255).collect();
        assert!(heuristic_is_binary(&mostly_binary, 512, 0.30));
    }

    #[test]
    fn heuristic_allows_common_whitespace_control_chars() {
        let text = b"line one\nline two\ttabbed\r\n".to_vec();
        assert!(!heuristic_is_binary(&text, 512, 0.30));
    }
}

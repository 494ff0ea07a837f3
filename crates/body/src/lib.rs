//! The body pipeline (§4.C): decompress, classify text-vs-binary, cap size,
//! and emit the single [`BodyPayload`] representation shared by HTTP
//! request/response bodies and WebSocket binary frames.
//!
//! The pipeline, not the caller, owns the text/binary decision (§9,
//! "Dynamic typing of captured payloads").

mod classify;
mod decompress;

pub use classify::is_binary_content_type;
pub use decompress::ContentEncoding;

use traffic_mcp_common::BodyPayload;

/// Heuristic sampling window for unclassified content types (§4.C step 3).
const HEURISTIC_SAMPLE_BYTES: usize = 512;

/// Fraction of non-printable bytes in the sample above which unclassified
/// content is treated as binary.
const HEURISTIC_BINARY_THRESHOLD: f64 = 0.30;

/// Outcome of running a raw buffer through the pipeline. `payload` is the
/// single representation the store persists; `truncated`/`decoding_error`
/// are surfaced so the caller can attach a note to the owning transaction.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub payload: Option<BodyPayload>,
    pub truncated: bool,
    pub decoding_error: Option<String>,
}

/// Run the four-step pipeline over a raw buffer (§4.C).
///
/// `content_type` and `content_encoding` are the raw header values, if
/// present. `max_size` is the configured capture cap (`maxBodySize`,
/// default 1 MiB); bytes beyond it are truncated *before* decompression is
/// attempted, per spec.
pub async fn process_body(
    raw: &[u8],
    content_type: Option<&str>,
    content_encoding: Option<&str>,
    max_size: u64,
) -> PipelineOutcome {
    let truncated = raw.len() as u64 > max_size;
    let capped = if truncated {
        &raw[..max_size as usize]
    } else {
        raw
    };

    if capped.is_empty() {
        return PipelineOutcome {
            payload: None,
            truncated,
            decoding_error: None,
        };
    }

    let (decoded, decoding_error) = match content_encoding.and_then(ContentEncoding::parse) {
        Some(encoding) => match decompress::decode(capped, encoding).await {
            Ok(bytes) => (bytes, None),
            Err(e) => {
                tracing::debug!(error = %e, "body decompression failed; storing as binary downgrade");
                return PipelineOutcome {
                    payload: BodyPayload::binary(capped.to_vec()),
                    truncated,
                    decoding_error: Some(e.to_string()),
                };
            }
        },
        None => (capped.to_vec(), None),
    };

    let is_binary = match content_type {
        Some(ct) if is_binary_content_type(ct) => true,
        Some(ct) if classify::is_text_content_type(ct) => false,
        _ => classify::heuristic_is_binary(&decoded, HEURISTIC_SAMPLE_BYTES, HEURISTIC_BINARY_THRESHOLD),
    };

    let payload = if is_binary {
        BodyPayload::binary(decoded)
    } else {
        match String::from_utf8(decoded) {
            Ok(s) => BodyPayload::text(s),
            Err(e) => BodyPayload::binary(e.into_bytes()),
        }
    };

    PipelineOutcome {
        payload,
        truncated,
        decoding_error,
    }
}

/// WebSocket text frames skip the pipeline entirely and are stored as UTF-8
/// verbatim (§4.C, last paragraph) — this helper exists purely so call
/// sites read uniformly; it performs no transformation.
pub fn ws_text_payload(text: &str) -> Option<BodyPayload> {
    BodyPayload::text(text)
}

/// WebSocket binary/ping/pong frames run through the same size-cap +
/// binary-classification steps as HTTP bodies, with no content-type to key
/// off (so the heuristic always applies) and never any content-encoding.
pub async fn ws_binary_payload(raw: &[u8], max_size: u64) -> PipelineOutcome {
    process_body(raw, None, None, max_size).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_buffer_is_unchanged() {
        let outcome = process_body(b"hello world", Some("text/plain"), None, 1_000_000).await;
        assert_eq!(outcome.payload, BodyPayload::text("hello world"));
        assert!(!outcome.truncated);
        assert!(outcome.decoding_error.is_none());
    }

    #[tokio::test]
    async fn gzip_then_plain_round_trip_to_same_payload() {
        use async_compression::tokio::bufread::GzipEncoder;
        use tokio::io::AsyncReadExt;

        let raw = "Hello, 世界".as_bytes();
        let mut encoder = GzipEncoder::new(tokio::io::BufReader::new(raw));
        let mut compressed = Vec::new();
        encoder.read_to_end(&mut compressed).await.unwrap();

        let gz_outcome = process_body(&compressed, Some("text/plain"), Some("gzip"), 1_000_000).await;
        let plain_outcome = process_body(raw, Some("text/plain"), None, 1_000_000).await;

        assert_eq!(gz_outcome.payload, plain_outcome.payload);
        assert_eq!(gz_outcome.payload, BodyPayload::text("Hello, 世界"));
    }

    #[tokio::test]
    async fn image_content_type_is_always_binary() {
        let outcome = process_body(&[1, 2, 3, 4], Some("image/png"), None, 1_000_000).await;
        assert!(outcome.payload.unwrap().is_binary());
    }

    #[tokio::test]
    async fn json_content_type_is_always_text() {
        let outcome = process_body(br#"{"a":1}"#, Some("application/json"), None, 1_000_000).await;
        assert_eq!(outcome.payload, BodyPayload::text(r#"{"a":1}"#));
    }

    #[tokio::test]
    async fn oversized_body_is_truncated_before_decompression() {
        let raw = vec![b'a'; 100];
        let outcome = process_body(&raw, Some("text/plain"), None, 10).await;
        assert!(outcome.truncated);
        match outcome.payload.unwrap() {
            BodyPayload::Text(s) => assert_eq!(s.len(), 10),
            BodyPayload::Binary(b) => assert_eq!(b.len(), 10),
        }
    }

    #[tokio::test]
    async fn unrecognized_encoding_failure_downgrades_to_binary() {
        // A declared gzip encoding over bytes that are not actually gzip.
        let outcome = process_body(b"not gzip data", Some("text/plain"), Some("gzip"), 1_000_000).await;
        assert!(outcome.payload.unwrap().is_binary());
        assert!(outcome.decoding_error.is_some());
    }

    #[tokio::test]
    async fn empty_buffer_yields_no_payload() {
        let outcome = process_body(&[], Some("text/plain"), None, 1_000_000).await;
        assert!(outcome.payload.is_none());
    }

    #[tokio::test]
    async fn heuristic_classifies_unlabeled_binary_sample() {
        let mut raw = vec![0u8; 400];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = (i % 255) as u8;
        }
        let outcome = process_body(&raw, Some("application/x-custom-proto"), None, 1_000_000).await;
        assert!(outcome.payload.unwrap().is_binary());
    }

    #[tokio::test]
    async fn heuristic_classifies_unlabeled_text_sample() {
        let raw = "the quick brown fox jumps over the lazy dog ".repeat(10);
        let outcome = process_body(raw.as_bytes(), Some("application/x-custom-proto"), None, 1_000_000).await;
        assert!(!outcome.payload.unwrap().is_binary());
    }
}

//! Decompression (§4.C step 2): gzip, deflate, brotli, zstd.

use thiserror::Error;
use tokio::io::{AsyncReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value, ignoring surrounding
    /// whitespace and case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gzip" => Some(ContentEncoding::Gzip),
            "deflate" => Some(ContentEncoding::Deflate),
            "br" | "brotli" => Some(ContentEncoding::Brotli),
            "zstd" => Some(ContentEncoding::Zstd),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("decompression failed: {0}")]
pub struct DecodeError(String);

pub async fn decode(data: &[u8], encoding: ContentEncoding) -> Result<Vec<u8>, DecodeError> {
    use async_compression::tokio::bufread::{BrotliDecoder, GzipDecoder, ZlibDecoder, ZstdDecoder};

    let reader = BufReader::new(data);
    let mut out = Vec::new();

    let result = match encoding {
        ContentEncoding::Gzip => {
            let mut decoder = GzipDecoder::new(reader);
            decoder.read_to_end(&mut out).await
        }
        ContentEncoding::Deflate => {
            let mut decoder = ZlibDecoder::new(reader);
            decoder.read_to_end(&mut out).await
        }
        ContentEncoding::Brotli => {
            let mut decoder = BrotliDecoder::new(reader);
            decoder.read_to_end(&mut out).await
        }
        ContentEncoding::Zstd => {
            let mut decoder = ZstdDecoder::new(reader);
            decoder.read_to_end(&mut out).await
        }
    };

    result.map(|_| out).map_err(|e| DecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_encodings() {
        assert_eq!(ContentEncoding::parse("gzip"), Some(ContentEncoding::Gzip));
        assert_eq!(ContentEncoding::parse("br"), Some(ContentEncoding::Brotli));
        assert_eq!(ContentEncoding::parse("Deflate"), Some(ContentEncoding::Deflate));
        assert_eq!(ContentEncoding::parse("zstd"), Some(ContentEncoding::Zstd));
        assert_eq!(ContentEncoding::parse("identity"), None);
    }
}

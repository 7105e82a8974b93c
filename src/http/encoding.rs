//! Response compression.
//!
//! Bodies are compressed as a whole in memory so the compressed length can
//! be announced in `Content-Length`.

use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{self, Write};

/// Content coding applied to a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    None,
    Deflate,
    GZip,
}

impl ContentEncoding {
    /// Picks a coding from an `Accept-Encoding` value. Deflate takes
    /// precedence when both are offered.
    pub fn negotiate(accept_encoding: Option<&str>) -> Self {
        match accept_encoding {
            Some(accept) if accept.contains("deflate") => ContentEncoding::Deflate,
            Some(accept) if accept.contains("gzip") => ContentEncoding::GZip,
            _ => ContentEncoding::None,
        }
    }

    /// Value for the `Content-Encoding` header.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            ContentEncoding::None => None,
            ContentEncoding::Deflate => Some("deflate"),
            ContentEncoding::GZip => Some("gzip"),
        }
    }
}

/// Only text and javascript bodies are worth compressing.
pub fn is_compressible(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.starts_with("text/") || content_type.starts_with("application/javascript")
}

/// Compresses `data` with the given coding. `ContentEncoding::None` copies.
pub fn compress(data: &[u8], encoding: ContentEncoding) -> io::Result<Vec<u8>> {
    match encoding {
        ContentEncoding::None => Ok(data.to_vec()),
        ContentEncoding::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        ContentEncoding::GZip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use std::io::Read;

    #[test]
    fn deflate_wins_over_gzip() {
        assert_eq!(
            ContentEncoding::negotiate(Some("gzip, deflate, br")),
            ContentEncoding::Deflate
        );
        assert_eq!(ContentEncoding::negotiate(Some("gzip")), ContentEncoding::GZip);
        assert_eq!(ContentEncoding::negotiate(Some("br")), ContentEncoding::None);
        assert_eq!(ContentEncoding::negotiate(None), ContentEncoding::None);
    }

    #[test]
    fn compressible_types() {
        assert!(is_compressible("text/html; charset=UTF-8"));
        assert!(is_compressible("application/javascript; charset=UTF-8"));
        assert!(!is_compressible("image/png"));
        assert!(!is_compressible("video/mp4"));
    }

    #[test]
    fn gzip_and_deflate_decode_back() {
        let text = b"<html><body>hello hello hello</body></html>".repeat(20);

        let mut out = Vec::new();
        GzDecoder::new(&compress(&text, ContentEncoding::GZip).unwrap()[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, text);

        out.clear();
        ZlibDecoder::new(&compress(&text, ContentEncoding::Deflate).unwrap()[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, text);
    }
}

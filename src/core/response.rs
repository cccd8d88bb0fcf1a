// src/core/response.rs

//! Response envelope preparation.
//!
//! The sender turns a body plus cache disposition into the final header
//! set: `Content-Length` computed from the bytes actually written,
//! optional gzip compression, and the `X-ISR-*` diagnostics headers. It
//! performs no network I/O itself; the HTTP frontend owns the socket.

use crate::core::errors::RestaticError;
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::debug;

/// Bodies smaller than this are never worth compressing.
const COMPRESSION_MIN_BYTES: usize = 1024;

/// How the cache handled the request, surfaced as `X-ISR-Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDisposition {
    Fresh,
    Stale,
    StaleRegenerating,
    Miss,
    Locked,
    Bypass,
}

impl CacheDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheDisposition::Fresh => "fresh",
            CacheDisposition::Stale => "stale",
            CacheDisposition::StaleRegenerating => "stale-regenerating",
            CacheDisposition::Miss => "miss",
            CacheDisposition::Locked => "locked",
            CacheDisposition::Bypass => "bypass",
        }
    }
}

/// Per-response diagnostics the orchestrator hands to the sender.
#[derive(Debug, Clone, Default)]
pub struct ResponseMeta {
    pub age_seconds: Option<i64>,
    pub generation_ms: Option<u64>,
    /// Remaining seconds of freshness, used for `Cache-Control: max-age`.
    pub expires_in_seconds: Option<i64>,
}

/// A fully prepared response: status, ordered headers, final body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ResponseEnvelope {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Stateless response builder carrying the compression policy.
#[derive(Debug, Clone)]
pub struct ResponseSender {
    compression_enabled: bool,
    compression_level: u32,
}

impl ResponseSender {
    pub fn new(compression_enabled: bool, compression_level: u32) -> Self {
        Self {
            compression_enabled,
            compression_level,
        }
    }

    /// Prepares a response envelope.
    ///
    /// Fails when the status code is outside 100–599 or when the
    /// transport has already started emitting bytes; both are caller
    /// bugs that must not produce a half-written response.
    pub fn prepare(
        &self,
        status: u16,
        body: Bytes,
        disposition: CacheDisposition,
        meta: &ResponseMeta,
        accept_encoding: Option<&str>,
        transport_started: bool,
    ) -> Result<ResponseEnvelope, RestaticError> {
        if transport_started {
            return Err(RestaticError::InvalidState(
                "transport already started emitting bytes".into(),
            ));
        }
        if !(100..=599).contains(&status) {
            return Err(RestaticError::InvalidRequest(format!(
                "invalid HTTP status code {status}"
            )));
        }

        let mut headers = vec![(
            "Content-Type".to_string(),
            "text/html; charset=utf-8".to_string(),
        )];

        let body = match self.maybe_compress(&body, accept_encoding) {
            Some(compressed) => {
                headers.push(("Content-Encoding".to_string(), "gzip".to_string()));
                headers.push(("Vary".to_string(), "Accept-Encoding".to_string()));
                compressed
            }
            None => body,
        };

        // Content-Length reflects the bytes that actually go out, i.e.
        // the compressed form when compression applied.
        headers.push(("Content-Length".to_string(), body.len().to_string()));
        headers.push(("X-ISR-Cache".to_string(), disposition.as_str().to_string()));

        if let Some(age) = meta.age_seconds {
            headers.push(("X-ISR-Age".to_string(), format!("{age}s")));
        }
        if let Some(generation_ms) = meta.generation_ms {
            headers.push((
                "X-ISR-Generation-Time".to_string(),
                format!("{generation_ms}ms"),
            ));
        }

        let cache_control = match disposition {
            CacheDisposition::Bypass => "no-store".to_string(),
            _ => {
                let max_age = meta.expires_in_seconds.unwrap_or(0).max(0);
                format!("public, max-age={max_age}")
            }
        };
        headers.push(("Cache-Control".to_string(), cache_control));

        Ok(ResponseEnvelope {
            status,
            headers,
            body,
        })
    }

    /// A minimal server-error document, marked with `X-ISR-Error`.
    pub fn error_response(&self, message: &str) -> ResponseEnvelope {
        let body = format!(
            "<!DOCTYPE html><html><head><title>500 Internal Server Error</title></head>\
             <body><h1>500 Internal Server Error</h1><p>{message}</p></body></html>"
        );
        ResponseEnvelope {
            status: 500,
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "text/html; charset=utf-8".to_string(),
                ),
                ("Content-Length".to_string(), body.len().to_string()),
                ("Cache-Control".to_string(), "no-store".to_string()),
                ("X-ISR-Error".to_string(), "true".to_string()),
            ],
            body: Bytes::from(body),
        }
    }

    /// Compresses when the policy allows it: body at least 1 KiB, the
    /// client advertises gzip, and the compressed form is strictly
    /// smaller.
    fn maybe_compress(&self, body: &Bytes, accept_encoding: Option<&str>) -> Option<Bytes> {
        if !self.compression_enabled || body.len() < COMPRESSION_MIN_BYTES {
            return None;
        }
        let accepts_gzip = accept_encoding
            .map(|v| v.to_ascii_lowercase().contains("gzip"))
            .unwrap_or(false);
        if !accepts_gzip {
            return None;
        }

        let mut encoder = GzEncoder::new(
            Vec::with_capacity(body.len() / 2),
            Compression::new(self.compression_level),
        );
        if encoder.write_all(body).is_err() {
            return None;
        }
        let compressed = encoder.finish().ok()?;
        if compressed.len() >= body.len() {
            debug!(
                "Skipping compression: {} bytes compressed to {}.",
                body.len(),
                compressed.len()
            );
            return None;
        }
        Some(Bytes::from(compressed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> ResponseSender {
        ResponseSender::new(true, 6)
    }

    #[test]
    fn status_out_of_range_fails() {
        let err = sender()
            .prepare(
                99,
                Bytes::new(),
                CacheDisposition::Miss,
                &ResponseMeta::default(),
                None,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, RestaticError::InvalidRequest(_)));

        assert!(sender()
            .prepare(
                600,
                Bytes::new(),
                CacheDisposition::Miss,
                &ResponseMeta::default(),
                None,
                false,
            )
            .is_err());
    }

    #[test]
    fn started_transport_fails() {
        let err = sender()
            .prepare(
                200,
                Bytes::new(),
                CacheDisposition::Fresh,
                &ResponseMeta::default(),
                None,
                true,
            )
            .unwrap_err();
        assert!(matches!(err, RestaticError::InvalidState(_)));
    }

    #[test]
    fn small_body_is_never_compressed() {
        let envelope = sender()
            .prepare(
                200,
                Bytes::from_static(b"tiny"),
                CacheDisposition::Fresh,
                &ResponseMeta::default(),
                Some("gzip"),
                false,
            )
            .unwrap();
        assert_eq!(envelope.header("Content-Encoding"), None);
        assert_eq!(envelope.header("Content-Length"), Some("4"));
    }

    #[test]
    fn compressible_body_is_compressed_with_correct_length() {
        let body = Bytes::from("a".repeat(4096));
        let envelope = sender()
            .prepare(
                200,
                body.clone(),
                CacheDisposition::Fresh,
                &ResponseMeta::default(),
                Some("deflate, GZIP;q=0.8"),
                false,
            )
            .unwrap();
        assert_eq!(envelope.header("Content-Encoding"), Some("gzip"));
        assert_eq!(envelope.header("Vary"), Some("Accept-Encoding"));
        assert!(envelope.body.len() < body.len());
        assert_eq!(
            envelope.header("Content-Length"),
            Some(envelope.body.len().to_string().as_str())
        );
    }

    #[test]
    fn no_accept_encoding_means_identity() {
        let body = Bytes::from("a".repeat(4096));
        let envelope = sender()
            .prepare(
                200,
                body.clone(),
                CacheDisposition::Fresh,
                &ResponseMeta::default(),
                None,
                false,
            )
            .unwrap();
        assert_eq!(envelope.header("Content-Encoding"), None);
        assert_eq!(envelope.body, body);
    }

    #[test]
    fn diagnostics_headers_present() {
        let meta = ResponseMeta {
            age_seconds: Some(0),
            generation_ms: Some(12),
            expires_in_seconds: Some(60),
        };
        let envelope = sender()
            .prepare(
                200,
                Bytes::from_static(b"<html>1</html>"),
                CacheDisposition::Miss,
                &meta,
                None,
                false,
            )
            .unwrap();
        assert_eq!(envelope.header("X-ISR-Cache"), Some("miss"));
        assert_eq!(envelope.header("X-ISR-Age"), Some("0s"));
        assert_eq!(envelope.header("X-ISR-Generation-Time"), Some("12ms"));
        assert_eq!(envelope.header("Cache-Control"), Some("public, max-age=60"));
    }

    #[test]
    fn error_response_is_marked() {
        let envelope = sender().error_response("boom");
        assert_eq!(envelope.status, 500);
        assert_eq!(envelope.header("X-ISR-Error"), Some("true"));
        assert_eq!(envelope.header("Cache-Control"), Some("no-store"));
    }
}

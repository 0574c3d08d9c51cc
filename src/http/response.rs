//! HTTP/1.x response encoding.
//!
//! # Responsibilities
//! - Serialize status line, headers and body
//! - Fill in `Content-Length` when the responder left it out
//! - Surface the upgrade handler carried by a 101 response
//! - Note `Connection: close` so the pipeline closes after the flush
//! - Close after answering a request that asked for it, see
//!   [`connection_codec`](crate::http::request::connection_codec)

use std::io;

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH};
use http::{HeaderValue, Response, StatusCode, Version};
use tokio_util::codec::Encoder;

use crate::http::request::CloseRequested;
use crate::http::upgrade::OnUpgrade;
use crate::pipeline::{ResponseEncoder as EncoderStage, UpgradeHandler};

/// Encodes `http::Response<Bytes>` values onto a connection's write buffer.
#[derive(Default)]
pub struct ResponseEncoder {
    upgrade: Option<Box<dyn UpgradeHandler>>,
    close: bool,
    requested: CloseRequested,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn closing_on(requested: CloseRequested) -> Self {
        Self {
            requested,
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for ResponseEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEncoder")
            .field("upgrade_pending", &self.upgrade.is_some())
            .field("close", &self.close)
            .field("close_requested", &self.requested.get())
            .finish()
    }
}

fn has_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

impl Encoder<Response<Bytes>> for ResponseEncoder {
    type Error = io::Error;

    fn encode(&mut self, response: Response<Bytes>, dst: &mut BytesMut) -> io::Result<()> {
        let (mut parts, body) = response.into_parts();
        let status = parts.status;
        let with_body = has_body(status);

        if self.requested.get() && status != StatusCode::SWITCHING_PROTOCOLS {
            parts
                .headers
                .insert(CONNECTION, HeaderValue::from_static("close"));
        }
        if with_body && !parts.headers.contains_key(CONTENT_LENGTH) {
            parts
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }

        let version: &[u8] = if parts.version == Version::HTTP_10 {
            b"HTTP/1.0 "
        } else {
            b"HTTP/1.1 "
        };
        dst.reserve(128 + body.len());
        dst.extend_from_slice(version);
        dst.extend_from_slice(status.as_str().as_bytes());
        dst.extend_from_slice(b" ");
        dst.extend_from_slice(status.canonical_reason().unwrap_or("Unknown").as_bytes());
        dst.extend_from_slice(b"\r\n");

        for (name, value) in &parts.headers {
            dst.extend_from_slice(name.as_str().as_bytes());
            dst.extend_from_slice(b": ");
            dst.extend_from_slice(value.as_bytes());
            dst.extend_from_slice(b"\r\n");
        }
        dst.extend_from_slice(b"\r\n");
        if with_body {
            dst.extend_from_slice(&body);
        }

        self.close = parts
            .headers
            .get(CONNECTION)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"close"));

        if status == StatusCode::SWITCHING_PROTOCOLS {
            self.upgrade = parts
                .extensions
                .remove::<OnUpgrade>()
                .and_then(OnUpgrade::take);
        }
        Ok(())
    }
}

impl EncoderStage<Response<Bytes>> for ResponseEncoder {
    fn take_upgrade(&mut self) -> Option<Box<dyn UpgradeHandler>> {
        self.upgrade.take()
    }

    fn close_after_flush(&self) -> bool {
        self.close
    }
}

/// A plain-text response that closes the connection after it is sent.
pub fn error_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::from_static(
        status.canonical_reason().unwrap_or("Error").as_bytes(),
    ));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::Decoder;

    use crate::config::LimitsConfig;
    use crate::http::request::connection_codec;
    use crate::http::upgrade::switching_protocols;
    use crate::pipeline::Upgraded;

    fn encode(encoder: &mut ResponseEncoder, response: Response<Bytes>) -> String {
        let mut dst = BytesMut::new();
        encoder.encode(response, &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn encodes_status_headers_and_body() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(Bytes::from_static(b"hello"))
            .unwrap();

        let mut encoder = ResponseEncoder::new();
        let wire = encode(&mut encoder, response);

        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-type: text/plain\r\n"));
        assert!(wire.contains("content-length: 5\r\n"));
        assert!(wire.ends_with("\r\n\r\nhello"));
        assert!(!encoder.close_after_flush());
        assert!(encoder.take_upgrade().is_none());
    }

    #[test]
    fn no_content_has_no_length_or_body() {
        let response = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Bytes::from_static(b"ignored"))
            .unwrap();

        let wire = encode(&mut ResponseEncoder::new(), response);
        assert_eq!(wire, "HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[test]
    fn connection_close_is_reported() {
        let mut encoder = ResponseEncoder::new();
        let wire = encode(&mut encoder, error_response(StatusCode::PAYLOAD_TOO_LARGE));

        assert!(wire.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(wire.contains("connection: close\r\n"));
        assert!(encoder.close_after_flush());

        encode(&mut encoder, Response::new(Bytes::new()));
        assert!(!encoder.close_after_flush());
    }

    #[test]
    fn closes_after_answering_http10_request() {
        let (mut decoder, mut encoder) = connection_codec(LimitsConfig::default());
        let mut buf = BytesMut::from(&b"GET / HTTP/1.0\r\n\r\nGET / HTTP/1.1\r\n\r\n"[..]);

        decoder.decode(&mut buf).unwrap().unwrap();
        let response = Response::builder()
            .header(CONNECTION, "keep-alive")
            .body(Bytes::from_static(b"one"))
            .unwrap();
        let wire = encode(&mut encoder, response);
        assert!(wire.contains("connection: close\r\n"));
        assert!(!wire.contains("keep-alive"));
        assert!(encoder.close_after_flush());

        decoder.decode(&mut buf).unwrap().unwrap();
        let wire = encode(&mut encoder, Response::new(Bytes::from_static(b"two")));
        assert!(!wire.contains("connection"));
        assert!(!encoder.close_after_flush());
    }

    #[test]
    fn switching_protocols_yields_handler() {
        let response =
            switching_protocols("echo", |_io: Upgraded| async { Ok::<_, io::Error>(()) }).unwrap();

        let mut encoder = ResponseEncoder::new();
        let wire = encode(&mut encoder, response);

        assert!(wire.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(wire.contains("upgrade: echo\r\n"));
        assert!(!wire.contains("content-length"));
        assert!(encoder.take_upgrade().is_some());
        assert!(encoder.take_upgrade().is_none());
    }
}

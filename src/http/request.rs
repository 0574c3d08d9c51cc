//! HTTP/1.x request decoding.
//!
//! # Responsibilities
//! - Parse the request line and headers (httparse)
//! - Collect `Content-Length` bodies up to the configured ceiling
//! - Classify failures so the pipeline can answer before closing
//!
//! # Design Decisions
//! - Limits checked before the body is buffered (early rejection)
//! - Chunked transfer encoding is refused with 501
//! - One request per `decode` call; pipelined requests stay in the buffer
//! - `Connection: close`, or HTTP/1.0 without `keep-alive`, is passed to the
//!   paired encoder so the connection closes after that response

use std::cell::Cell;
use std::io;
use std::rc::Rc;

use bytes::{Buf, Bytes, BytesMut};
use http::request::Parts;
use http::{HeaderName, Method, Request, Response, StatusCode, Version};
use thiserror::Error;
use tokio_util::codec::Decoder;

use crate::config::LimitsConfig;
use crate::http::response::{error_response, ResponseEncoder};
use crate::pipeline::Reject;

/// Terminal request decoding failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("more than {0} request headers")]
    TooManyHeaders(usize),

    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge { limit: usize },

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("request body of {length} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { length: u64, limit: usize },

    #[error("Transfer-Encoding is not supported")]
    UnsupportedTransferEncoding,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DecodeError {
    /// Status to answer with before closing, if the peer is owed one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DecodeError::Malformed(_)
            | DecodeError::TooManyHeaders(_)
            | DecodeError::InvalidContentLength => Some(StatusCode::BAD_REQUEST),
            DecodeError::HeadTooLarge { .. } => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            DecodeError::BodyTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            DecodeError::UnsupportedTransferEncoding => Some(StatusCode::NOT_IMPLEMENTED),
            DecodeError::Io(_) => None,
        }
    }
}

#[derive(Debug)]
enum State {
    Head,
    Body { head: Parts, length: usize },
}

/// Whether the request being answered asked for the connection to close.
///
/// Written by a decoder on every head and read by the encoder of the same
/// connection. Requests are answered one at a time, so one flag suffices.
#[derive(Debug, Clone, Default)]
pub(crate) struct CloseRequested(Rc<Cell<bool>>);

impl CloseRequested {
    pub(crate) fn set(&self, close: bool) {
        self.0.set(close);
    }

    pub(crate) fn get(&self) -> bool {
        self.0.get()
    }
}

/// Decoder and encoder for one connection, sharing the peer's close request.
pub fn connection_codec(limits: LimitsConfig) -> (RequestDecoder, ResponseEncoder) {
    let close = CloseRequested::default();
    let decoder = RequestDecoder {
        limits,
        state: State::Head,
        close: close.clone(),
    };
    (decoder, ResponseEncoder::closing_on(close))
}

/// Decodes `http::Request<Bytes>` values from a connection's read buffer.
#[derive(Debug)]
pub struct RequestDecoder {
    limits: LimitsConfig,
    state: State,
    close: CloseRequested,
}

impl RequestDecoder {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            limits,
            state: State::Head,
            close: CloseRequested::default(),
        }
    }

    /// Parse a complete head off the front of `src`.
    ///
    /// Returns the head and declared body length, leaving `src` positioned at
    /// the body.
    fn parse_head(&self, src: &mut BytesMut) -> Result<Option<(Parts, usize)>, DecodeError> {
        if src.is_empty() {
            return Ok(None);
        }

        let (head, length, head_len) = {
            let mut headers = vec![httparse::EMPTY_HEADER; self.limits.max_headers];
            let mut parsed = httparse::Request::new(&mut headers);

            let head_len = match parsed.parse(&src[..]) {
                Ok(httparse::Status::Complete(len)) => len,
                Ok(httparse::Status::Partial) => {
                    if src.len() > self.limits.max_header_bytes {
                        return Err(DecodeError::HeadTooLarge {
                            limit: self.limits.max_header_bytes,
                        });
                    }
                    return Ok(None);
                }
                Err(httparse::Error::TooManyHeaders) => {
                    return Err(DecodeError::TooManyHeaders(self.limits.max_headers))
                }
                Err(e) => return Err(DecodeError::Malformed(e.to_string())),
            };
            if head_len > self.limits.max_header_bytes {
                return Err(DecodeError::HeadTooLarge {
                    limit: self.limits.max_header_bytes,
                });
            }

            let (Some(method), Some(path), Some(version)) =
                (parsed.method, parsed.path, parsed.version)
            else {
                return Err(DecodeError::Malformed("incomplete request line".into()));
            };
            let method = Method::from_bytes(method.as_bytes())
                .map_err(|e| DecodeError::Malformed(e.to_string()))?;
            let version = if version == 0 {
                Version::HTTP_10
            } else {
                Version::HTTP_11
            };

            let mut builder = Request::builder().method(method).uri(path).version(version);
            let mut content_length: Option<u64> = None;
            let (mut close, mut keep_alive) = (false, false);
            for header in parsed.headers.iter() {
                if header.name.eq_ignore_ascii_case("connection") {
                    for token in connection_tokens(header.value) {
                        close |= token.eq_ignore_ascii_case("close");
                        keep_alive |= token.eq_ignore_ascii_case("keep-alive");
                    }
                }
                if header.name.eq_ignore_ascii_case("transfer-encoding") {
                    return Err(DecodeError::UnsupportedTransferEncoding);
                }
                if header.name.eq_ignore_ascii_case("content-length") {
                    let value = parse_content_length(header.value)?;
                    if content_length.is_some_and(|seen| seen != value) {
                        return Err(DecodeError::InvalidContentLength);
                    }
                    content_length = Some(value);
                }
                let name = HeaderName::from_bytes(header.name.as_bytes())
                    .map_err(|e| DecodeError::Malformed(e.to_string()))?;
                builder = builder.header(name, header.value);
            }

            let length = content_length.unwrap_or(0);
            if length > self.limits.max_body_size as u64 {
                return Err(DecodeError::BodyTooLarge {
                    length,
                    limit: self.limits.max_body_size,
                });
            }
            let length = usize::try_from(length).map_err(|_| DecodeError::InvalidContentLength)?;

            let (head, ()) = builder
                .body(())
                .map_err(|e| DecodeError::Malformed(e.to_string()))?
                .into_parts();
            self.close
                .set(close || (version == Version::HTTP_10 && !keep_alive));
            (head, length, head_len)
        };

        src.advance(head_len);
        Ok(Some((head, length)))
    }

    fn take_body(
        &mut self,
        head: Parts,
        length: usize,
        src: &mut BytesMut,
    ) -> Option<Request<Bytes>> {
        if src.len() < length {
            src.reserve(length - src.len());
            self.state = State::Body { head, length };
            return None;
        }
        let body = src.split_to(length).freeze();
        Some(Request::from_parts(head, body))
    }
}

fn parse_content_length(value: &[u8]) -> Result<u64, DecodeError> {
    std::str::from_utf8(value)
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse().ok())
        .ok_or(DecodeError::InvalidContentLength)
}

fn connection_tokens(value: &[u8]) -> impl Iterator<Item = &str> {
    std::str::from_utf8(value)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
}

impl Decoder for RequestDecoder {
    type Item = Request<Bytes>;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match std::mem::replace(&mut self.state, State::Head) {
            State::Head => match self.parse_head(src)? {
                Some((head, length)) => Ok(self.take_body(head, length, src)),
                None => Ok(None),
            },
            State::Body { head, length } => Ok(self.take_body(head, length, src)),
        }
    }
}

impl Reject<Response<Bytes>> for RequestDecoder {
    fn reject(&self, error: &DecodeError) -> Option<Response<Bytes>> {
        error.status().map(error_response)
    }
}

//! Demo application served by the binary.
//!
//! - `GET /` greets with the serving worker loop
//! - `POST /echo` returns the request body
//! - `Connection: upgrade` + `Upgrade: echo` switches to a raw byte echo

use std::io;
use std::time::Instant;

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use tokio::io::AsyncWriteExt;

use engine_server::http::{requested_protocol, switching_protocols};
use engine_server::{RequestContext, Responder, ResponderError, Upgraded};

/// Container shared by every worker loop.
#[derive(Debug)]
pub struct AppInfo {
    name: &'static str,
    started: Instant,
}

impl AppInfo {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            started: Instant::now(),
        }
    }
}

pub struct DemoResponder;

impl Responder<AppInfo> for DemoResponder {
    type Request = Request<Bytes>;
    type Response = Response<Bytes>;

    async fn respond(
        &self,
        request: Request<Bytes>,
        cx: &RequestContext<AppInfo>,
    ) -> Result<Option<Response<Bytes>>, ResponderError> {
        if requested_protocol(&request).is_some_and(|p| p.eq_ignore_ascii_case("echo")) {
            return switching_protocols("echo", echo).map(Some).map_err(ResponderError::new);
        }

        let app = cx.container();
        let (status, body) = match (request.method(), request.uri().path()) {
            (&Method::GET, "/") => (
                StatusCode::OK,
                Bytes::from(format!(
                    "Hello from {} (worker {}, up {}s)\n",
                    app.name,
                    cx.worker_id(),
                    app.started.elapsed().as_secs()
                )),
            ),
            (&Method::POST, "/echo") => (StatusCode::OK, request.into_body()),
            _ => (StatusCode::NOT_FOUND, Bytes::from_static(b"Not Found\n")),
        };

        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(body)
            .map(Some)
            .map_err(ResponderError::new)
    }
}

/// Write back every byte received until the peer closes.
async fn echo(io: Upgraded) -> io::Result<()> {
    let (mut reader, mut writer) = tokio::io::split(io);
    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.shutdown().await
}

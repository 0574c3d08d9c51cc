//! Negotiating protocol upgrades from a responder.
//!
//! A responder answers with `101 Switching Protocols` and attaches the
//! handler as an [`OnUpgrade`] extension; the response encoder takes it out
//! once the response is serialized.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::header::{CONNECTION, UPGRADE};
use http::{HeaderMap, Request, Response, StatusCode};

use crate::pipeline::UpgradeHandler;

/// Response extension carrying the handler that takes over the connection.
#[derive(Clone)]
pub struct OnUpgrade(Arc<Mutex<Option<Box<dyn UpgradeHandler>>>>);

impl OnUpgrade {
    pub fn new(handler: impl UpgradeHandler) -> Self {
        Self(Arc::new(Mutex::new(Some(Box::new(handler)))))
    }

    /// Remove the handler. Clones share it, so only one take succeeds.
    pub fn take(self) -> Option<Box<dyn UpgradeHandler>> {
        let mut slot = match self.0.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }
}

impl std::fmt::Debug for OnUpgrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("OnUpgrade")
    }
}

/// Build a `101 Switching Protocols` response handing the connection to `handler`.
pub fn switching_protocols(
    protocol: &str,
    handler: impl UpgradeHandler,
) -> Result<Response<Bytes>, http::Error> {
    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, "upgrade")
        .header(UPGRADE, protocol)
        .extension(OnUpgrade::new(handler))
        .body(Bytes::new())
}

/// The protocol a request asks to switch to, if it asks.
pub fn requested_protocol<B>(request: &Request<B>) -> Option<&str> {
    let headers: &HeaderMap = request.headers();
    let wants_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

    if !wants_upgrade {
        return None;
    }
    headers.get(UPGRADE)?.to_str().ok().map(str::trim)
}

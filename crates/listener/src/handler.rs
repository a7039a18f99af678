//! Per-request handling: authenticate, read the body, answer, hand off.

use std::net::IpAddr;

use bytes::Bytes;
use dispatch::{Authenticator, BodyReadError, Config, DeliveryId, Dispatcher, Notification};
use http_body_util::{BodyExt, Empty, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use tracing::{error, info_span, warn, Instrument};

const GITHUB_EVENT_HEADER: &str = "x-github-event";
const GITHUB_DELIVERY_HEADER: &str = "x-github-delivery";

/// Handles every request the listener accepts, whatever its method or path.
///
/// Responses never carry a body:
///
/// | Status | Meaning |
/// |--------|---------|
/// | `401` | authentication failed; the body was not read |
/// | `400` | the body could not be read in full |
/// | `200` | the body was read; delivery was started but not awaited |
#[derive(Debug)]
pub struct WebhookHandler {
    authenticator: Authenticator,
    dispatcher: Dispatcher,
    max_body_bytes: usize,
}

impl WebhookHandler {
    pub fn new(authenticator: Authenticator, dispatcher: Dispatcher, max_body_bytes: usize) -> Self {
        Self {
            authenticator,
            dispatcher,
            max_body_bytes,
        }
    }

    /// Builds a handler from the runtime configuration and an already chosen sink.
    pub fn from_config(config: &Config, dispatcher: Dispatcher) -> Self {
        Self::new(
            Authenticator::new(config.source.clone(), config.access_token.clone()),
            dispatcher,
            config.max_body_bytes,
        )
    }

    /// Label of the sink every accepted notification goes to.
    pub fn sink(&self) -> String {
        self.dispatcher.describe()
    }

    /// Handles one request arriving from `peer`.
    pub async fn handle<B>(&self, peer: IpAddr, req: Request<B>) -> Response<Empty<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let delivery = DeliveryId::new_random();
        let event = header_value(&req, GITHUB_EVENT_HEADER);
        let github_delivery = header_value(&req, GITHUB_DELIVERY_HEADER);

        let span = info_span!(
            "webhook",
            %delivery,
            %peer,
            method = %req.method(),
            event = event.as_deref().unwrap_or("-"),
            github_delivery = github_delivery.as_deref().unwrap_or("-"),
        );

        async move {
            if let Err(e) = self.authenticator.authenticate(peer, req.uri().query()) {
                warn!(error = %e, "rejecting webhook request");
                return empty_response(StatusCode::UNAUTHORIZED);
            }

            let payload = match read_body(req.into_body(), self.max_body_bytes).await {
                Ok(payload) => payload,
                Err(e) => {
                    error!(error = %e, "could not read webhook body");
                    return empty_response(StatusCode::BAD_REQUEST);
                }
            };

            self.dispatcher.spawn(Notification {
                delivery,
                peer,
                event,
                github_delivery,
                payload,
            });

            empty_response(StatusCode::OK)
        }
        .instrument(span)
        .await
    }
}

/// Buffers the whole body, failing once it grows past `limit` bytes.
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, BodyReadError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(BodyReadError::TooLarge { limit }),
        Err(e) => Err(BodyReadError::Transport(e.to_string())),
    }
}

fn header_value<B>(req: &Request<B>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn empty_response(status: StatusCode) -> Response<Empty<Bytes>> {
    let mut response = Response::new(Empty::new());
    *response.status_mut() = status;
    response
}

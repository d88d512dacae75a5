//! Correlation ids for the blood bank API.
//!
//! Every request gets a [`CorrelationId`], taken from `X-Correlation-ID` when
//! the client sent a valid UUID and minted otherwise. Handlers read it through
//! the extractor, the request span records it next to the gateway's requester
//! headers, and the response echoes it back.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, response::Response};
use tower::{Layer, Service};
use tracing::Instrument;

use crate::extractors::{CorrelationId, REQUESTER_ID_HEADER, REQUESTER_ROLE_HEADER};

/// Header carrying the correlation id in both directions.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Layer that tags requests and responses with a correlation id.
///
/// # Example
///
/// ```
/// use axum::{Router, routing::get};
/// use bloodbank_web::middleware::correlation_id_layer;
///
/// let app: Router = Router::new()
///     .route("/health", get(|| async { "ok" }))
///     .layer(correlation_id_layer());
/// ```
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// See [`correlation_id_layer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdService { inner }
    }
}

/// Service produced by [`CorrelationIdLayer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdService<S> {
    inner: S,
}

fn header_text<'a>(req: &'a Request, name: &str) -> &'a str {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

impl<S> Service<Request> for CorrelationIdService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let id = CorrelationId::from_headers(req.headers());
        let span = tracing::info_span!(
            "api_request",
            correlation_id = %id.0,
            method = %req.method(),
            path = %req.uri().path(),
            requester = header_text(&req, REQUESTER_ID_HEADER),
            role = header_text(&req, REQUESTER_ROLE_HEADER),
        );
        req.extensions_mut().insert(id);

        let started = Instant::now();
        let pending = self.inner.call(req);

        Box::pin(
            async move {
                let mut response = pending.await?;
                tracing::debug!(
                    status = response.status().as_u16(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "Request finished"
                );
                // A hyphenated UUID is always a valid header value
                if let Ok(value) = HeaderValue::try_from(id.0.to_string()) {
                    response.headers_mut().insert(CORRELATION_ID_HEADER, value);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}

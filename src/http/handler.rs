//! Request gate: every inbound request is answered from one admission decision.

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower::{BoxError, ServiceBuilder};
use tracing::{instrument, warn};

use crate::meter::{Admission, AdmissionStrategy};

/// Body sent with `200 OK` when a request is admitted.
pub const ADMITTED_BODY: &str = "Pong\n";
/// Body sent with `429 Too Many Requests` when a request is dropped.
pub const REJECTED_BODY: &str = "Request dropped, overflowing.......\n";

impl IntoResponse for Admission {
    fn into_response(self) -> Response {
        match self {
            Admission::Admitted => (StatusCode::OK, ADMITTED_BODY).into_response(),
            Admission::Rejected => {
                (StatusCode::TOO_MANY_REQUESTS, REJECTED_BODY).into_response()
            }
        }
    }
}

/// Build the router that gates all methods and paths through `strategy`.
pub fn build_router(strategy: Arc<dyn AdmissionStrategy>, request_timeout: Duration) -> Router {
    Router::new()
        .fallback(gate)
        .with_state(strategy)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(request_timeout),
        )
}

/// Answer one request. The admission decision is made before the response is
/// built, so no lock is held while it is written.
#[instrument(skip_all, fields(method = %method, path = %uri.path()))]
async fn gate(
    State(strategy): State<Arc<dyn AdmissionStrategy>>,
    method: Method,
    uri: Uri,
) -> Admission {
    strategy.admit().await
}

async fn handle_middleware_error(err: BoxError) -> (StatusCode, &'static str) {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!("Request timed out");
        (StatusCode::REQUEST_TIMEOUT, "Request timed out\n")
    } else {
        warn!(error = %err, "Unhandled middleware error");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error\n")
    }
}

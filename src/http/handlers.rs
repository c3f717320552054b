//! Route handlers.

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use tracing::{field, Instrument, Span};

use crate::events::Event;
use crate::http::admission::Rejection;
use crate::http::request::request_id;
use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Liveness probe. Any method.
pub async fn ruok() -> &'static str {
    "imok"
}

/// Slack Events API webhook.
pub async fn slack_event(State(state): State<AppState>, request: Request) -> Response {
    let span = tracing::info_span!(
        "event_handler",
        request_id = %request_id(&request),
        event_id = field::Empty,
        event_time = field::Empty,
        event_type = field::Empty,
    );

    let response = handle_event(state, request).instrument(span).await;
    metrics::record_response(response.status().as_u16());
    response
}

async fn handle_event(state: AppState, request: Request) -> Response {
    let admitted = match state.gate.admit(request).await {
        Ok(admitted) => admitted,
        Err(rejection) => return reject(rejection),
    };
    tracing::debug!(body_len = admitted.body_len, "Request admitted");

    let envelope = match Event::parse(&admitted.document) {
        Ok(Event::UrlVerification { challenge }) => {
            tracing::info!("Answering URL verification challenge");
            return response::challenge(challenge);
        }
        Ok(Event::Callback(envelope)) => envelope,
        Err(e) => return reject(Rejection::InvalidEvent(e)),
    };

    let span = Span::current();
    span.record("event_id", envelope.id.as_str());
    span.record("event_time", envelope.time);
    span.record("event_type", envelope.kind.as_str());
    tracing::info!("Event accepted");

    state.dispatcher.spawn(envelope);
    response::accepted()
}

fn reject(rejection: Rejection) -> Response {
    let reason = rejection.reason();
    match &rejection {
        Rejection::MethodNotAllowed(_) => {
            tracing::info!(reason, error = %rejection, "Rejecting request");
        }
        Rejection::BodyRead(_) => {
            tracing::error!(reason, error = %rejection, "Rejecting request");
        }
        _ => {
            tracing::warn!(reason, error = %rejection, "Rejecting request");
        }
    }
    metrics::record_rejection(reason);
    rejection.into_response()
}

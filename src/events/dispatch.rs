//! Event dispatch.
//!
//! Dispatch runs after the HTTP response has been committed. Its result is
//! only ever logged and counted; a failure here never changes what Slack
//! was told, so accepted deliveries are not retried.

use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::events::parser::{Envelope, ParseError};
use crate::events::richtext::{self, ShapeError};
use crate::net::connection::ActivityTracker;
use crate::observability::metrics;

pub const APP_MENTION: &str = "app_mention";

/// A user mentioning the app in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub event_id: String,
    pub event_time: i64,
    pub user: Option<String>,
    pub channel: Option<String>,
    /// The text the user wrote after the mention.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Mention(Mention),
    /// No handler for this payload kind.
    Ignored { kind: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("error getting event type: {0}")]
    PayloadKind(#[from] ParseError),
    #[error("malformed app_mention payload: {0}")]
    MalformedMention(#[from] ShapeError),
}

/// Routes accepted events to their handlers.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    mentions: Option<mpsc::UnboundedSender<Mention>>,
    jobs: ActivityTracker,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every extracted mention to `sink`.
    pub fn with_mention_sink(mut self, sink: mpsc::UnboundedSender<Mention>) -> Self {
        self.mentions = Some(sink);
        self
    }

    /// Dispatch jobs that have been accepted but not finished.
    pub fn jobs(&self) -> &ActivityTracker {
        &self.jobs
    }

    /// Route a single envelope to its handler.
    pub fn dispatch(&self, envelope: &Envelope) -> Result<DispatchOutcome, DispatchError> {
        match envelope.payload_kind()? {
            APP_MENTION => Ok(DispatchOutcome::Mention(handle_mention(envelope)?)),
            other => Ok(DispatchOutcome::Ignored {
                kind: other.to_owned(),
            }),
        }
    }

    /// Process `envelope` in the background, logging the outcome.
    ///
    /// The job is tracked so graceful shutdown can wait for it.
    pub fn spawn(&self, envelope: Envelope) {
        let guard = self.jobs.track();
        let dispatcher = self.clone();

        tokio::spawn(
            async move {
                let _guard = guard;
                dispatcher.finish(&envelope);
            }
            .in_current_span(),
        );
    }

    fn finish(&self, envelope: &Envelope) {
        let kind = envelope.payload_kind().unwrap_or("unknown").to_owned();

        match self.dispatch(envelope) {
            Ok(DispatchOutcome::Mention(mention)) => {
                tracing::info!(
                    user = mention.user.as_deref().unwrap_or_default(),
                    channel = mention.channel.as_deref().unwrap_or_default(),
                    "App mention received"
                );
                tracing::debug!(text = %mention.text, "Mention text");
                metrics::record_dispatch(&kind, "handled");

                if let Some(sink) = &self.mentions {
                    if sink.send(mention).is_err() {
                        tracing::warn!("Mention subscriber has gone away");
                    }
                }
            }
            Ok(DispatchOutcome::Ignored { kind }) => {
                tracing::debug!(payload_type = %kind, "No handler for event type");
                metrics::record_dispatch(&kind, "ignored");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to process the event");
                metrics::record_dispatch(&kind, "failed");
            }
        }
    }
}

fn handle_mention(envelope: &Envelope) -> Result<Mention, ShapeError> {
    // Re-wrapped so the path walker sees the payload as a JSON tree.
    let payload = Value::Object(envelope.payload.clone());
    let text = richtext::mention_text(&payload)?.to_owned();
    let field = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_owned);

    Ok(Mention {
        event_id: envelope.id.clone(),
        event_time: envelope.time,
        user: field("user"),
        channel: field("channel"),
        text,
    })
}

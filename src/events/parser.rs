//! Envelope parsing for Events API deliveries.
//!
//! Only the fields needed to route a delivery are extracted; the inner
//! `event` payload stays as raw JSON for the dispatcher.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

pub const URL_VERIFICATION: &str = "url_verification";
pub const EVENT_CALLBACK: &str = "event_callback";

/// Why a required field could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldProblem {
    Missing,
    WrongType { expected: &'static str },
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldProblem::Missing => f.write_str("key does not exist"),
            FieldProblem::WrongType { expected } => write!(f, "value is not {expected}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to get field {field}: {problem}")]
pub struct ParseError {
    pub field: &'static str,
    pub problem: FieldProblem,
}

/// Outer envelope kind for non-verification deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    EventCallback,
    Other(String),
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &str {
        match self {
            EnvelopeKind::EventCallback => EVENT_CALLBACK,
            EnvelopeKind::Other(kind) => kind,
        }
    }
}

/// A delivery carrying an inner event payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub id: String,
    /// Unix seconds at which the event occurred.
    pub time: i64,
    /// The raw `event` object.
    pub payload: Map<String, Value>,
}

impl Envelope {
    /// Inner payload kind, e.g. `app_mention`.
    pub fn payload_kind(&self) -> Result<&str, ParseError> {
        match self.payload.get("type") {
            None => Err(ParseError {
                field: "event.type",
                problem: FieldProblem::Missing,
            }),
            Some(value) => value.as_str().ok_or(ParseError {
                field: "event.type",
                problem: FieldProblem::WrongType {
                    expected: "a string",
                },
            }),
        }
    }
}

/// A parsed webhook document.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    UrlVerification { challenge: String },
    Callback(Envelope),
}

impl Event {
    /// Parse an admitted JSON document.
    pub fn parse(document: &Value) -> Result<Self, ParseError> {
        let kind = string_field(document, "type")?;

        if kind == URL_VERIFICATION {
            let challenge = string_field(document, "challenge")?;
            return Ok(Event::UrlVerification {
                challenge: challenge.to_owned(),
            });
        }

        let id = string_field(document, "event_id")?.to_owned();
        let time = int_field(document, "event_time")?;
        let payload = match document.get("event") {
            None => {
                return Err(ParseError {
                    field: "event",
                    problem: FieldProblem::Missing,
                })
            }
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(ParseError {
                    field: "event",
                    problem: FieldProblem::WrongType {
                        expected: "an object",
                    },
                })
            }
        };

        let kind = if kind == EVENT_CALLBACK {
            EnvelopeKind::EventCallback
        } else {
            EnvelopeKind::Other(kind.to_owned())
        };

        Ok(Event::Callback(Envelope {
            kind,
            id,
            time,
            payload,
        }))
    }
}

fn string_field<'a>(document: &'a Value, field: &'static str) -> Result<&'a str, ParseError> {
    let value = document.get(field).ok_or(ParseError {
        field,
        problem: FieldProblem::Missing,
    })?;
    value.as_str().ok_or(ParseError {
        field,
        problem: FieldProblem::WrongType {
            expected: "a string",
        },
    })
}

fn int_field(document: &Value, field: &'static str) -> Result<i64, ParseError> {
    let value = document.get(field).ok_or(ParseError {
        field,
        problem: FieldProblem::Missing,
    })?;
    value.as_i64().ok_or(ParseError {
        field,
        problem: FieldProblem::WrongType {
            expected: "an integer",
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn callback() -> Value {
        json!({
            "token": "Jhj5dZrVaK7ZwHHjRyZWjbDl",
            "team_id": "T061EG9RZ",
            "type": "event_callback",
            "event_id": "Ev0LAN670R",
            "event_time": 1515449522,
            "event": {
                "type": "app_mention",
                "user": "U061F7AUR",
                "text": "<@U0LAN0Z89> is it everything a river should be?",
                "channel": "C0LAN2Q65"
            }
        })
    }

    #[test]
    fn url_verification() {
        let doc = json!({
            "token": "Jhj5dZrVaK7ZwHHjRyZWjbDl",
            "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P",
            "type": "url_verification"
        });
        assert_eq!(
            Event::parse(&doc).unwrap(),
            Event::UrlVerification {
                challenge: "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P".into()
            }
        );
    }

    #[test]
    fn url_verification_ignores_missing_id() {
        // Verification handshakes never carry event_id or event_time.
        let doc = json!({"type": "url_verification", "challenge": "abc"});
        assert!(matches!(
            Event::parse(&doc),
            Ok(Event::UrlVerification { .. })
        ));
    }

    #[test]
    fn url_verification_requires_string_challenge() {
        let doc = json!({"type": "url_verification"});
        assert_eq!(
            Event::parse(&doc).unwrap_err(),
            ParseError {
                field: "challenge",
                problem: FieldProblem::Missing
            }
        );

        let doc = json!({"type": "url_verification", "challenge": 42});
        assert_eq!(Event::parse(&doc).unwrap_err().field, "challenge");
    }

    #[test]
    fn event_callback() {
        let Event::Callback(envelope) = Event::parse(&callback()).unwrap() else {
            panic!("expected callback");
        };
        assert_eq!(envelope.kind, EnvelopeKind::EventCallback);
        assert_eq!(envelope.id, "Ev0LAN670R");
        assert_eq!(envelope.time, 1515449522);
        assert_eq!(envelope.payload_kind().unwrap(), "app_mention");
    }

    #[test]
    fn type_is_required() {
        let err = Event::parse(&json!({"challenge": "abc"})).unwrap_err();
        assert_eq!(err.field, "type");
        let err = Event::parse(&json!({"type": 7})).unwrap_err();
        assert_eq!(
            err.problem,
            FieldProblem::WrongType {
                expected: "a string"
            }
        );
    }

    #[test]
    fn required_callback_fields() {
        for field in ["event_id", "event_time", "event"] {
            let mut doc = callback();
            doc.as_object_mut().unwrap().remove(field);
            let err = Event::parse(&doc).unwrap_err();
            assert_eq!(err.field, field);
            assert_eq!(err.problem, FieldProblem::Missing);
        }
    }

    #[test]
    fn event_time_must_be_integer() {
        let mut doc = callback();
        doc["event_time"] = json!("1515449522");
        assert_eq!(Event::parse(&doc).unwrap_err().field, "event_time");

        doc["event_time"] = json!(1515449522.5);
        assert_eq!(Event::parse(&doc).unwrap_err().field, "event_time");
    }

    #[test]
    fn event_must_be_object() {
        let mut doc = callback();
        doc["event"] = json!(["app_mention"]);
        assert_eq!(
            Event::parse(&doc).unwrap_err(),
            ParseError {
                field: "event",
                problem: FieldProblem::WrongType {
                    expected: "an object"
                }
            }
        );
    }

    #[test]
    fn other_envelope_kinds_still_need_ids() {
        let mut doc = callback();
        doc["type"] = json!("app_rate_limited");
        let Event::Callback(envelope) = Event::parse(&doc).unwrap() else {
            panic!("expected callback");
        };
        assert_eq!(envelope.kind, EnvelopeKind::Other("app_rate_limited".into()));

        doc.as_object_mut().unwrap().remove("event_id");
        assert!(Event::parse(&doc).is_err());
    }

    #[test]
    fn payload_kind_problems() {
        let mut doc = callback();
        doc["event"] = json!({"user": "U061F7AUR"});
        let Event::Callback(envelope) = Event::parse(&doc).unwrap() else {
            panic!("expected callback");
        };
        assert_eq!(envelope.payload_kind().unwrap_err().problem, FieldProblem::Missing);
    }
}

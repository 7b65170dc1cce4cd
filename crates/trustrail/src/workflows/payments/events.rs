//! Typed decoding of provider webhook payloads.
//!
//! The provider pushes three event shapes at one endpoint. Instead of
//! duck-typing on field presence inside the handlers, ingestion decodes the
//! raw payload once into a tagged variant, trying the shapes in a fixed
//! priority: mandate-activation marker, then credit marker, then debit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::lending::repository::RepositoryError;

/// Result carried by a debit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebitOutcome {
    Successful,
    Failed,
}

/// One provider webhook, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    MandateActivation {
        mandate_ref: String,
        mandate_id: Option<String>,
    },
    Credit {
        virtual_account: String,
        amount: f64,
    },
    Debit {
        transaction_ref: String,
        outcome: DebitOutcome,
        amount: f64,
        payment_id: Option<String>,
        failure_reason: String,
        biller_code: Option<String>,
    },
}

impl ProviderEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            ProviderEvent::MandateActivation { .. } => "activate_mandate",
            ProviderEvent::Credit { .. } => "credit",
            ProviderEvent::Debit { .. } => "debit",
        }
    }
}

/// Envelope fields shared by all event shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub request_ref: String,
    pub signature_hash: String,
    pub event: ProviderEvent,
}

/// Classify a raw payload into one of the three event shapes.
///
/// An explicit `details.meta.event_type` wins when present; otherwise the
/// structural markers are checked in priority order. Anything else is a
/// debit, the provider's most common push.
pub fn decode_event(payload: &serde_json::Value) -> DecodedEvent {
    let request_ref = str_at(payload, &["request_ref"]).unwrap_or_default();
    let signature_hash = str_at(payload, &["details", "meta", "signature_hash"])
        .or_else(|| str_at(payload, &["signature_hash"]))
        .unwrap_or_default();

    let explicit = str_at(payload, &["details", "meta", "event_type"]);
    let event = match explicit.as_deref() {
        Some("activate_mandate") => decode_activation(payload),
        Some("credit") => decode_credit(payload),
        Some("debit") => decode_debit(payload),
        _ => {
            if is_activation(payload) {
                decode_activation(payload)
            } else if str_at(payload, &["details", "meta", "cr_account"]).is_some() {
                decode_credit(payload)
            } else {
                decode_debit(payload)
            }
        }
    };

    DecodedEvent {
        request_ref,
        signature_hash,
        event,
    }
}

fn is_activation(payload: &serde_json::Value) -> bool {
    str_at(payload, &["transaction_type"]).as_deref() == Some("activate_mandate")
        || str_at(payload, &["request_type"]).as_deref() == Some("activate_mandate")
}

fn decode_activation(payload: &serde_json::Value) -> ProviderEvent {
    // The activation reference has moved between payload revisions; accept
    // every location the provider has used.
    let mandate_ref = str_at(payload, &["details", "transaction_ref"])
        .or_else(|| str_at(payload, &["details", "data", "data", "reference"]))
        .or_else(|| str_at(payload, &["transaction_ref"]))
        .unwrap_or_default();
    let mandate_id = id_at(payload, &["details", "data", "data", "id"])
        .or_else(|| id_at(payload, &["details", "mandate_id"]));

    ProviderEvent::MandateActivation {
        mandate_ref,
        mandate_id,
    }
}

fn decode_credit(payload: &serde_json::Value) -> ProviderEvent {
    ProviderEvent::Credit {
        virtual_account: str_at(payload, &["details", "meta", "cr_account"]).unwrap_or_default(),
        amount: amount_at(payload, &["details", "amount"]),
    }
}

fn decode_debit(payload: &serde_json::Value) -> ProviderEvent {
    let status = str_at(payload, &["details", "status"]).unwrap_or_default();
    let outcome = if status.eq_ignore_ascii_case("successful") {
        DebitOutcome::Successful
    } else {
        DebitOutcome::Failed
    };
    let failure_reason = str_at(payload, &["details", "meta", "failure_reason"])
        .or_else(|| str_at(payload, &["details", "meta", "reason"]))
        .unwrap_or_else(|| "Payment failed".to_string());

    ProviderEvent::Debit {
        transaction_ref: str_at(payload, &["details", "transaction_ref"]).unwrap_or_default(),
        outcome,
        amount: amount_at(payload, &["details", "amount"]),
        payment_id: str_at(payload, &["details", "meta", "payment_id"]),
        failure_reason,
        biller_code: str_at(payload, &["details", "meta", "biller_code"]),
    }
}

fn value_at<'a>(payload: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    path.iter()
        .try_fold(payload, |value, key| value.get(key))
}

fn str_at(payload: &serde_json::Value, path: &[&str]) -> Option<String> {
    value_at(payload, path)
        .and_then(|value| value.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The provider's numeric ids arrive both as JSON numbers and as strings.
fn id_at(payload: &serde_json::Value, path: &[&str]) -> Option<String> {
    match value_at(payload, path) {
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Amounts arrive both as JSON numbers and as numeric strings.
fn amount_at(payload: &serde_json::Value, path: &[&str]) -> f64 {
    match value_at(payload, path) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Audit row persisted for every received provider event, even when
/// classification or processing fails.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderEventLog {
    pub log_id: String,
    pub event_kind: &'static str,
    pub request_ref: String,
    pub raw_payload: serde_json::Value,
    pub signature_valid: bool,
    pub processed_successfully: bool,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

pub trait EventLogRepository: Send + Sync {
    fn insert(&self, log: ProviderEventLog) -> Result<(), RepositoryError>;
    fn update(&self, log: &ProviderEventLog) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_event_type_wins() {
        let payload = json!({
            "request_ref": "req_1",
            "details": {
                "transaction_ref": "txn_1",
                "status": "Successful",
                "amount": "9600",
                "meta": { "event_type": "debit", "cr_account": "9977001122" },
            },
        });
        let decoded = decode_event(&payload);
        assert!(matches!(decoded.event, ProviderEvent::Debit { .. }));
    }

    #[test]
    fn activation_marker_beats_credit_marker() {
        let payload = json!({
            "request_ref": "req_2",
            "transaction_type": "activate_mandate",
            "details": {
                "transaction_ref": "mnd_1",
                "meta": { "cr_account": "9977001122" },
            },
        });
        let decoded = decode_event(&payload);
        assert_eq!(
            decoded.event,
            ProviderEvent::MandateActivation {
                mandate_ref: "mnd_1".to_string(),
                mandate_id: None,
            }
        );
    }

    #[test]
    fn credit_marker_is_checked_before_debit_default() {
        let payload = json!({
            "request_ref": "req_3",
            "details": {
                "amount": 24000.0,
                "meta": { "cr_account": "9977001122" },
            },
        });
        let decoded = decode_event(&payload);
        assert_eq!(
            decoded.event,
            ProviderEvent::Credit {
                virtual_account: "9977001122".to_string(),
                amount: 24_000.0,
            }
        );
    }

    #[test]
    fn unmarked_payload_defaults_to_debit() {
        let payload = json!({
            "request_ref": "req_4",
            "details": {
                "transaction_ref": "txn_9",
                "status": "Failed",
                "amount": "9600.00",
                "meta": { "reason": "insufficient funds", "biller_code": "BC01" },
            },
        });
        let decoded = decode_event(&payload);
        match decoded.event {
            ProviderEvent::Debit {
                transaction_ref,
                outcome,
                amount,
                failure_reason,
                biller_code,
                ..
            } => {
                assert_eq!(transaction_ref, "txn_9");
                assert_eq!(outcome, DebitOutcome::Failed);
                assert_eq!(amount, 9_600.0);
                assert_eq!(failure_reason, "insufficient funds");
                assert_eq!(biller_code.as_deref(), Some("BC01"));
            }
            other => panic!("expected debit, got {other:?}"),
        }
    }

    #[test]
    fn activation_reference_falls_back_through_known_locations() {
        let payload = json!({
            "request_ref": "req_5",
            "request_type": "activate_mandate",
            "details": {
                "data": { "data": { "reference": "mnd_77", "id": "42" } },
            },
        });
        let decoded = decode_event(&payload);
        assert_eq!(
            decoded.event,
            ProviderEvent::MandateActivation {
                mandate_ref: "mnd_77".to_string(),
                mandate_id: Some("42".to_string()),
            }
        );
    }

    #[test]
    fn signature_hash_is_read_from_meta_or_top_level() {
        let nested = json!({
            "request_ref": "req_6",
            "details": { "meta": { "signature_hash": "abc" } },
        });
        assert_eq!(decode_event(&nested).signature_hash, "abc");

        let top = json!({ "request_ref": "req_7", "signature_hash": "def" });
        assert_eq!(decode_event(&top).signature_hash, "def");
    }
}

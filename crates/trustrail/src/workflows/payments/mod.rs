//! Event-driven servicing: webhook decoding, reconciliation, and default
//! monitoring.

pub mod events;
pub mod monitor;
pub mod reconciler;

pub use events::{
    decode_event, DebitOutcome, DecodedEvent, EventLogRepository, ProviderEvent, ProviderEventLog,
};
pub use monitor::{DefaultMonitor, DEFAULT_FAILED_PAYMENT_THRESHOLD};
pub use reconciler::PaymentEventReconciler;

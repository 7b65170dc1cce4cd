//! Default detection over active installment plans.
//!
//! Safe to re-run every cycle: the DEFAULTED transition is only attempted
//! from ACTIVE, so an already-defaulted application is untouched on the next
//! pass. Overdue schedules and stalled mandates are surfaced in the logs for
//! operator attention, with no automated remediation.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::workflows::lending::domain::ApplicationStatus;
use crate::workflows::lending::lifecycle::transition;
use crate::workflows::lending::repository::{
    ApplicationRepository, AuditActor, AuditEntry, AuditSink, PaymentRepository,
};
use crate::workflows::notify::BusinessNotifier;

pub const DEFAULT_FAILED_PAYMENT_THRESHOLD: u32 = 3;
const STUCK_MANDATE_HOURS: i64 = 48;

pub struct DefaultMonitor {
    applications: Arc<dyn ApplicationRepository>,
    payments: Arc<dyn PaymentRepository>,
    notifier: Arc<dyn BusinessNotifier>,
    audit: Arc<dyn AuditSink>,
}

impl DefaultMonitor {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        payments: Arc<dyn PaymentRepository>,
        notifier: Arc<dyn BusinessNotifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            applications,
            payments,
            notifier,
            audit,
        }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) {
        info!("payment monitor tick started");

        self.log_overdue_schedules(now);
        self.detect_defaults(now).await;
        self.log_stuck_mandates(now);

        info!("payment monitor tick completed");
    }

    fn log_overdue_schedules(&self, now: DateTime<Utc>) {
        match self.payments.overdue_scheduled(now) {
            Ok(overdue) if !overdue.is_empty() => {
                warn!(count = overdue.len(), "scheduled payments past due");
                for payment in overdue {
                    warn!(
                        transaction = %payment.transaction_id,
                        scheduled = %payment.scheduled_date,
                        "overdue scheduled payment"
                    );
                }
            }
            Ok(_) => {}
            Err(err) => error!(%err, "could not scan scheduled payments"),
        }
    }

    async fn detect_defaults(&self, now: DateTime<Utc>) {
        let active = match self.applications.by_status(ApplicationStatus::Active) {
            Ok(active) => active,
            Err(err) => {
                error!(%err, "could not load active applications");
                return;
            }
        };

        for mut app in active {
            let failed_count = match self.payments.failed_count(&app.application_id) {
                Ok(count) => count,
                Err(err) => {
                    error!(application = %app.application_id, %err, "could not count failed payments");
                    continue;
                }
            };
            if failed_count < DEFAULT_FAILED_PAYMENT_THRESHOLD {
                continue;
            }

            warn!(
                application = %app.application_id,
                failed_count,
                "failed payment threshold reached, marking defaulted"
            );

            if let Err(err) = transition(&mut app, ApplicationStatus::Defaulted, now) {
                error!(application = %app.application_id, %err, "defaulted transition rejected");
                continue;
            }
            if let Err(err) = self.applications.update(&app) {
                error!(application = %app.application_id, %err, "could not persist default");
                continue;
            }

            self.audit.record(AuditEntry {
                actor: AuditActor::System,
                action: "application.defaulted".to_string(),
                entity: "Application",
                entity_id: app.application_id.0.clone(),
                from_status: Some(ApplicationStatus::Active.label()),
                to_status: Some(app.status.label()),
                metadata: json!({
                    "failedPaymentCount": failed_count,
                    "outstandingBalance": app.outstanding_balance,
                }),
                at: now,
            });

            self.notifier
                .notify(
                    &app.business_id,
                    "application.defaulted",
                    json!({
                        "event": "application.defaulted",
                        "applicationId": app.application_id.0,
                        "trustWalletId": app.trust_wallet_id.0,
                        "customerName": app.customer.full_name(),
                        "failedPaymentCount": failed_count,
                        "outstandingBalance": app.outstanding_balance,
                        "paymentsCompleted": app.payments_completed,
                        "totalPayments": app.installment_count,
                    }),
                )
                .await;
        }
    }

    fn log_stuck_mandates(&self, now: DateTime<Utc>) {
        let threshold = now - Duration::hours(STUCK_MANDATE_HOURS);
        match self.applications.by_status(ApplicationStatus::MandateCreated) {
            Ok(created) => {
                for app in created
                    .iter()
                    .filter(|app| app.submitted_at < threshold)
                {
                    warn!(
                        application = %app.application_id,
                        submitted_at = %app.submitted_at,
                        mandate_ref = app.mandate_ref.as_deref().unwrap_or(""),
                        "mandate stuck awaiting activation for over 48 hours"
                    );
                }
            }
            Err(err) => error!(%err, "could not scan mandates awaiting activation"),
        }
    }
}

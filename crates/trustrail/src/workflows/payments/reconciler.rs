//! Reconciliation of pushed provider events against the application state
//! machine.
//!
//! Ingestion always acknowledges receipt; classification, signature
//! verification, and per-event processing outcomes are recorded on an event
//! log row instead of being surfaced to the provider. Handlers tolerate
//! duplicate delivery, missing local records, and out-of-order arrival.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::events::{
    decode_event, DebitOutcome, EventLogRepository, ProviderEvent, ProviderEventLog,
};
use crate::workflows::lending::domain::{
    build_schedule, ApplicationStatus, PaymentStatus, PaymentTransaction, TransactionId,
};
use crate::workflows::lending::lifecycle::{transition, TransitionError};
use crate::workflows::lending::repository::{
    ApplicationRepository, AuditActor, AuditEntry, AuditSink, BusinessRepository,
    PaymentRepository, RepositoryError,
};
use crate::workflows::notify::BusinessNotifier;
use crate::workflows::provider::signature::verify_event_signature;
use crate::workflows::provider::{InvoiceRequest, MandateProvider, ProviderError};

#[derive(Debug, thiserror::Error)]
enum ReconcileError {
    #[error("{0} not found in event payload")]
    MissingField(&'static str),
    #[error("no business registered for biller code {0}")]
    UnknownBusiness(String),
    #[error("no active application matches a debit of {0}")]
    NoMatchingApplication(f64),
    #[error("no open installment slot left for a debit of {0}")]
    NoOpenInstallment(f64),
    #[error("no application holds virtual account {0}")]
    UnknownVirtualAccount(String),
    #[error("no application holds mandate reference {0}")]
    UnknownMandateRef(String),
    #[error("application {0} missing mid-reconciliation")]
    ApplicationMissing(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Applies provider webhook events to applications and payments.
pub struct PaymentEventReconciler {
    applications: Arc<dyn ApplicationRepository>,
    payments: Arc<dyn PaymentRepository>,
    businesses: Arc<dyn BusinessRepository>,
    event_log: Arc<dyn EventLogRepository>,
    provider: Arc<dyn MandateProvider>,
    notifier: Arc<dyn BusinessNotifier>,
    audit: Arc<dyn AuditSink>,
    api_key: String,
}

impl PaymentEventReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        payments: Arc<dyn PaymentRepository>,
        businesses: Arc<dyn BusinessRepository>,
        event_log: Arc<dyn EventLogRepository>,
        provider: Arc<dyn MandateProvider>,
        notifier: Arc<dyn BusinessNotifier>,
        audit: Arc<dyn AuditSink>,
        api_key: String,
    ) -> Self {
        Self {
            applications,
            payments,
            businesses,
            event_log,
            provider,
            notifier,
            audit,
            api_key,
        }
    }

    /// Process one pushed event. Never fails outward: the return value only
    /// says whether internal processing succeeded, for the delivery log.
    pub async fn process(&self, payload: serde_json::Value, now: DateTime<Utc>) -> bool {
        let decoded = decode_event(&payload);
        let signature_valid =
            verify_event_signature(&self.api_key, &decoded.request_ref, &decoded.signature_hash);

        let mut log = ProviderEventLog {
            log_id: format!("pel_{}", Uuid::new_v4().simple()),
            event_kind: decoded.event.kind(),
            request_ref: decoded.request_ref.clone(),
            raw_payload: payload,
            signature_valid,
            processed_successfully: false,
            error: None,
            received_at: now,
            processed_at: None,
        };
        if let Err(err) = self.event_log.insert(log.clone()) {
            warn!(%err, "could not record provider event log");
        }

        let result = match decoded.event {
            ProviderEvent::Debit {
                transaction_ref,
                outcome,
                amount,
                payment_id,
                failure_reason,
                biller_code,
            } => {
                self.handle_debit(
                    transaction_ref,
                    outcome,
                    amount,
                    payment_id,
                    failure_reason,
                    biller_code,
                    now,
                )
                .await
            }
            ProviderEvent::Credit {
                virtual_account,
                amount,
            } => self.handle_credit(virtual_account, amount, now).await,
            ProviderEvent::MandateActivation {
                mandate_ref,
                mandate_id,
            } => self.handle_mandate_activation(mandate_ref, mandate_id, now).await,
        };

        log.processed_at = Some(now);
        match result {
            Ok(()) => {
                log.processed_successfully = true;
                info!(request_ref = %log.request_ref, kind = log.event_kind, "provider event processed");
            }
            Err(err) => {
                log.error = Some(err.to_string());
                warn!(request_ref = %log.request_ref, kind = log.event_kind, %err, "provider event processing failed");
            }
        }
        if let Err(err) = self.event_log.update(&log) {
            warn!(%err, "could not update provider event log");
        }
        log.processed_successfully
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_debit(
        &self,
        transaction_ref: String,
        outcome: DebitOutcome,
        amount: f64,
        payment_id: Option<String>,
        failure_reason: String,
        biller_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        if transaction_ref.is_empty() {
            return Err(ReconcileError::MissingField("transaction reference"));
        }

        let payment = self.payments.find_by_provider_ref(&transaction_ref)?;
        let mut payment = match payment {
            Some(payment) => payment,
            None => {
                self.attach_provider_debit(&transaction_ref, amount, biller_code, now)
                    .await?
            }
        };

        if payment.status.is_terminal() {
            info!(
                transaction = %payment.transaction_id,
                status = payment.status.label(),
                "duplicate debit event for settled payment, ignoring"
            );
            return Ok(());
        }

        let mut app = self
            .applications
            .fetch(&payment.application_id)?
            .ok_or_else(|| ReconcileError::ApplicationMissing(payment.application_id.0.clone()))?;

        match outcome {
            DebitOutcome::Successful => {
                payment.status = PaymentStatus::Successful;
                payment.paid_date = Some(now);
                payment.provider_payment_id = payment_id;
                self.payments.update(&payment)?;

                let completed = app.register_payment(payment.amount);
                if completed && app.status == ApplicationStatus::Active {
                    transition(&mut app, ApplicationStatus::Completed, now)?;
                    info!(application = %app.application_id, "all installments received, plan completed");
                }
                self.applications.update(&app)?;

                self.audit.record(AuditEntry {
                    actor: AuditActor::System,
                    action: "payment.success".to_string(),
                    entity: "PaymentTransaction",
                    entity_id: payment.transaction_id.0.clone(),
                    from_status: None,
                    to_status: Some(payment.status.label()),
                    metadata: json!({
                        "applicationId": app.application_id.0,
                        "amount": payment.amount,
                        "paymentNumber": payment.payment_number,
                        "totalPayments": payment.total_payments,
                    }),
                    at: now,
                });

                self.notifier
                    .notify(
                        &app.business_id,
                        "payment.success",
                        json!({
                            "event": "payment.success",
                            "applicationId": app.application_id.0,
                            "transactionId": payment.transaction_id.0,
                            "amount": payment.amount,
                            "paymentNumber": payment.payment_number,
                            "totalPayments": payment.total_payments,
                            "paidDate": payment.paid_date,
                            "customerName": app.customer.full_name(),
                            "trustWalletId": app.trust_wallet_id.0,
                        }),
                    )
                    .await;
            }
            DebitOutcome::Failed => {
                payment.status = PaymentStatus::Failed;
                payment.failure_reason = Some(failure_reason.clone());
                self.payments.update(&payment)?;

                self.audit.record(AuditEntry {
                    actor: AuditActor::System,
                    action: "payment.failed".to_string(),
                    entity: "PaymentTransaction",
                    entity_id: payment.transaction_id.0.clone(),
                    from_status: None,
                    to_status: Some(payment.status.label()),
                    metadata: json!({
                        "applicationId": app.application_id.0,
                        "amount": payment.amount,
                        "paymentNumber": payment.payment_number,
                        "failureReason": failure_reason,
                    }),
                    at: now,
                });

                self.notifier
                    .notify(
                        &app.business_id,
                        "payment.failed",
                        json!({
                            "event": "payment.failed",
                            "applicationId": app.application_id.0,
                            "transactionId": payment.transaction_id.0,
                            "amount": payment.amount,
                            "paymentNumber": payment.payment_number,
                            "totalPayments": payment.total_payments,
                            "failureReason": payment.failure_reason,
                            "customerName": app.customer.full_name(),
                            "trustWalletId": app.trust_wallet_id.0,
                        }),
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Best-effort attachment of a provider-initiated debit we never
    /// scheduled locally: match the newest ACTIVE application for the biller
    /// with an equal installment amount, then reuse its next open installment
    /// row or synthesize one. Matching on amount alone is ambiguous when two
    /// active plans share an installment amount.
    async fn attach_provider_debit(
        &self,
        transaction_ref: &str,
        amount: f64,
        biller_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PaymentTransaction, ReconcileError> {
        warn!(transaction_ref, "debit event for unknown payment, attaching by amount match");

        let biller_code = biller_code.ok_or(ReconcileError::MissingField("biller code"))?;
        let business = self
            .businesses
            .find_by_biller_code(&biller_code)?
            .ok_or(ReconcileError::UnknownBusiness(biller_code))?;
        let app = self
            .applications
            .find_active_by_installment(&business.business_id, amount)?
            .ok_or(ReconcileError::NoMatchingApplication(amount))?;

        // Walk forward to the first installment slot that is still open:
        // settled rows (including failed attempts) keep their numbers, so a
        // provider retry lands on the next free slot instead of colliding
        // with the per-application payment-number uniqueness.
        let mut open_row = None;
        let mut open_number = None;
        for number in app.payments_completed + 1..=app.installment_count {
            match self
                .payments
                .find_by_payment_number(&app.application_id, number)?
            {
                Some(row) if row.status.is_terminal() => continue,
                Some(row) => {
                    open_row = Some(row);
                    break;
                }
                None => {
                    open_number = Some(number);
                    break;
                }
            }
        }

        if let Some(mut scheduled) = open_row {
            scheduled.provider_ref = Some(transaction_ref.to_string());
            scheduled.status = PaymentStatus::Pending;
            self.payments.update(&scheduled)?;
            return Ok(scheduled);
        }
        let payment_number =
            open_number.ok_or(ReconcileError::NoOpenInstallment(amount))?;

        let payment = PaymentTransaction {
            transaction_id: TransactionId::generate(),
            application_id: app.application_id.clone(),
            trust_wallet_id: app.trust_wallet_id.clone(),
            business_id: app.business_id.clone(),
            amount,
            status: PaymentStatus::Pending,
            payment_number,
            total_payments: app.installment_count,
            scheduled_date: now,
            paid_date: None,
            provider_ref: Some(transaction_ref.to_string()),
            provider_payment_id: None,
            failure_reason: None,
        };
        self.payments.insert(payment.clone())?;
        info!(
            transaction = %payment.transaction_id,
            application = %app.application_id,
            "created payment transaction from debit event"
        );
        Ok(payment)
    }

    async fn handle_credit(
        &self,
        virtual_account: String,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        if virtual_account.is_empty() {
            return Err(ReconcileError::MissingField("virtual account"));
        }

        let mut app = self
            .applications
            .find_by_virtual_account(&virtual_account)?
            .ok_or_else(|| ReconcileError::UnknownVirtualAccount(virtual_account.clone()))?;

        if app.down_payment_received {
            info!(
                application = %app.application_id,
                "duplicate down-payment event, ignoring"
            );
            return Ok(());
        }

        if (amount - app.down_payment_required).abs() > 0.01 {
            warn!(
                application = %app.application_id,
                expected = app.down_payment_required,
                received = amount,
                "down payment amount mismatch"
            );
        }

        app.register_down_payment(amount, now);
        transition(&mut app, ApplicationStatus::Active, now)?;
        self.applications.update(&app)?;

        self.audit.record(AuditEntry {
            actor: AuditActor::System,
            action: "downpayment.received".to_string(),
            entity: "Application",
            entity_id: app.application_id.0.clone(),
            from_status: Some(ApplicationStatus::MandateActive.label()),
            to_status: Some(app.status.label()),
            metadata: json!({ "amount": amount, "virtualAccount": virtual_account }),
            at: now,
        });

        self.notifier
            .notify(
                &app.business_id,
                "downpayment.received",
                json!({
                    "event": "downpayment.received",
                    "applicationId": app.application_id.0,
                    "amount": amount,
                    "virtualAccount": virtual_account,
                    "customerName": app.customer.full_name(),
                    "trustWalletId": app.trust_wallet_id.0,
                    "nextSteps": "Installment payments will be debited automatically on the agreed schedule",
                    "firstPaymentDate": app.mandate_activated_at,
                }),
            )
            .await;

        info!(application = %app.application_id, amount, "down payment received, plan active");
        Ok(())
    }

    async fn handle_mandate_activation(
        &self,
        mandate_ref: String,
        mandate_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        if mandate_ref.is_empty() {
            return Err(ReconcileError::MissingField("mandate reference"));
        }

        let mut app = self
            .applications
            .find_by_mandate_ref(&mandate_ref)?
            .ok_or_else(|| ReconcileError::UnknownMandateRef(mandate_ref.clone()))?;

        // Idempotency checkpoint: a virtual account means invoice issuance
        // already ran, whether synchronously or from an earlier delivery of
        // this same event.
        if app.virtual_account_number.is_some() {
            info!(
                application = %app.application_id,
                "mandate already active with virtual account, ignoring duplicate"
            );
            if app.mandate_id.is_none() && mandate_id.is_some() {
                app.mandate_id = mandate_id;
                self.applications.update(&app)?;
            }
            return Ok(());
        }

        transition(&mut app, ApplicationStatus::MandateActive, now)?;
        app.mandate_id = mandate_id.clone();
        self.applications.update(&app)?;

        self.audit.record(AuditEntry {
            actor: AuditActor::System,
            action: "mandate.activated".to_string(),
            entity: "Application",
            entity_id: app.application_id.0.clone(),
            from_status: Some(ApplicationStatus::MandateCreated.label()),
            to_status: Some(app.status.label()),
            metadata: json!({ "mandateRef": mandate_ref, "mandateId": mandate_id }),
            at: now,
        });

        let business = self
            .businesses
            .fetch(&app.business_id)?
            .ok_or_else(|| ReconcileError::ApplicationMissing(app.business_id.0.clone()))?;
        let biller_code = business
            .biller_code
            .clone()
            .ok_or(ReconcileError::MissingField("biller code"))?;

        let invoice = InvoiceRequest {
            biller_code,
            down_payment: app.down_payment_required,
            installment_count: app.installment_count,
            frequency: app.frequency,
            start_date: now,
        };
        let virtual_account = self.provider.send_invoice(&invoice).await?;
        app.virtual_account_number = Some(virtual_account.account_number.clone());
        self.applications.update(&app)?;

        for scheduled in build_schedule(&app, now) {
            self.payments.insert(scheduled)?;
        }

        self.notifier
            .notify(
                &app.business_id,
                "mandate.activated",
                json!({
                    "event": "mandate.activated",
                    "applicationId": app.application_id.0,
                    "mandateRef": mandate_ref,
                    "mandateId": app.mandate_id,
                    "virtualAccount": virtual_account.account_number,
                    "downPaymentRequired": app.down_payment_required,
                    "customerName": app.customer.full_name(),
                    "trustWalletId": app.trust_wallet_id.0,
                    "nextSteps": "Customer should pay the down payment into the virtual account to activate the installment plan",
                }),
            )
            .await;

        info!(
            application = %app.application_id,
            virtual_account = %virtual_account.account_number,
            "mandate activated via provider event"
        );
        Ok(())
    }
}

//! Timer-driven origination pipeline.
//!
//! Each tick claims a FIFO batch of applications awaiting analysis, scores
//! them through the configured analysis path, and drives approved
//! applications through mandate creation and invoice issuance as separately
//! durable steps. A failure in any step leaves the application at its last
//! committed status for operator follow-up; the batch keeps going.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::workflows::lending::domain::{
    build_schedule, Application, ApplicationStatus, Business, TrustReportId, TrustWallet,
};
use crate::workflows::lending::lifecycle::{transition, TransitionError};
use crate::workflows::lending::repository::{
    ApplicationRepository, AuditActor, AuditEntry, AuditSink, BusinessRepository,
    PaymentRepository, RepositoryError, StoredTrustReport, TrustReportRepository,
    TrustWalletRepository,
};
use crate::workflows::notify::BusinessNotifier;
use crate::workflows::provider::{InvoiceRequest, MandateProvider, ProviderError};
use crate::workflows::statement::{parse_statement_str, StatementParseError};
use crate::workflows::trust::analyzer::{
    invalid_statement_report, AnalysisContext, AnalyzerError, DocumentAnalyzer,
};
use crate::workflows::trust::{Decision, TrustEngine, TrustEngineError, TrustEngineReport};

#[derive(Debug, thiserror::Error)]
pub enum OriginationError {
    #[error("application has no statement to analyze")]
    NoStatement,
    #[error("trust wallet {0} not found")]
    WalletMissing(String),
    #[error("business {0} not found")]
    BusinessMissing(String),
    #[error("business {0} has no biller code, merchant onboarding incomplete")]
    NotOnboarded(String),
    #[error(transparent)]
    Statement(#[from] StatementParseError),
    #[error(transparent)]
    Scoring(#[from] TrustEngineError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Polls for submitted applications and runs them to a decision.
pub struct OriginationOrchestrator {
    applications: Arc<dyn ApplicationRepository>,
    wallets: Arc<dyn TrustWalletRepository>,
    businesses: Arc<dyn BusinessRepository>,
    reports: Arc<dyn TrustReportRepository>,
    payments: Arc<dyn PaymentRepository>,
    provider: Arc<dyn MandateProvider>,
    notifier: Arc<dyn BusinessNotifier>,
    audit: Arc<dyn AuditSink>,
    document_analyzer: Option<Arc<dyn DocumentAnalyzer>>,
    batch_size: usize,
}

impl OriginationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        wallets: Arc<dyn TrustWalletRepository>,
        businesses: Arc<dyn BusinessRepository>,
        reports: Arc<dyn TrustReportRepository>,
        payments: Arc<dyn PaymentRepository>,
        provider: Arc<dyn MandateProvider>,
        notifier: Arc<dyn BusinessNotifier>,
        audit: Arc<dyn AuditSink>,
        document_analyzer: Option<Arc<dyn DocumentAnalyzer>>,
        batch_size: usize,
    ) -> Self {
        Self {
            applications,
            wallets,
            businesses,
            reports,
            payments,
            provider,
            notifier,
            audit,
            document_analyzer,
            batch_size,
        }
    }

    /// One polling tick: claim up to `batch_size` applications, oldest
    /// submission first, and process each in turn.
    pub async fn run_once(&self, now: DateTime<Utc>) {
        let pending = match self.applications.pending_analysis(self.batch_size) {
            Ok(pending) => pending,
            Err(err) => {
                error!(%err, "could not load pending applications");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "processing pending applications");

        for candidate in pending {
            let id = candidate.application_id.clone();

            // Conditional claim: only the tick that flips the row to
            // ANALYZING may process it, so an overlapping tick backs off.
            match self.applications.claim_for_analysis(&id) {
                Ok(true) => {}
                Ok(false) => {
                    info!(application = %id, "claim lost to a concurrent tick, skipping");
                    continue;
                }
                Err(err) => {
                    error!(application = %id, %err, "claim failed");
                    continue;
                }
            }

            let app = match self.applications.fetch(&id) {
                Ok(Some(app)) => app,
                Ok(None) => continue,
                Err(err) => {
                    error!(application = %id, %err, "could not reload claimed application");
                    continue;
                }
            };

            if let Err(err) = self.process_application(app, now).await {
                // Left in ANALYZING deliberately: analysis failures need an
                // operator's eyes, not a silent retry loop.
                error!(application = %id, %err, "application processing failed");
            }
        }

        info!("statement analysis tick completed");
    }

    async fn process_application(
        &self,
        mut app: Application,
        now: DateTime<Utc>,
    ) -> Result<(), OriginationError> {
        info!(application = %app.application_id, "analyzing application");
        self.audit.record(AuditEntry {
            actor: AuditActor::System,
            action: "application.process".to_string(),
            entity: "Application",
            entity_id: app.application_id.0.clone(),
            from_status: Some(ApplicationStatus::PendingAnalysis.label()),
            to_status: Some(ApplicationStatus::Analyzing.label()),
            metadata: json!({
                "trustWalletId": app.trust_wallet_id.0,
                "businessId": app.business_id.0,
            }),
            at: now,
        });

        let wallet = self
            .wallets
            .fetch(&app.trust_wallet_id)?
            .ok_or_else(|| OriginationError::WalletMissing(app.trust_wallet_id.0.clone()))?;

        let report = self.analyze(&app, &wallet, now.date_naive()).await?;

        let report_id = TrustReportId::generate();
        self.reports.insert(StoredTrustReport {
            report_id: report_id.clone(),
            application_id: app.application_id.clone(),
            trust_wallet_id: app.trust_wallet_id.clone(),
            business_id: app.business_id.clone(),
            report: report.clone(),
            analyzed_at: now,
        })?;
        app.trust_report_id = Some(report_id);
        app.analyzed_at = Some(now);

        let business = self
            .businesses
            .fetch(&app.business_id)?
            .ok_or_else(|| OriginationError::BusinessMissing(app.business_id.0.clone()))?;

        match report.decision {
            Decision::Approved => {
                transition(&mut app, ApplicationStatus::Approved, now)?;
                self.applications.update(&app)?;

                self.complete_approval(&mut app, &business, now).await?;

                let next_steps = if app.virtual_account_number.is_some() {
                    "Customer should pay the down payment into the virtual account to activate the installment plan"
                } else {
                    "Waiting for mandate activation"
                };
                self.notifier
                    .notify(
                        &app.business_id,
                        "application.approved",
                        json!({
                            "event": "application.approved",
                            "applicationId": app.application_id.0,
                            "trustWalletId": app.trust_wallet_id.0,
                            "customerName": app.customer.full_name(),
                            "trustScore": report.trust_score,
                            "decision": report.decision.label(),
                            "totalAmount": app.total_amount,
                            "mandateRef": app.mandate_ref,
                            "virtualAccountNumber": app.virtual_account_number,
                            "downPaymentRequired": app.down_payment_required,
                            "nextSteps": next_steps,
                        }),
                    )
                    .await;
                info!(application = %app.application_id, "application approved, mandate pipeline run");
            }
            Decision::Declined => {
                transition(&mut app, ApplicationStatus::Declined, now)?;
                self.applications.update(&app)?;

                self.notifier
                    .notify(
                        &app.business_id,
                        "application.declined",
                        json!({
                            "event": "application.declined",
                            "applicationId": app.application_id.0,
                            "trustWalletId": app.trust_wallet_id.0,
                            "customerName": app.customer.full_name(),
                            "trustScore": report.trust_score,
                            "decision": report.decision.label(),
                            "riskFlags": report.risk_flags,
                            "isValidStatement": report.is_valid_statement,
                            "invalidStatementReason": report.invalid_statement_reason,
                        }),
                    )
                    .await;
                info!(application = %app.application_id, "application declined");
            }
            Decision::FlaggedForReview => {
                transition(&mut app, ApplicationStatus::FlaggedForReview, now)?;
                self.applications.update(&app)?;

                self.notifier
                    .notify(
                        &app.business_id,
                        "application.flagged",
                        json!({
                            "event": "application.flagged",
                            "applicationId": app.application_id.0,
                            "trustWalletId": app.trust_wallet_id.0,
                            "customerName": app.customer.full_name(),
                            "trustScore": report.trust_score,
                            "decision": report.decision.label(),
                            "riskFlags": report.risk_flags,
                            "message": "Application requires manual review",
                        }),
                    )
                    .await;
                info!(application = %app.application_id, "application flagged for review");
            }
        }

        self.audit.record(AuditEntry {
            actor: AuditActor::System,
            action: format!("application.{}", report.decision.label().to_lowercase()),
            entity: "Application",
            entity_id: app.application_id.0.clone(),
            from_status: Some(ApplicationStatus::Analyzing.label()),
            to_status: Some(app.status.label()),
            metadata: json!({
                "trustScore": report.trust_score,
                "decision": report.decision.label(),
            }),
            at: now,
        });

        Ok(())
    }

    /// Pick the analysis path for this application.
    ///
    /// An externally stored document goes to the document-understanding
    /// provider; on its failure the local engine is the fallback as long as a
    /// raw ledger is still present. With neither, analysis fails hard and the
    /// application stays in ANALYZING.
    async fn analyze(
        &self,
        app: &Application,
        wallet: &TrustWallet,
        as_of: NaiveDate,
    ) -> Result<TrustEngineReport, OriginationError> {
        if let (Some(handle), Some(analyzer)) = (&app.statement_file_handle, &self.document_analyzer)
        {
            let context = AnalysisContext {
                installment_amount: app.installment_amount,
                workflow: wallet.approval_workflow,
            };
            match analyzer.analyze(handle, &context).await {
                Ok(report) if !report.is_valid_statement => {
                    let reason = report
                        .invalid_statement_reason
                        .unwrap_or_else(|| "document is not a valid bank statement".to_string());
                    warn!(application = %app.application_id, %reason, "uploaded document rejected");
                    return Ok(invalid_statement_report(
                        &reason,
                        app.installment_amount,
                        as_of,
                    ));
                }
                Ok(report) => {
                    info!(application = %app.application_id, score = report.trust_score, "document analysis completed");
                    return Ok(report);
                }
                Err(err) => {
                    error!(application = %app.application_id, %err, "document analysis failed");
                    if app.statement_csv.is_none() {
                        return Err(err.into());
                    }
                    info!(application = %app.application_id, "falling back to local statement analysis");
                }
            }
        }

        let csv = app
            .statement_csv
            .as_deref()
            .ok_or(OriginationError::NoStatement)?;
        let ledger = parse_statement_str(csv)?;
        let report = TrustEngine::analyze(&ledger, app.installment_amount, &wallet.approval_workflow)?;
        info!(application = %app.application_id, score = report.trust_score, "local analysis completed");
        Ok(report)
    }

    /// Drive an APPROVED application through the provider pipeline.
    ///
    /// Mandate creation and invoice issuance commit separately so a failure
    /// after either step leaves recoverable state: an application stuck at
    /// MANDATE_CREATED is finished later by the mandate-activation event.
    /// Also used when an operator approves a flagged application.
    pub async fn complete_approval(
        &self,
        app: &mut Application,
        business: &Business,
        now: DateTime<Utc>,
    ) -> Result<(), OriginationError> {
        let biller_code = business
            .biller_code
            .clone()
            .ok_or_else(|| OriginationError::NotOnboarded(business.business_id.0.clone()))?;

        let mandate = self
            .provider
            .create_mandate(&app.customer, &biller_code, app.total_amount)
            .await?;
        app.mandate_ref = Some(mandate.mandate_ref.clone());
        transition(app, ApplicationStatus::MandateCreated, now)?;
        self.applications.update(app)?;
        self.audit.record(AuditEntry {
            actor: AuditActor::System,
            action: "mandate.created".to_string(),
            entity: "Application",
            entity_id: app.application_id.0.clone(),
            from_status: Some(ApplicationStatus::Approved.label()),
            to_status: Some(app.status.label()),
            metadata: json!({ "mandateRef": mandate.mandate_ref }),
            at: now,
        });

        let invoice = InvoiceRequest {
            biller_code,
            down_payment: app.down_payment_required,
            installment_count: app.installment_count,
            frequency: app.frequency,
            start_date: now,
        };
        match self.provider.send_invoice(&invoice).await {
            Ok(virtual_account) => {
                app.virtual_account_number = Some(virtual_account.account_number.clone());
                transition(app, ApplicationStatus::MandateActive, now)?;
                self.applications.update(app)?;

                for scheduled in build_schedule(app, now) {
                    self.payments.insert(scheduled)?;
                }

                self.audit.record(AuditEntry {
                    actor: AuditActor::System,
                    action: "invoice.sent".to_string(),
                    entity: "Application",
                    entity_id: app.application_id.0.clone(),
                    from_status: Some(ApplicationStatus::MandateCreated.label()),
                    to_status: Some(app.status.label()),
                    metadata: json!({
                        "virtualAccountNumber": virtual_account.account_number,
                        "downPaymentRequired": app.down_payment_required,
                    }),
                    at: now,
                });
                info!(
                    application = %app.application_id,
                    virtual_account = %virtual_account.account_number,
                    "virtual account created"
                );
            }
            Err(err) => {
                // Leave MANDATE_CREATED; the provider's own activation event
                // completes the pipeline asynchronously.
                error!(application = %app.application_id, %err, "invoice issuance failed");
            }
        }

        Ok(())
    }
}

//! Application intake: validation, term derivation, and creation of the
//! PENDING_ANALYSIS record the origination job picks up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, CustomerDetails, InstallmentTerms,
    TrustWalletId, WorkflowConfigError,
};
use super::repository::{
    ApplicationRepository, AuditActor, AuditEntry, AuditSink, CredentialCipher, RepositoryError,
    TrustWalletRepository,
};

/// Raw customer fields as they arrive on a submission, before the sensitive
/// ones are sealed.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerSubmission {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub account_number: String,
    pub bank_code: String,
    pub bvn: String,
}

/// One submission against a trust wallet.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSubmission {
    pub trust_wallet_id: TrustWalletId,
    pub customer: CustomerSubmission,
    pub total_amount: f64,
    #[serde(default)]
    pub statement_csv: Option<String>,
    #[serde(default)]
    pub statement_file_handle: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("trust wallet {0} not found")]
    WalletMissing(String),
    #[error("total amount must be positive")]
    InvalidAmount,
    #[error("a bank statement (CSV or stored document) is required")]
    MissingStatement,
    #[error(transparent)]
    InvalidWorkflow(#[from] WorkflowConfigError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Intake facade composing the wallet lookup, credential cipher, and
/// application repository.
pub struct ApplicationIntake {
    wallets: Arc<dyn TrustWalletRepository>,
    applications: Arc<dyn ApplicationRepository>,
    cipher: Arc<dyn CredentialCipher>,
    audit: Arc<dyn AuditSink>,
}

impl ApplicationIntake {
    pub fn new(
        wallets: Arc<dyn TrustWalletRepository>,
        applications: Arc<dyn ApplicationRepository>,
        cipher: Arc<dyn CredentialCipher>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            wallets,
            applications,
            cipher,
            audit,
        }
    }

    /// Validate a submission and create the application awaiting analysis.
    pub fn submit(
        &self,
        submission: ApplicationSubmission,
        now: DateTime<Utc>,
    ) -> Result<Application, SubmissionError> {
        if submission.total_amount <= 0.0 {
            return Err(SubmissionError::InvalidAmount);
        }
        let has_csv = submission
            .statement_csv
            .as_deref()
            .is_some_and(|csv| !csv.trim().is_empty());
        if !has_csv && submission.statement_file_handle.is_none() {
            return Err(SubmissionError::MissingStatement);
        }

        let wallet = self
            .wallets
            .fetch(&submission.trust_wallet_id)?
            .ok_or_else(|| SubmissionError::WalletMissing(submission.trust_wallet_id.0.clone()))?;
        wallet.approval_workflow.validate()?;

        let terms = InstallmentTerms::derive(submission.total_amount, &wallet.installment_plan);
        let customer = submission.customer;

        let app = Application {
            application_id: ApplicationId::generate(),
            trust_wallet_id: wallet.trust_wallet_id.clone(),
            business_id: wallet.business_id.clone(),
            customer: CustomerDetails {
                first_name: customer.first_name,
                last_name: customer.last_name,
                email: customer.email,
                phone_number: customer.phone_number,
                account_number: self.cipher.seal(&customer.account_number),
                bank_code: customer.bank_code,
                bvn: self.cipher.seal(&customer.bvn),
            },
            total_amount: submission.total_amount,
            down_payment_required: terms.down_payment_required,
            installment_amount: terms.installment_amount,
            installment_count: wallet.installment_plan.installment_count,
            frequency: wallet.installment_plan.frequency,
            payments_completed: 0,
            total_paid: 0.0,
            outstanding_balance: submission.total_amount,
            down_payment_received: false,
            down_payment_amount: None,
            mandate_ref: None,
            mandate_id: None,
            virtual_account_number: None,
            trust_report_id: None,
            statement_csv: submission.statement_csv.filter(|csv| !csv.trim().is_empty()),
            statement_file_handle: submission.statement_file_handle,
            status: ApplicationStatus::PendingAnalysis,
            submitted_at: now,
            analyzed_at: None,
            approved_at: None,
            declined_at: None,
            mandate_activated_at: None,
            completed_at: None,
        };

        self.applications.insert(app.clone())?;
        self.audit.record(AuditEntry {
            actor: AuditActor::Business,
            action: "application.submitted".to_string(),
            entity: "Application",
            entity_id: app.application_id.0.clone(),
            from_status: None,
            to_status: Some(app.status.label()),
            metadata: json!({
                "trustWalletId": app.trust_wallet_id.0,
                "totalAmount": app.total_amount,
                "downPaymentRequired": app.down_payment_required,
                "installmentAmount": app.installment_amount,
            }),
            at: now,
        });

        info!(application = %app.application_id, "application submitted");
        Ok(app)
    }
}

/// Sanitized representation of an application's exposed state.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub total_amount: f64,
    pub down_payment_required: f64,
    pub installment_amount: f64,
    pub installment_count: u32,
    pub frequency: &'static str,
    pub payments_completed: u32,
    pub total_paid: f64,
    pub outstanding_balance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_account_number: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl ApplicationStatusView {
    pub fn from_application(app: &Application) -> Self {
        Self {
            application_id: app.application_id.clone(),
            status: app.status.label(),
            total_amount: app.total_amount,
            down_payment_required: app.down_payment_required,
            installment_amount: app.installment_amount,
            installment_count: app.installment_count,
            frequency: app.frequency.label(),
            payments_completed: app.payments_completed,
            total_paid: app.total_paid,
            outstanding_balance: app.outstanding_balance,
            virtual_account_number: app.virtual_account_number.clone(),
            submitted_at: app.submitted_at,
        }
    }
}

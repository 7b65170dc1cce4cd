use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, Business, BusinessId, EncryptedSecret,
    PaymentTransaction, TransactionId, TrustReportId, TrustWallet, TrustWalletId,
};
use crate::workflows::trust::TrustEngineReport;

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction for applications.
///
/// `claim_for_analysis` is the atomic compare-and-set used by the origination
/// job: the claim succeeds only if the row is still PENDING_ANALYSIS, so two
/// overlapping job ticks cannot both pick up the same application.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, app: Application) -> Result<(), RepositoryError>;
    fn update(&self, app: &Application) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    /// Applications awaiting analysis, oldest submission first.
    fn pending_analysis(&self, limit: usize) -> Result<Vec<Application>, RepositoryError>;
    /// CAS PENDING_ANALYSIS -> ANALYZING; false when another worker won.
    fn claim_for_analysis(&self, id: &ApplicationId) -> Result<bool, RepositoryError>;
    fn by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>, RepositoryError>;
    fn find_by_virtual_account(
        &self,
        account_number: &str,
    ) -> Result<Option<Application>, RepositoryError>;
    fn find_by_mandate_ref(&self, mandate_ref: &str)
        -> Result<Option<Application>, RepositoryError>;
    /// Newest ACTIVE application for a business whose installment amount
    /// matches, used by the debit fallback path.
    fn find_active_by_installment(
        &self,
        business_id: &BusinessId,
        amount: f64,
    ) -> Result<Option<Application>, RepositoryError>;
}

/// Storage abstraction for installment payment transactions.
pub trait PaymentRepository: Send + Sync {
    fn insert(&self, payment: PaymentTransaction) -> Result<(), RepositoryError>;
    fn update(&self, payment: &PaymentTransaction) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &TransactionId) -> Result<Option<PaymentTransaction>, RepositoryError>;
    fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<PaymentTransaction>, RepositoryError>;
    fn find_by_payment_number(
        &self,
        application_id: &ApplicationId,
        payment_number: u32,
    ) -> Result<Option<PaymentTransaction>, RepositoryError>;
    fn failed_count(&self, application_id: &ApplicationId) -> Result<u32, RepositoryError>;
    fn overdue_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, RepositoryError>;
}

/// Persisted trust-engine report. Written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTrustReport {
    pub report_id: TrustReportId,
    pub application_id: ApplicationId,
    pub trust_wallet_id: TrustWalletId,
    pub business_id: BusinessId,
    pub report: TrustEngineReport,
    pub analyzed_at: DateTime<Utc>,
}

pub trait TrustReportRepository: Send + Sync {
    fn insert(&self, report: StoredTrustReport) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &TrustReportId) -> Result<Option<StoredTrustReport>, RepositoryError>;
}

pub trait TrustWalletRepository: Send + Sync {
    fn insert(&self, wallet: TrustWallet) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &TrustWalletId) -> Result<Option<TrustWallet>, RepositoryError>;
}

pub trait BusinessRepository: Send + Sync {
    fn insert(&self, business: Business) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError>;
    fn find_by_biller_code(&self, biller_code: &str)
        -> Result<Option<Business>, RepositoryError>;
}

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditActor {
    System,
    Business,
    Admin,
}

/// One audit trail row, written alongside every lifecycle transition.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub actor: AuditActor,
    pub action: String,
    pub entity: &'static str,
    pub entity_id: String,
    pub from_status: Option<&'static str>,
    pub to_status: Option<&'static str>,
    pub metadata: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Collaborator contract for the audit log writer.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Collaborator contract for credential encryption. The cipher itself
/// (a symmetric scheme keyed off the provider client secret) lives outside
/// this crate; entities only ever hold its output.
pub trait CredentialCipher: Send + Sync {
    fn seal(&self, plaintext: &str) -> EncryptedSecret;
}

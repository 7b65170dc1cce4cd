//! Core lending entities, the application state machine, and the storage
//! contracts every pipeline stage shares.

pub mod domain;
pub mod lifecycle;
pub mod repository;
pub mod service;

pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApprovalWorkflow, Business, BusinessId,
    CustomerDetails, EncryptedSecret, InstallmentFrequency, InstallmentPlan, InstallmentTerms,
    PaymentStatus, PaymentTransaction, TransactionId, TrustReportId, TrustWallet, TrustWalletId,
    WorkflowConfigError,
};
pub use lifecycle::{apply_review, transition, ReviewDecision, ReviewError, TransitionError};
pub use repository::{
    ApplicationRepository, AuditActor, AuditEntry, AuditSink, BusinessRepository,
    CredentialCipher, PaymentRepository, RepositoryError, StoredTrustReport,
    TrustReportRepository, TrustWalletRepository,
};
pub use service::{
    ApplicationIntake, ApplicationStatusView, ApplicationSubmission, CustomerSubmission,
    SubmissionError,
};

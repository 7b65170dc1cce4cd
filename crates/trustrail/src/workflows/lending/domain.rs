use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier wrapper for installment applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(format!("app_{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for a business's configured installment plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustWalletId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(pub String);

/// Identifier wrapper for installment payment transactions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn generate() -> Self {
        Self(format!("txn_{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for persisted trust-engine reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrustReportId(pub String);

impl TrustReportId {
    pub fn generate() -> Self {
        Self(format!("teo_{}", Uuid::new_v4().simple()))
    }
}

/// Ciphertext produced by the credential cipher collaborator.
///
/// Account numbers and BVNs are stored only in this form; the plaintext never
/// appears on the entities.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    pub fn from_ciphertext(ciphertext: String) -> Self {
        Self(ciphertext)
    }

    pub fn ciphertext(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptedSecret(..)")
    }
}

/// Customer identity and debit-authorization details captured at intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub account_number: EncryptedSecret,
    pub bank_code: String,
    pub bvn: EncryptedSecret,
}

impl CustomerDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Cadence of the recurring installment debits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentFrequency {
    Weekly,
    Monthly,
}

impl InstallmentFrequency {
    pub const fn label(self) -> &'static str {
        match self {
            InstallmentFrequency::Weekly => "weekly",
            InstallmentFrequency::Monthly => "monthly",
        }
    }
}

/// High level status tracked throughout an application's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    PendingAnalysis,
    Analyzing,
    Approved,
    Declined,
    FlaggedForReview,
    MandateCreated,
    MandateActive,
    Active,
    Completed,
    Defaulted,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::PendingAnalysis => "PENDING_ANALYSIS",
            ApplicationStatus::Analyzing => "ANALYZING",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Declined => "DECLINED",
            ApplicationStatus::FlaggedForReview => "FLAGGED_FOR_REVIEW",
            ApplicationStatus::MandateCreated => "MANDATE_CREATED",
            ApplicationStatus::MandateActive => "MANDATE_ACTIVE",
            ApplicationStatus::Active => "ACTIVE",
            ApplicationStatus::Completed => "COMPLETED",
            ApplicationStatus::Defaulted => "DEFAULTED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Declined
                | ApplicationStatus::Completed
                | ApplicationStatus::Defaulted
        )
    }
}

/// One customer's installment agreement under one trust wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub application_id: ApplicationId,
    pub trust_wallet_id: TrustWalletId,
    pub business_id: BusinessId,
    pub customer: CustomerDetails,

    pub total_amount: f64,
    pub down_payment_required: f64,
    pub installment_amount: f64,
    pub installment_count: u32,
    pub frequency: InstallmentFrequency,

    pub payments_completed: u32,
    pub total_paid: f64,
    pub outstanding_balance: f64,
    pub down_payment_received: bool,
    pub down_payment_amount: Option<f64>,

    pub mandate_ref: Option<String>,
    pub mandate_id: Option<String>,
    pub virtual_account_number: Option<String>,
    pub trust_report_id: Option<TrustReportId>,

    /// Raw statement export kept for the local scoring path.
    pub statement_csv: Option<String>,
    /// Handle of an externally stored statement document, when present the
    /// external analysis path is preferred.
    pub statement_file_handle: Option<String>,

    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub analyzed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub mandate_activated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Application {
    /// Fold a successful installment debit into the running totals.
    ///
    /// Keeps `outstanding_balance = total_amount - total_paid` floored at zero
    /// and `payments_completed <= installment_count`. Returns true when this
    /// payment was the final installment.
    pub fn register_payment(&mut self, amount: f64) -> bool {
        if self.payments_completed < self.installment_count {
            self.payments_completed += 1;
        }
        self.total_paid += amount;
        self.outstanding_balance = (self.outstanding_balance - amount).max(0.0);
        self.payments_completed >= self.installment_count
    }

    /// Fold the received down payment into the running totals.
    pub fn register_down_payment(&mut self, amount: f64, at: DateTime<Utc>) {
        self.down_payment_received = true;
        self.down_payment_amount = Some(amount);
        self.total_paid += amount;
        self.outstanding_balance = (self.outstanding_balance - amount).max(0.0);
        self.mandate_activated_at.get_or_insert(at);
    }
}

/// Financial terms derived from a wallet's installment plan at submission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstallmentTerms {
    pub down_payment_required: f64,
    pub installment_amount: f64,
}

impl InstallmentTerms {
    pub fn derive(total_amount: f64, plan: &InstallmentPlan) -> Self {
        let down_payment_required = total_amount * plan.down_payment_percentage / 100.0;
        let installment_amount =
            (total_amount - down_payment_required) / plan.installment_count as f64;
        Self {
            down_payment_required,
            installment_amount,
        }
    }
}

/// Installment plan embedded in a trust wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub down_payment_percentage: f64,
    pub installment_count: u32,
    pub frequency: InstallmentFrequency,
}

/// Decision thresholds a business configures per trust wallet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub auto_approve_threshold: u8,
    pub auto_decline_threshold: u8,
    pub min_trust_score: u8,
}

impl ApprovalWorkflow {
    /// Enforced when a wallet is configured, consumed at decision time.
    pub fn validate(&self) -> Result<(), WorkflowConfigError> {
        if self.auto_approve_threshold <= self.auto_decline_threshold {
            return Err(WorkflowConfigError::ThresholdsInverted {
                auto_approve: self.auto_approve_threshold,
                auto_decline: self.auto_decline_threshold,
            });
        }
        if self.min_trust_score > self.auto_approve_threshold {
            return Err(WorkflowConfigError::MinScoreAboveApprove {
                min_trust_score: self.min_trust_score,
                auto_approve: self.auto_approve_threshold,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WorkflowConfigError {
    #[error("auto-approve threshold {auto_approve} must be greater than auto-decline threshold {auto_decline}")]
    ThresholdsInverted { auto_approve: u8, auto_decline: u8 },
    #[error("minimum trust score {min_trust_score} must not exceed auto-approve threshold {auto_approve}")]
    MinScoreAboveApprove { min_trust_score: u8, auto_approve: u8 },
}

/// Per-business installment product configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustWallet {
    pub trust_wallet_id: TrustWalletId,
    pub business_id: BusinessId,
    pub name: String,
    pub installment_plan: InstallmentPlan,
    pub approval_workflow: ApprovalWorkflow,
}

/// Business account holding provider onboarding state and webhook settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Business {
    pub business_id: BusinessId,
    pub name: String,
    pub biller_code: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

/// Terminal and in-flight states of one installment debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Scheduled,
    Pending,
    Successful,
    Failed,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Scheduled => "SCHEDULED",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Successful => "SUCCESSFUL",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Successful | PaymentStatus::Failed)
    }
}

/// One scheduled or executed installment debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub transaction_id: TransactionId,
    pub application_id: ApplicationId,
    pub trust_wallet_id: TrustWalletId,
    pub business_id: BusinessId,
    pub amount: f64,
    pub status: PaymentStatus,
    pub payment_number: u32,
    pub total_payments: u32,
    pub scheduled_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub provider_ref: Option<String>,
    pub provider_payment_id: Option<String>,
    pub failure_reason: Option<String>,
}

/// Scheduled debit date for the n-th installment (1-indexed).
pub fn scheduled_date_for(
    activated_at: DateTime<Utc>,
    payment_number: u32,
    frequency: InstallmentFrequency,
) -> DateTime<Utc> {
    let offset = payment_number.saturating_sub(1);
    match frequency {
        InstallmentFrequency::Weekly => activated_at + Duration::weeks(offset as i64),
        InstallmentFrequency::Monthly => activated_at
            .checked_add_months(Months::new(offset))
            .unwrap_or(activated_at),
    }
}

/// Bulk-build the SCHEDULED installment rows for an application whose mandate
/// just became active.
pub fn build_schedule(app: &Application, activated_at: DateTime<Utc>) -> Vec<PaymentTransaction> {
    (1..=app.installment_count)
        .map(|payment_number| {
            let transaction_id = TransactionId::generate();
            PaymentTransaction {
                provider_ref: Some(transaction_id.0.clone()),
                transaction_id,
                application_id: app.application_id.clone(),
                trust_wallet_id: app.trust_wallet_id.clone(),
                business_id: app.business_id.clone(),
                amount: app.installment_amount,
                status: PaymentStatus::Scheduled,
                payment_number,
                total_payments: app.installment_count,
                scheduled_date: scheduled_date_for(activated_at, payment_number, app.frequency),
                paid_date: None,
                provider_payment_id: None,
                failure_reason: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealed(value: &str) -> EncryptedSecret {
        EncryptedSecret::from_ciphertext(format!("sealed:{value}"))
    }

    fn sample_application() -> Application {
        Application {
            application_id: ApplicationId("app_test".to_string()),
            trust_wallet_id: TrustWalletId("twl_test".to_string()),
            business_id: BusinessId("bus_test".to_string()),
            customer: CustomerDetails {
                first_name: "Ada".to_string(),
                last_name: "Obi".to_string(),
                email: "ada@example.com".to_string(),
                phone_number: "+2348000000000".to_string(),
                account_number: sealed("0123456789"),
                bank_code: "058".to_string(),
                bvn: sealed("22211133344"),
            },
            total_amount: 120_000.0,
            down_payment_required: 24_000.0,
            installment_amount: 9_600.0,
            installment_count: 10,
            frequency: InstallmentFrequency::Monthly,
            payments_completed: 0,
            total_paid: 0.0,
            outstanding_balance: 120_000.0,
            down_payment_received: false,
            down_payment_amount: None,
            mandate_ref: None,
            mandate_id: None,
            virtual_account_number: None,
            trust_report_id: None,
            statement_csv: None,
            statement_file_handle: None,
            status: ApplicationStatus::Active,
            submitted_at: Utc::now(),
            analyzed_at: None,
            approved_at: None,
            declined_at: None,
            mandate_activated_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn terms_follow_down_payment_percentage() {
        let plan = InstallmentPlan {
            down_payment_percentage: 20.0,
            installment_count: 10,
            frequency: InstallmentFrequency::Monthly,
        };
        let terms = InstallmentTerms::derive(120_000.0, &plan);
        assert_eq!(terms.down_payment_required, 24_000.0);
        assert_eq!(terms.installment_amount, 9_600.0);
    }

    #[test]
    fn workflow_rejects_inverted_thresholds() {
        let workflow = ApprovalWorkflow {
            auto_approve_threshold: 40,
            auto_decline_threshold: 70,
            min_trust_score: 30,
        };
        assert!(matches!(
            workflow.validate(),
            Err(WorkflowConfigError::ThresholdsInverted { .. })
        ));
    }

    #[test]
    fn workflow_rejects_min_score_above_approve() {
        let workflow = ApprovalWorkflow {
            auto_approve_threshold: 70,
            auto_decline_threshold: 40,
            min_trust_score: 80,
        };
        assert!(matches!(
            workflow.validate(),
            Err(WorkflowConfigError::MinScoreAboveApprove { .. })
        ));
    }

    #[test]
    fn register_payment_keeps_balance_identity() {
        let mut app = sample_application();
        app.register_down_payment(24_000.0, Utc::now());
        for _ in 0..9 {
            assert!(!app.register_payment(9_600.0));
        }
        assert!(app.register_payment(9_600.0));
        assert_eq!(app.payments_completed, 10);
        assert_eq!(app.total_paid, 120_000.0);
        assert_eq!(app.outstanding_balance, 0.0);
    }

    #[test]
    fn register_payment_caps_completed_count() {
        let mut app = sample_application();
        app.installment_count = 2;
        app.register_payment(9_600.0);
        app.register_payment(9_600.0);
        app.register_payment(9_600.0);
        assert_eq!(app.payments_completed, 2);
    }

    #[test]
    fn monthly_schedule_spaces_payments_by_month() {
        let activated = "2026-01-31T00:00:00Z".parse::<DateTime<Utc>>().expect("ts");
        let second = scheduled_date_for(activated, 2, InstallmentFrequency::Monthly);
        assert_eq!(second.to_rfc3339(), "2026-02-28T00:00:00+00:00");
        let weekly = scheduled_date_for(activated, 3, InstallmentFrequency::Weekly);
        assert_eq!(weekly - activated, Duration::weeks(2));
    }
}

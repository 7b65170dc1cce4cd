//! In-memory reference implementations of the storage and delivery contracts.
//!
//! These back the local service runtime and the test suites; a deployment
//! swaps them for database-backed implementations without touching the
//! pipeline code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::workflows::lending::domain::{
    Application, ApplicationId, ApplicationStatus, Business, BusinessId, EncryptedSecret,
    PaymentStatus, PaymentTransaction, TransactionId, TrustReportId, TrustWallet, TrustWalletId,
};
use crate::workflows::lending::repository::{
    ApplicationRepository, AuditEntry, AuditSink, BusinessRepository, CredentialCipher,
    PaymentRepository, RepositoryError, StoredTrustReport, TrustReportRepository,
    TrustWalletRepository,
};
use crate::workflows::notify::{BusinessNotifier, NotificationLog, NotificationLogRepository};
use crate::workflows::payments::events::{EventLogRepository, ProviderEventLog};

#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, Application>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, app: Application) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&app.application_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(app.application_id.clone(), app);
        Ok(())
    }

    fn update(&self, app: &Application) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&app.application_id) {
            guard.insert(app.application_id.clone(), app.clone());
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn pending_analysis(&self, limit: usize) -> Result<Vec<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        let mut pending: Vec<Application> = guard
            .values()
            .filter(|app| app.status == ApplicationStatus::PendingAnalysis)
            .cloned()
            .collect();
        pending.sort_by_key(|app| app.submitted_at);
        pending.truncate(limit);
        Ok(pending)
    }

    fn claim_for_analysis(&self, id: &ApplicationId) -> Result<bool, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let app = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if app.status == ApplicationStatus::PendingAnalysis {
            app.status = ApplicationStatus::Analyzing;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn by_status(&self, status: ApplicationStatus) -> Result<Vec<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|app| app.status == status)
            .cloned()
            .collect())
    }

    fn find_by_virtual_account(
        &self,
        account_number: &str,
    ) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|app| app.virtual_account_number.as_deref() == Some(account_number))
            .cloned())
    }

    fn find_by_mandate_ref(
        &self,
        mandate_ref: &str,
    ) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|app| app.mandate_ref.as_deref() == Some(mandate_ref))
            .cloned())
    }

    fn find_active_by_installment(
        &self,
        business_id: &BusinessId,
        amount: f64,
    ) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|app| {
                app.business_id == *business_id
                    && app.status == ApplicationStatus::Active
                    && (app.installment_amount - amount).abs() < 0.01
            })
            .max_by_key(|app| app.submitted_at)
            .cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    rows: Arc<Mutex<HashMap<TransactionId, PaymentTransaction>>>,
}

impl InMemoryPaymentRepository {
    /// Test helper: all rows for one application, ordered by payment number.
    pub fn for_application(&self, id: &ApplicationId) -> Vec<PaymentTransaction> {
        let guard = self.rows.lock().expect("repository mutex poisoned");
        let mut rows: Vec<PaymentTransaction> = guard
            .values()
            .filter(|row| row.application_id == *id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.payment_number);
        rows
    }
}

impl PaymentRepository for InMemoryPaymentRepository {
    fn insert(&self, payment: PaymentTransaction) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("repository mutex poisoned");
        let duplicate_number = guard.values().any(|row| {
            row.application_id == payment.application_id
                && row.payment_number == payment.payment_number
        });
        if duplicate_number || guard.contains_key(&payment.transaction_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(payment.transaction_id.clone(), payment);
        Ok(())
    }

    fn update(&self, payment: &PaymentTransaction) -> Result<(), RepositoryError> {
        let mut guard = self.rows.lock().expect("repository mutex poisoned");
        if guard.contains_key(&payment.transaction_id) {
            guard.insert(payment.transaction_id.clone(), payment.clone());
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &TransactionId) -> Result<Option<PaymentTransaction>, RepositoryError> {
        let guard = self.rows.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<PaymentTransaction>, RepositoryError> {
        let guard = self.rows.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|row| row.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    fn find_by_payment_number(
        &self,
        application_id: &ApplicationId,
        payment_number: u32,
    ) -> Result<Option<PaymentTransaction>, RepositoryError> {
        let guard = self.rows.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|row| {
                row.application_id == *application_id && row.payment_number == payment_number
            })
            .cloned())
    }

    fn failed_count(&self, application_id: &ApplicationId) -> Result<u32, RepositoryError> {
        let guard = self.rows.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|row| {
                row.application_id == *application_id && row.status == PaymentStatus::Failed
            })
            .count() as u32)
    }

    fn overdue_scheduled(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentTransaction>, RepositoryError> {
        let guard = self.rows.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|row| row.status == PaymentStatus::Scheduled && row.scheduled_date < now)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTrustReportRepository {
    reports: Arc<Mutex<HashMap<TrustReportId, StoredTrustReport>>>,
}

impl TrustReportRepository for InMemoryTrustReportRepository {
    fn insert(&self, report: StoredTrustReport) -> Result<(), RepositoryError> {
        let mut guard = self.reports.lock().expect("repository mutex poisoned");
        if guard.contains_key(&report.report_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(report.report_id.clone(), report);
        Ok(())
    }

    fn fetch(&self, id: &TrustReportId) -> Result<Option<StoredTrustReport>, RepositoryError> {
        let guard = self.reports.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTrustWalletRepository {
    wallets: Arc<Mutex<HashMap<TrustWalletId, TrustWallet>>>,
}

impl TrustWalletRepository for InMemoryTrustWalletRepository {
    fn insert(&self, wallet: TrustWallet) -> Result<(), RepositoryError> {
        let mut guard = self.wallets.lock().expect("repository mutex poisoned");
        if guard.contains_key(&wallet.trust_wallet_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(wallet.trust_wallet_id.clone(), wallet);
        Ok(())
    }

    fn fetch(&self, id: &TrustWalletId) -> Result<Option<TrustWallet>, RepositoryError> {
        let guard = self.wallets.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryBusinessRepository {
    businesses: Arc<Mutex<HashMap<BusinessId, Business>>>,
}

impl BusinessRepository for InMemoryBusinessRepository {
    fn insert(&self, business: Business) -> Result<(), RepositoryError> {
        let mut guard = self.businesses.lock().expect("repository mutex poisoned");
        if guard.contains_key(&business.business_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(business.business_id.clone(), business);
        Ok(())
    }

    fn fetch(&self, id: &BusinessId) -> Result<Option<Business>, RepositoryError> {
        let guard = self.businesses.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_biller_code(
        &self,
        biller_code: &str,
    ) -> Result<Option<Business>, RepositoryError> {
        let guard = self.businesses.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|business| business.biller_code.as_deref() == Some(biller_code))
            .cloned())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryEventLog {
    entries: Arc<Mutex<Vec<ProviderEventLog>>>,
}

impl InMemoryEventLog {
    pub fn entries(&self) -> Vec<ProviderEventLog> {
        self.entries.lock().expect("event log mutex poisoned").clone()
    }
}

impl EventLogRepository for InMemoryEventLog {
    fn insert(&self, log: ProviderEventLog) -> Result<(), RepositoryError> {
        let mut guard = self.entries.lock().expect("event log mutex poisoned");
        guard.push(log);
        Ok(())
    }

    fn update(&self, log: &ProviderEventLog) -> Result<(), RepositoryError> {
        let mut guard = self.entries.lock().expect("event log mutex poisoned");
        match guard.iter_mut().find(|entry| entry.log_id == log.log_id) {
            Some(entry) => {
                *entry = log.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}

#[derive(Default, Clone)]
pub struct InMemoryNotificationLog {
    entries: Arc<Mutex<Vec<NotificationLog>>>,
}

impl InMemoryNotificationLog {
    pub fn entries(&self) -> Vec<NotificationLog> {
        self.entries
            .lock()
            .expect("notification log mutex poisoned")
            .clone()
    }
}

impl NotificationLogRepository for InMemoryNotificationLog {
    fn insert(&self, log: NotificationLog) -> Result<(), RepositoryError> {
        let mut guard = self
            .entries
            .lock()
            .expect("notification log mutex poisoned");
        guard.push(log);
        Ok(())
    }

    fn update(&self, log: &NotificationLog) -> Result<(), RepositoryError> {
        let mut guard = self
            .entries
            .lock()
            .expect("notification log mutex poisoned");
        match guard.iter_mut().find(|entry| entry.log_id == log.log_id) {
            Some(entry) => {
                *entry = log.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn retryable(
        &self,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<NotificationLog>, RepositoryError> {
        use crate::workflows::notify::DeliveryStatus;
        let guard = self
            .entries
            .lock()
            .expect("notification log mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| entry.status == DeliveryStatus::Failed && entry.attempts < max_attempts)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex poisoned").clone()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .expect("audit mutex poisoned")
            .push(entry);
    }
}

/// Captured business notification, for assertions.
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub business_id: BusinessId,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Notifier that records instead of delivering.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<RecordedNotification>>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<RecordedNotification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl BusinessNotifier for RecordingNotifier {
    async fn notify(
        &self,
        business_id: &BusinessId,
        event: &str,
        payload: serde_json::Value,
    ) -> bool {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(RecordedNotification {
                business_id: business_id.clone(),
                event: event.to_string(),
                payload,
            });
        true
    }
}

/// Stand-in for the external symmetric cipher: tags the plaintext rather than
/// protecting it. Only for local runs and tests.
#[derive(Default, Clone)]
pub struct PrefixCipher;

impl CredentialCipher for PrefixCipher {
    fn seal(&self, plaintext: &str) -> EncryptedSecret {
        EncryptedSecret::from_ciphertext(format!("sealed:{plaintext}"))
    }
}

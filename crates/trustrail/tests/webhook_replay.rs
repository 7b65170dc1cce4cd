//! Duplicate, out-of-order, and threshold behavior of the webhook reconciler
//! and the default monitor, driven against seeded in-memory state.

mod common {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    use trustrail::workflows::lending::domain::{
        Application, ApplicationId, ApplicationStatus, Business, BusinessId, CustomerDetails,
        EncryptedSecret, InstallmentFrequency, PaymentStatus, PaymentTransaction, TransactionId,
        TrustWalletId,
    };
    use trustrail::workflows::memory::{
        InMemoryApplicationRepository, InMemoryAuditSink, InMemoryBusinessRepository,
        InMemoryEventLog, InMemoryPaymentRepository, RecordingNotifier,
    };
    use trustrail::workflows::payments::{DefaultMonitor, PaymentEventReconciler};
    use trustrail::workflows::provider::signature::request_signature;
    use trustrail::workflows::provider::{
        InvoiceRequest, MandateHandle, MandateProvider, MerchantHandle, MerchantProfile,
        ProviderError, VirtualAccount,
    };

    pub(super) const API_KEY: &str = "test-api-key";

    /// Provider double that should never be reached by these scenarios.
    pub(super) struct UnusedProvider;

    #[async_trait]
    impl MandateProvider for UnusedProvider {
        async fn create_merchant(
            &self,
            _profile: &MerchantProfile,
        ) -> Result<MerchantHandle, ProviderError> {
            Err(ProviderError::Rejected("not expected in this test".into()))
        }

        async fn create_mandate(
            &self,
            _customer: &CustomerDetails,
            _biller_code: &str,
            _total_amount: f64,
        ) -> Result<MandateHandle, ProviderError> {
            Err(ProviderError::Rejected("not expected in this test".into()))
        }

        async fn send_invoice(
            &self,
            _invoice: &InvoiceRequest,
        ) -> Result<VirtualAccount, ProviderError> {
            Err(ProviderError::Rejected("not expected in this test".into()))
        }
    }

    pub(super) struct Harness {
        pub(super) applications: Arc<InMemoryApplicationRepository>,
        pub(super) payments: Arc<InMemoryPaymentRepository>,
        pub(super) notifier: Arc<RecordingNotifier>,
        pub(super) reconciler: PaymentEventReconciler,
        pub(super) monitor: DefaultMonitor,
    }

    pub(super) fn harness() -> Harness {
        use trustrail::workflows::lending::repository::BusinessRepository;

        let applications = Arc::new(InMemoryApplicationRepository::default());
        let payments = Arc::new(InMemoryPaymentRepository::default());
        let businesses = Arc::new(InMemoryBusinessRepository::default());
        let event_log = Arc::new(InMemoryEventLog::default());
        let audit = Arc::new(InMemoryAuditSink::default());
        let notifier = Arc::new(RecordingNotifier::default());

        businesses
            .insert(Business {
                business_id: BusinessId("bus_1".to_string()),
                name: "Mama Nkechi Stores".to_string(),
                biller_code: Some("BLR0001".to_string()),
                webhook_url: None,
                webhook_secret: None,
            })
            .expect("business seeds");

        let reconciler = PaymentEventReconciler::new(
            applications.clone(),
            payments.clone(),
            businesses.clone(),
            event_log,
            Arc::new(UnusedProvider),
            notifier.clone(),
            audit.clone(),
            API_KEY.to_string(),
        );
        let monitor = DefaultMonitor::new(
            applications.clone(),
            payments.clone(),
            notifier.clone(),
            audit,
        );

        Harness {
            applications,
            payments,
            notifier,
            reconciler,
            monitor,
        }
    }

    fn sealed(value: &str) -> EncryptedSecret {
        EncryptedSecret::from_ciphertext(format!("sealed:{value}"))
    }

    /// An application mid-servicing: mandate active, down payment received.
    pub(super) fn active_application(
        id: &str,
        installment_count: u32,
        installment_amount: f64,
        now: DateTime<Utc>,
    ) -> Application {
        let total_amount = installment_amount * installment_count as f64 / 0.8;
        let down_payment = total_amount * 0.2;
        Application {
            application_id: ApplicationId(id.to_string()),
            trust_wallet_id: TrustWalletId("twl_1".to_string()),
            business_id: BusinessId("bus_1".to_string()),
            customer: CustomerDetails {
                first_name: "Ada".to_string(),
                last_name: "Obi".to_string(),
                email: "ada@example.com".to_string(),
                phone_number: "+2348000000000".to_string(),
                account_number: sealed("0123456789"),
                bank_code: "058".to_string(),
                bvn: sealed("22211133344"),
            },
            total_amount,
            down_payment_required: down_payment,
            installment_amount,
            installment_count,
            frequency: InstallmentFrequency::Monthly,
            payments_completed: 0,
            total_paid: down_payment,
            outstanding_balance: total_amount - down_payment,
            down_payment_received: true,
            down_payment_amount: Some(down_payment),
            mandate_ref: Some(format!("MND-{id}")),
            mandate_id: Some("777".to_string()),
            virtual_account_number: Some(format!("99-{id}")),
            trust_report_id: None,
            statement_csv: None,
            statement_file_handle: None,
            status: ApplicationStatus::Active,
            submitted_at: now,
            analyzed_at: Some(now),
            approved_at: Some(now),
            declined_at: None,
            mandate_activated_at: Some(now),
            completed_at: None,
        }
    }

    pub(super) fn scheduled_row(
        app: &Application,
        payment_number: u32,
        now: DateTime<Utc>,
    ) -> PaymentTransaction {
        let transaction_id = TransactionId(format!("{}-p{payment_number}", app.application_id.0));
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
            scheduled_date: now,
            paid_date: None,
            provider_payment_id: None,
            failure_reason: None,
        }
    }

    pub(super) fn debit_event(
        tag: &str,
        provider_ref: &str,
        amount: f64,
        successful: bool,
    ) -> serde_json::Value {
        let request_ref = format!("req_{tag}");
        let signature = request_signature(API_KEY, &request_ref);
        serde_json::json!({
            "request_ref": request_ref,
            "signature_hash": signature,
            "details": {
                "transaction_ref": provider_ref,
                "status": if successful { "Successful" } else { "Failed" },
                "amount": amount,
                "meta": {
                    "biller_code": "BLR0001",
                    "reason": "card declined",
                },
            },
        })
    }

    pub(super) fn credit_event(tag: &str, virtual_account: &str, amount: f64) -> serde_json::Value {
        let request_ref = format!("req_{tag}");
        let signature = request_signature(API_KEY, &request_ref);
        serde_json::json!({
            "request_ref": request_ref,
            "signature_hash": signature,
            "details": {
                "amount": amount,
                "meta": { "cr_account": virtual_account },
            },
        })
    }
}

use chrono::Utc;
use common::{active_application, credit_event, debit_event, harness, scheduled_row};
use trustrail::workflows::lending::domain::{ApplicationStatus, PaymentStatus};
use trustrail::workflows::lending::repository::{ApplicationRepository, PaymentRepository};

#[tokio::test]
async fn replayed_debit_success_is_a_no_op() {
    let h = harness();
    let now = Utc::now();
    let app = active_application("app_replay", 10, 9_600.0, now);
    h.applications.insert(app.clone()).expect("insert");
    for number in 1..=10 {
        h.payments
            .insert(scheduled_row(&app, number, now))
            .expect("schedule");
    }

    let event = debit_event("d1", "app_replay-p1", 9_600.0, true);
    assert!(h.reconciler.process(event.clone(), now).await);
    let after_first = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");

    // Same terminal webhook again: totals must not move.
    assert!(h.reconciler.process(event, now).await);
    let after_second = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");

    assert_eq!(after_first.payments_completed, 1);
    assert_eq!(after_second.payments_completed, after_first.payments_completed);
    assert_eq!(after_second.total_paid, after_first.total_paid);
    assert_eq!(
        after_second.outstanding_balance,
        after_first.outstanding_balance
    );
}

#[tokio::test]
async fn completion_happens_exactly_at_the_final_installment() {
    let h = harness();
    let now = Utc::now();
    let app = active_application("app_complete", 5, 10_000.0, now);
    h.applications.insert(app.clone()).expect("insert");
    for number in 1..=5 {
        h.payments
            .insert(scheduled_row(&app, number, now))
            .expect("schedule");
    }

    for number in 1..=4 {
        let event = debit_event(
            &format!("c{number}"),
            &format!("app_complete-p{number}"),
            10_000.0,
            true,
        );
        assert!(h.reconciler.process(event, now).await);
        let state = h
            .applications
            .fetch(&app.application_id)
            .expect("fetch")
            .expect("present");
        assert_eq!(state.status, ApplicationStatus::Active, "not complete at {number}");
    }

    let final_event = debit_event("c5", "app_complete-p5", 10_000.0, true);
    assert!(h.reconciler.process(final_event.clone(), now).await);
    let completed = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(completed.status, ApplicationStatus::Completed);
    assert_eq!(completed.payments_completed, 5);
    assert_eq!(completed.outstanding_balance, 0.0);

    // A sixth duplicate delivery cannot complete it twice or move totals.
    assert!(h.reconciler.process(final_event, now).await);
    let replayed = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(replayed.payments_completed, 5);
    assert_eq!(replayed.total_paid, completed.total_paid);
}

#[tokio::test]
async fn provider_initiated_debit_attaches_to_the_open_installment() {
    let h = harness();
    let now = Utc::now();
    let app = active_application("app_attach", 10, 9_600.0, now);
    h.applications.insert(app.clone()).expect("insert");
    for number in 1..=10 {
        h.payments
            .insert(scheduled_row(&app, number, now))
            .expect("schedule");
    }

    // Reference we never issued: the reconciler matches by biller + amount
    // and adopts the next open installment row instead of duplicating it.
    let event = debit_event("a1", "PWA-INITIATED-REF", 9_600.0, true);
    assert!(h.reconciler.process(event, now).await);

    let rows = h.payments.for_application(&app.application_id);
    assert_eq!(rows.len(), 10);
    let first = &rows[0];
    assert_eq!(first.payment_number, 1);
    assert_eq!(first.status, PaymentStatus::Successful);
    assert_eq!(first.provider_ref.as_deref(), Some("PWA-INITIATED-REF"));

    let state = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(state.payments_completed, 1);
}

#[tokio::test]
async fn failed_debits_default_only_at_the_threshold_and_only_once() {
    let h = harness();
    let now = Utc::now();
    let app = active_application("app_default", 10, 9_600.0, now);
    h.applications.insert(app.clone()).expect("insert");
    for number in 1..=10 {
        h.payments
            .insert(scheduled_row(&app, number, now))
            .expect("schedule");
    }

    for number in 1..=2 {
        let event = debit_event(
            &format!("f{number}"),
            &format!("app_default-p{number}"),
            9_600.0,
            false,
        );
        assert!(h.reconciler.process(event, now).await);
    }

    h.monitor.run_once(now).await;
    let still_active = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(still_active.status, ApplicationStatus::Active);

    let third = debit_event("f3", "app_default-p3", 9_600.0, false);
    assert!(h.reconciler.process(third, now).await);

    h.monitor.run_once(now).await;
    h.monitor.run_once(now).await;

    let defaulted = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(defaulted.status, ApplicationStatus::Defaulted);

    let defaulted_events = h
        .notifier
        .events()
        .into_iter()
        .filter(|event| event.event == "application.defaulted")
        .count();
    assert_eq!(defaulted_events, 1);
}

#[tokio::test]
async fn replayed_down_payment_credit_is_a_no_op() {
    let h = harness();
    let now = Utc::now();
    let mut app = active_application("app_credit", 10, 9_600.0, now);
    // Rewind to the moment just before the down payment arrived.
    app.status = ApplicationStatus::MandateActive;
    app.down_payment_received = false;
    app.down_payment_amount = None;
    app.total_paid = 0.0;
    app.outstanding_balance = app.total_amount;
    let virtual_account = app.virtual_account_number.clone().expect("virtual account");
    h.applications.insert(app.clone()).expect("insert");

    let event = credit_event("k1", &virtual_account, app.down_payment_required);
    assert!(h.reconciler.process(event.clone(), now).await);
    let after_first = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(after_first.status, ApplicationStatus::Active);

    assert!(h.reconciler.process(event, now).await);
    let after_second = h
        .applications
        .fetch(&app.application_id)
        .expect("fetch")
        .expect("present");
    assert_eq!(after_second.total_paid, after_first.total_paid);
    assert_eq!(
        after_second.outstanding_balance,
        after_first.outstanding_balance
    );
}

use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryMandateProvider};
use crate::routes::{with_service_routes, ServiceState};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;
use trustrail::config::AppConfig;
use trustrail::error::AppError;
use trustrail::telemetry;
use trustrail::workflows::lending::service::ApplicationIntake;
use trustrail::workflows::memory::{
    InMemoryApplicationRepository, InMemoryAuditSink, InMemoryBusinessRepository,
    InMemoryEventLog, InMemoryNotificationLog, InMemoryPaymentRepository,
    InMemoryTrustReportRepository, InMemoryTrustWalletRepository, PrefixCipher,
};
use trustrail::workflows::notify::{BusinessNotifier, HttpBusinessNotifier};
use trustrail::workflows::origination::OriginationOrchestrator;
use trustrail::workflows::payments::{DefaultMonitor, PaymentEventReconciler};
use trustrail::workflows::provider::{HttpMandateProvider, MandateProvider};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let applications = Arc::new(InMemoryApplicationRepository::default());
    let payments = Arc::new(InMemoryPaymentRepository::default());
    let wallets = Arc::new(InMemoryTrustWalletRepository::default());
    let businesses = Arc::new(InMemoryBusinessRepository::default());
    let reports = Arc::new(InMemoryTrustReportRepository::default());
    let event_log = Arc::new(InMemoryEventLog::default());
    let notification_log = Arc::new(InMemoryNotificationLog::default());
    let audit = Arc::new(InMemoryAuditSink::default());

    let provider: Arc<dyn MandateProvider> = match config.provider.base_url.clone() {
        Some(base_url) => Arc::new(HttpMandateProvider::new(
            base_url,
            config.provider.api_key.clone(),
            config.provider.mock_mode.clone(),
        )),
        None => Arc::new(InMemoryMandateProvider::default()),
    };
    let http_notifier = Arc::new(HttpBusinessNotifier::new(
        businesses.clone(),
        notification_log.clone(),
    ));
    let notifier: Arc<dyn BusinessNotifier> = http_notifier.clone();

    let intake = Arc::new(ApplicationIntake::new(
        wallets.clone(),
        applications.clone(),
        Arc::new(PrefixCipher),
        audit.clone(),
    ));
    let orchestrator = Arc::new(OriginationOrchestrator::new(
        applications.clone(),
        wallets.clone(),
        businesses.clone(),
        reports.clone(),
        payments.clone(),
        provider.clone(),
        notifier.clone(),
        audit.clone(),
        None,
        config.jobs.analysis_batch_size,
    ));
    let monitor = Arc::new(DefaultMonitor::new(
        applications.clone(),
        payments.clone(),
        notifier.clone(),
        audit.clone(),
    ));
    let reconciler = Arc::new(PaymentEventReconciler::new(
        applications.clone(),
        payments.clone(),
        businesses.clone(),
        event_log.clone(),
        provider.clone(),
        notifier.clone(),
        audit.clone(),
        config.provider.api_key.clone(),
    ));

    spawn_polling_job(
        orchestrator.clone(),
        config.jobs.origination_interval_secs,
        "statement-analysis",
    );
    spawn_monitor_job(monitor, config.jobs.monitor_interval_secs);
    spawn_notification_retry_job(http_notifier, config.jobs.notify_retry_interval_secs);

    let service_state = ServiceState {
        intake,
        applications,
        businesses,
        reconciler,
        orchestrator,
        provider,
        notifier,
        audit,
    };

    let app = with_service_routes(service_state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "installment servicing backend ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn spawn_polling_job(
    orchestrator: Arc<OriginationOrchestrator>,
    interval_secs: u64,
    name: &'static str,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            info!(job = name, "job tick");
            orchestrator.run_once(Utc::now()).await;
        }
    });
}

fn spawn_monitor_job(monitor: Arc<DefaultMonitor>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            monitor.run_once(Utc::now()).await;
        }
    });
}

fn spawn_notification_retry_job(notifier: Arc<HttpBusinessNotifier>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let delivered = notifier.retry_failed().await;
            if delivered > 0 {
                info!(delivered, "redelivered failed business notifications");
            }
        }
    });
}

use crate::infra::AppState;
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use trustrail::error::AppError;
use trustrail::workflows::lending::domain::{ApplicationId, ApplicationStatus, Business, BusinessId};
use trustrail::workflows::lending::lifecycle::{apply_review, ReviewDecision};
use trustrail::workflows::lending::repository::{
    ApplicationRepository, AuditActor, AuditEntry, AuditSink, BusinessRepository, RepositoryError,
};
use trustrail::workflows::lending::service::{
    ApplicationIntake, ApplicationStatusView, ApplicationSubmission,
};
use trustrail::workflows::notify::BusinessNotifier;
use trustrail::workflows::origination::{OriginationError, OriginationOrchestrator};
use trustrail::workflows::payments::PaymentEventReconciler;
use trustrail::workflows::provider::{MandateProvider, MerchantProfile};

/// Handles and collaborators the HTTP surface needs.
#[derive(Clone)]
pub(crate) struct ServiceState {
    pub(crate) intake: Arc<ApplicationIntake>,
    pub(crate) applications: Arc<dyn ApplicationRepository>,
    pub(crate) businesses: Arc<dyn BusinessRepository>,
    pub(crate) reconciler: Arc<PaymentEventReconciler>,
    pub(crate) orchestrator: Arc<OriginationOrchestrator>,
    pub(crate) provider: Arc<dyn MandateProvider>,
    pub(crate) notifier: Arc<dyn BusinessNotifier>,
    pub(crate) audit: Arc<dyn AuditSink>,
}

pub(crate) fn with_service_routes(service: ServiceState) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/businesses",
            axum::routing::post(onboard_business_endpoint),
        )
        .route(
            "/api/v1/applications",
            axum::routing::post(submit_application_endpoint),
        )
        .route(
            "/api/v1/applications/:id",
            axum::routing::get(application_status_endpoint),
        )
        .route(
            "/api/v1/applications/:id/review",
            axum::routing::post(review_application_endpoint),
        )
        .route(
            "/webhooks/provider",
            axum::routing::post(provider_webhook_endpoint),
        )
        .layer(Extension(service))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct BusinessOnboardingRequest {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) phone_number: String,
    pub(crate) rc_number: String,
    pub(crate) settlement_account_number: String,
    pub(crate) settlement_bank_code: String,
    pub(crate) settlement_account_name: String,
    #[serde(default)]
    pub(crate) webhook_url: Option<String>,
}

/// Register a business: onboards it with the provider to obtain a biller
/// code, and issues a webhook signing secret when a URL is configured.
pub(crate) async fn onboard_business_endpoint(
    Extension(service): Extension<ServiceState>,
    Json(request): Json<BusinessOnboardingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let profile = MerchantProfile {
        business_name: request.name.clone(),
        email: request.email,
        phone_number: request.phone_number,
        rc_number: request.rc_number,
        settlement_account_number: request.settlement_account_number,
        settlement_bank_code: request.settlement_bank_code,
        settlement_account_name: request.settlement_account_name,
    };
    let merchant = service
        .provider
        .create_merchant(&profile)
        .await
        .map_err(OriginationError::Provider)?;

    let business = Business {
        business_id: BusinessId(format!("bus_{}", uuid_simple())),
        name: request.name,
        biller_code: Some(merchant.biller_code.clone()),
        webhook_secret: request
            .webhook_url
            .as_ref()
            .map(|_| format!("whsec_{}", uuid_simple())),
        webhook_url: request.webhook_url,
    };
    service.businesses.insert(business.clone())?;
    service.audit.record(AuditEntry {
        actor: AuditActor::Admin,
        action: "business.onboarded".to_string(),
        entity: "Business",
        entity_id: business.business_id.0.clone(),
        from_status: None,
        to_status: None,
        metadata: json!({ "billerCode": merchant.biller_code }),
        at: Utc::now(),
    });

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "businessId": business.business_id.0,
            "billerCode": business.biller_code,
            "webhookUrl": business.webhook_url,
            "webhookSecret": business.webhook_secret,
        })),
    ))
}

fn uuid_simple() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) async fn submit_application_endpoint(
    Extension(service): Extension<ServiceState>,
    Json(submission): Json<ApplicationSubmission>,
) -> Result<impl IntoResponse, AppError> {
    let app = service.intake.submit(submission, Utc::now())?;
    Ok((
        StatusCode::CREATED,
        Json(ApplicationStatusView::from_application(&app)),
    ))
}

pub(crate) async fn application_status_endpoint(
    Extension(service): Extension<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<ApplicationStatusView>, AppError> {
    let app = service
        .applications
        .fetch(&ApplicationId(id))?
        .ok_or(AppError::Repository(RepositoryError::NotFound))?;
    Ok(Json(ApplicationStatusView::from_application(&app)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub(crate) decision: ReviewAction,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ReviewAction {
    Approve,
    Decline,
}

/// Operator decision on a flagged application. Approval re-enters the
/// mandate pipeline immediately.
pub(crate) async fn review_application_endpoint(
    Extension(service): Extension<ServiceState>,
    Path(id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<ApplicationStatusView>, AppError> {
    let now = Utc::now();
    let app_id = ApplicationId(id);
    let mut app = service
        .applications
        .fetch(&app_id)?
        .ok_or(AppError::Repository(RepositoryError::NotFound))?;

    let decision = match request.decision {
        ReviewAction::Approve => ReviewDecision::Approve,
        ReviewAction::Decline => ReviewDecision::Decline,
    };
    let previous = app.status;
    let next = apply_review(&mut app, decision, now)?;
    service.applications.update(&app)?;
    service.audit.record(AuditEntry {
        actor: AuditActor::Admin,
        action: "application.reviewed".to_string(),
        entity: "Application",
        entity_id: app.application_id.0.clone(),
        from_status: Some(previous.label()),
        to_status: Some(next.label()),
        metadata: json!({ "decision": next.label() }),
        at: now,
    });

    if next == ApplicationStatus::Approved {
        let business = service
            .businesses
            .fetch(&app.business_id)?
            .ok_or(AppError::Repository(RepositoryError::NotFound))?;
        service
            .orchestrator
            .complete_approval(&mut app, &business, now)
            .await?;
        service
            .notifier
            .notify(
                &app.business_id,
                "application.approved",
                json!({
                    "event": "application.approved",
                    "applicationId": app.application_id.0,
                    "trustWalletId": app.trust_wallet_id.0,
                    "customerName": app.customer.full_name(),
                    "decision": "APPROVED",
                    "mandateRef": app.mandate_ref,
                    "virtualAccountNumber": app.virtual_account_number,
                    "downPaymentRequired": app.down_payment_required,
                    "message": "Approved after manual review",
                }),
            )
            .await;
    } else {
        service
            .notifier
            .notify(
                &app.business_id,
                "application.declined",
                json!({
                    "event": "application.declined",
                    "applicationId": app.application_id.0,
                    "trustWalletId": app.trust_wallet_id.0,
                    "customerName": app.customer.full_name(),
                    "decision": "DECLINED",
                    "message": "Declined after manual review",
                }),
            )
            .await;
    }

    Ok(Json(ApplicationStatusView::from_application(&app)))
}

/// Provider push endpoint. Always acknowledges with 200 so the provider does
/// not retry-storm us; the processing outcome only reaches the event log.
pub(crate) async fn provider_webhook_endpoint(
    Extension(service): Extension<ServiceState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let processed = service.reconciler.process(payload, Utc::now()).await;
    if processed {
        Json(json!({ "success": true, "message": "Webhook received" }))
    } else {
        Json(json!({ "success": false, "message": "Webhook received but processing failed" }))
    }
}

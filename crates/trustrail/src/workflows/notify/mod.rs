//! Outbound business notifications.
//!
//! Every lifecycle transition of interest is pushed to the business's
//! configured webhook URL as a signed JSON envelope. Delivery is logged with
//! attempt counts; failures are not retried inline. A bounded retry sweep is
//! exposed for a scheduler to call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::workflows::lending::domain::BusinessId;
use crate::workflows::lending::repository::{BusinessRepository, RepositoryError};
use crate::workflows::provider::signature::notification_signature;

pub const MAX_DELIVERY_ATTEMPTS: u32 = 4;

pub const EVENT_HEADER: &str = "X-TrustRail-Event";
pub const SIGNATURE_HEADER: &str = "X-TrustRail-Signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

/// One delivery attempt trail for a business notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub log_id: String,
    pub business_id: BusinessId,
    pub event: String,
    pub payload: serde_json::Value,
    pub url: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

pub trait NotificationLogRepository: Send + Sync {
    fn insert(&self, log: NotificationLog) -> Result<(), RepositoryError>;
    fn update(&self, log: &NotificationLog) -> Result<(), RepositoryError>;
    /// Failed deliveries still under the attempt ceiling, for the retry sweep.
    fn retryable(&self, max_attempts: u32, limit: usize)
        -> Result<Vec<NotificationLog>, RepositoryError>;
}

/// Contract the pipeline stages use to reach businesses.
///
/// Returns whether the notification was delivered; failures are logged, never
/// propagated, so a dead business endpoint cannot stall the pipeline.
#[async_trait]
pub trait BusinessNotifier: Send + Sync {
    async fn notify(&self, business_id: &BusinessId, event: &str, payload: serde_json::Value)
        -> bool;
}

/// HTTP implementation posting signed envelopes to the business's URL.
pub struct HttpBusinessNotifier {
    businesses: Arc<dyn BusinessRepository>,
    log: Arc<dyn NotificationLogRepository>,
    http: reqwest::Client,
}

impl HttpBusinessNotifier {
    pub fn new(
        businesses: Arc<dyn BusinessRepository>,
        log: Arc<dyn NotificationLogRepository>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            businesses,
            log,
            http,
        }
    }

    async fn deliver(
        &self,
        url: &str,
        event: &str,
        payload: &serde_json::Value,
        secret: Option<&str>,
    ) -> Result<u16, (Option<u16>, String)> {
        let body = payload.to_string();
        let mut request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, event);
        if let Some(secret) = secret {
            request = request.header(SIGNATURE_HEADER, notification_signature(&body, secret));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|err| (err.status().map(|s| s.as_u16()), err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err((
                Some(status.as_u16()),
                format!("endpoint answered {status}"),
            ))
        }
    }

    /// Bounded retry sweep over failed deliveries. Returns how many were
    /// delivered this pass.
    pub async fn retry_failed(&self) -> usize {
        let retryable = match self.log.retryable(MAX_DELIVERY_ATTEMPTS, 50) {
            Ok(entries) => entries,
            Err(err) => {
                error!(%err, "could not load retryable notifications");
                return 0;
            }
        };

        let mut delivered = 0;
        for mut entry in retryable {
            let Ok(Some(business)) = self.businesses.fetch(&entry.business_id) else {
                continue;
            };
            let Some(url) = business.webhook_url.as_deref() else {
                continue;
            };

            entry.attempts += 1;
            match self
                .deliver(url, &entry.event, &entry.payload, business.webhook_secret.as_deref())
                .await
            {
                Ok(http_status) => {
                    entry.status = DeliveryStatus::Delivered;
                    entry.http_status = Some(http_status);
                    entry.error = None;
                    entry.delivered_at = Some(Utc::now());
                    delivered += 1;
                }
                Err((http_status, message)) => {
                    entry.http_status = http_status;
                    entry.error = Some(message);
                }
            }
            if let Err(err) = self.log.update(&entry) {
                error!(%err, log_id = %entry.log_id, "could not update notification log");
            }
        }
        delivered
    }
}

#[async_trait]
impl BusinessNotifier for HttpBusinessNotifier {
    async fn notify(
        &self,
        business_id: &BusinessId,
        event: &str,
        payload: serde_json::Value,
    ) -> bool {
        let business = match self.businesses.fetch(business_id) {
            Ok(Some(business)) => business,
            Ok(None) => {
                error!(business_id = %business_id.0, event, "notification for unknown business");
                return false;
            }
            Err(err) => {
                error!(%err, event, "could not load business for notification");
                return false;
            }
        };

        let Some(url) = business.webhook_url.clone() else {
            debug!(business_id = %business_id.0, event, "no webhook URL configured, skipping");
            return false;
        };

        let mut entry = NotificationLog {
            log_id: format!("bwl_{}", Uuid::new_v4().simple()),
            business_id: business_id.clone(),
            event: event.to_string(),
            payload,
            url: url.clone(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            http_status: None,
            error: None,
            sent_at: Utc::now(),
            delivered_at: None,
        };
        if let Err(err) = self.log.insert(entry.clone()) {
            error!(%err, event, "could not record notification log");
        }

        entry.attempts = 1;
        let delivered = match self
            .deliver(&url, event, &entry.payload, business.webhook_secret.as_deref())
            .await
        {
            Ok(http_status) => {
                entry.status = DeliveryStatus::Delivered;
                entry.http_status = Some(http_status);
                entry.delivered_at = Some(Utc::now());
                info!(business_id = %business_id.0, event, "notification delivered");
                true
            }
            Err((http_status, message)) => {
                entry.status = DeliveryStatus::Failed;
                entry.http_status = http_status;
                entry.error = Some(message.clone());
                error!(business_id = %business_id.0, event, %message, "notification delivery failed");
                false
            }
        };

        if let Err(err) = self.log.update(&entry) {
            error!(%err, log_id = %entry.log_id, "could not update notification log");
        }
        delivered
    }
}

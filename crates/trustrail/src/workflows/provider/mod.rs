//! Client for the payment-mandate provider.
//!
//! Three request types cover the whole integration: merchant onboarding at
//! business registration, mandate creation after approval, and invoice
//! issuance to open a virtual account and schedule the recurring debits.
//! Every request is a signed JSON envelope; any non-`Successful` response
//! status is a hard error for the caller.

pub mod signature;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::workflows::lending::domain::{CustomerDetails, InstallmentFrequency};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

/// Business onboarding details forwarded to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct MerchantProfile {
    pub business_name: String,
    pub email: String,
    pub phone_number: String,
    pub rc_number: String,
    pub settlement_account_number: String,
    pub settlement_bank_code: String,
    pub settlement_account_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantHandle {
    pub biller_code: String,
    pub merchant_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MandateHandle {
    pub mandate_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAccount {
    pub account_number: String,
}

/// Invoice issuance parameters: the down payment plus the recurring schedule.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub biller_code: String,
    pub down_payment: f64,
    pub installment_count: u32,
    pub frequency: InstallmentFrequency,
    pub start_date: DateTime<Utc>,
}

/// Contract with the external mandate/invoice provider.
#[async_trait]
pub trait MandateProvider: Send + Sync {
    async fn create_merchant(&self, profile: &MerchantProfile)
        -> Result<MerchantHandle, ProviderError>;
    async fn create_mandate(
        &self,
        customer: &CustomerDetails,
        biller_code: &str,
        total_amount: f64,
    ) -> Result<MandateHandle, ProviderError>;
    async fn send_invoice(&self, invoice: &InvoiceRequest)
        -> Result<VirtualAccount, ProviderError>;
}

pub fn generate_request_ref() -> String {
    format!("req_{}", Uuid::new_v4().simple())
}

/// Wire format for provider timestamps.
pub fn format_provider_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d-%H-%M-%S").to_string()
}

#[derive(Debug, Serialize)]
struct RequestEnvelope<T: Serialize> {
    request_ref: String,
    request_type: &'static str,
    transaction: TransactionBody<T>,
}

#[derive(Debug, Serialize)]
struct TransactionBody<T: Serialize> {
    mock_mode: String,
    transaction_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<T>,
    meta: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct MandateAuth {
    #[serde(rename = "type")]
    auth_type: &'static str,
    secure: String,
    auth_provider: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ResponseEnvelope<T> {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct MerchantData {
    biller_code: String,
    merchant_id: String,
}

#[derive(Debug, Deserialize)]
struct MandateData {
    reference: String,
}

#[derive(Debug, Deserialize)]
struct InvoiceData {
    virtual_account_number: String,
}

/// HTTPS implementation of [`MandateProvider`].
pub struct HttpMandateProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    mock_mode: String,
}

impl HttpMandateProvider {
    pub fn new(base_url: String, api_key: String, mock_mode: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            http,
            base_url,
            api_key,
            mock_mode,
        }
    }

    async fn post<D: for<'de> Deserialize<'de>>(
        &self,
        request_type: &'static str,
        body: serde_json::Value,
    ) -> Result<D, ProviderError> {
        let request_ref = body
            .get("request_ref")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let signature = signature::request_signature(&self.api_key, &request_ref);

        info!(%request_ref, request_type, "provider request");

        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("Signature", signature)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                error!(%request_ref, request_type, %err, "provider request failed");
                ProviderError::Transport(err.to_string())
            })?;

        let envelope: ResponseEnvelope<D> = response
            .json()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        if !envelope.status.eq_ignore_ascii_case("successful") {
            return Err(ProviderError::Rejected(
                envelope
                    .message
                    .unwrap_or_else(|| format!("status {}", envelope.status)),
            ));
        }

        info!(%request_ref, request_type, "provider request succeeded");
        envelope
            .data
            .ok_or_else(|| ProviderError::Rejected("successful reply carried no data".to_string()))
    }

    fn envelope<T: Serialize>(
        &self,
        request_type: &'static str,
        details: Option<T>,
        meta: serde_json::Value,
    ) -> serde_json::Value {
        let request_ref = generate_request_ref();
        serde_json::to_value(RequestEnvelope {
            request_ref: request_ref.clone(),
            request_type,
            transaction: TransactionBody {
                mock_mode: self.mock_mode.clone(),
                transaction_ref: request_ref,
                details,
                meta,
            },
        })
        .expect("request envelope serializes")
    }
}

#[async_trait]
impl MandateProvider for HttpMandateProvider {
    async fn create_merchant(
        &self,
        profile: &MerchantProfile,
    ) -> Result<MerchantHandle, ProviderError> {
        let body = self.envelope(
            "create merchant",
            Some(profile),
            serde_json::json!({}),
        );
        let data: MerchantData = self.post("create merchant", body).await?;
        Ok(MerchantHandle {
            biller_code: data.biller_code,
            merchant_id: data.merchant_id,
        })
    }

    async fn create_mandate(
        &self,
        customer: &CustomerDetails,
        biller_code: &str,
        total_amount: f64,
    ) -> Result<MandateHandle, ProviderError> {
        // Credentials were sealed by the cipher collaborator at intake; the
        // ciphertext is forwarded as-is.
        let auth = MandateAuth {
            auth_type: "bank.account",
            secure: customer.account_number.ciphertext().to_string(),
            auth_provider: "PayWithAccount",
        };
        let meta = serde_json::json!({
            "bvn": customer.bvn.ciphertext(),
            "biller_code": biller_code,
            "amount": total_amount,
            "skip_consent": "true",
        });
        let mut body = self.envelope::<()>("create mandate", None, meta);
        body["auth"] = serde_json::to_value(auth).expect("auth serializes");

        let data: MandateData = self.post("create mandate", body).await?;
        Ok(MandateHandle {
            mandate_ref: data.reference,
        })
    }

    async fn send_invoice(
        &self,
        invoice: &InvoiceRequest,
    ) -> Result<VirtualAccount, ProviderError> {
        let meta = serde_json::json!({
            "type": "instalment",
            "down_payment": invoice.down_payment,
            "repeat_frequency": invoice.frequency.label(),
            "repeat_start_date": format_provider_date(invoice.start_date),
            "number_of_payments": invoice.installment_count,
            "biller_code": invoice.biller_code,
        });
        let body = self.envelope::<()>("send invoice", None, meta);
        let data: InvoiceData = self.post("send invoice", body).await?;
        Ok(VirtualAccount {
            account_number: data.virtual_account_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_dates_use_the_dashed_wire_layout() {
        let ts = "2026-03-05T09:15:30Z".parse::<DateTime<Utc>>().expect("ts");
        assert_eq!(format_provider_date(ts), "2026-03-05-09-15-30");
    }

    #[test]
    fn response_envelope_surfaces_failure_message() {
        let raw = serde_json::json!({
            "status": "Failed",
            "message": "mandate limit exceeded",
            "data": { "reference": "" },
        });
        let envelope: ResponseEnvelope<MandateData> =
            serde_json::from_value(raw).expect("envelope decodes");
        assert_eq!(envelope.status, "Failed");
        assert_eq!(envelope.message.as_deref(), Some("mandate limit exceeded"));
    }

    #[test]
    fn request_refs_are_unique() {
        assert_ne!(generate_request_ref(), generate_request_ref());
    }
}

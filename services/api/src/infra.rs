use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use trustrail::workflows::lending::domain::CustomerDetails;
use trustrail::workflows::provider::{
    InvoiceRequest, MandateHandle, MandateProvider, MerchantHandle, MerchantProfile,
    ProviderError, VirtualAccount,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Injected stand-in for the mandate provider so local runs and demos work
/// without provider credentials. Hands out sequential references the way the
/// sandbox environment does.
#[derive(Default)]
pub(crate) struct InMemoryMandateProvider {
    sequence: AtomicU64,
}

impl InMemoryMandateProvider {
    fn next(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl MandateProvider for InMemoryMandateProvider {
    async fn create_merchant(
        &self,
        _profile: &MerchantProfile,
    ) -> Result<MerchantHandle, ProviderError> {
        let n = self.next();
        Ok(MerchantHandle {
            biller_code: format!("BLR{n:04}"),
            merchant_id: format!("MRC{n:06}"),
        })
    }

    async fn create_mandate(
        &self,
        _customer: &CustomerDetails,
        _biller_code: &str,
        _total_amount: f64,
    ) -> Result<MandateHandle, ProviderError> {
        Ok(MandateHandle {
            mandate_ref: format!("MND{:06}", self.next()),
        })
    }

    async fn send_invoice(
        &self,
        _invoice: &InvoiceRequest,
    ) -> Result<VirtualAccount, ProviderError> {
        Ok(VirtualAccount {
            account_number: format!("99{:08}", self.next()),
        })
    }
}

/*!
 * Payment provider integration.
 *
 * The rest of the crate talks to payments through the [`PaymentProvider`]
 * trait. [`HttpPaymentProvider`] speaks the Stripe-compatible REST surface
 * (coupons, hosted checkout sessions, refunds). When no secret key is
 * configured the [`OfflinePaymentProvider`] stands in, so development
 * environments can run the full checkout flow without credentials.
 */

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// One purchasable line submitted to the provider, amounts in minor units.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: i64,
}

/// Request for a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Client reference attached to the session (our order id)
    pub reference: String,
    pub line_items: Vec<SessionLineItem>,
    /// Provider-side coupon id to apply, if the order carried one
    pub coupon_code: Option<String>,
    pub approved_url: String,
    pub cancel_url: String,
}

/// Hosted checkout session returned by the provider.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Current provider-side state of a session.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub id: String,
    pub paid: bool,
    pub payment_intent_id: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Mirror a coupon into the provider. `amount_off` is a flat discount.
    async fn create_coupon(
        &self,
        code: &str,
        amount_off: Decimal,
        currency: &str,
    ) -> Result<(), ServiceError>;

    /// Remove the provider-side mirror of a coupon.
    async fn delete_coupon(&self, code: &str) -> Result<(), ServiceError>;

    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, ServiceError>;

    async fn refund(&self, payment_intent_id: &str) -> Result<(), ServiceError>;
}

/// Convert a decimal amount to provider minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::Validation(format!("amount out of range: {}", amount)))
}

/// Reqwest-backed provider client.
pub struct HttpPaymentProvider {
    client: Client,
    base_url: String,
    secret_key: String,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    error: Option<ProviderErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl HttpPaymentProvider {
    pub fn new(
        base_url: String,
        secret_key: String,
        currency: String,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ServiceError::Internal(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            currency,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_error(response: reqwest::Response) -> ServiceError {
        let status = response.status();
        let message = response
            .json::<ProviderErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| format!("provider returned {}", status));
        ServiceError::Payment(message)
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    #[instrument(skip(self))]
    async fn create_coupon(
        &self,
        code: &str,
        amount_off: Decimal,
        currency: &str,
    ) -> Result<(), ServiceError> {
        let cents = to_minor_units(amount_off)?;
        let params = [
            ("id", code.to_string()),
            ("name", code.to_string()),
            ("amount_off", cents.to_string()),
            ("currency", currency.to_string()),
        ];

        let response = self
            .client
            .post(self.url("/v1/coupons"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::Payment(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        debug!(code, "provider coupon created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_coupon(&self, code: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .delete(self.url(&format!("/v1/coupons/{}", code)))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::Payment(e.to_string()))?;

        // A missing mirror is not a failure; the local row is authoritative
        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(Self::read_error(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("client_reference_id".into(), request.reference.clone()),
            ("success_url".into(), request.approved_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            params.push((
                format!("line_items[{}][price_data][currency]", i),
                self.currency.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount_cents.to_string(),
            ));
            params.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
        }

        if let Some(code) = &request.coupon_code {
            params.push(("discounts[0][coupon]".into(), code.clone()));
        }

        let response = self
            .client
            .post(self.url("/v1/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::Payment(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Payment(format!("malformed session response: {}", e)))?;

        let url = body
            .url
            .ok_or_else(|| ServiceError::Payment("session response missing url".into()))?;

        info!(session_id = %body.id, "checkout session created");
        Ok(CheckoutSession { id: body.id, url })
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, ServiceError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/checkout/sessions/{}", session_id)))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ServiceError::Payment(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Payment(format!("malformed session response: {}", e)))?;

        Ok(SessionStatus {
            id: body.id,
            paid: body.payment_status.as_deref() == Some("paid"),
            payment_intent_id: body.payment_intent,
        })
    }

    #[instrument(skip(self))]
    async fn refund(&self, payment_intent_id: &str) -> Result<(), ServiceError> {
        let params = [("payment_intent", payment_intent_id.to_string())];
        let response = self
            .client
            .post(self.url("/v1/refunds"))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::Payment(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }
        info!(payment_intent_id, "refund issued");
        Ok(())
    }
}

/// Credential-free provider for development. Sessions are fabricated and
/// always report paid, so the order flow can be exercised end to end.
#[derive(Debug, Default)]
pub struct OfflinePaymentProvider;

#[async_trait]
impl PaymentProvider for OfflinePaymentProvider {
    async fn create_coupon(
        &self,
        code: &str,
        _amount_off: Decimal,
        _currency: &str,
    ) -> Result<(), ServiceError> {
        debug!(code, "offline provider: coupon mirror skipped");
        Ok(())
    }

    async fn delete_coupon(&self, _code: &str) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let id = format!("offline_sess_{}", Uuid::new_v4().simple());
        Ok(CheckoutSession {
            url: format!("{}?session_id={}", request.approved_url, id),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionStatus, ServiceError> {
        Ok(SessionStatus {
            id: session_id.to_string(),
            paid: true,
            payment_intent_id: Some(format!("offline_pi_{}", Uuid::new_v4().simple())),
        })
    }

    async fn refund(&self, payment_intent_id: &str) -> Result<(), ServiceError> {
        debug!(payment_intent_id, "offline provider: refund skipped");
        Ok(())
    }
}

/// Select the provider implementation from configuration.
pub fn provider_from_config(cfg: &AppConfig) -> Result<Arc<dyn PaymentProvider>, ServiceError> {
    match &cfg.payment_secret_key {
        Some(key) if !key.trim().is_empty() => Ok(Arc::new(HttpPaymentProvider::new(
            cfg.payment_api_base.clone(),
            key.clone(),
            cfg.payment_currency.clone(),
        )?)),
        _ => {
            warn!("no payment secret configured; using offline payment provider");
            Ok(Arc::new(OfflinePaymentProvider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn converts_decimal_to_cents() {
        assert_eq!(to_minor_units(dec!(10)).unwrap(), 1000);
        assert_eq!(to_minor_units(dec!(10.50)).unwrap(), 1050);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
    }

    #[test]
    fn rejects_amounts_beyond_minor_unit_range() {
        use assert_matches::assert_matches;
        let too_big = dec!(200_000_000_000_000_000);
        assert_matches!(to_minor_units(too_big), Err(ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn offline_sessions_report_paid() {
        let provider = OfflinePaymentProvider;
        let session = provider
            .create_checkout_session(&CreateSessionRequest {
                reference: "1".into(),
                line_items: vec![],
                coupon_code: None,
                approved_url: "http://localhost/done".into(),
                cancel_url: "http://localhost/cart".into(),
            })
            .await
            .unwrap();
        let status = provider.retrieve_session(&session.id).await.unwrap();
        assert!(status.paid);
        assert!(status.payment_intent_id.is_some());
    }
}

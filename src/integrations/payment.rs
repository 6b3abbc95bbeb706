//! Payment gateway seam and its Stripe Checkout implementation.
//!
//! Only the session fields the signup and plan-change flows consume are
//! modelled.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::HTTP_CLIENT;
use crate::db::models::SubscriptionPlan;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,
    #[error("payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected payment gateway response: {0}")]
    Malformed(String),
}

/// What a checkout session pays for. Carried in `metadata.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    Signup,
    PlanChange,
}

impl CheckoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutKind::Signup => "signup",
            CheckoutKind::PlanChange => "plan_change",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "signup" => Some(CheckoutKind::Signup),
            "plan_change" => Some(CheckoutKind::PlanChange),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub kind: CheckoutKind,
    /// Correlates the session back to a pending signup or an existing user.
    pub client_reference_id: String,
    pub customer_email: String,
    pub plan: SubscriptionPlan,
    pub amount_cents: i64,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Redirect target for the caller.
    pub url: String,
}

/// Hosted page where a customer manages cards, invoices and cancellation.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalSession {
    pub url: String,
}

/// Externally verified state of a checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySession {
    pub id: String,
    pub payment_status: String,
    #[serde(rename = "customer")]
    pub customer_id: Option<String>,
    #[serde(rename = "subscription")]
    pub subscription_id: Option<String>,
    pub client_reference_id: Option<String>,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl GatewaySession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    /// Sessions created before `kind` was recorded are signups.
    pub fn kind(&self) -> Option<CheckoutKind> {
        match self.metadata.get("kind") {
            Some(kind) => CheckoutKind::parse(kind),
            None => Some(CheckoutKind::Signup),
        }
    }

    pub fn plan(&self) -> Option<SubscriptionPlan> {
        self.metadata.get("plan").and_then(|p| p.parse().ok())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, GatewayError>;

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, GatewayError>;
}

/// Stripe Checkout over its form-encoded REST API.
pub struct StripeGateway {
    api_base: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
        let plan_label = format!("{} plan", request.plan.as_str());
        vec![
            ("mode".into(), "subscription".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("customer_email".into(), request.customer_email.clone()),
            (
                "client_reference_id".into(),
                request.client_reference_id.clone(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
            ("line_items[0][price_data][currency]".into(), "usd".into()),
            (
                "line_items[0][price_data][unit_amount]".into(),
                request.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                plan_label,
            ),
            (
                "line_items[0][price_data][recurring][interval]".into(),
                "month".into(),
            ),
            ("metadata[kind]".into(), request.kind.as_str().into()),
            ("metadata[plan]".into(), request.plan.as_str().into()),
        ]
    }

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let response = HTTP_CLIENT
            .post(format!("{}/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&Self::checkout_form(request))
            .send()
            .await?;
        let session: CheckoutSession = Self::read(response).await?;
        tracing::info!(
            session_id = %session.id,
            kind = request.kind.as_str(),
            plan = %request.plan,
            "checkout session created"
        );
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, GatewayError> {
        let response = HTTP_CLIENT
            .get(format!("{}/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, GatewayError> {
        let response = HTTP_CLIENT
            .post(format!("{}/billing_portal/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&[("customer", customer_id), ("return_url", return_url)])
            .send()
            .await?;
        let session: PortalSession = Self::read(response).await?;
        tracing::info!(customer_id = %customer_id, "billing portal session created");
        Ok(session)
    }
}

/// Stand-in used when no STRIPE_SECRET_KEY is configured.
pub struct UnconfiguredGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredGateway {
    async fn create_checkout_session(
        &self,
        _request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn retrieve_session(&self, _session_id: &str) -> Result<GatewaySession, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn create_portal_session(
        &self,
        _customer_id: &str,
        _return_url: &str,
    ) -> Result<PortalSession, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}

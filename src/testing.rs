//! Test fixtures: an [`AppState`] over the in-process store and cache, with
//! scripted payment gateway and recording notifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::MemoryCache;
use crate::config::{AppConfig, CachePolicy, PlanPricing};
use crate::db::memory::MemoryStore;
use crate::db::models::{Category, ProfileChanges, SubscriptionPlan, User};
use crate::db::store::Store;
use crate::integrations::notify::{Notifier, NotifyError, SignupNotification};
use crate::integrations::payment::{
    CheckoutKind, CheckoutRequest, CheckoutSession, GatewayError, GatewaySession, PaymentGateway,
    PortalSession,
};
use crate::state::AppState;

pub fn test_config() -> AppConfig {
    AppConfig {
        environment: "test".to_string(),
        jwt_secret: "test-secret".to_string(),
        access_token_minutes: 60,
        bcrypt_cost: 4,
        otp_ttl: Duration::from_secs(300),
        otp_length: 8,
        username_max_attempts: 5,
        slug_max_attempts: 5,
        public_base_url: "http://localhost:3000".to_string(),
        default_page_size: 9,
        max_page_size: 100,
        upload_dir: std::env::temp_dir()
            .join(format!("artisanshub-test-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned(),
        max_upload_bytes: 1024 * 1024,
        redis_url: None,
        stripe_secret_key: None,
        stripe_api_base: "http://gateway.invalid".to_string(),
        mail_relay_url: None,
        telegram_bot_token: None,
        telegram_chat_id: None,
        pricing: PlanPricing {
            basic_cents: 2900,
            express_cents: 5900,
            premium_cents: 9900,
        },
        cache: CachePolicy {
            key_prefix: String::new(),
            detail_ttl: Duration::from_secs(60),
            listing_ttl: Duration::from_secs(60),
            sweep_max_page: 10,
            sweep_page_sizes: vec![6, 9, 12],
        },
    }
}

/// Gateway that records created sessions and answers `retrieve_session`
/// from whatever the test marked as paid or unpaid.
#[derive(Default)]
pub struct FakeGateway {
    pub created: Mutex<Vec<CheckoutRequest>>,
    pub sessions: Mutex<HashMap<String, GatewaySession>>,
    pub fail_checkout: Mutex<bool>,
    /// `(customer_id, return_url)` of each portal session opened.
    pub portals: Mutex<Vec<(String, String)>>,
    pub fail_portal: Mutex<bool>,
}

impl FakeGateway {
    /// Resolve the most recent checkout session with the given payment status.
    pub fn settle_last(&self, payment_status: &str) -> Option<String> {
        let request = self.created.lock().ok()?.last().cloned()?;
        let id = format!("cs_test_{}", self.created.lock().ok()?.len());
        let mut metadata = HashMap::new();
        metadata.insert("kind".to_string(), request.kind.as_str().to_string());
        metadata.insert("plan".to_string(), request.plan.as_str().to_string());
        let session = GatewaySession {
            id: id.clone(),
            payment_status: payment_status.to_string(),
            customer_id: Some("cus_test".to_string()),
            subscription_id: Some("sub_test".to_string()),
            client_reference_id: Some(request.client_reference_id.clone()),
            amount_total: Some(request.amount_cents),
            metadata,
        };
        self.sessions.lock().ok()?.insert(id.clone(), session);
        Some(id)
    }

    pub fn last_kind(&self) -> Option<CheckoutKind> {
        self.created.lock().ok()?.last().map(|r| r.kind)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        if *self.fail_checkout.lock().unwrap() {
            return Err(GatewayError::Rejected {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        Ok(CheckoutSession {
            id: format!("cs_test_{}", created.len()),
            url: format!("https://checkout.test/{}", created.len()),
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession, GatewayError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(GatewayError::Rejected {
                status: 404,
                message: "No such checkout session".to_string(),
            })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, GatewayError> {
        if *self.fail_portal.lock().unwrap() {
            return Err(GatewayError::Rejected {
                status: 400,
                message: "No such customer".to_string(),
            });
        }
        self.portals
            .lock()
            .unwrap()
            .push((customer_id.to_string(), return_url.to_string()));
        Ok(PortalSession {
            url: format!("https://portal.test/{}", customer_id),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub codes: Mutex<HashMap<String, String>>,
    pub signups: Mutex<Vec<SignupNotification>>,
    pub fail_otp: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn code_for(&self, email: &str) -> Option<String> {
        self.codes.lock().unwrap().get(email).cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_otp(&self, email: &str, code: &str) -> Result<(), NotifyError> {
        if *self.fail_otp.lock().unwrap() {
            return Err(NotifyError::Rejected(503));
        }
        self.codes
            .lock()
            .unwrap()
            .insert(email.to_string(), code.to_string());
        Ok(())
    }

    async fn send_signup_notification(
        &self,
        notification: &SignupNotification,
    ) -> Result<(), NotifyError> {
        self.signups.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(
            store.clone(),
            cache.clone(),
            gateway.clone(),
            notifier.clone(),
            test_config(),
        );
        Self {
            state,
            store,
            cache,
            gateway,
            notifier,
        }
    }

    /// Full explorer signup through OTP verification.
    pub async fn explorer(&self, email: &str) -> User {
        use crate::services::signup::{self, ExplorerSignup};

        signup::start_explorer_signup(
            &self.state,
            ExplorerSignup {
                email: email.to_string(),
                password: "password123".to_string(),
                password_confirm: "password123".to_string(),
            },
        )
        .await
        .unwrap();
        let code = self.notifier.code_for(email).unwrap();
        signup::verify_otp(&self.state, email, &code).await.unwrap();
        self.store.user_by_email(email).await.unwrap().unwrap()
    }

    /// Full paid artist signup: OTP, checkout, settled session.
    pub async fn artist(&self, email: &str, name: &str, plan: SubscriptionPlan) -> User {
        use crate::services::signup::{self, ArtistSignup};

        signup::start_artist_signup(
            &self.state,
            ArtistSignup {
                email: email.to_string(),
                username: Some(name.to_string()),
                password: "password123".to_string(),
                password_confirm: "password123".to_string(),
                package: plan,
            },
        )
        .await
        .unwrap();
        let code = self.notifier.code_for(email).unwrap();
        signup::verify_otp(&self.state, email, &code).await.unwrap();
        let session_id = self.gateway.settle_last("paid").unwrap();
        signup::complete_payment(&self.state, &session_id)
            .await
            .unwrap();
        self.store.user_by_email(email).await.unwrap().unwrap()
    }

    /// Fill the artist's mandatory fields and make the profile visible.
    /// Returns the slug.
    pub async fn publish(&self, user_id: uuid::Uuid) -> String {
        let profile = self.store.artist_by_user(user_id).await.unwrap().unwrap();
        crate::services::visibility::update_profile(&self.state, profile.id, complete_changes())
            .await
            .unwrap()
            .slug
    }
}

pub fn complete_changes() -> ProfileChanges {
    ProfileChanges {
        location_state: Some("Texas".into()),
        location_city: Some("Austin".into()),
        short_bio: Some("Stickers".into()),
        full_bio: Some("Handmade stickers".into()),
        categories: Some(vec![Category::Stickers]),
        profile_image_url: Some("/uploads/portfolio/me.png".into()),
        is_visible: Some(true),
        ..Default::default()
    }
}

impl TestContext {
    /// Bearer token for an active user, with the role the store resolves.
    pub async fn token(&self, user: &User) -> String {
        let role = self.store.resolve_role(user.id).await.unwrap();
        crate::services::auth::create_access_token(&self.state.config, user, role.name()).unwrap()
    }
}

/// Drive one request through a router; the body comes back as JSON, or
/// `Value::Null` when empty.
pub async fn send(
    app: axum::Router,
    method: axum::http::Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (axum::http::StatusCode, serde_json::Value) {
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

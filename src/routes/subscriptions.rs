/**
 * Subscription Routes
 * Checkout return endpoint, plan changes and the billing portal
 */
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::db::models::SubscriptionPlan;
use crate::error::AppResult;
use crate::services::auth::AuthUser;
use crate::services::{require_artist, signup};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PlanChangeRequest {
    #[serde(alias = "package")]
    pub plan: SubscriptionPlan,
}

/// GET /api/subscriptions/success?session_id=...
/// The gateway redirects here after checkout; settles the session.
pub async fn checkout_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> AppResult<Json<signup::PaymentOutcome>> {
    Ok(Json(
        signup::complete_payment(&state, &query.session_id).await?,
    ))
}

/// POST /api/subscriptions/checkout - Start a plan change (artists only)
pub async fn change_plan(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<PlanChangeRequest>,
) -> AppResult<Json<signup::CheckoutStarted>> {
    let profile = require_artist(&auth.role)?;
    Ok(Json(
        signup::start_plan_change(&state, &auth.user, profile, payload.plan).await?,
    ))
}

/// GET /api/subscriptions/portal - Billing portal link (artists only)
pub async fn billing_portal(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<signup::PortalStarted>> {
    require_artist(&auth.role)?;
    Ok(Json(signup::open_billing_portal(&state, &auth.user).await?))
}

#[cfg(test)]
mod tests {
    use crate::db::models::SubscriptionPlan;
    use crate::testing::{send, TestContext};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_artist_signup_completes_on_success_redirect() {
        let ctx = TestContext::new();
        let app = crate::create_app(ctx.state.clone());
        send(
            app.clone(),
            Method::POST,
            "/api/auth/signup/artist",
            None,
            Some(json!({
                "email": "lena@x.com",
                "username": "Lena Art",
                "password": "password123",
                "passwordConfirm": "password123",
                "package": "basic"
            })),
        )
        .await;
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        send(
            app.clone(),
            Method::POST,
            "/api/auth/otp/verify",
            None,
            Some(json!({"email": "lena@x.com", "code": code})),
        )
        .await;

        let session_id = ctx.gateway.settle_last("paid").unwrap();
        let (status, body) = send(
            app.clone(),
            Method::GET,
            &format!("/api/subscriptions/success?session_id={}", session_id),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "activated");

        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"login": "lena@x.com", "password": "password123"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "artist");
    }

    #[tokio::test]
    async fn test_missing_session_id_is_validation_error() {
        let ctx = TestContext::new();
        let (status, _) = send(
            crate::create_app(ctx.state),
            Method::GET,
            "/api/subscriptions/success",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_plan_change_requires_artist() {
        let ctx = TestContext::new();
        let explorer = ctx.explorer("e@x.com").await;
        let token = ctx.token(&explorer).await;
        let (status, _) = send(
            crate::create_app(ctx.state.clone()),
            Method::POST,
            "/api/subscriptions/checkout",
            Some(&token),
            Some(json!({"plan": "premium"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            crate::create_app(ctx.state),
            Method::POST,
            "/api/subscriptions/checkout",
            None,
            Some(json!({"plan": "premium"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_plan_change_starts_checkout() {
        let ctx = TestContext::new();
        let artist = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let token = ctx.token(&artist).await;
        let (status, body) = send(
            crate::create_app(ctx.state.clone()),
            Method::POST,
            "/api/subscriptions/checkout",
            Some(&token),
            Some(json!({"plan": "premium"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["checkoutUrl"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_billing_portal_returns_link() {
        let ctx = TestContext::new();
        let artist = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let token = ctx.token(&artist).await;
        let (status, body) = send(
            crate::create_app(ctx.state.clone()),
            Method::GET,
            "/api/subscriptions/portal",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["portalUrl"], "https://portal.test/cus_test");
    }

    #[tokio::test]
    async fn test_billing_portal_without_customer_is_not_found() {
        use crate::db::store::Store;
        use crate::services::signup::{self, ArtistSignup};

        let ctx = TestContext::new();
        signup::start_artist_signup(
            &ctx.state,
            ArtistSignup {
                email: "lena@x.com".to_string(),
                username: Some("lena".to_string()),
                password: "password123".to_string(),
                password_confirm: "password123".to_string(),
                package: SubscriptionPlan::Basic,
            },
        )
        .await
        .unwrap();
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        signup::verify_otp(&ctx.state, "lena@x.com", &code)
            .await
            .unwrap();
        let session_id = ctx.gateway.settle_last("paid").unwrap();
        ctx.gateway
            .sessions
            .lock()
            .unwrap()
            .get_mut(&session_id)
            .unwrap()
            .customer_id = None;
        signup::complete_payment(&ctx.state, &session_id)
            .await
            .unwrap();
        let artist = ctx.store.user_by_email("lena@x.com").await.unwrap().unwrap();
        let token = ctx.token(&artist).await;

        let (status, _) = send(
            crate::create_app(ctx.state),
            Method::GET,
            "/api/subscriptions/portal",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_billing_portal_gateway_failure_is_bad_gateway() {
        let ctx = TestContext::new();
        let artist = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let token = ctx.token(&artist).await;
        *ctx.gateway.fail_portal.lock().unwrap() = true;
        let (status, body) = send(
            crate::create_app(ctx.state),
            Method::GET,
            "/api/subscriptions/portal",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "external_service_failure");
    }

    #[tokio::test]
    async fn test_billing_portal_requires_artist() {
        let ctx = TestContext::new();
        let explorer = ctx.explorer("e@x.com").await;
        let token = ctx.token(&explorer).await;
        let (status, _) = send(
            crate::create_app(ctx.state),
            Method::GET,
            "/api/subscriptions/portal",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}

//! Signup-to-Activation State Machine.
//!
//! Explorers: inactive user + explorer profile, activated by OTP.
//! Artists: a pending record walks `Pending -> OtpSent -> Verified ->
//! AwaitingPayment -> Paid` and is replaced by user, profile and subscription
//! in one storage transaction once the gateway reports the session paid.
//! Plan changes for existing artists settle through the same entry point.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::hash_password;
use super::naming::{generate_otp, normalize_username, slug_candidate, slugify, username_candidate};
use crate::db::models::{
    ArtistActivation, ArtistProfile, NewExplorerAccount, NewPendingArtist, PendingArtist,
    SignupState, SubscriptionPlan, User,
};
use crate::db::store::{StoreError, UniqueField};
use crate::error::{AppError, AppResult};
use crate::integrations::notify::SignupNotification;
use crate::integrations::payment::{CheckoutKind, CheckoutRequest, GatewaySession};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerSignup {
    pub email: String,
    pub password: String,
    #[serde(alias = "password2")]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistSignup {
    pub email: String,
    pub username: Option<String>,
    pub password: String,
    #[serde(alias = "password2")]
    pub password_confirm: String,
    pub package: SubscriptionPlan,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupStarted {
    pub email: String,
    pub otp_sent: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    #[serde(rename_all = "camelCase")]
    Activated { user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    PaymentRequired {
        checkout_url: String,
        session_id: String,
    },
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    #[serde(rename_all = "camelCase")]
    Activated {
        user_id: Uuid,
        username: String,
        slug: String,
    },
    #[serde(rename_all = "camelCase")]
    PlanChanged { plan: SubscriptionPlan },
    #[serde(rename_all = "camelCase")]
    PaymentFailed { message: String },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutStarted {
    pub checkout_url: String,
    pub session_id: String,
}

// ============================================================================
// Validation
// ============================================================================

fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::validation("A valid email address is required")),
    }
}

fn check_password(password: &str, confirm: &str) -> AppResult<()> {
    if password != confirm {
        return Err(AppError::validation("Passwords do not match"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

async fn advance(state: &AppState, pending: &PendingArtist, next: SignupState) -> AppResult<()> {
    if !pending.state.can_transition_to(next) {
        return Err(AppError::conflict(format!(
            "Signup cannot move from {} to {}",
            pending.state.as_str(),
            next.as_str()
        )));
    }
    state.store.set_pending_state(pending.id, next).await?;
    tracing::debug!(
        pending_id = %pending.id,
        from = pending.state.as_str(),
        to = next.as_str(),
        "signup state changed"
    );
    Ok(())
}

// ============================================================================
// start_signup
// ============================================================================

/// Create (or, for an unverified retry, re-password) an inactive explorer
/// account, then send a verification code.
pub async fn start_explorer_signup(
    state: &AppState,
    request: ExplorerSignup,
) -> AppResult<SignupStarted> {
    let email = normalize_email(&request.email)?;
    check_password(&request.password, &request.password_confirm)?;

    if state.store.pending_artist_by_email(&email).await?.is_some() {
        return Err(AppError::conflict(
            "An artist signup for this email is already in progress",
        ));
    }

    let password_hash = hash_password(request.password, state.config.bcrypt_cost).await?;
    match state.store.user_by_email(&email).await? {
        Some(user) if user.is_active => {
            return Err(AppError::conflict(
                "An account with this email already exists",
            ));
        }
        Some(user) => {
            state.store.update_password(user.id, &password_hash).await?;
            tracing::info!(user_id = %user.id, "unverified signup retried, password updated");
        }
        None => {
            let user = create_explorer(state, &email, password_hash).await?;
            tracing::info!(user_id = %user.id, username = %user.username, "explorer account created");
        }
    }

    request_otp(state, &email).await?;
    Ok(SignupStarted {
        email,
        otp_sent: true,
    })
}

/// Username collisions are resolved at write time: the insert is retried
/// with the next suffix on a username constraint violation.
async fn create_explorer(state: &AppState, email: &str, password_hash: String) -> AppResult<User> {
    let base = normalize_username(email);
    for attempt in 0..state.config.username_max_attempts {
        let account = NewExplorerAccount {
            username: username_candidate(&base, attempt),
            email: email.to_string(),
            password_hash: password_hash.clone(),
        };
        match state.store.create_explorer_account(account).await {
            Ok((user, _profile)) => return Ok(user),
            Err(StoreError::UniqueViolation(UniqueField::Username)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::conflict(
        "Could not allocate a unique username, please contact support",
    ))
}

/// Record (or overwrite) the pending artist signup, then send a code.
pub async fn start_artist_signup(
    state: &AppState,
    request: ArtistSignup,
) -> AppResult<SignupStarted> {
    let email = normalize_email(&request.email)?;
    check_password(&request.password, &request.password_confirm)?;

    if state.store.user_by_email(&email).await?.is_some() {
        return Err(AppError::conflict(
            "An account with this email already exists",
        ));
    }

    let username = normalize_username(
        request
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(&email),
    );
    let password_hash = hash_password(request.password, state.config.bcrypt_cost).await?;
    let pending = state
        .store
        .upsert_pending_artist(NewPendingArtist {
            email: email.clone(),
            username,
            password_hash,
            package: request.package,
        })
        .await?;
    tracing::info!(pending_id = %pending.id, plan = %pending.package, "artist signup pending");

    request_otp(state, &email).await?;
    Ok(SignupStarted {
        email,
        otp_sent: true,
    })
}

// ============================================================================
// OTP
// ============================================================================

/// Issue and deliver a fresh code. A delivery failure leaves the signup
/// where it is so the caller can simply ask again.
pub async fn request_otp(state: &AppState, email: &str) -> AppResult<()> {
    let email = normalize_email(email)?;

    if let Some(pending) = state.store.pending_artist_by_email(&email).await? {
        advance(state, &pending, SignupState::OtpSent).await?;
    } else {
        match state.store.user_by_email(&email).await? {
            Some(user) if user.is_active => {
                return Err(AppError::conflict("This account is already verified"));
            }
            Some(_) => {}
            None => return Err(AppError::not_found("No signup found for this email")),
        }
    }

    let code = generate_otp(state.config.otp_length);
    state
        .cache
        .store_otp(&email, &code, state.config.otp_ttl)
        .await?;
    state.notifier.send_otp(&email, &code).await?;
    Ok(())
}

/// Check the single-use code. Explorers are activated; artists are sent to
/// checkout.
pub async fn verify_otp(state: &AppState, email: &str, code: &str) -> AppResult<VerifyOutcome> {
    let email = normalize_email(email)?;
    let code = code.trim();

    if code.is_empty() || !state.cache.consume_otp(&email, code).await? {
        return Err(AppError::validation("Invalid or expired verification code"));
    }

    if let Some(pending) = state.store.pending_artist_by_email(&email).await? {
        advance(state, &pending, SignupState::Verified).await?;
        let verified = PendingArtist {
            state: SignupState::Verified,
            ..pending
        };
        let checkout = start_signup_checkout(state, &verified).await?;
        return Ok(VerifyOutcome::PaymentRequired {
            checkout_url: checkout.checkout_url,
            session_id: checkout.session_id,
        });
    }

    let user = state
        .store
        .user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("No signup found for this email"))?;
    state.store.activate_user(user.id).await?;
    tracing::info!(user_id = %user.id, "account verified and activated");
    Ok(VerifyOutcome::Activated { user_id: user.id })
}

// ============================================================================
// Checkout
// ============================================================================

fn success_url(state: &AppState) -> String {
    format!(
        "{}/api/subscriptions/success?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.public_base_url.trim_end_matches('/')
    )
}

fn cancel_url(state: &AppState) -> String {
    format!(
        "{}/signup/cancelled",
        state.config.public_base_url.trim_end_matches('/')
    )
}

async fn start_signup_checkout(
    state: &AppState,
    pending: &PendingArtist,
) -> AppResult<CheckoutStarted> {
    let request = CheckoutRequest {
        kind: CheckoutKind::Signup,
        client_reference_id: pending.id.to_string(),
        customer_email: pending.email.clone(),
        plan: pending.package,
        amount_cents: state.config.pricing.price_cents(pending.package),
        success_url: success_url(state),
        cancel_url: cancel_url(state),
    };
    let session = state.gateway.create_checkout_session(&request).await?;
    advance(state, pending, SignupState::AwaitingPayment).await?;
    Ok(CheckoutStarted {
        checkout_url: session.url,
        session_id: session.id,
    })
}

/// Checkout for an active artist switching to another plan.
pub async fn start_plan_change(
    state: &AppState,
    user: &User,
    profile: &ArtistProfile,
    plan: SubscriptionPlan,
) -> AppResult<CheckoutStarted> {
    if profile.subscription_plan == plan {
        return Err(AppError::validation(format!(
            "You are already on the {} plan",
            plan
        )));
    }
    let request = CheckoutRequest {
        kind: CheckoutKind::PlanChange,
        client_reference_id: user.id.to_string(),
        customer_email: user.email.clone(),
        plan,
        amount_cents: state.config.pricing.price_cents(plan),
        success_url: success_url(state),
        cancel_url: cancel_url(state),
    };
    let session = state.gateway.create_checkout_session(&request).await?;
    tracing::info!(user_id = %user.id, from = %profile.subscription_plan, to = %plan, "plan change checkout started");
    Ok(CheckoutStarted {
        checkout_url: session.url,
        session_id: session.id,
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalStarted {
    pub portal_url: String,
}

/// Hosted billing portal for an artist's gateway customer. Returns to the
/// dashboard when the artist is done.
pub async fn open_billing_portal(state: &AppState, user: &User) -> AppResult<PortalStarted> {
    let customer_id = state
        .store
        .subscription_for(user.id)
        .await?
        .and_then(|sub| sub.gateway_customer_id)
        .ok_or_else(|| AppError::not_found("No billing account found for this user"))?;
    let return_url = format!(
        "{}/artists/dashboard",
        state.config.public_base_url.trim_end_matches('/')
    );
    let portal = state
        .gateway
        .create_portal_session(&customer_id, &return_url)
        .await?;
    tracing::info!(user_id = %user.id, "billing portal opened");
    Ok(PortalStarted {
        portal_url: portal.url,
    })
}

// ============================================================================
// complete_payment
// ============================================================================

/// Settle a checkout session reported back by the gateway.
pub async fn complete_payment(state: &AppState, session_id: &str) -> AppResult<PaymentOutcome> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(AppError::validation("session_id is required"));
    }
    let session = state.gateway.retrieve_session(session_id).await?;

    match session.kind() {
        Some(CheckoutKind::Signup) => complete_signup(state, &session).await,
        Some(CheckoutKind::PlanChange) => complete_plan_change(state, &session).await,
        None => Err(AppError::validation("Unknown checkout session kind")),
    }
}

fn reference_id(session: &GatewaySession) -> Option<Uuid> {
    session
        .client_reference_id
        .as_deref()
        .and_then(|r| Uuid::parse_str(r).ok())
}

async fn complete_signup(state: &AppState, session: &GatewaySession) -> AppResult<PaymentOutcome> {
    let pending = match reference_id(session) {
        Some(id) => state.store.pending_artist_by_id(id).await?,
        None => None,
    }
    .ok_or_else(|| {
        tracing::warn!(session_id = %session.id, "payment does not match any pending signup");
        AppError::not_found("No pending signup matches this payment, please sign up again")
    })?;

    if !session.is_paid() {
        advance(state, &pending, SignupState::PaymentFailed).await?;
        tracing::warn!(pending_id = %pending.id, status = %session.payment_status, "signup payment not completed");
        return Ok(PaymentOutcome::PaymentFailed {
            message: "Payment was not completed. Verify your email again to retry.".to_string(),
        });
    }
    advance(state, &pending, SignupState::Paid).await?;
    // A restart may have re-chosen the package after this session was opened.
    let plan = session.plan().unwrap_or(pending.package);

    let base_slug = slugify(&pending.username);
    let (mut username_attempt, mut slug_attempt) = (0u32, 0u32);
    let activated = loop {
        if username_attempt >= state.config.username_max_attempts {
            return Err(AppError::IntegrityRace(
                "Could not allocate a unique username".to_string(),
            ));
        }
        if slug_attempt >= state.config.slug_max_attempts {
            return Err(AppError::IntegrityRace(
                "Could not allocate a unique profile slug".to_string(),
            ));
        }
        let activation = ArtistActivation {
            pending_id: pending.id,
            username: username_candidate(&pending.username, username_attempt),
            slug: slug_candidate(&base_slug, slug_attempt),
            plan,
            gateway_customer_id: session.customer_id.clone(),
            gateway_subscription_id: session.subscription_id.clone(),
        };
        match state.store.activate_artist(activation).await {
            Ok(activated) => break activated,
            Err(StoreError::UniqueViolation(UniqueField::Username)) => username_attempt += 1,
            Err(StoreError::UniqueViolation(UniqueField::Slug)) => slug_attempt += 1,
            Err(e) => return Err(e.into()),
        }
    };
    tracing::info!(
        user_id = %activated.user.id,
        artist_id = %activated.profile.id,
        slug = %activated.profile.slug,
        plan = %activated.subscription.plan_name,
        "artist account activated"
    );

    let notification = SignupNotification {
        user_id: activated.user.id,
        email: activated.user.email.clone(),
        created_at: activated.user.created_at,
        plan: activated.subscription.plan_name,
        amount_paid_cents: session.amount_total,
        customer_id: session.customer_id.clone(),
    };
    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.send_signup_notification(&notification).await {
            tracing::warn!(user_id = %notification.user_id, error = %e, "signup notification failed");
        }
    });

    state
        .cache
        .artist_changed(None, &activated.profile.slug)
        .await;
    Ok(PaymentOutcome::Activated {
        user_id: activated.user.id,
        username: activated.user.username,
        slug: activated.profile.slug,
    })
}

async fn complete_plan_change(
    state: &AppState,
    session: &GatewaySession,
) -> AppResult<PaymentOutcome> {
    if !session.is_paid() {
        return Ok(PaymentOutcome::PaymentFailed {
            message: "Payment was not completed. Your plan is unchanged.".to_string(),
        });
    }
    let user_id = reference_id(session)
        .ok_or_else(|| AppError::not_found("No account matches this payment"))?;
    let plan = session
        .plan()
        .ok_or_else(|| AppError::validation("Checkout session carries no plan"))?;

    let profile = state
        .store
        .change_plan(
            user_id,
            plan,
            session.customer_id.as_deref(),
            session.subscription_id.as_deref(),
        )
        .await?;
    tracing::info!(user_id = %user_id, plan = %plan, "subscription plan changed");

    state.cache.artist_changed(None, &profile.slug).await;
    Ok(PaymentOutcome::PlanChanged { plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::Store;
    use crate::testing::TestContext;

    fn explorer(email: &str, password: &str) -> ExplorerSignup {
        ExplorerSignup {
            email: email.to_string(),
            password: password.to_string(),
            password_confirm: password.to_string(),
        }
    }

    fn artist(email: &str, plan: SubscriptionPlan) -> ArtistSignup {
        ArtistSignup {
            email: email.to_string(),
            username: None,
            password: "password123".to_string(),
            password_confirm: "password123".to_string(),
            package: plan,
        }
    }

    /// Hold `base`, `base1`, ... with unrelated explorer accounts.
    async fn occupy_usernames(ctx: &TestContext, base: &str, count: u32) {
        for attempt in 0..count {
            ctx.store
                .create_explorer_account(NewExplorerAccount {
                    username: username_candidate(base, attempt),
                    email: format!("holder{}@elsewhere.com", attempt),
                    password_hash: "hash".to_string(),
                })
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_input_validation() {
        assert!(normalize_email("  A@X.com ").is_ok());
        assert!(normalize_email("nope").is_err());
        assert!(normalize_email("@x.com").is_err());
        assert!(check_password("password1", "password2").is_err());
        assert!(check_password("short", "short").is_err());
        assert!(check_password("longenough", "longenough").is_ok());
    }

    #[tokio::test]
    async fn test_unverified_signup_retry_updates_password_in_place() {
        let ctx = TestContext::new();
        start_explorer_signup(&ctx.state, explorer("a@x.com", "first-password"))
            .await
            .unwrap();
        let first = ctx.store.user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(first.username, "a");
        assert!(!first.is_active);

        start_explorer_signup(&ctx.state, explorer("a@x.com", "second-password"))
            .await
            .unwrap();
        let second = ctx.store.user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_ne!(second.password_hash, first.password_hash);
        assert!(ctx.store.user_by_login("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_email_is_rejected() {
        let ctx = TestContext::new();
        ctx.explorer("a@x.com").await;
        let err = start_explorer_signup(&ctx.state, explorer("a@x.com", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = start_artist_signup(&ctx.state, artist("a@x.com", SubscriptionPlan::Basic))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_username_collision_takes_next_suffix() {
        let ctx = TestContext::new();
        ctx.explorer("a@x.com").await;
        ctx.explorer("a@y.com").await;
        let user = ctx.store.user_by_email("a@y.com").await.unwrap().unwrap();
        assert_eq!(user.username, "a1");
    }

    #[tokio::test]
    async fn test_wrong_code_is_rejected_and_codes_are_single_use() {
        let ctx = TestContext::new();
        start_explorer_signup(&ctx.state, explorer("a@x.com", "password123"))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("a@x.com").unwrap();
        assert!(matches!(
            verify_otp(&ctx.state, "a@x.com", "00000000x").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            verify_otp(&ctx.state, "a@x.com", &code).await.unwrap(),
            VerifyOutcome::Activated { .. }
        ));
        assert!(matches!(
            verify_otp(&ctx.state, "a@x.com", &code).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_otp_delivery_failure_is_retryable() {
        let ctx = TestContext::new();
        *ctx.notifier.fail_otp.lock().unwrap() = true;
        let err = start_artist_signup(&ctx.state, artist("lena@x.com", SubscriptionPlan::Basic))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
        let pending = ctx
            .store
            .pending_artist_by_email("lena@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.state, SignupState::OtpSent);

        *ctx.notifier.fail_otp.lock().unwrap() = false;
        request_otp(&ctx.state, "lena@x.com").await.unwrap();
        assert!(ctx.notifier.code_for("lena@x.com").is_some());
    }

    #[tokio::test]
    async fn test_paid_signup_activates_artist_atomically() {
        let ctx = TestContext::new();
        start_artist_signup(&ctx.state, artist("lena@x.com", SubscriptionPlan::Express))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        let outcome = verify_otp(&ctx.state, "lena@x.com", &code).await.unwrap();
        assert!(matches!(outcome, VerifyOutcome::PaymentRequired { .. }));
        assert_eq!(ctx.gateway.last_kind(), Some(CheckoutKind::Signup));
        assert_eq!(
            ctx.gateway.created.lock().unwrap()[0].amount_cents,
            5900
        );
        let pending = ctx
            .store
            .pending_artist_by_email("lena@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.state, SignupState::AwaitingPayment);
        assert!(ctx.store.user_by_email("lena@x.com").await.unwrap().is_none());

        let session_id = ctx.gateway.settle_last("paid").unwrap();
        let outcome = complete_payment(&ctx.state, &session_id).await.unwrap();
        let PaymentOutcome::Activated { user_id, slug, .. } = outcome else {
            panic!("expected activation");
        };
        assert_eq!(slug, "lena");

        let user = ctx.store.user_by_id(user_id).await.unwrap().unwrap();
        assert!(user.is_active);
        let profile = ctx.store.artist_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(profile.subscription_plan, SubscriptionPlan::Express);
        assert!(!profile.is_visible);
        let sub = ctx.store.subscription_for(user_id).await.unwrap().unwrap();
        assert_eq!(sub.gateway_customer_id.as_deref(), Some("cus_test"));
        assert!(ctx
            .store
            .pending_artist_by_email("lena@x.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unpaid_session_marks_payment_failed_and_is_reenterable() {
        let ctx = TestContext::new();
        start_artist_signup(&ctx.state, artist("lena@x.com", SubscriptionPlan::Basic))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        verify_otp(&ctx.state, "lena@x.com", &code).await.unwrap();
        let session_id = ctx.gateway.settle_last("unpaid").unwrap();

        let outcome = complete_payment(&ctx.state, &session_id).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::PaymentFailed { .. }));
        let pending = ctx
            .store
            .pending_artist_by_email("lena@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.state, SignupState::PaymentFailed);

        request_otp(&ctx.state, "lena@x.com").await.unwrap();
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        assert!(matches!(
            verify_otp(&ctx.state, "lena@x.com", &code).await.unwrap(),
            VerifyOutcome::PaymentRequired { .. }
        ));
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_signup_verified() {
        let ctx = TestContext::new();
        start_artist_signup(&ctx.state, artist("lena@x.com", SubscriptionPlan::Basic))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        *ctx.gateway.fail_checkout.lock().unwrap() = true;
        let err = verify_otp(&ctx.state, "lena@x.com", &code).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));
        let pending = ctx
            .store
            .pending_artist_by_email("lena@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.state, SignupState::Verified);
        assert!(request_otp(&ctx.state, "lena@x.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_uncorrelated_session_has_no_side_effects() {
        let ctx = TestContext::new();
        start_artist_signup(&ctx.state, artist("lena@x.com", SubscriptionPlan::Basic))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        verify_otp(&ctx.state, "lena@x.com", &code).await.unwrap();
        let session_id = ctx.gateway.settle_last("paid").unwrap();
        ctx.gateway
            .sessions
            .lock()
            .unwrap()
            .get_mut(&session_id)
            .unwrap()
            .client_reference_id = Some(Uuid::new_v4().to_string());

        let err = complete_payment(&ctx.state, &session_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(ctx.store.user_by_email("lena@x.com").await.unwrap().is_none());
        assert!(ctx
            .store
            .pending_artist_by_email("lena@x.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_slug_collision_takes_next_suffix() {
        let ctx = TestContext::new();
        ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let second = ctx.artist("lena@y.com", "lena", SubscriptionPlan::Basic).await;
        assert_eq!(second.username, "lena1");
        let profile = ctx.store.artist_by_user(second.id).await.unwrap().unwrap();
        assert_eq!(profile.slug, "lena-2");
    }

    #[tokio::test]
    async fn test_plan_change_checkout_and_settlement() {
        let ctx = TestContext::new();
        let user = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let profile = ctx.store.artist_by_user(user.id).await.unwrap().unwrap();
        assert!(matches!(
            start_plan_change(&ctx.state, &user, &profile, SubscriptionPlan::Basic).await,
            Err(AppError::Validation(_))
        ));

        start_plan_change(&ctx.state, &user, &profile, SubscriptionPlan::Premium)
            .await
            .unwrap();
        assert_eq!(ctx.gateway.last_kind(), Some(CheckoutKind::PlanChange));
        let session_id = ctx.gateway.settle_last("paid").unwrap();
        assert_eq!(
            complete_payment(&ctx.state, &session_id).await.unwrap(),
            PaymentOutcome::PlanChanged {
                plan: SubscriptionPlan::Premium
            }
        );
        let profile = ctx.store.artist_by_user(user.id).await.unwrap().unwrap();
        assert_eq!(profile.subscription_plan, SubscriptionPlan::Premium);
        let sub = ctx.store.subscription_for(user.id).await.unwrap().unwrap();
        assert_eq!(sub.plan_name, SubscriptionPlan::Premium);
    }

    #[tokio::test]
    async fn test_exhausted_explorer_usernames_leave_no_account() {
        let ctx = TestContext::new();
        occupy_usernames(&ctx, "a", ctx.state.config.username_max_attempts).await;

        let err = start_explorer_signup(&ctx.state, explorer("a@x.com", "password123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(ctx.store.user_by_email("a@x.com").await.unwrap().is_none());
        assert!(ctx.notifier.code_for("a@x.com").is_none());
    }

    #[tokio::test]
    async fn test_exhausted_artist_usernames_keep_the_paid_signup() {
        let ctx = TestContext::new();
        occupy_usernames(&ctx, "lena", ctx.state.config.username_max_attempts).await;
        start_artist_signup(&ctx.state, artist("lena@x.com", SubscriptionPlan::Basic))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        verify_otp(&ctx.state, "lena@x.com", &code).await.unwrap();
        let session_id = ctx.gateway.settle_last("paid").unwrap();

        let err = complete_payment(&ctx.state, &session_id).await.unwrap_err();
        assert!(matches!(err, AppError::IntegrityRace(_)));
        assert!(ctx.store.user_by_email("lena@x.com").await.unwrap().is_none());
        let pending = ctx
            .store
            .pending_artist_by_email("lena@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.state, SignupState::Paid);
    }

    #[tokio::test]
    async fn test_restarted_signup_still_honours_earlier_paid_session() {
        let ctx = TestContext::new();
        start_artist_signup(&ctx.state, artist("lena@x.com", SubscriptionPlan::Premium))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("lena@x.com").unwrap();
        verify_otp(&ctx.state, "lena@x.com", &code).await.unwrap();

        // Restart on a cheaper plan while the first checkout is still open.
        start_artist_signup(&ctx.state, artist("lena@x.com", SubscriptionPlan::Basic))
            .await
            .unwrap();
        let pending = ctx
            .store
            .pending_artist_by_email("lena@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.state, SignupState::OtpSent);
        assert_eq!(pending.package, SubscriptionPlan::Basic);

        let session_id = ctx.gateway.settle_last("paid").unwrap();
        let outcome = complete_payment(&ctx.state, &session_id).await.unwrap();
        let PaymentOutcome::Activated { user_id, .. } = outcome else {
            panic!("expected activation");
        };
        let profile = ctx.store.artist_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(profile.subscription_plan, SubscriptionPlan::Premium);
        let sub = ctx.store.subscription_for(user_id).await.unwrap().unwrap();
        assert_eq!(sub.plan_name, SubscriptionPlan::Premium);
    }

    #[tokio::test]
    async fn test_concurrent_verifies_consume_the_code_once() {
        let ctx = TestContext::new();
        start_explorer_signup(&ctx.state, explorer("a@x.com", "password123"))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("a@x.com").unwrap();

        let (first, second) = tokio::join!(
            verify_otp(&ctx.state, "a@x.com", &code),
            verify_otp(&ctx.state, "a@x.com", &code)
        );
        let accepted = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        assert!(matches!(
            first.or(second),
            Ok(VerifyOutcome::Activated { .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_guess_does_not_burn_the_code() {
        let ctx = TestContext::new();
        start_explorer_signup(&ctx.state, explorer("a@x.com", "password123"))
            .await
            .unwrap();
        let code = ctx.notifier.code_for("a@x.com").unwrap();
        assert!(verify_otp(&ctx.state, "a@x.com", "nope").await.is_err());
        assert!(verify_otp(&ctx.state, "a@x.com", &code).await.is_ok());
    }

    #[tokio::test]
    async fn test_billing_portal_uses_gateway_customer() {
        let ctx = TestContext::new();
        let user = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let portal = open_billing_portal(&ctx.state, &user).await.unwrap();
        assert_eq!(portal.portal_url, "https://portal.test/cus_test");
        let opened = ctx.gateway.portals.lock().unwrap().clone();
        assert_eq!(
            opened,
            vec![(
                "cus_test".to_string(),
                "http://localhost:3000/artists/dashboard".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_billing_portal_without_customer_is_not_found() {
        let ctx = TestContext::new();
        let user = ctx.explorer("a@x.com").await;
        assert!(matches!(
            open_billing_portal(&ctx.state, &user).await,
            Err(AppError::NotFound(_))
        ));
        assert!(ctx.gateway.portals.lock().unwrap().is_empty());
    }
}

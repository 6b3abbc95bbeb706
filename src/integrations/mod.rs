/*!
 * Integrations Module
 * Outbound collaborators: payment gateway and notification delivery
 */
pub mod notify;
pub mod payment;

use std::time::Duration;

use once_cell::sync::Lazy;

/// Shared outbound client. Both collaborators are unreliable, so every call
/// is bounded by a timeout.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
});

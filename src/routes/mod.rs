/**
 * Routes Module
 * API route handlers
 */
use serde::{Deserialize, Serialize};

pub mod artists;
pub mod auth;
pub mod bookmarks;
pub mod explorers;
pub mod health;
pub mod portfolio;
pub mod ratings;
pub mod subscriptions;

/// Error body shared by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Success body for operations with nothing else to report.
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

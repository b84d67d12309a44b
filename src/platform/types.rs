//! Platform API types

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// A Magento store view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreView {
    pub id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub website_id: Option<i64>,
}

/// Platform API error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Instance unreachable: {0}")]
    Unreachable(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl PlatformError {
    /// Map a non-success HTTP status and its message to an error
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Auth(message),
            400 => Self::Validation(message),
            404 => Self::NotFound(message),
            408 | 504 => Self::Timeout(message),
            _ => Self::Http { status, message },
        }
    }

    /// Whether the whole instance is unusable, as opposed to one request failing
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Auth(_))
    }

    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout(_) | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            PlatformError::from_status(401, "no".into()),
            PlatformError::Auth(_)
        ));
        assert!(matches!(
            PlatformError::from_status(400, "bad".into()),
            PlatformError::Validation(_)
        ));
        assert_eq!(
            PlatformError::from_status(500, "boom".into()),
            PlatformError::Http {
                status: 500,
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(PlatformError::Unreachable("x".into()).is_transient());
        assert!(PlatformError::Http { status: 503, message: String::new() }.is_transient());
        assert!(!PlatformError::Validation("x".into()).is_transient());
        assert!(!PlatformError::Http { status: 409, message: String::new() }.is_transient());
    }

    #[test]
    fn test_store_view_deserialize() {
        let view: StoreView = serde_json::from_value(serde_json::json!({
            "id": 1,
            "code": "default",
            "name": "Default Store View",
            "website_id": 1,
            "store_group_id": 1
        }))
        .unwrap();
        assert_eq!(view.code, "default");
        assert_eq!(view.website_id, Some(1));
    }
}

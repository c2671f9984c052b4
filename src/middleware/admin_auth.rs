// src/middleware/admin_auth.rs

use crate::{error::AppError, state::AppState};
use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Constant-time string comparison to prevent timing attacks
pub fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }
    result == 0
}

/// Guards mutating admin routes with the `X-Admin-Token` header.
///
/// With no token configured every request is refused.
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state
        .config
        .server
        .admin_token
        .as_deref()
        .filter(|t| !t.is_empty())
    else {
        warn!("Admin authentication failed: no admin token configured");
        return Err(AppError::Unauthorized);
    };

    let presented = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(token) if secure_compare(token, expected) => {
            debug!("Admin authentication successful");
            Ok(next.run(req).await)
        }
        _ => {
            warn!("Admin authentication failed: invalid or missing token");
            Err(AppError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::secure_compare;

    #[test]
    fn test_secure_compare() {
        assert!(secure_compare("s3cret", "s3cret"));
        assert!(!secure_compare("s3cret", "s3creT"));
        assert!(!secure_compare("s3cret", "s3cret-longer"));
        assert!(secure_compare("", ""));
    }
}

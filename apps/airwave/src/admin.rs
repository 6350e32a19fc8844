// SPDX-FileCopyrightText: © 2025 Airwave Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Shared-secret check for the background-stream admin routes.

use axum::http::{header, HeaderMap};
use tracing::{debug, warn};

use crate::config::AdminConfig;
use crate::server::AppError;

/// Recorded as `created_by` on schedules made through the admin API.
pub const ADMIN_ACTOR: &str = "admin";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Accepts the request only if it carries `Authorization: Bearer <admin.token>`.
///
/// # Errors
///
/// `Forbidden` when no admin token is configured, `Unauthorized` when the
/// header is missing or does not match.
pub fn require_admin(headers: &HeaderMap, admin: &AdminConfig) -> Result<(), AppError> {
    let Some(expected) = admin.token.as_deref() else {
        warn!("Admin route called but no admin token is configured");
        return Err(AppError::Forbidden("Admin API is disabled".to_string()));
    };

    match bearer_token(headers) {
        Some(presented) if presented == expected => {
            debug!("Admin request authorized");
            Ok(())
        },
        Some(_) => Err(AppError::Unauthorized("Invalid admin token".to_string())),
        None => Err(AppError::Unauthorized("Missing admin token".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn unconfigured_token_forbids_everything() {
        let admin = AdminConfig { token: None };
        assert!(matches!(
            require_admin(&headers_with("Bearer anything"), &admin),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn token_must_match() {
        let admin = AdminConfig { token: Some("s3cret".to_string()) };
        assert!(require_admin(&headers_with("Bearer s3cret"), &admin).is_ok());
        assert!(matches!(
            require_admin(&headers_with("Bearer nope"), &admin),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            require_admin(&headers_with("Basic s3cret"), &admin),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(require_admin(&HeaderMap::new(), &admin), Err(AppError::Unauthorized(_))));
    }
}

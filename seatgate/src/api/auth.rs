//! Bearer token authentication
//!
//! `auth_middleware` guards every protected route: it validates the
//! `Authorization: Bearer <token>` header and stores the resulting
//! [`Principal`] in the request extensions. Handlers then check the role
//! with [`require_role`].

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use seatgate_common::api::Principal;
use seatgate_common::db::Role;
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Authentication middleware
///
/// Returns 401 when the token is missing, malformed, badly signed or
/// expired. Applied to protected routes only.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("No token, authorization denied".to_string()))?;

    let principal = state.tokens.verify(token).map_err(|e| {
        debug!("Rejected session token: {}", e);
        ApiError::Unauthorized("Token is not valid".to_string())
    })?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 403 unless the caller holds one of `roles`
pub fn require_role(principal: &Principal, roles: &[Role]) -> ApiResult<()> {
    if principal.has_role(roles) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Role '{}' is not allowed to access this resource",
            principal.role
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role) -> Principal {
        Principal {
            subject: "u1".to_string(),
            role,
            name: "N".to_string(),
        }
    }

    #[test]
    fn test_require_role() {
        assert!(require_role(&principal(Role::Admin), &[Role::Admin]).is_ok());
        assert!(require_role(&principal(Role::Teacher), &[Role::Admin, Role::Teacher]).is_ok());

        let err = require_role(&principal(Role::Student), &[Role::Admin]).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}

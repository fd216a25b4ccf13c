use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use aba_common::AppError;

use crate::jwt::{Claims, JwtService, Role};

/// Validates the bearer token and stashes `Claims` in the request
/// extensions for downstream extractors — grounded in the teacher's
/// `auth_middleware` (`shared/auth/src/middleware.rs`), fixed to take the
/// `JwtService` as its own middleware state rather than a mismatched
/// generic the teacher never actually wired up.
pub async fn auth_middleware(
    State(jwt_service): State<JwtService>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token_from_headers(&headers)
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    let claims = jwt_service.validate_token(&token)?;
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Gate for admin/coordinator-only operations (team assignment, RBT
/// unavailability reporting — spec §7 Unauthorized).
pub async fn require_scheduling_admin(
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("missing authentication".to_string()))?;

    if claims.role.can_administer_scheduling() {
        Ok(next.run(request).await)
    } else {
        Err(AppError::Unauthorized(
            "actor does not hold an admin or coordinator role".to_string(),
        ))
    }
}

pub fn extract_claims(request: &Request) -> Option<&Claims> {
    request.extensions().get::<Claims>()
}

pub fn extract_role(request: &Request) -> Option<Role> {
    extract_claims(request).map(|c| c.role)
}

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers.get("Authorization")?;
    let auth_str = auth_header.to_str().ok()?;
    auth_str.strip_prefix("Bearer ").map(|s| s.to_string())
}

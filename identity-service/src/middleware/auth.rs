use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::sync::Arc;

use crate::claims::{AuthorizationContext, ClaimMapper};
use crate::services::{IdentityError, TokenVerifier};

/// Turns a bearer token into an [`AuthorizationContext`].
pub struct Authenticator {
    verifier: Arc<dyn TokenVerifier>,
    mapper: ClaimMapper,
}

impl Authenticator {
    pub fn new(verifier: Arc<dyn TokenVerifier>, mapper: ClaimMapper) -> Self {
        Self { verifier, mapper }
    }

    pub async fn authenticate(&self, token: &str) -> Result<AuthorizationContext, IdentityError> {
        let claims = self.verifier.verify(token).await.map_err(|e| {
            tracing::warn!(error = %e, "Bearer token rejected");
            IdentityError::InvalidCredentials
        })?;

        let context = self.mapper.map(&claims);
        if !context.is_valid() {
            tracing::warn!("Verified token carries no principal");
            return Err(IdentityError::InvalidCredentials);
        }

        Ok(context)
    }
}

/// Token from `Authorization: Bearer <token>`; the scheme name is
/// case-insensitive.
fn bearer_token(req: &Request) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    Some(token.trim()).filter(|token| !token.is_empty())
}

/// Require a valid bearer token and expose its context to handlers.
pub async fn authentication_middleware(
    State(authenticator): State<Arc<Authenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing bearer token")))?
        .to_string();

    let context = authenticator.authenticate(&token).await?;

    tracing::debug!(principal = %context.principal(), "Request authenticated");
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

/// Extractor for the context stored by [`authentication_middleware`].
pub struct Authenticated(pub AuthorizationContext);

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuthorizationContext>()
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Authorization context missing from request extensions"
                ))
            })?;

        Ok(Authenticated(context.clone()))
    }
}

/// Gate a handler on a role, by bare name (`"admin"`, not `"ROLE_admin"`).
pub fn require_role(context: &AuthorizationContext, role: &str) -> Result<(), AppError> {
    if context.has_role(role) {
        return Ok(());
    }

    tracing::warn!(
        principal = %context.principal(),
        role = %role,
        "Access denied: missing role"
    );
    Err(AppError::Forbidden(anyhow::anyhow!("Missing role {}", role)))
}

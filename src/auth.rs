use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::{Role, UserRecord},
    repository::RepositoryState,
    roles::{RoleCacheState, resolve_role},
};

/// Header accepted in `Env::Local` instead of a bearer token.
pub const LOCAL_BYPASS_HEADER: &str = "x-user-email";

/// Claims
///
/// Payload of the identity provider's token. Only `email` is used for role
/// resolution; `sub` is the provider's own user id.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    /// Expiration time. Tokens past it are rejected.
    pub exp: usize,
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request: the caller's email, the
/// name stored in their role group and the role that group implies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl From<UserRecord> for AuthUser {
    fn from(user: UserRecord) -> Self {
        Self {
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

/// Pulls the caller's email out of the request: the local bypass header when
/// running locally, otherwise the `email` claim of a valid bearer token.
fn authenticated_email(parts: &Parts, config: &AppConfig) -> Result<String, AppError> {
    if config.env == Env::Local {
        if let Some(email) = parts
            .headers
            .get(LOCAL_BYPASS_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|email| !email.is_empty())
        {
            return Ok(email.to_string());
        }
    }

    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthenticated)?;

    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Ok(data.claims.email),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!(?other, "rejected invalid token"),
            }
            Err(AppError::Unauthenticated)
        }
    }
}

/// AuthUser extractor
///
/// Authenticates the request, then resolves the email to a role through the
/// role cache. Missing or invalid credentials are a 401; an email that belongs
/// to no role group is a 403.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    RoleCacheState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let email = authenticated_email(parts, &config)?;

        let repo = RepositoryState::from_ref(state);
        let roles = RoleCacheState::from_ref(state);

        match roles.resolve(repo.as_ref(), &email).await? {
            Some(user) => Ok(user.into()),
            None => {
                tracing::info!(%email, "access denied: email in no role group");
                Err(AppError::access_denied())
            }
        }
    }
}

/// AdminUser
///
/// An `AuthUser` whose admin membership was confirmed against the store for
/// this very request. The role cache is bypassed and refreshed with the result.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    RoleCacheState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let email = authenticated_email(parts, &config)?;

        let repo = RepositoryState::from_ref(state);
        let roles = RoleCacheState::from_ref(state);

        let Some(user) = resolve_role(repo.as_ref(), &email).await? else {
            roles.invalidate(&email).await;
            return Err(AppError::access_denied());
        };
        roles.put(user.clone()).await;

        if user.role != Role::Admin {
            tracing::warn!(%email, role = %user.role, "non-admin attempted an admin action");
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(AdminUser(user.into()))
    }
}

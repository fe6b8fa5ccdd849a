use rocket::Request;
use rocket::State;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket_db_pools::sqlx;
use rocket_okapi::request::OpenApiFromRequest;

use crate::auth::responses::Role;
use crate::auth::users::{self, UserRecord};
use crate::auth::{AuthError, AuthResult, AuthState};

/// Message left on the request by a failing guard so the error catchers can
/// answer with it.
#[derive(Debug, Clone, Default)]
pub struct AuthFailure(pub Option<String>);

/// A caller whose bearer token verified and whose account still exists.
/// The role comes from the stored row, not from the token.
#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct AuthUser {
    pub user: UserRecord,
}

impl AuthUser {
    pub fn id(&self) -> i32 {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.user.role, Role::Admin)
    }

    pub fn is_warga(&self) -> bool {
        matches!(self.user.role, Role::Warga)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match extract_user(request).await {
            Ok(user) => Outcome::Success(user),
            Err(err) => fail(request, err),
        }
    }
}

#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct RequireAdmin(pub AuthUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireAdmin {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthUser::from_request(request).await {
            Outcome::Success(user) if user.is_admin() => Outcome::Success(RequireAdmin(user)),
            Outcome::Success(user) => {
                log::warn!("access denied: user {} is not an admin", user.id());
                fail(request, AuthError::Forbidden)
            }
            Outcome::Error(err) => Outcome::Error(err),
            Outcome::Forward(_) => fail(request, AuthError::MissingToken),
        }
    }
}

#[derive(Debug, Clone, OpenApiFromRequest)]
pub struct RequireWarga(pub AuthUser);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireWarga {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match AuthUser::from_request(request).await {
            Outcome::Success(user) if user.is_warga() => Outcome::Success(RequireWarga(user)),
            Outcome::Success(user) => {
                log::warn!("access denied: user {} is not a warga", user.id());
                fail(request, AuthError::Forbidden)
            }
            Outcome::Error(err) => Outcome::Error(err),
            Outcome::Forward(_) => fail(request, AuthError::MissingToken),
        }
    }
}

fn fail<T>(request: &Request<'_>, err: AuthError) -> Outcome<T, AuthError> {
    let status = err.status();
    if status == Status::InternalServerError {
        log::error!("authentication failed: {}", err);
    } else {
        log::debug!("authentication rejected: {}", err);
    }
    request.local_cache(|| AuthFailure(Some(err.public_message())));
    Outcome::Error((status, err))
}

async fn extract_user(request: &Request<'_>) -> AuthResult<AuthUser> {
    let token = parse_bearer(request.headers().get_one("Authorization"))?;

    let auth_state = request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    let pool = request
        .guard::<&State<sqlx::PgPool>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("database pool missing from state".into()))?;

    let claims = auth_state.jwt_service.decode_access_token(token)?;
    let user_id = claims.user_id()?;

    let user = users::find_by_id(pool.inner(), user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;

    if user.role.as_str() != claims.role {
        log::warn!(
            "token role '{}' does not match stored role '{}' for user {}",
            claims.role,
            user.role.as_str(),
            user.id
        );
        return Err(AuthError::TokenInvalid);
    }

    Ok(AuthUser { user })
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: Option<&str>) -> AuthResult<&str> {
    let token = header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AuthError::MissingToken)?;
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_tokens() {
        assert_eq!(parse_bearer(Some("Bearer abc.def.ghi")).expect("token"), "abc.def.ghi");
    }

    #[test]
    fn rejects_missing_or_foreign_schemes() {
        assert!(matches!(parse_bearer(None), Err(AuthError::MissingToken)));
        assert!(matches!(
            parse_bearer(Some("Basic dXNlcjpwYXNz")),
            Err(AuthError::MissingToken)
        ));
        assert!(matches!(parse_bearer(Some("Bearer ")), Err(AuthError::MissingToken)));
        assert!(matches!(parse_bearer(Some("bearer abc")), Err(AuthError::MissingToken)));
    }
}

use chrono::Utc;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_db_pools::sqlx;
use rocket_okapi::openapi;

use crate::auth::guards::AuthUser;
use crate::auth::responses::{
    AdminLoginRequest, LoginResponse, MessageResponse, PasswordCheckResponse, RefreshResponse,
    RefreshTokenRequest, RegisterAdminRequest, RegisterResponse, RegisterWargaRequest,
    UserSummary, VerifyPasswordRequest, VerifyResponse, WargaLoginRequest,
};
use crate::auth::users::{self, NewAdmin, NewWarga, UserCredentials, UserRecord};
use crate::auth::validation::{self, ValidationError};
use crate::auth::{AuthError, AuthState};
use crate::error::ErrorResponse;

type AuthRouteError = status::Custom<Json<ErrorResponse>>;
type AuthRouteResult<T> = Result<Json<T>, AuthRouteError>;
type CreatedResult<T> = Result<status::Custom<Json<T>>, AuthRouteError>;

#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<payload>")]
pub async fn register_admin(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<RegisterAdminRequest>,
) -> CreatedResult<RegisterResponse> {
    let payload = payload.into_inner();

    let (Some(username), Some(email), Some(password)) = (
        validation::present(&payload.username),
        validation::present(&payload.email),
        non_empty(&payload.password),
    ) else {
        return Err(invalid_input(ValidationError::MissingFields(
            "Username, email, and password are required",
        )));
    };

    let email = email.to_lowercase();
    validation::validate_email(&email).map_err(invalid_input)?;
    let divisi = validation::present(&payload.divisi);
    if let Some(divisi) = divisi {
        validation::validate_divisi(divisi).map_err(invalid_input)?;
    }
    validation::validate_password(password).map_err(invalid_input)?;

    let taken = users::username_or_email_taken(pool.inner(), username, &email)
        .await
        .map_err(respond_error)?;
    if taken {
        return Err(respond_message(
            Status::Conflict,
            "Username or email already exists",
        ));
    }

    let password_hash = state
        .password_service
        .hash_password(password)
        .map_err(respond_error)?;

    let user = users::insert_admin(
        pool.inner(),
        NewAdmin {
            username,
            email: &email,
            divisi,
            password_hash: &password_hash,
        },
    )
    .await
    .map_err(|err| {
        if users::is_unique_violation(&err) {
            respond_message(Status::Conflict, "Username or email already exists")
        } else {
            respond_error(err)
        }
    })?;

    log::info!("registered admin {} ({})", user.id, username);

    Ok(status::Custom(
        Status::Created,
        Json(RegisterResponse {
            message: "Admin registered successfully".to_string(),
            user: UserSummary::from(&user),
        }),
    ))
}

#[openapi(tag = "Auth")]
#[post("/auth/register-user", data = "<payload>")]
pub async fn register_warga(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<RegisterWargaRequest>,
) -> CreatedResult<RegisterResponse> {
    let payload = payload.into_inner();

    let (Some(nik), Some(nama), Some(email), Some(password)) = (
        validation::present(&payload.nik),
        validation::present(&payload.nama),
        validation::present(&payload.email),
        non_empty(&payload.password),
    ) else {
        return Err(invalid_input(ValidationError::MissingFields(
            "NIK, nama, email, and password are required",
        )));
    };

    let email = email.to_lowercase();
    validation::validate_email(&email).map_err(invalid_input)?;
    validation::validate_nik(nik).map_err(invalid_input)?;
    validation::validate_password(password).map_err(invalid_input)?;

    let taken = users::nik_or_email_taken(pool.inner(), nik, &email)
        .await
        .map_err(respond_error)?;
    if taken {
        return Err(respond_message(Status::Conflict, "NIK or email already exists"));
    }

    let password_hash = state
        .password_service
        .hash_password(password)
        .map_err(respond_error)?;

    let user = users::insert_warga(
        pool.inner(),
        NewWarga {
            nik,
            nama,
            email: &email,
            password_hash: &password_hash,
        },
    )
    .await
    .map_err(|err| {
        if users::is_unique_violation(&err) {
            respond_message(Status::Conflict, "NIK or email already exists")
        } else {
            respond_error(err)
        }
    })?;

    log::info!("registered warga {}", user.id);

    Ok(status::Custom(
        Status::Created,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user: UserSummary::from(&user),
        }),
    ))
}

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<payload>")]
pub async fn login_admin(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<AdminLoginRequest>,
) -> AuthRouteResult<LoginResponse> {
    let (Some(username), Some(password)) = (
        validation::present(&payload.username),
        non_empty(&payload.password),
    ) else {
        return Err(respond_message(
            Status::BadRequest,
            "Username and password are required",
        ));
    };

    let credentials = users::find_admin_credentials(pool.inner(), username)
        .await
        .map_err(respond_error)?;

    let user = check_credentials(state, pool, credentials, password).await?;
    start_session(state, user).await.map(Json)
}

#[openapi(tag = "Auth")]
#[post("/auth/login-user", data = "<payload>")]
pub async fn login_warga(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<WargaLoginRequest>,
) -> AuthRouteResult<LoginResponse> {
    let (Some(nik), Some(password)) = (
        validation::present(&payload.nik),
        non_empty(&payload.password),
    ) else {
        return Err(respond_message(
            Status::BadRequest,
            "NIK and password are required",
        ));
    };

    let credentials = users::find_warga_credentials(pool.inner(), nik)
        .await
        .map_err(respond_error)?;

    let user = check_credentials(state, pool, credentials, password).await?;
    start_session(state, user).await.map(Json)
}

#[openapi(tag = "Auth")]
#[get("/auth/verify")]
pub async fn verify(user: AuthUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        valid: true,
        user: UserSummary::from(&user.user),
    })
}

#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<payload>")]
pub async fn refresh(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    payload: Json<RefreshTokenRequest>,
) -> AuthRouteResult<RefreshResponse> {
    let Some(token) = validation::present(&payload.refresh_token) else {
        return Err(respond_message(
            Status::BadRequest,
            "Refresh token is required",
        ));
    };

    let claims = state
        .jwt_service
        .decode_refresh_token(token)
        .map_err(respond_error)?;
    let token_id = claims.token_id().map_err(respond_error)?;
    let claimed_user = claims.user_id().map_err(respond_error)?;

    let active = state
        .refresh_store
        .find_active(token_id, token, Utc::now())
        .await
        .map_err(respond_error)?;

    if active.user_id != claimed_user {
        log::warn!(
            "refresh token {} presented for user {} but issued to {}",
            token_id,
            claimed_user,
            active.user_id
        );
        return Err(respond_error(AuthError::RefreshTokenInvalid));
    }

    let user = users::find_by_id(pool.inner(), active.user_id)
        .await
        .map_err(respond_error)?
        .ok_or_else(|| respond_error(AuthError::UserNotFound))?;

    let access = state
        .jwt_service
        .issue_access_token(&user)
        .map_err(respond_error)?;

    log::debug!("issued access token for user {} via refresh", user.id);

    Ok(Json(RefreshResponse {
        access_token: access.token,
        user: UserSummary::from(&user),
    }))
}

#[openapi(tag = "Auth")]
#[post("/auth/logout", data = "<payload>")]
pub async fn logout(
    state: &State<AuthState>,
    payload: Json<RefreshTokenRequest>,
) -> AuthRouteResult<MessageResponse> {
    let Some(token) = validation::present(&payload.refresh_token) else {
        return Err(respond_message(
            Status::BadRequest,
            "Refresh token is required",
        ));
    };

    // An expired token can still be revoked; only the signature must hold.
    let token_id = state
        .jwt_service
        .decode_refresh_token_for_revocation(token)
        .and_then(|claims| claims.token_id())
        .map_err(|_| respond_message(Status::NotFound, "Refresh token not found"))?;

    let revoked = state
        .refresh_store
        .revoke(token_id, token, Utc::now())
        .await
        .map_err(respond_error)?;

    if !revoked {
        return Err(respond_message(Status::NotFound, "Refresh token not found"));
    }

    log::info!("revoked refresh token {}", token_id);

    Ok(Json(MessageResponse {
        message: "Logout successful".to_string(),
    }))
}

#[openapi(tag = "Auth")]
#[post("/auth/verify-password", data = "<payload>")]
pub async fn verify_password(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    user: AuthUser,
    payload: Json<VerifyPasswordRequest>,
) -> AuthRouteResult<PasswordCheckResponse> {
    let Some(password) = non_empty(&payload.password) else {
        return Err(respond_message(Status::BadRequest, "Password is required"));
    };

    let stored = users::find_password_hash(pool.inner(), user.id())
        .await
        .map_err(respond_error)?
        .ok_or_else(|| respond_error(AuthError::UserNotFound))?;

    let matches = state
        .password_service
        .verify_password(password, &stored)
        .map_err(respond_error)?;

    if !matches {
        return Err(respond_error(AuthError::InvalidPassword));
    }

    Ok(Json(PasswordCheckResponse {
        valid: true,
        message: "Password verified successfully".to_string(),
    }))
}

/// Passwords are compared exactly as sent, so only emptiness is checked.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Unknown identities and wrong passwords both end in the same 401.
async fn check_credentials(
    state: &State<AuthState>,
    pool: &State<sqlx::PgPool>,
    credentials: Option<UserCredentials>,
    password: &str,
) -> Result<UserRecord, AuthRouteError> {
    let Some(UserCredentials {
        user,
        password_hash,
    }) = credentials
    else {
        state.password_service.verify_dummy(password);
        return Err(respond_error(AuthError::InvalidCredentials));
    };

    let valid = state
        .password_service
        .verify_password(password, &password_hash)
        .map_err(respond_error)?;

    if !valid {
        log::debug!("password mismatch for user {}", user.id);
        return Err(respond_error(AuthError::InvalidCredentials));
    }

    if state.password_service.needs_rehash(&password_hash) {
        match state.password_service.hash_password(password) {
            Ok(upgraded) => {
                if let Err(err) = users::update_password_hash(pool.inner(), user.id, &upgraded).await
                {
                    log::warn!("failed to upgrade password hash for user {}: {}", user.id, err);
                }
            }
            Err(err) => log::warn!("failed to rehash password for user {}: {}", user.id, err),
        }
    }

    Ok(user)
}

async fn start_session(
    state: &State<AuthState>,
    user: UserRecord,
) -> Result<LoginResponse, AuthRouteError> {
    let access = state
        .jwt_service
        .issue_access_token(&user)
        .map_err(respond_error)?;
    let refresh = state
        .jwt_service
        .issue_refresh_token(user.id)
        .map_err(respond_error)?;

    state
        .refresh_store
        .record(user.id, &refresh)
        .await
        .map_err(respond_error)?;

    log::info!("user {} logged in as {}", user.id, user.role.as_str());

    Ok(LoginResponse {
        message: "Login successful".to_string(),
        access_token: access.token,
        refresh_token: refresh.token,
        user: UserSummary::from(&user),
    })
}

fn invalid_input(err: ValidationError) -> AuthRouteError {
    respond_message(Status::BadRequest, &err.to_string())
}

fn respond_error(err: AuthError) -> AuthRouteError {
    let status = err.status();
    if status == Status::InternalServerError {
        log::error!("auth route failed: {}", err);
    }
    status::Custom(status, Json(ErrorResponse::new(err.public_message())))
}

fn respond_message(status: Status, message: &str) -> AuthRouteError {
    status::Custom(status, Json(ErrorResponse::new(message)))
}

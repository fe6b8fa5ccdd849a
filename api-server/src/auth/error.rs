use rocket::http::Status;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("No token provided")]
    MissingToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid refresh token")]
    RefreshTokenInvalid,
    #[error("Refresh token revoked")]
    RefreshTokenRevoked,
    #[error("Refresh token expired")]
    RefreshTokenExpired,
    #[error("Access denied")]
    Forbidden,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("database error: {0}")]
    Sqlx(#[from] rocket_db_pools::sqlx::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::InvalidCredentials
            | AuthError::InvalidPassword
            | AuthError::MissingToken
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::UserNotFound
            | AuthError::RefreshTokenInvalid
            | AuthError::RefreshTokenRevoked
            | AuthError::RefreshTokenExpired => Status::Unauthorized,
            AuthError::Forbidden => Status::Forbidden,
            AuthError::Config(_)
            | AuthError::Sqlx(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_)
            | AuthError::Bcrypt(_) => Status::InternalServerError,
        }
    }

    /// Message safe to send to a client. Server-side failures collapse to a
    /// generic string; the detail only goes to the log.
    pub fn public_message(&self) -> String {
        if self.status() == Status::InternalServerError {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

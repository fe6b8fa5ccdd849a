use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::auth::responses::Role;
use crate::auth::users::UserRecord;
use crate::auth::{AuthConfig, AuthError, AuthResult};

const REFRESH_TOKEN_TYPE: &str = "refresh";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nik: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nama: Option<String>,
}

impl AccessTokenClaims {
    pub fn user_id(&self) -> AuthResult<i32> {
        self.sub.parse().map_err(|_| AuthError::TokenInvalid)
    }
}

/// Refresh tokens only carry the subject and a token id; everything else is
/// looked up again when the token is redeemed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub typ: String,
}

impl RefreshTokenClaims {
    pub fn user_id(&self) -> AuthResult<i32> {
        self.sub.parse().map_err(|_| AuthError::RefreshTokenInvalid)
    }

    pub fn token_id(&self) -> AuthResult<Uuid> {
        self.jti.parse().map_err(|_| AuthError::RefreshTokenInvalid)
    }
}

#[derive(Debug, Clone)]
pub struct SignedAccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SignedRefreshToken {
    pub token_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtService {
    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
    validation: Validation,
    revocation_validation: Validation,
    issuer: String,
    audience: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        let access_secret = config.jwt_secret.as_bytes();
        let refresh_secret = config.jwt_refresh_secret.as_bytes();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.audience.clone()]);
        validation.set_issuer(&[config.issuer.clone()]);
        validation.leeway = 30;

        // Logout must still be able to revoke a token whose `exp` has passed.
        let mut revocation_validation = validation.clone();
        revocation_validation.validate_exp = false;

        Ok(Self {
            access_encoding_key: EncodingKey::from_secret(access_secret),
            access_decoding_key: DecodingKey::from_secret(access_secret),
            refresh_encoding_key: EncodingKey::from_secret(refresh_secret),
            refresh_decoding_key: DecodingKey::from_secret(refresh_secret),
            validation,
            revocation_validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        })
    }

    pub fn issue_access_token(&self, user: &UserRecord) -> AuthResult<SignedAccessToken> {
        let now = Utc::now();
        let expires_at = now + self.access_token_ttl;

        let (username, nik, nama) = match user.role {
            Role::Admin => (user.username.clone(), None, None),
            Role::Warga => (None, user.nik.clone(), user.nama.clone()),
        };

        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            role: user.role.as_str().to_string(),
            username,
            nik,
            nama,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.access_encoding_key,
        )?;

        Ok(SignedAccessToken { token, expires_at })
    }

    pub fn issue_refresh_token(&self, user_id: i32) -> AuthResult<SignedRefreshToken> {
        let now = Utc::now();
        let expires_at = now + self.refresh_token_ttl;
        let token_id = Uuid::new_v4();

        let claims = RefreshTokenClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: token_id.to_string(),
            typ: REFRESH_TOKEN_TYPE.to_string(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.refresh_encoding_key,
        )?;

        Ok(SignedRefreshToken {
            token_id,
            token,
            expires_at,
        })
    }

    pub fn decode_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        decode::<AccessTokenClaims>(token, &self.access_decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            })
    }

    pub fn decode_refresh_token(&self, token: &str) -> AuthResult<RefreshTokenClaims> {
        let claims =
            decode::<RefreshTokenClaims>(token, &self.refresh_decoding_key, &self.validation)
                .map(|data| data.claims)
                .map_err(|err| match err.kind() {
                    ErrorKind::ExpiredSignature => AuthError::RefreshTokenExpired,
                    _ => AuthError::RefreshTokenInvalid,
                })?;
        ensure_refresh_type(claims)
    }

    /// Signature, issuer and audience are still checked; only `exp` is not.
    pub fn decode_refresh_token_for_revocation(
        &self,
        token: &str,
    ) -> AuthResult<RefreshTokenClaims> {
        let claims = decode::<RefreshTokenClaims>(
            token,
            &self.refresh_decoding_key,
            &self.revocation_validation,
        )
        .map(|data| data.claims)
        .map_err(|_| AuthError::RefreshTokenInvalid)?;
        ensure_refresh_type(claims)
    }
}

fn ensure_refresh_type(claims: RefreshTokenClaims) -> AuthResult<RefreshTokenClaims> {
    if claims.typ == REFRESH_TOKEN_TYPE {
        Ok(claims)
    } else {
        Err(AuthError::RefreshTokenInvalid)
    }
}

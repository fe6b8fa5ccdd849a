use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rocket_db_pools::sqlx::{self, PgPool, Row};
use sha2::{Digest, Sha512};
use uuid::Uuid;

use crate::auth::jwt::SignedRefreshToken;
use crate::auth::{AuthError, AuthResult};

const SALT_LEN: usize = 16;

/// How long revoked rows are kept before the sweep removes them.
pub const REVOKED_RETENTION_HOURS: i64 = 24;

/// Outcome of a successful refresh-token lookup.
#[derive(Debug, Clone)]
pub struct ActiveRefreshToken {
    pub token_id: Uuid,
    pub user_id: i32,
    pub expires_at: DateTime<Utc>,
}

/// Refresh-token rows keyed by the token's `jti`. Only a salted digest of
/// the token string is stored.
#[derive(Debug, Clone)]
pub struct RefreshTokenStore {
    pool: PgPool,
}

impl RefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, user_id: i32, issued: &SignedRefreshToken) -> AuthResult<()> {
        let salt = generate_salt();
        let stored = encode_hash(&salt, &hash_secret(&issued.token, &salt));

        sqlx::query(
            "INSERT INTO refresh_tokens (token_id, user_id, hashed_token, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(issued.token_id)
        .bind(user_id)
        .bind(stored)
        .bind(issued.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Resolve a presented token to its row. Absent, revoked and expired rows
    /// are distinct errors that all map to 401.
    pub async fn find_active(
        &self,
        token_id: Uuid,
        plain_token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<ActiveRefreshToken> {
        let row = sqlx::query(
            "SELECT user_id, hashed_token, expires_at, revoked FROM refresh_tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or(AuthError::RefreshTokenInvalid)?;

        let user_id: i32 = row.try_get("user_id")?;
        let hashed: String = row.try_get("hashed_token")?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        let revoked: bool = row.try_get("revoked")?;

        if !verify_secret(plain_token, &hashed) {
            return Err(AuthError::RefreshTokenInvalid);
        }

        if revoked {
            return Err(AuthError::RefreshTokenRevoked);
        }

        if expires_at <= now {
            return Err(AuthError::RefreshTokenExpired);
        }

        Ok(ActiveRefreshToken {
            token_id,
            user_id,
            expires_at,
        })
    }

    /// Flip the revoked flag. Returns `false` when no row matches the token.
    /// Revoking an already revoked token succeeds and keeps the first
    /// revocation time.
    pub async fn revoke(
        &self,
        token_id: Uuid,
        plain_token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<bool> {
        let hashed = sqlx::query_scalar::<_, String>(
            "SELECT hashed_token FROM refresh_tokens WHERE token_id = $1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(hashed) = hashed else {
            return Ok(false);
        };

        if !verify_secret(plain_token, &hashed) {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE, revoked_at = COALESCE(revoked_at, $1) WHERE token_id = $2",
        )
        .bind(now)
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at <= $1 OR (revoked AND revoked_at <= $2)",
        )
        .bind(now)
        .bind(now - Duration::hours(REVOKED_RETENTION_HOURS))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn generate_salt() -> [u8; SALT_LEN] {
    let mut bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn hash_secret(secret: &str, salt: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn encode_hash(salt: &[u8], hash: &[u8]) -> String {
    let salt_b64 = STANDARD_NO_PAD.encode(salt);
    let hash_b64 = STANDARD_NO_PAD.encode(hash);
    format!("{}${}", salt_b64, hash_b64)
}

fn verify_secret(secret: &str, stored: &str) -> bool {
    let Some((salt_b64, hash_b64)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (STANDARD_NO_PAD.decode(salt_b64), STANDARD_NO_PAD.decode(hash_b64))
    else {
        return false;
    };
    let candidate = hash_secret(secret, &salt);
    constant_time_eq(&candidate, &expected)
}

/// Constant-time comparison to avoid timing side-channels.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

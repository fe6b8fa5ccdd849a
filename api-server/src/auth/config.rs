use crate::auth::{AuthError, AuthResult};

const DEFAULT_ACCESS_EXPIRY: &str = "15m";
const DEFAULT_REFRESH_EXPIRY: &str = "7d";

/// Authentication configuration loaded from environment variables.
///
/// Signing secrets have no fallback: a missing `JWT_SECRET` or
/// `JWT_REFRESH_SECRET` is a configuration error.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let issuer = std::env::var("LAPOR_JWT_ISSUER").unwrap_or_else(|_| "lapor".into());
        let audience =
            std::env::var("LAPOR_JWT_AUDIENCE").unwrap_or_else(|_| "lapor-api".into());

        let access_expiry = std::env::var("JWT_ACCESS_EXPIRY")
            .unwrap_or_else(|_| DEFAULT_ACCESS_EXPIRY.into());
        let access_token_ttl_secs = parse_duration_secs(&access_expiry).ok_or_else(|| {
            AuthError::Config(format!("JWT_ACCESS_EXPIRY '{access_expiry}' is not a valid duration"))
        })?;

        let refresh_expiry = std::env::var("JWT_REFRESH_EXPIRY")
            .unwrap_or_else(|_| DEFAULT_REFRESH_EXPIRY.into());
        let refresh_token_ttl_secs = parse_duration_secs(&refresh_expiry).ok_or_else(|| {
            AuthError::Config(format!(
                "JWT_REFRESH_EXPIRY '{refresh_expiry}' is not a valid duration"
            ))
        })?;

        let jwt_secret = required_secret("JWT_SECRET")?;
        let jwt_refresh_secret = required_secret("JWT_REFRESH_SECRET")?;

        let config = Self {
            issuer,
            audience,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            jwt_secret,
            jwt_refresh_secret,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would let one key sign both token kinds.
    pub fn validate(&self) -> AuthResult<()> {
        if self.jwt_secret == self.jwt_refresh_secret {
            return Err(AuthError::Config(
                "JWT_SECRET and JWT_REFRESH_SECRET must differ".into(),
            ));
        }
        if self.access_token_ttl_secs <= 0 || self.refresh_token_ttl_secs <= 0 {
            return Err(AuthError::Config("token lifetimes must be positive".into()));
        }
        Ok(())
    }
}

fn required_secret(name: &str) -> AuthResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AuthError::Config(format!("{name} is required"))),
    }
}

/// Parse a lifetime such as `15m`, `7d` or `1h 30m` into whole seconds.
/// A bare integer is read as seconds.
pub fn parse_duration_secs(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return i64::try_from(secs).ok();
    }
    let duration = humantime::parse_duration(raw).ok()?;
    i64::try_from(duration.as_secs()).ok()
}

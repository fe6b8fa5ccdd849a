//! Authentication module: configuration, credential handling, token minting,
//! Rocket request guards, and HTTP route handlers.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod refresh_store;
pub mod responses;
pub mod routes;
pub mod users;
pub mod validation;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, RequireAdmin, RequireWarga};
pub use jwt::JwtService;
pub use passwords::PasswordService;
pub use refresh_store::RefreshTokenStore;
pub use responses::Role;

#[derive(Clone)]
pub struct AuthState {
    pub password_service: Arc<PasswordService>,
    pub jwt_service: Arc<JwtService>,
    pub refresh_store: RefreshTokenStore,
}

impl AuthState {
    pub fn new(
        password_service: PasswordService,
        jwt_service: JwtService,
        refresh_store: RefreshTokenStore,
    ) -> Self {
        Self {
            password_service: Arc::new(password_service),
            jwt_service: Arc::new(jwt_service),
            refresh_store,
        }
    }

    /// Build every auth service from one configuration and pool.
    pub fn from_config(config: AuthConfig, pool: sqlx::PgPool) -> AuthResult<Self> {
        let password_service = PasswordService::new()?;
        let jwt_service = JwtService::from_config(&config)?;
        let refresh_store = RefreshTokenStore::new(pool);
        Ok(Self::new(password_service, jwt_service, refresh_store))
    }
}

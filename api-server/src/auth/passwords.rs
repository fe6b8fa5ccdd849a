use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::RngCore;

use crate::auth::{AuthError, AuthResult};

/// bcrypt cost shared by every service that reads the `users` table.
pub const BCRYPT_COST: u32 = 10;

const SALT_LEN: usize = 16;

const DUMMY_PASSWORD: &str = "lapor-dummy-password";

/// Hashes new passwords with bcrypt and still verifies the Argon2id PHC
/// strings an earlier build of this service wrote.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    dummy_hash: String,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        let dummy_hash = bcrypt::hash(DUMMY_PASSWORD, BCRYPT_COST)?;
        Ok(Self {
            argon2: Argon2::default(),
            dummy_hash,
        })
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        Ok(bcrypt::hash(password, BCRYPT_COST)?)
    }

    pub fn verify_password(&self, password: &str, encoded: &str) -> AuthResult<bool> {
        if is_bcrypt_hash(encoded) {
            return Ok(bcrypt::verify(password, encoded)?);
        }

        // Parameters come from the PHC string, not from `self.argon2`.
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::from(err)),
        }
    }

    /// Burn roughly the same time as a real verification so unknown
    /// identities are not distinguishable by latency.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify_password(password, &self.dummy_hash);
    }

    /// True for Argon2 hashes and for bcrypt hashes at another cost.
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        bcrypt_cost(encoded) != Some(BCRYPT_COST)
    }
}

/// Argon2id PHC string in the format earlier builds stored. Only fixtures
/// need to produce these now.
pub fn argon2id_hash(password: &str) -> AuthResult<String> {
    let mut builder = ParamsBuilder::new();
    builder.m_cost(19 * 1024); // 19 MiB
    builder.t_cost(2);
    builder.p_cost(1);
    let params = builder.build().map_err(AuthError::from)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes).map_err(AuthError::from)?;
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(AuthError::from)?
        .to_string();
    Ok(hash)
}

fn is_bcrypt_hash(encoded: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| encoded.starts_with(prefix))
}

/// `$2b$10$...` -> `Some(10)`.
fn bcrypt_cost(encoded: &str) -> Option<u32> {
    if !is_bcrypt_hash(encoded) {
        return None;
    }
    encoded.split('$').nth(2)?.parse().ok()
}

//! Process-level settings read once at startup: which services to mount,
//! where the database lives, and how often to sweep refresh tokens.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use rocket::figment::Figment;
use thiserror::Error;

pub const DEFAULT_SWEEP_SECS: u64 = 3600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("LAPOR_SERVICES must be one of auth, laporan, all (got '{0}')")]
    UnknownServiceSet(String),
    #[error("DB_PASSWORD is required when DB_HOST is set")]
    MissingDbPassword,
    #[error("{key} is not a valid number: '{value}'")]
    InvalidNumber { key: &'static str, value: String },
}

/// Route groups a single process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceSet {
    Auth,
    Laporan,
    #[default]
    All,
}

impl ServiceSet {
    pub fn serves_auth(&self) -> bool {
        matches!(self, ServiceSet::Auth | ServiceSet::All)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceSet::Auth => "auth",
            ServiceSet::Laporan => "laporan",
            ServiceSet::All => "all",
        }
    }
}

impl FromStr for ServiceSet {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auth" => Ok(ServiceSet::Auth),
            "laporan" => Ok(ServiceSet::Laporan),
            "all" | "" => Ok(ServiceSet::All),
            _ => Err(ConfigError::UnknownServiceSet(value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub services: ServiceSet,
    /// `None` leaves `databases.lapor_db.url` to Rocket's own config sources.
    pub database_url: Option<String>,
    pub port: Option<u16>,
    /// `None` disables the refresh-token sweep.
    pub refresh_sweep_interval: Option<Duration>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let services = match lookup("LAPOR_SERVICES") {
            Some(raw) => raw.parse()?,
            None => ServiceSet::default(),
        };

        let port = parse_number::<u16>(&lookup, "PORT")?;
        let sweep_secs = parse_number::<u64>(&lookup, "LAPOR_REFRESH_SWEEP_SECS")?
            .unwrap_or(DEFAULT_SWEEP_SECS);
        let refresh_sweep_interval = (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs));

        Ok(Self {
            services,
            database_url: database_url(&lookup)?,
            port,
            refresh_sweep_interval,
        })
    }

    /// Rocket's figment with the environment-derived values layered on top.
    pub fn figment(&self) -> Figment {
        let mut figment = rocket::Config::figment();
        if let Some(url) = &self.database_url {
            figment = figment.merge(("databases.lapor_db.url", url.as_str()));
        }
        if let Some(port) = self.port {
            figment = figment.merge(("port", port));
        }
        figment
    }
}

fn database_url<F>(lookup: &F) -> Result<Option<String>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
        return Ok(Some(url));
    }

    let Some(host) = lookup("DB_HOST").filter(|host| !host.trim().is_empty()) else {
        return Ok(None);
    };

    let password = lookup("DB_PASSWORD").ok_or(ConfigError::MissingDbPassword)?;
    let port = lookup("DB_PORT").unwrap_or_else(|| "5432".to_string());
    let user = lookup("DB_USER").unwrap_or_else(|| "postgres".to_string());
    let name = lookup("DB_NAME").unwrap_or_else(|| "lapordb".to_string());

    Ok(Some(format!(
        "postgres://{}:{}@{}:{}/{}",
        user, password, host, port, name
    )))
}

fn parse_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value }),
        None => Ok(None),
    }
}

#[macro_use]
extern crate rocket;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod maintenance;
pub mod models;
pub mod request_logger;
pub mod routes;

use crate::auth::{AuthConfig, AuthState};
use crate::config::{ServerConfig, ServiceSet};
use crate::db::LaporDb;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket, Route};
use rocket_cors::{AllowedOrigins, Cors, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    openapi_get_routes,
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::Once;

static LOGGER: Once = Once::new();

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

/// CORS policy for browser clients; `X-Served-By` stays readable cross-origin.
pub fn cors() -> Result<Cors, rocket_cors::Error> {
    CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .expose_headers(
            [request_logger::SERVED_BY_HEADER]
                .into_iter()
                .map(String::from)
                .collect(),
        )
        .allow_credentials(true)
        .to_cors()
}

/// A Rocket that refuses to ignite, so startup problems found before the
/// build surface the same way as fairing failures.
fn refuse_ignition(reason: String) -> Rocket<Build> {
    rocket::build().attach(AdHoc::try_on_ignite("Startup Check", move |rocket| async move {
        log::error!("{}", reason);
        Err(rocket)
    }))
}

/// Handlers (plus `/openapi.json`) for the selected service set.
fn api_routes(services: ServiceSet) -> Vec<Route> {
    match services {
        ServiceSet::All => openapi_get_routes![
            routes::health::health_check,
            auth::routes::register_admin,
            auth::routes::register_warga,
            auth::routes::login_admin,
            auth::routes::login_warga,
            auth::routes::verify,
            auth::routes::refresh,
            auth::routes::logout,
            auth::routes::verify_password,
            routes::laporan::list_laporan,
            routes::laporan::list_public_laporan,
            routes::laporan::list_my_laporan,
            routes::laporan::create_laporan,
            routes::laporan::update_laporan_status,
        ],
        ServiceSet::Auth => openapi_get_routes![
            routes::health::health_check,
            auth::routes::register_admin,
            auth::routes::register_warga,
            auth::routes::login_admin,
            auth::routes::login_warga,
            auth::routes::verify,
            auth::routes::refresh,
            auth::routes::logout,
            auth::routes::verify_password,
        ],
        ServiceSet::Laporan => openapi_get_routes![
            routes::health::health_check,
            routes::laporan::list_laporan,
            routes::laporan::list_public_laporan,
            routes::laporan::list_my_laporan,
            routes::laporan::create_laporan,
            routes::laporan::update_laporan_status,
        ],
    }
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let server_config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => return refuse_ignition(format!("invalid server configuration: {err}")),
    };

    let cors = match cors() {
        Ok(cors) => cors,
        Err(err) => return refuse_ignition(format!("invalid CORS configuration: {err}")),
    };

    log::info!(
        "starting Lapor API (services: {})",
        server_config.services.as_str()
    );

    let services = server_config.services;
    let sweep_interval = server_config
        .refresh_sweep_interval
        .filter(|_| services.serves_auth());

    rocket::custom(server_config.figment())
        .attach(RequestLogger::from_env())
        .attach(LaporDb::init())
        .attach(cors)
        .attach(AdHoc::try_on_ignite(
            "Run Migrations",
            |rocket| async move {
                match LaporDb::fetch(&rocket) {
                    Some(db) => {
                        let pool = (**db).clone();
                        match db::run_migrations(&pool).await {
                            Ok(_) => {
                                log::info!("database migrations successful");
                                Ok(rocket)
                            }
                            Err(e) => {
                                log::error!("database migrations failed: {}", e);
                                Err(rocket)
                            }
                        }
                    }
                    None => {
                        log::error!("database pool not available for migrations");
                        Err(rocket)
                    }
                }
            },
        ))
        // Guards and handlers take the pool and auth services from managed state.
        .attach(AdHoc::try_on_ignite(
            "Manage DB Pool and Auth State",
            |rocket| async move {
                let Some(db) = LaporDb::fetch(&rocket) else {
                    log::error!("database pool not available for auth state");
                    return Err(rocket);
                };
                let pool = (**db).clone();

                let auth_state = match AuthConfig::from_env()
                    .and_then(|config| AuthState::from_config(config, pool.clone()))
                {
                    Ok(state) => state,
                    Err(err) => {
                        log::error!("failed to initialise authentication: {}", err);
                        return Err(rocket);
                    }
                };

                Ok(rocket.manage(pool).manage(auth_state))
            },
        ))
        .attach(AdHoc::on_liftoff("Spawn Refresh Token Sweep", move |rocket| {
            Box::pin(async move {
                let Some(every) = sweep_interval else {
                    log::info!("refresh token sweep disabled");
                    return;
                };
                match rocket.state::<AuthState>() {
                    Some(state) => {
                        maintenance::spawn_refresh_sweeper(state.refresh_store.clone(), every);
                    }
                    None => log::error!("failed to spawn refresh token sweep: auth state not found"),
                }
            })
        }))
        .mount("/", api_routes(services))
        .mount(
            "/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Lapor API", "../../openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
        .register("/", routes::catchers::all())
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use rocket_db_pools::sqlx::{self, PgPool};

    use crate::auth::passwords::PasswordService;
    use crate::auth::users::{self, NewAdmin, NewWarga, UserRecord};
    use crate::auth::{AuthConfig, AuthError, AuthState};

    pub use database::{TestDatabase, TestDatabaseError};

    pub const TEST_PASSWORD: &str = "Sup3rSecret!";

    /// Fixed configuration with distinct signing keys for tests.
    pub fn test_auth_config() -> AuthConfig {
        AuthConfig {
            issuer: "lapor-test".to_string(),
            audience: "lapor-api-test".to_string(),
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            jwt_secret: "test-access-secret-0123456789abcdef".to_string(),
            jwt_refresh_secret: "test-refresh-secret-fedcba9876543210".to_string(),
        }
    }

    /// Auth services over `pool` using [`test_auth_config`].
    pub fn test_auth_state(pool: PgPool) -> AuthState {
        AuthState::from_config(test_auth_config(), pool).expect("test auth state")
    }

    /// Seeds accounts directly through the storage layer.
    pub struct TestFixtures<'a> {
        pool: &'a PgPool,
        passwords: PasswordService,
    }

    impl<'a> TestFixtures<'a> {
        pub fn new(pool: &'a PgPool) -> Self {
            Self {
                pool,
                passwords: PasswordService::new().expect("password service"),
            }
        }

        pub async fn insert_admin(
            &self,
            username: &str,
            email: &str,
            password: &str,
        ) -> Result<UserRecord, AuthError> {
            let hash = self.passwords.hash_password(password)?;
            users::insert_admin(
                self.pool,
                NewAdmin {
                    username,
                    email,
                    divisi: Some("kebersihan"),
                    password_hash: &hash,
                },
            )
            .await
        }

        pub async fn insert_warga(
            &self,
            nik: &str,
            nama: &str,
            email: &str,
            password: &str,
        ) -> Result<UserRecord, AuthError> {
            let hash = self.passwords.hash_password(password)?;
            users::insert_warga(
                self.pool,
                NewWarga {
                    nik,
                    nama,
                    email,
                    password_hash: &hash,
                },
            )
            .await
        }

        /// Insert a warga whose password is stored as an Argon2id PHC string,
        /// the way accounts created by earlier builds look.
        pub async fn insert_legacy_warga(
            &self,
            nik: &str,
            nama: &str,
            email: &str,
            password: &str,
        ) -> Result<UserRecord, AuthError> {
            let hash = crate::auth::passwords::argon2id_hash(password)?;
            users::insert_warga(
                self.pool,
                NewWarga {
                    nik,
                    nama,
                    email,
                    password_hash: &hash,
                },
            )
            .await
        }

        pub async fn count_users(&self) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(self.pool)
                .await
        }

        pub async fn password_hash(&self, user_id: i32) -> Result<String, sqlx::Error> {
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(self.pool)
                .await
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::ImageExt;
        use testcontainers_modules::postgres::Postgres;
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        const POSTGRES_TAG: &str = "16-alpine";

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        impl TestDatabaseError {
            /// True when no Postgres could be reached at all, as opposed to a
            /// broken schema or query.
            pub fn is_unavailable(&self) -> bool {
                matches!(self, TestDatabaseError::Container(_))
            }
        }

        /// Ephemeral database for integration tests. Uses `TEST_DATABASE_URL`
        /// when set, otherwise a disposable Postgres container.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let (admin_url, container) = match std::env::var("TEST_DATABASE_URL") {
                    Ok(url) if !url.trim().is_empty() => (url, None),
                    _ => {
                        let container = Postgres::default().with_tag(POSTGRES_TAG).start().await?;
                        let host = container.get_host().await?.to_string();
                        let port = container.get_host_port_ipv4(5432).await?;
                        (
                            format!("postgres://postgres:postgres@{}:{}/postgres", host, port),
                            Some(container),
                        )
                    }
                };

                let base_options: PgConnectOptions =
                    admin_url.parse().map_err(TestDatabaseError::Sqlx)?;
                let base_options = base_options.log_statements(LevelFilter::Off);

                let base_name = base_options
                    .get_database()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "postgres".to_string());

                let admin_options = base_options.clone().database("postgres");
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await?;

                let new_db_name = format!("{}_{}", base_name, Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", new_db_name);
                sqlx::query(&create_sql).execute(&admin_pool).await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(base_options.clone().database(&new_db_name))
                    .await?;

                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name: new_db_name,
                    container,
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close pool connections and drop the ephemeral database.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }

                drop_database_with_fallback(self.admin_options.clone(), &self.database_name)
                    .await?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }

                Ok(())
            }
        }

        async fn drop_database_with_fallback(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;

            let drop_force = format!("DROP DATABASE \"{}\" WITH (FORCE)", database_name);
            match sqlx::query(&drop_force).execute(&admin_pool).await {
                Ok(_) => Ok(()),
                Err(err) if force_drop_unsupported(&err) => {
                    let drop_sql = format!("DROP DATABASE \"{}\"", database_name);
                    sqlx::query(&drop_sql).execute(&admin_pool).await?;
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }

        fn force_drop_unsupported(err: &sqlx::Error) -> bool {
            matches!(
                err,
                sqlx::Error::Database(db_err)
                    if db_err
                        .code()
                        .map(|code| code == "42601" || code == "0A000")
                        .unwrap_or(false)
            )
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let db_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ = drop_database_with_fallback(admin_options, &db_name).await;
                        });
                    } else {
                        std::thread::spawn(move || {
                            if let Ok(rt) = tokio::runtime::Runtime::new() {
                                rt.block_on(async move {
                                    pool.close().await;
                                    let _ =
                                        drop_database_with_fallback(admin_options, &db_name).await;
                                });
                            }
                        });
                    }
                }

                if let Some(container) = self.container.take() {
                    drop(container);
                }
            }
        }
    }

    /// Builder for Rocket instances used by the integration tests. Routes are
    /// mounted at `/` and the JSON error catchers are always registered.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        routes: Vec<Route>,
        pg_pool: Option<PgPool>,
        auth_state: Option<AuthState>,
    }

    impl TestRocketBuilder {
        /// Random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                ..Default::default()
            }
        }

        pub fn mount_routes(mut self, routes: Vec<Route>) -> Self {
            self.routes.extend(routes);
            self
        }

        pub fn manage_pg_pool(mut self, pool: PgPool) -> Self {
            self.pg_pool = Some(pool);
            self
        }

        pub fn manage_auth_state(mut self, state: AuthState) -> Self {
            self.auth_state = Some(state);
            self
        }

        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment)
                .mount("/", self.routes)
                .register("/", crate::routes::catchers::all());

            if let Some(pool) = self.pg_pool {
                rocket = rocket.manage(pool);
            }

            if let Some(state) = self.auth_state {
                rocket = rocket.manage(state);
            }

            rocket
        }

        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}

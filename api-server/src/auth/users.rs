//! Credential store queries over the `users` table.

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::postgres::PgRow;
use rocket_db_pools::sqlx::{self, FromRow, PgPool, Row};

use crate::auth::responses::Role;
use crate::auth::{AuthError, AuthResult};

const USER_COLUMNS: &str = "id, username, nik, nama, email, divisi, role, created_at";

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i32,
    pub username: Option<String>,
    pub nik: Option<String>,
    pub nama: Option<String>,
    pub email: String,
    pub divisi: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for UserRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role.parse::<Role>().map_err(|err| sqlx::Error::ColumnDecode {
            index: "role".into(),
            source: Box::new(err),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            nik: row.try_get("nik")?,
            nama: row.try_get("nama")?,
            email: row.try_get("email")?,
            divisi: row.try_get("divisi")?,
            role,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// A user row together with its stored hash, used only by login paths.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: UserRecord,
    pub password_hash: String,
}

impl<'r> FromRow<'r, PgRow> for UserCredentials {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user: UserRecord::from_row(row)?,
            password_hash: row.try_get("password_hash")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewAdmin<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub divisi: Option<&'a str>,
    pub password_hash: &'a str,
}

#[derive(Debug, Clone)]
pub struct NewWarga<'a> {
    pub nik: &'a str,
    pub nama: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

pub async fn find_by_id(pool: &PgPool, user_id: i32) -> AuthResult<Option<UserRecord>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let user = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_admin_credentials(
    pool: &PgPool,
    username: &str,
) -> AuthResult<Option<UserCredentials>> {
    let sql = format!(
        "SELECT {USER_COLUMNS}, password_hash FROM users WHERE username = $1 AND role = 'admin'"
    );
    let row = sqlx::query_as::<_, UserCredentials>(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_warga_credentials(
    pool: &PgPool,
    nik: &str,
) -> AuthResult<Option<UserCredentials>> {
    let sql = format!(
        "SELECT {USER_COLUMNS}, password_hash FROM users WHERE nik = $1 AND role = 'warga'"
    );
    let row = sqlx::query_as::<_, UserCredentials>(&sql)
        .bind(nik)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_password_hash(pool: &PgPool, user_id: i32) -> AuthResult<Option<String>> {
    let hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(hash)
}

pub async fn username_or_email_taken(
    pool: &PgPool,
    username: &str,
    email: &str,
) -> AuthResult<bool> {
    let existing = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM users WHERE username = $1 OR lower(email) = lower($2) LIMIT 1",
    )
    .bind(username)
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(existing.is_some())
}

pub async fn nik_or_email_taken(pool: &PgPool, nik: &str, email: &str) -> AuthResult<bool> {
    let existing = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM users WHERE nik = $1 OR lower(email) = lower($2) LIMIT 1",
    )
    .bind(nik)
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(existing.is_some())
}

pub async fn insert_admin(pool: &PgPool, admin: NewAdmin<'_>) -> AuthResult<UserRecord> {
    let sql = format!(
        "INSERT INTO users (username, email, password_hash, divisi, role) VALUES ($1, $2, $3, $4, 'admin') RETURNING {USER_COLUMNS}"
    );
    let user = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(admin.username)
        .bind(admin.email)
        .bind(admin.password_hash)
        .bind(admin.divisi)
        .fetch_one(pool)
        .await?;
    Ok(user)
}

pub async fn insert_warga(pool: &PgPool, warga: NewWarga<'_>) -> AuthResult<UserRecord> {
    let sql = format!(
        "INSERT INTO users (nik, nama, email, password_hash, role) VALUES ($1, $2, $3, $4, 'warga') RETURNING {USER_COLUMNS}"
    );
    let user = sqlx::query_as::<_, UserRecord>(&sql)
        .bind(warga.nik)
        .bind(warga.nama)
        .bind(warga.email)
        .bind(warga.password_hash)
        .fetch_one(pool)
        .await?;
    Ok(user)
}

pub async fn update_password_hash(pool: &PgPool, user_id: i32, hash: &str) -> AuthResult<()> {
    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(hash)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// True when an insert lost a race against a concurrent registration.
pub fn is_unique_violation(err: &AuthError) -> bool {
    matches!(
        err,
        AuthError::Sqlx(sqlx::Error::Database(db_err))
            if db_err.code().map(|code| code == "23505").unwrap_or(false)
    )
}

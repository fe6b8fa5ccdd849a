//! Complaint reports. Warga file them, admins list them and move them
//! through their status lifecycle, and `publik` ones are listed for anyone.

use rocket::State;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket_db_pools::sqlx;
use rocket_okapi::openapi;

use crate::auth::{RequireAdmin, RequireWarga};
use crate::auth::validation;
use crate::error::ApiError;
use crate::models::{
    CreateLaporanRequest, INVALID_REPORT_DIVISI_MESSAGE, INVALID_STATUS_MESSAGE,
    INVALID_TIPE_MESSAGE, Laporan, LaporanStatus, LaporanTipe, PublicLaporan, PublicLaporanPage,
    UpdateStatusRequest,
};

const LAPORAN_COLUMNS: &str =
    "id, title, description, tipe, divisi, status, created_by, created_at, updated_at";

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;

/// Missing, unparsable or out-of-range values fall back to page 1 of 10.
fn page_window(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let limit = limit
        .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = (page - 1).saturating_mul(limit);
    (page, limit, offset)
}

/// List every report, newest first.
#[openapi(tag = "Laporan")]
#[get("/laporan")]
pub async fn list_laporan(
    pool: &State<sqlx::PgPool>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<Laporan>>, ApiError> {
    let sql = format!("SELECT {LAPORAN_COLUMNS} FROM laporan ORDER BY created_at DESC, id DESC");
    let reports: Vec<Laporan> = sqlx::query_as(&sql).fetch_all(pool.inner()).await?;

    Ok(Json(reports))
}

/// `publik` reports for anyone, newest first, one page at a time.
#[openapi(tag = "Laporan")]
#[get("/laporan/public?<page>&<limit>")]
pub async fn list_public_laporan(
    pool: &State<sqlx::PgPool>,
    page: Option<i64>,
    limit: Option<i64>,
) -> Result<Json<PublicLaporanPage>, ApiError> {
    let (page, limit, offset) = page_window(page, limit);

    let total_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM laporan WHERE tipe = 'publik'")
        .fetch_one(pool.inner())
        .await?;

    let sql = format!(
        "SELECT {LAPORAN_COLUMNS} FROM laporan WHERE tipe = 'publik' ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
    );
    let reports: Vec<Laporan> = sqlx::query_as(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool.inner())
        .await?;

    let total_pages = (total_items + limit - 1) / limit;
    log::debug!(
        "public laporan page {} of {} ({} items)",
        page,
        total_pages,
        reports.len()
    );

    Ok(Json(PublicLaporanPage {
        data: reports.into_iter().map(PublicLaporan::from).collect(),
        page,
        limit,
        total_items,
        total_pages,
    }))
}

/// Reports filed by the calling warga, newest first. Anonymous reports are
/// included only when `user_hash` matches the key they were filed under.
#[openapi(tag = "Laporan")]
#[get("/laporan/my?<user_hash>")]
pub async fn list_my_laporan(
    pool: &State<sqlx::PgPool>,
    warga: RequireWarga,
    user_hash: Option<String>,
) -> Result<Json<Vec<Laporan>>, ApiError> {
    let user_hash = validation::present(&user_hash);
    let sql = format!(
        "SELECT {LAPORAN_COLUMNS} FROM laporan \
         WHERE created_by = $1 OR (tipe = 'anonim' AND anonymous_key = $2) \
         ORDER BY created_at DESC, id DESC"
    );
    let reports: Vec<Laporan> = sqlx::query_as(&sql)
        .bind(warga.0.id())
        .bind(user_hash)
        .fetch_all(pool.inner())
        .await?;

    Ok(Json(reports))
}

/// File a new report. The status always starts at `pending`; an `anonim`
/// report stores the client key instead of the caller's id.
#[openapi(tag = "Laporan")]
#[post("/laporan", data = "<payload>")]
pub async fn create_laporan(
    pool: &State<sqlx::PgPool>,
    warga: RequireWarga,
    payload: Json<CreateLaporanRequest>,
) -> Result<status::Custom<Json<Laporan>>, ApiError> {
    let (Some(title), Some(description)) = (
        validation::present(&payload.title),
        validation::present(&payload.description),
    ) else {
        return Err(ApiError::BadRequest(
            "Title and description are required".to_string(),
        ));
    };

    let tipe = match validation::present(&payload.tipe) {
        Some(raw) => raw
            .parse::<LaporanTipe>()
            .map_err(|_| ApiError::BadRequest(INVALID_TIPE_MESSAGE.to_string()))?,
        None => LaporanTipe::default(),
    };

    let divisi = validation::present(&payload.divisi);
    if let Some(divisi) = divisi {
        validation::validate_divisi(divisi)
            .map_err(|_| ApiError::BadRequest(INVALID_REPORT_DIVISI_MESSAGE.to_string()))?;
    }

    let (created_by, anonymous_key) = match tipe {
        LaporanTipe::Anonim => {
            let Some(key) = validation::present(&payload.user_nik_hash) else {
                return Err(ApiError::BadRequest(
                    "userNikHash is required for anonymous reports".to_string(),
                ));
            };
            (None, Some(key))
        }
        LaporanTipe::Publik | LaporanTipe::Private => (Some(warga.0.id()), None),
    };

    let sql = format!(
        "INSERT INTO laporan (title, description, tipe, divisi, status, created_by, anonymous_key) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {LAPORAN_COLUMNS}"
    );
    let report: Laporan = sqlx::query_as(&sql)
        .bind(title)
        .bind(description)
        .bind(tipe.as_str())
        .bind(divisi)
        .bind(LaporanStatus::Pending.as_str())
        .bind(created_by)
        .bind(anonymous_key)
        .fetch_one(pool.inner())
        .await?;

    match created_by {
        Some(user_id) => log::info!("laporan {} created by user {}", report.id, user_id),
        None => log::info!("anonymous laporan {} created", report.id),
    }

    Ok(status::Custom(Status::Created, Json(report)))
}

/// Move a report to a new status.
///
/// `id` is parsed here rather than by the router so the admin guard answers
/// first: callers without a valid admin token never learn whether the id
/// was well formed.
#[openapi(tag = "Laporan")]
#[put("/laporan/<id>/status", data = "<payload>")]
pub async fn update_laporan_status(
    id: &str,
    pool: &State<sqlx::PgPool>,
    admin: RequireAdmin,
    payload: Json<UpdateStatusRequest>,
) -> Result<Json<Laporan>, ApiError> {
    let id = id
        .parse::<i32>()
        .map_err(|_| ApiError::BadRequest("Invalid laporan id".to_string()))?;

    let Some(raw_status) = validation::present(&payload.status) else {
        return Err(ApiError::BadRequest("Status is required".to_string()));
    };

    let new_status = raw_status
        .parse::<LaporanStatus>()
        .map_err(|_| ApiError::BadRequest(INVALID_STATUS_MESSAGE.to_string()))?;

    let sql = format!(
        "UPDATE laporan SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING {LAPORAN_COLUMNS}"
    );
    let report: Option<Laporan> = sqlx::query_as(&sql)
        .bind(new_status.as_str())
        .bind(id)
        .fetch_optional(pool.inner())
        .await?;

    let report = report.ok_or_else(|| ApiError::NotFound("Laporan not found".to_string()))?;

    log::info!(
        "laporan {} set to {} by admin {}",
        report.id,
        new_status.as_str(),
        admin.0.id()
    );

    Ok(Json(report))
}

use chrono::{DateTime, Utc};
use rocket_db_pools::sqlx::postgres::PgRow;
use rocket_db_pools::sqlx::{self, FromRow, Row};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INVALID_STATUS_MESSAGE: &str =
    "Invalid status. Must be one of: pending, in_progress, completed, rejected";
pub const INVALID_TIPE_MESSAGE: &str = "Tipe must be one of: publik, private, anonim";
pub const INVALID_REPORT_DIVISI_MESSAGE: &str =
    "Divisi must be one of: kebersihan, kesehatan, fasilitas umum, kriminalitas";

/// Lifecycle of a complaint. Any state may move to any other.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LaporanStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown laporan status '{0}'")]
pub struct UnknownStatus(pub String);

impl LaporanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaporanStatus::Pending => "pending",
            LaporanStatus::InProgress => "in_progress",
            LaporanStatus::Completed => "completed",
            LaporanStatus::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for LaporanStatus {
    type Err = UnknownStatus;

    fn from_str(status: &str) -> Result<Self, Self::Err> {
        match status {
            "pending" => Ok(LaporanStatus::Pending),
            "in_progress" => Ok(LaporanStatus::InProgress),
            "completed" => Ok(LaporanStatus::Completed),
            "rejected" => Ok(LaporanStatus::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Visibility of a report.
///
/// `publik` reports appear on the unauthenticated listing, `private` ones only
/// to admins and their author, and `anonim` ones are stored without the
/// author's account id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LaporanTipe {
    Publik,
    #[default]
    Private,
    Anonim,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown laporan tipe '{0}'")]
pub struct UnknownTipe(pub String);

impl LaporanTipe {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaporanTipe::Publik => "publik",
            LaporanTipe::Private => "private",
            LaporanTipe::Anonim => "anonim",
        }
    }
}

impl std::str::FromStr for LaporanTipe {
    type Err = UnknownTipe;

    fn from_str(tipe: &str) -> Result<Self, Self::Err> {
        match tipe {
            "publik" => Ok(LaporanTipe::Publik),
            "private" => Ok(LaporanTipe::Private),
            "anonim" => Ok(LaporanTipe::Anonim),
            other => Err(UnknownTipe(other.to_string())),
        }
    }
}

fn decode_column<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|err| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(err),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Laporan {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub tipe: LaporanTipe,
    pub divisi: Option<String>,
    pub status: LaporanStatus,
    /// Id of the reporting warga; `None` for anonymous reports. Not a foreign
    /// key: reports outlive accounts.
    pub created_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Laporan {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            tipe: decode_column(row, "tipe")?,
            divisi: row.try_get("divisi")?,
            status: decode_column(row, "status")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// A `publik` report as shown to anyone, without author fields.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PublicLaporan {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub divisi: Option<String>,
    pub status: LaporanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Laporan> for PublicLaporan {
    fn from(report: Laporan) -> Self {
        Self {
            id: report.id,
            title: report.title,
            description: report.description,
            divisi: report.divisi,
            status: report.status,
            created_at: report.created_at,
            updated_at: report.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicLaporanPage {
    pub data: Vec<PublicLaporan>,
    pub page: i64,
    pub limit: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

/// Body of `POST /laporan`. A `status` field, if sent, is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateLaporanRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to `private`.
    #[serde(default)]
    pub tipe: Option<String>,
    #[serde(default)]
    pub divisi: Option<String>,
    /// Client-side digest identifying the author of an `anonim` report.
    #[serde(default, rename = "userNikHash")]
    pub user_nik_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_only_known_values() {
        assert_eq!("in_progress".parse::<LaporanStatus>(), Ok(LaporanStatus::InProgress));
        assert_eq!("rejected".parse::<LaporanStatus>(), Ok(LaporanStatus::Rejected));
        assert!("done".parse::<LaporanStatus>().is_err());
        assert!("Pending".parse::<LaporanStatus>().is_err());
    }

    #[test]
    fn status_serializes_as_column_value() {
        let json = serde_json::to_string(&LaporanStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in_progress\"");
        for status in [
            LaporanStatus::Pending,
            LaporanStatus::InProgress,
            LaporanStatus::Completed,
            LaporanStatus::Rejected,
        ] {
            let json = serde_json::to_string(&status).expect("serialize");
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn tipe_parses_only_known_values() {
        assert_eq!("anonim".parse::<LaporanTipe>(), Ok(LaporanTipe::Anonim));
        assert_eq!("publik".parse::<LaporanTipe>(), Ok(LaporanTipe::Publik));
        assert!("public".parse::<LaporanTipe>().is_err());
        assert_eq!(LaporanTipe::default(), LaporanTipe::Private);

        let json = serde_json::to_string(&LaporanTipe::Publik).expect("serialize");
        assert_eq!(json, "\"publik\"");
    }

    #[test]
    fn page_uses_camel_case_totals() {
        let page = PublicLaporanPage {
            data: Vec::new(),
            page: 2,
            limit: 10,
            total_items: 11,
            total_pages: 2,
        };
        let json = serde_json::to_value(&page).expect("serialize");
        assert_eq!(json["totalItems"], 11);
        assert_eq!(json["totalPages"], 2);
    }

    #[test]
    fn create_request_reads_anonymous_key() {
        let body: CreateLaporanRequest = serde_json::from_str(
            r#"{"title":"t","description":"d","tipe":"anonim","userNikHash":"abc123"}"#,
        )
        .expect("deserialize");
        assert_eq!(body.tipe.as_deref(), Some("anonim"));
        assert_eq!(body.user_nik_hash.as_deref(), Some("abc123"));
        assert_eq!(body.divisi, None);
    }

    #[test]
    fn create_request_ignores_client_status() {
        let body: CreateLaporanRequest = serde_json::from_str(
            r#"{"title":"Jalan rusak","description":"Lubang besar","status":"completed"}"#,
        )
        .expect("deserialize");
        assert_eq!(body.title.as_deref(), Some("Jalan rusak"));
        assert_eq!(body.description.as_deref(), Some("Lubang besar"));
    }
}

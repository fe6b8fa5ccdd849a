use lapor_api::auth::users::UserRecord;
use lapor_api::auth::{AuthState, JwtService, Role};
use lapor_api::models::{Laporan, LaporanStatus, LaporanTipe};
use lapor_api::routes::laporan::{
    create_laporan, list_laporan, list_my_laporan, list_public_laporan, update_laporan_status,
};
use lapor_api::test_support::{
    TEST_PASSWORD, TestDatabase, TestFixtures, TestRocketBuilder, test_auth_state,
};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::{Client, LocalRequest};
use rocket::routes;
use serde_json::{Value, json};

struct Harness {
    test_db: TestDatabase,
    client: Client,
    state: AuthState,
    admin_token: String,
    warga_token: String,
    other_warga_token: String,
    warga: UserRecord,
}

fn access_token(state: &AuthState, user: &UserRecord) -> String {
    state
        .jwt_service
        .issue_access_token(user)
        .expect("access token")
        .token
}

async fn setup(label: &str) -> Option<Harness> {
    let test_db = match TestDatabase::new().await {
        Ok(db) => db,
        Err(err) if err.is_unavailable() => {
            eprintln!("skipping {label}: no database available ({err})");
            return None;
        }
        Err(err) => panic!("failed to provision test database: {err:?}"),
    };

    let pool = test_db.pool_clone();
    let fixtures = TestFixtures::new(&pool);
    let admin = fixtures
        .insert_admin("budi", "budi@lapor.id", TEST_PASSWORD)
        .await
        .expect("seed admin");
    let warga = fixtures
        .insert_warga("3201010101010001", "Siti", "siti@lapor.id", TEST_PASSWORD)
        .await
        .expect("seed warga");
    let other = fixtures
        .insert_warga("3201010101010002", "Agus", "agus@lapor.id", TEST_PASSWORD)
        .await
        .expect("seed second warga");

    let state = test_auth_state(pool.clone());
    let admin_token = access_token(&state, &admin);
    let warga_token = access_token(&state, &warga);
    let other_warga_token = access_token(&state, &other);

    let client = TestRocketBuilder::new()
        .manage_pg_pool(pool)
        .manage_auth_state(state.clone())
        .mount_routes(routes![
            list_laporan,
            list_public_laporan,
            list_my_laporan,
            create_laporan,
            update_laporan_status
        ])
        .async_client()
        .await;

    Some(Harness {
        test_db,
        client,
        state,
        admin_token,
        warga_token,
        other_warga_token,
        warga,
    })
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {token}"))
}

async fn send(request: LocalRequest<'_>) -> (Status, Value) {
    let response = request.dispatch().await;
    let status = response.status();
    let body = response.into_json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

async fn file_report(h: &Harness, title: &str) -> Laporan {
    file_report_with(h, json!({ "title": title, "description": "Sampah menumpuk" })).await
}

async fn file_report_with(h: &Harness, body: Value) -> Laporan {
    let (status, body) = send(
        h.client
            .post("/laporan")
            .header(ContentType::JSON)
            .header(bearer(&h.warga_token))
            .body(body.to_string()),
    )
    .await;
    assert_eq!(status, Status::Created, "unexpected body: {body}");
    serde_json::from_value(body).expect("laporan body")
}

#[tokio::test]
async fn new_reports_always_start_pending() {
    let Some(h) = setup("report creation test").await else {
        return;
    };

    let (status, body) = send(
        h.client
            .post("/laporan")
            .header(ContentType::JSON)
            .header(bearer(&h.warga_token))
            .body(
                json!({ "title": "Jalan rusak", "description": "Lubang besar", "status": "completed" })
                    .to_string(),
            ),
    )
    .await;
    assert_eq!(status, Status::Created);
    let report: Laporan = serde_json::from_value(body).expect("laporan body");
    assert_eq!(report.status, LaporanStatus::Pending);
    assert_eq!(report.created_by, Some(h.warga.id));
    assert_eq!(report.title, "Jalan rusak");
    assert_eq!(report.created_at, report.updated_at);

    let (status, body) = send(
        h.client
            .post("/laporan")
            .header(ContentType::JSON)
            .header(bearer(&h.warga_token))
            .body(json!({ "title": "Only a title" }).to_string()),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "Title and description are required");

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn admins_list_all_reports_newest_first() {
    let Some(h) = setup("report listing test").await else {
        return;
    };

    let first = file_report(&h, "Pertama").await;
    let second = file_report(&h, "Kedua").await;

    let (status, body) = send(h.client.get("/laporan").header(bearer(&h.admin_token))).await;
    assert_eq!(status, Status::Ok);
    let reports: Vec<Laporan> = serde_json::from_value(body).expect("laporan list");
    let ids: Vec<i32> = reports.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn warga_see_only_their_own_reports() {
    let Some(h) = setup("own reports test").await else {
        return;
    };

    let mine = file_report(&h, "Milik saya").await;

    let (status, body) = send(h.client.get("/laporan/my").header(bearer(&h.warga_token))).await;
    assert_eq!(status, Status::Ok);
    let reports: Vec<Laporan> = serde_json::from_value(body).expect("laporan list");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, mine.id);

    let (status, body) =
        send(h.client.get("/laporan/my").header(bearer(&h.other_warga_token))).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!([]));

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn status_updates_validate_and_bump_timestamp() {
    let Some(h) = setup("status update test").await else {
        return;
    };

    let report = file_report(&h, "Lampu jalan mati").await;
    let uri = format!("/laporan/{}/status", report.id);

    let (status, body) = send(
        h.client
            .put(uri.clone())
            .header(ContentType::JSON)
            .header(bearer(&h.admin_token))
            .body(json!({ "status": "done" }).to_string()),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(
        body["error"],
        "Invalid status. Must be one of: pending, in_progress, completed, rejected"
    );

    let (status, body) = send(
        h.client
            .put(uri.clone())
            .header(ContentType::JSON)
            .header(bearer(&h.admin_token))
            .body("{}"),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "Status is required");

    let unchanged: String = sqlx::query_scalar("SELECT status FROM laporan WHERE id = $1")
        .bind(report.id)
        .fetch_one(h.test_db.pool())
        .await
        .expect("status lookup");
    assert_eq!(unchanged, "pending");

    let (status, body) = send(
        h.client
            .put(uri)
            .header(ContentType::JSON)
            .header(bearer(&h.admin_token))
            .body(json!({ "status": "in_progress" }).to_string()),
    )
    .await;
    assert_eq!(status, Status::Ok);
    let updated: Laporan = serde_json::from_value(body).expect("laporan body");
    assert_eq!(updated.status, LaporanStatus::InProgress);
    assert!(updated.updated_at > report.updated_at);
    assert_eq!(updated.created_at, report.created_at);

    let (status, body) = send(
        h.client
            .put("/laporan/999999/status")
            .header(ContentType::JSON)
            .header(bearer(&h.admin_token))
            .body(json!({ "status": "completed" }).to_string()),
    )
    .await;
    assert_eq!(status, Status::NotFound);
    assert_eq!(body["error"], "Laporan not found");

    let (status, body) = send(
        h.client
            .put("/laporan/abc/status")
            .header(ContentType::JSON)
            .header(bearer(&h.admin_token))
            .body(json!({ "status": "completed" }).to_string()),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["error"], "Invalid laporan id");

    // Without a token the guard answers before the id is looked at.
    let (status, body) = send(
        h.client
            .put("/laporan/abc/status")
            .header(ContentType::JSON)
            .body(json!({ "status": "completed" }).to_string()),
    )
    .await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["error"], "No token provided");

    let (status, body) = send(
        h.client
            .put("/laporan/abc/status")
            .header(ContentType::JSON)
            .header(bearer(&h.warga_token))
            .body(json!({ "status": "completed" }).to_string()),
    )
    .await;
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["error"], "Access denied");

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn roles_are_enforced_per_route() {
    let Some(h) = setup("role gating test").await else {
        return;
    };

    let (status, body) = send(h.client.get("/laporan").header(bearer(&h.warga_token))).await;
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["error"], "Access denied");

    let (status, body) = send(
        h.client
            .post("/laporan")
            .header(ContentType::JSON)
            .header(bearer(&h.admin_token))
            .body(json!({ "title": "t", "description": "d" }).to_string()),
    )
    .await;
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["error"], "Access denied");

    let (status, body) = send(h.client.get("/laporan")).await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["error"], "No token provided");

    // A token signed with another key never reaches the role check.
    let mut foreign = lapor_api::test_support::test_auth_config();
    foreign.jwt_secret = "some-other-access-secret-0000000000".to_string();
    let foreign_jwt = JwtService::from_config(&foreign).expect("jwt service");
    let forged = foreign_jwt
        .issue_access_token(&h.warga)
        .expect("access token")
        .token;
    let (status, body) = send(h.client.get("/laporan/my").header(bearer(&forged))).await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["error"], "Invalid token");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM laporan")
        .fetch_one(h.test_db.pool())
        .await
        .expect("count");
    assert_eq!(count, 0);

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn deleted_accounts_lose_access() {
    let Some(h) = setup("deleted account test").await else {
        return;
    };

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(h.warga.id)
        .execute(h.test_db.pool())
        .await
        .expect("delete warga");

    let (status, body) = send(h.client.get("/laporan/my").header(bearer(&h.warga_token))).await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["error"], "User not found");

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn report_type_and_division_are_validated() {
    let Some(h) = setup("report tipe test").await else {
        return;
    };

    let private = file_report(&h, "Tanpa tipe").await;
    assert_eq!(private.tipe, LaporanTipe::Private);
    assert_eq!(private.divisi, None);

    let public = file_report_with(
        &h,
        json!({ "title": "Banjir", "description": "Air naik", "tipe": "publik", "divisi": "fasilitas umum" }),
    )
    .await;
    assert_eq!(public.tipe, LaporanTipe::Publik);
    assert_eq!(public.divisi.as_deref(), Some("fasilitas umum"));
    assert_eq!(public.created_by, Some(h.warga.id));

    let cases = [
        (
            json!({ "title": "t", "description": "d", "tipe": "rahasia" }),
            "Tipe must be one of: publik, private, anonim",
        ),
        (
            json!({ "title": "t", "description": "d", "divisi": "keuangan" }),
            "Divisi must be one of: kebersihan, kesehatan, fasilitas umum, kriminalitas",
        ),
        (
            json!({ "title": "t", "description": "d", "tipe": "anonim" }),
            "userNikHash is required for anonymous reports",
        ),
    ];
    for (body, message) in cases {
        let (status, answer) = send(
            h.client
                .post("/laporan")
                .header(ContentType::JSON)
                .header(bearer(&h.warga_token))
                .body(body.to_string()),
        )
        .await;
        assert_eq!(status, Status::BadRequest, "body {body}");
        assert_eq!(answer["error"], message);
    }

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn anonymous_reports_are_found_only_by_their_key() {
    let Some(h) = setup("anonymous report test").await else {
        return;
    };

    let anonymous = file_report_with(
        &h,
        json!({ "title": "Pungli", "description": "Di kantor desa", "tipe": "anonim", "userNikHash": "k3y-siti" }),
    )
    .await;
    assert_eq!(anonymous.tipe, LaporanTipe::Anonim);
    assert_eq!(anonymous.created_by, None);
    let mine = file_report(&h, "Atas nama saya").await;

    let (status, body) = send(h.client.get("/laporan/my").header(bearer(&h.warga_token))).await;
    assert_eq!(status, Status::Ok);
    let reports: Vec<Laporan> = serde_json::from_value(body).expect("laporan list");
    let ids: Vec<i32> = reports.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![mine.id]);

    let (status, body) = send(
        h.client
            .get("/laporan/my?user_hash=k3y-siti")
            .header(bearer(&h.warga_token)),
    )
    .await;
    assert_eq!(status, Status::Ok);
    let reports: Vec<Laporan> = serde_json::from_value(body).expect("laporan list");
    let ids: Vec<i32> = reports.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![mine.id, anonymous.id]);

    let stored: Option<i32> = sqlx::query_scalar("SELECT created_by FROM laporan WHERE id = $1")
        .bind(anonymous.id)
        .fetch_one(h.test_db.pool())
        .await
        .expect("creator lookup");
    assert_eq!(stored, None);

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn public_listing_pages_through_publik_reports_only() {
    let Some(h) = setup("public listing test").await else {
        return;
    };

    let mut public_ids = Vec::new();
    for n in 0..3 {
        let report = file_report_with(
            &h,
            json!({ "title": format!("Publik {n}"), "description": "d", "tipe": "publik" }),
        )
        .await;
        public_ids.push(report.id);
    }
    file_report(&h, "Rahasia").await;
    public_ids.reverse();

    // No token needed.
    let (status, body) = send(h.client.get("/laporan/public?page=1&limit=2")).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["totalItems"], 3);
    assert_eq!(body["totalPages"], 2);
    let first: Vec<i64> = body["data"]
        .as_array()
        .expect("data array")
        .iter()
        .filter_map(|r| r["id"].as_i64())
        .collect();
    assert_eq!(first, vec![i64::from(public_ids[0]), i64::from(public_ids[1])]);
    assert!(body["data"][0].get("created_by").is_none());

    let (status, body) = send(h.client.get("/laporan/public?page=2&limit=2")).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["id"], public_ids[2]);

    // Out-of-range and unparsable values fall back to the defaults.
    let (status, body) = send(h.client.get("/laporan/public?page=0&limit=500")).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(3));

    let (status, body) = send(h.client.get("/laporan/public?page=abc")).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["page"], 1);

    h.test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn promoted_role_claims_do_not_open_admin_routes() {
    let Some(h) = setup("role claim gating test").await else {
        return;
    };

    let mut promoted = h.warga.clone();
    promoted.role = Role::Admin;
    let token = access_token(&h.state, &promoted);

    let (status, body) = send(h.client.get("/laporan").header(bearer(&token))).await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["error"], "Invalid token");

    h.test_db.close().await.expect("failed to drop test database");
}

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Data, Request, Response};
use std::time::Instant;

pub const SERVED_BY_HEADER: &str = "X-Served-By";

/// Logs one line per request and tags every response with the replica that
/// served it.
pub struct RequestLogger {
    served_by: String,
}

impl RequestLogger {
    pub fn new(served_by: impl Into<String>) -> Self {
        Self {
            served_by: served_by.into(),
        }
    }

    /// Host name from `HOSTNAME`, or `unknown`.
    pub fn from_env() -> Self {
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(host)
    }
}

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let started = request.local_cache(Instant::now);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        response.set_header(Header::new(SERVED_BY_HEADER, self.served_by.clone()));

        log::info!(
            "{} {} -> {} ({:.2}ms)",
            request.method(),
            request.uri(),
            response.status().code,
            elapsed_ms
        );
    }
}

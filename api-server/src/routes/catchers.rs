//! JSON bodies for failures that never reach a handler: guard rejections,
//! unknown routes and bodies that do not deserialize.

use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request, catch, catchers};

use crate::auth::guards::AuthFailure;
use crate::error::ErrorResponse;

pub fn all() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable,
        internal_error
    ]
}

fn guard_message(request: &Request<'_>, fallback: &str) -> Json<ErrorResponse> {
    let cached = request.local_cache(AuthFailure::default);
    let message = cached.0.clone().unwrap_or_else(|| fallback.to_string());
    Json(ErrorResponse::new(message))
}

#[catch(400)]
pub fn bad_request() -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Invalid request body"))
}

#[catch(401)]
pub fn unauthorized(request: &Request<'_>) -> Json<ErrorResponse> {
    guard_message(request, "No token provided")
}

#[catch(403)]
pub fn forbidden(request: &Request<'_>) -> Json<ErrorResponse> {
    guard_message(request, "Access denied")
}

#[catch(404)]
pub fn not_found() -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Not found"))
}

/// Rocket answers 422 for JSON it cannot map onto the body type and for
/// path segments that fail to parse. Both are client input errors.
#[catch(422)]
pub fn unprocessable() -> status::Custom<Json<ErrorResponse>> {
    status::Custom(
        Status::BadRequest,
        Json(ErrorResponse::new("Invalid request body")),
    )
}

#[catch(500)]
pub fn internal_error(request: &Request<'_>) -> Json<ErrorResponse> {
    guard_message(request, "Internal server error")
}

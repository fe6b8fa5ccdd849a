//! HTTP route handlers outside the auth core.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive
//! the API document; `catchers` turns framework-level failures into the
//! same `{ "error": ... }` body the handlers use.

pub mod catchers;
pub mod health;
pub mod laporan;

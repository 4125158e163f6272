//! HTTP adapter - axum routes and handlers over the application layer.

mod handlers;
mod routes;

pub use handlers::{ApiError, AppState};
pub use routes::router;

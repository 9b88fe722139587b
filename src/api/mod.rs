//! Operator HTTP API: health, status, pause/resume and state inspection.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;

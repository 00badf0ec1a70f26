//! HTTP API handlers for kita-ingest

pub mod auth;
pub mod health;
pub mod processes;
pub mod sse;
pub mod upload;

pub use auth::auth_middleware;
pub use health::health_routes;
pub use processes::process_routes;
pub use sse::process_event_stream;
pub use upload::upload_routes;

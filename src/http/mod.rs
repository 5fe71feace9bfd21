//! HTTP surface: health, WebSocket upgrade and lobby routes

pub mod middleware;
pub mod routes;

pub use routes::build_router;

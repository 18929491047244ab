//! HTTP API module: health, status, and the operator surface.

pub mod handlers;
pub mod routes;

pub use handlers::{AppState, PositionView};
pub use routes::create_router;

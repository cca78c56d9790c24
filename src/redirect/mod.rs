pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::{create_redirect_router, is_reserved_slug, HEALTH_PATH};

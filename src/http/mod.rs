//! HTTP admission layer built on axum.

mod middleware;
mod server;

pub use middleware::{rate_limit_middleware, GateState};
pub use server::{router, HttpServer};

//! Admin Module
//!
//! Read-only HTTP surface for operators. It never mutates the cache.
//!
//! # Endpoints
//! - `GET /stats` - Cache counters, storage occupancy and follower count
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

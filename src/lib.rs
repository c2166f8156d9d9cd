//! # vitrine
//!
//! Async request-handling core for real-estate agent landing pages: an
//! HTTP/1.1 server, a short-lived query result cache for the hot profile
//! reads, and fixed-window rate limiting for sensitive actions.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use vitrine::profile::{MemoryProfileStore, ProfileService, routes::routes};
//! use vitrine::rate_limit::RateLimiter;
//! use vitrine::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let limiter = Arc::new(RateLimiter::with_max_entries(config.rate_limit_max_entries));
//!     let store = Arc::new(MemoryProfileStore::new());
//!     let service = Arc::new(ProfileService::new(store, Arc::clone(&limiter), &config));
//!
//!     let server = Server::bind(&config.bind_addr).await?;
//!     server
//!         .serve(Arc::new(routes(service, limiter, &config)), std::future::pending())
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod http;
pub mod middleware;
pub mod profile;
pub mod rate_limit;
pub mod router;
pub mod security;
pub mod server;

pub use config::{Config, ConfigError};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};

//! Security middleware.
//!
//! - [`RateLimitMiddleware`] — per-client fixed-window limiting of a named
//!   action, answering `429 Too Many Requests` once the client is over budget.

pub mod rate_limit;

pub use rate_limit::{RateLimitMiddleware, client_identifier};

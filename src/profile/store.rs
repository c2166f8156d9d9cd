//! Persistence seam for agent profiles and leads.

use std::{future::Future, pin::Pin};

use thiserror::Error;

use super::{AgentProfile, LeadRequest, ProfileQuery, ProfileUpdate};

/// Errors a [`ProfileStore`] reports.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile store unavailable: {0}")]
    Unavailable(String),

    #[error("profile store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Boxed future returned by [`ProfileStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Where profiles and leads live.
///
/// Implementations are shared across Tokio tasks. They must not cache on
/// their own: [`ProfileService`](super::ProfileService) does that and relies
/// on every write going through it so it can invalidate.
pub trait ProfileStore: Send + Sync {
    /// Reads the profile shaped by `query`; `Ok(None)` if no such agent exists.
    fn fetch<'a>(&'a self, query: &'a ProfileQuery) -> StoreFuture<'a, Option<AgentProfile>>;

    /// Applies `update`; `Ok(false)` if no such agent exists.
    fn update<'a>(&'a self, slug: &'a str, update: ProfileUpdate) -> StoreFuture<'a, bool>;

    /// Records a visitor lead for the agent and returns its id; `Ok(None)` if
    /// no such agent exists.
    fn record_lead<'a>(&'a self, slug: &'a str, lead: LeadRequest) -> StoreFuture<'a, Option<u64>>;
}

//! Cached profile reads, invalidating writes and throttled lead intake.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::store::{ProfileStore, StoreError};
use super::{AgentProfile, LeadRequest, ProfileQuery, ProfileUpdate};
use crate::cache::{CacheStatsSnapshot, QueryCache};
use crate::config::Config;
use crate::rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter, actions};

/// What happened to a submitted lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadOutcome {
    Recorded { id: u64 },
    UnknownAgent,
    /// The contact address sent too many leads recently; nothing was recorded.
    Throttled(RateLimitDecision),
}

/// Profile reads through the query cache, writes that keep it fresh, and
/// lead intake throttled per contact address.
///
/// Every write to a profile must go through [`ProfileService::update_profile`]
/// (or be followed by [`ProfileService::flush_cache`]); writes that bypass it
/// stay invisible for up to one cache TTL.
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
    cache: QueryCache<ProfileQuery, Option<AgentProfile>>,
    limiter: Arc<RateLimiter>,
    lead_email_limit: Option<RateLimitConfig>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>, limiter: Arc<RateLimiter>, config: &Config) -> Self {
        let lead_email_limit = if config.rate_limit_enabled {
            config.rate_limits.get(actions::LEAD_CONTACT_EMAIL).copied()
        } else {
            None
        };

        Self {
            store,
            cache: QueryCache::with_ttl(config.cache_ttl),
            limiter,
            lead_email_limit,
        }
    }

    /// Reads a profile, serving repeated identical queries from the cache.
    ///
    /// `None` means the agent does not exist; that answer is cached too.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] on a miss; failures are not cached.
    pub async fn profile(
        &self,
        query: &ProfileQuery,
    ) -> Result<Arc<Option<AgentProfile>>, StoreError> {
        self.cache.get_or_load(query, || self.store.fetch(query)).await
    }

    /// Applies `update` and drops every cached variant of the profile.
    ///
    /// Returns `false` if the agent does not exist.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`]; the cache is left alone when the write fails.
    pub async fn update_profile(
        &self,
        slug: &str,
        update: ProfileUpdate,
    ) -> Result<bool, StoreError> {
        let updated = self.store.update(slug, update).await?;
        if updated {
            let removed = self.cache.invalidate(Some(slug));
            info!(slug, removed, "profile updated");
        }
        Ok(updated)
    }

    /// Drops every cached profile, e.g. after a bulk import.
    pub fn flush_cache(&self) -> usize {
        self.cache.invalidate(None)
    }

    /// Records a visitor's contact request for the agent at `slug`.
    ///
    /// The contact address (case-insensitive) is limited by the
    /// `lead_contact_email` policy before anything is stored, so a throttled
    /// lead is never recorded.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`].
    pub async fn submit_lead(
        &self,
        slug: &str,
        lead: LeadRequest,
    ) -> Result<LeadOutcome, StoreError> {
        if let Some(limit) = &self.lead_email_limit {
            let identifier = format!(
                "{}:{}",
                actions::LEAD_CONTACT_EMAIL,
                lead.email.trim().to_lowercase()
            );
            let decision = self.limiter.check(&identifier, limit);
            if !decision.allowed {
                warn!(
                    slug,
                    retry_after = decision.retry_after_secs(),
                    "lead throttled by contact address"
                );
                return Ok(LeadOutcome::Throttled(decision));
            }
        }

        match self.store.record_lead(slug, lead).await? {
            Some(id) => {
                info!(slug, lead_id = id, "lead recorded");
                Ok(LeadOutcome::Recorded { id })
            }
            None => {
                debug!(slug, "lead for unknown agent");
                Ok(LeadOutcome::UnknownAgent)
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }

    pub fn cache(&self) -> &QueryCache<ProfileQuery, Option<AgentProfile>> {
        &self.cache
    }
}

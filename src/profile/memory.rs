//! In-process [`ProfileStore`] backed by a `tokio` read-write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use super::store::{ProfileStore, StoreFuture};
use super::{AgentProfile, LeadRequest, ProfileQuery, ProfileUpdate, Property};

/// Everything stored about one agent.
#[derive(Debug, Clone, Default)]
pub struct AgentRecord {
    pub slug: String,
    pub name: String,
    pub creci: String,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub properties: Vec<Property>,
    pub leads: Vec<(u64, LeadRequest)>,
}

impl AgentRecord {
    // Featured listings first, then by id, so limited reads are stable.
    fn shape(&self, query: &ProfileQuery) -> AgentProfile {
        let properties = if query.include_properties {
            let mut listed = self.properties.clone();
            listed.sort_by_key(|p| (!p.featured, p.id));
            if let Some(limit) = query.property_limit {
                listed.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            }
            listed
        } else {
            Vec::new()
        };

        AgentProfile {
            slug: self.slug.clone(),
            name: self.name.clone(),
            creci: self.creci.clone(),
            bio: (!query.summary_only).then(|| self.bio.clone()).flatten(),
            phone: query.include_contact.then(|| self.phone.clone()).flatten(),
            email: query.include_contact.then(|| self.email.clone()).flatten(),
            properties,
            property_count: self.properties.len(),
        }
    }
}

/// A [`ProfileStore`] that keeps everything in memory.
///
/// Counts fetches so callers can observe how many reads reached the store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    agents: RwLock<HashMap<String, AgentRecord>>,
    next_lead_id: AtomicU64,
    fetches: AtomicU64,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `agents`, keyed by slug.
    pub fn with_agents(agents: impl IntoIterator<Item = AgentRecord>) -> Self {
        let agents = agents
            .into_iter()
            .map(|agent| (agent.slug.clone(), agent))
            .collect();
        Self {
            agents: RwLock::new(agents),
            ..Self::default()
        }
    }

    /// Adds or replaces an agent.
    pub async fn insert(&self, agent: AgentRecord) {
        self.agents.write().await.insert(agent.slug.clone(), agent);
    }

    /// Number of [`ProfileStore::fetch`] calls served so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Leads recorded for `slug`, oldest first.
    pub async fn leads(&self, slug: &str) -> Vec<(u64, LeadRequest)> {
        self.agents
            .read()
            .await
            .get(slug)
            .map(|agent| agent.leads.clone())
            .unwrap_or_default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn fetch<'a>(&'a self, query: &'a ProfileQuery) -> StoreFuture<'a, Option<AgentProfile>> {
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            let agents = self.agents.read().await;
            Ok(agents.get(&query.slug).map(|agent| agent.shape(query)))
        })
    }

    fn update<'a>(&'a self, slug: &'a str, update: ProfileUpdate) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut agents = self.agents.write().await;
            let Some(agent) = agents.get_mut(slug) else {
                return Ok(false);
            };
            if let Some(name) = update.name {
                agent.name = name;
            }
            if let Some(bio) = update.bio {
                agent.bio = Some(bio);
            }
            if let Some(phone) = update.phone {
                agent.phone = Some(phone);
            }
            if let Some(email) = update.email {
                agent.email = Some(email);
            }
            Ok(true)
        })
    }

    fn record_lead<'a>(&'a self, slug: &'a str, lead: LeadRequest) -> StoreFuture<'a, Option<u64>> {
        Box::pin(async move {
            let mut agents = self.agents.write().await;
            let Some(agent) = agents.get_mut(slug) else {
                return Ok(None);
            };
            let id = self.next_lead_id.fetch_add(1, Ordering::Relaxed) + 1;
            agent.leads.push((id, lead));
            Ok(Some(id))
        })
    }
}

//! Agent ("corretor") public profiles: the hot read path behind every
//! landing-page view, plus the visitor contact form feeding the agent's leads.
//!
//! - [`ProfileQuery`] — the typed shape of a profile read, used as cache key.
//! - [`ProfileStore`] — persistence seam; deployments plug in their database.
//! - [`MemoryProfileStore`] — in-process store for demos and tests.
//! - [`ProfileService`] — cached reads, invalidating writes, throttled leads.
//! - [`routes`] — HTTP endpoints.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Request;
use crate::cache::QueryKey;

pub mod memory;
pub mod routes;
pub mod service;
pub mod store;

pub use memory::{AgentRecord, MemoryProfileStore};
pub use service::{LeadOutcome, ProfileService};
pub use store::{ProfileStore, StoreError, StoreFuture};

/// A listing shown on an agent's page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: u64,
    pub title: String,
    pub city: String,
    pub price_cents: u64,
    pub bedrooms: u8,
    pub featured: bool,
}

/// An agent's public profile, shaped by the [`ProfileQuery`] that read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentProfile {
    pub slug: String,
    pub name: String,
    /// Regional broker registration number.
    pub creci: String,
    /// Omitted for summary reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Empty unless properties were requested.
    pub properties: Vec<Property>,
    /// Total active listings, regardless of `property_limit`.
    pub property_count: usize,
}

/// Partial update of an agent's profile; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// A visitor's contact request, as submitted by the landing-page form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
    /// The listing the visitor asked about, if any.
    #[serde(default)]
    pub property_id: Option<u64>,
}

/// Rejected query-string options.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid property limit {value:?}: expected a positive integer")]
    InvalidLimit { value: String },
}

/// Everything that changes the shape of a profile read.
///
/// Every field is part of the cache key: two queries hit the same entry only
/// if all fields are equal.
///
/// # Examples
///
/// ```
/// use vitrine::cache::derive_key;
/// use vitrine::profile::ProfileQuery;
///
/// let q = ProfileQuery::new("ana-souza").with_properties(Some(6));
/// assert_eq!(derive_key(&q), "ana-souza:props=1:contact=0:summary=0:limit=6");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProfileQuery {
    pub slug: String,
    pub include_properties: bool,
    pub include_contact: bool,
    pub summary_only: bool,
    pub property_limit: Option<u32>,
}

impl ProfileQuery {
    /// The full profile without listings or contact details.
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            include_properties: false,
            include_contact: false,
            summary_only: false,
            property_limit: None,
        }
    }

    /// Include listings, at most `limit` of them.
    #[must_use]
    pub fn with_properties(mut self, limit: Option<u32>) -> Self {
        self.include_properties = true;
        self.property_limit = limit;
        self
    }

    #[must_use]
    pub fn with_contact(mut self) -> Self {
        self.include_contact = true;
        self
    }

    #[must_use]
    pub fn summary(mut self) -> Self {
        self.summary_only = true;
        self
    }

    /// Reads the options from the query string: `imoveis`, `contato` and
    /// `resumo` are switches, `limite` caps the listings.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidLimit`] if `limite` is not a positive integer.
    pub fn from_request(slug: &str, request: &Request) -> Result<Self, QueryError> {
        let property_limit = match request.query_param("limite") {
            None => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(limit) if limit > 0 => Some(limit),
                _ => {
                    return Err(QueryError::InvalidLimit {
                        value: raw.to_owned(),
                    });
                }
            },
        };

        Ok(Self {
            slug: slug.to_owned(),
            include_properties: request.query_flag("imoveis"),
            include_contact: request.query_flag("contato"),
            summary_only: request.query_flag("resumo"),
            property_limit,
        })
    }
}

impl QueryKey for ProfileQuery {
    fn entity_id(&self) -> &str {
        &self.slug
    }

    fn shape(&self) -> String {
        let limit = self
            .property_limit
            .map_or_else(|| "all".to_owned(), |l| l.to_string());
        format!(
            "props={}:contact={}:summary={}:limit={limit}",
            u8::from(self.include_properties),
            u8::from(self.include_contact),
            u8::from(self.summary_only),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::derive_key;

    fn request(target: &str) -> Request {
        let raw = format!("GET {target} HTTP/1.1\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn key_covers_every_option() {
        let base = ProfileQuery::new("ana");
        let variants = [
            base.clone(),
            base.clone().with_properties(None),
            base.clone().with_properties(Some(3)),
            base.clone().with_contact(),
            base.clone().summary(),
            ProfileQuery {
                property_limit: Some(3),
                ..base.clone()
            },
            ProfileQuery::new("bia"),
        ];

        let keys: Vec<String> = variants.iter().map(derive_key).collect();
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(derive_key(&base), derive_key(&ProfileQuery::new("ana")));
    }

    #[test]
    fn query_string_options() {
        let req = request("/c/ana?imoveis&limite=6&resumo=1");
        let q = ProfileQuery::from_request("ana", &req).unwrap();
        assert_eq!(q, ProfileQuery::new("ana").with_properties(Some(6)).summary());
    }

    #[test]
    fn escaped_limit_is_decoded() {
        let q = ProfileQuery::from_request("ana", &request("/c/ana?limite=%36")).unwrap();
        assert_eq!(q.property_limit, Some(6));
    }

    #[test]
    fn invalid_limit_is_rejected() {
        for target in ["/c/ana?limite=0", "/c/ana?limite=-1", "/c/ana?limite=seis"] {
            assert!(matches!(
                ProfileQuery::from_request("ana", &request(target)),
                Err(QueryError::InvalidLimit { .. })
            ));
        }
    }

    #[test]
    fn lead_request_optional_fields_default() {
        let lead: LeadRequest = serde_json::from_str(
            r#"{"name": "Rui", "email": "rui@example.com", "message": "Posso visitar?"}"#,
        )
        .unwrap();
        assert_eq!(lead.phone, None);
        assert_eq!(lead.property_id, None);
    }
}

//! Per-request context: the request, matched path parameters, and a typed
//! extension map middleware uses to hand values to handlers.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::Request;

/// Type-erased per-request values, at most one per type.
///
/// The rate-limit middleware stores its [`RateLimitDecision`] here so the
/// handler can read the remaining budget.
///
/// [`RateLimitDecision`]: crate::rate_limit::RateLimitDecision
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value of the same type.
    pub fn insert<T>(&mut self, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn remove<T>(&mut self) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }
}

/// Path parameters captured by the matched route (`/corretores/:slug` → `slug`).
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Everything a middleware or handler knows about the request in flight.
pub struct Context {
    request: Request,
    params: PathParams,
    extensions: Extensions,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self {
            request,
            params,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Deserializes the request body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the [`serde_json::Error`] if the body is not valid JSON for `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_keyed_by_type() {
        let mut ext = Extensions::new();
        ext.insert(7_u32);
        ext.insert("corretor");
        ext.insert(9_u32);

        assert_eq!(ext.get::<u32>(), Some(&9));
        assert_eq!(ext.get::<&str>(), Some(&"corretor"));
        assert_eq!(ext.remove::<u32>(), Some(9));
        assert!(ext.get::<u32>().is_none());
    }

    #[test]
    fn json_body_is_parsed() {
        #[derive(serde::Deserialize)]
        struct Lead {
            name: String,
        }

        let raw = b"POST / HTTP/1.1\r\nContent-Length: 14\r\n\r\n{\"name\":\"Ana\"}";
        let (request, _) = Request::parse(raw).unwrap();
        let ctx = Context::new(request);
        let lead: Lead = ctx.json().unwrap();
        assert_eq!(lead.name, "Ana");
    }
}

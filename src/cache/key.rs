//! Cache key derivation from typed query descriptions.
//!
//! Every memoized read path describes its query with a type implementing
//! [`QueryKey`]. The key is `"{entity}:{shape}"`, where `entity` is the
//! entity's public identifier and `shape` renders every option that changes
//! the result, in a fixed order.

/// A query whose result can be memoized by [`QueryCache`](super::QueryCache).
///
/// Implementors must render **every** field that affects the result shape in
/// [`shape`](Self::shape), always in the same order. Omitting a field makes two
/// different queries share one cache entry.
///
/// # Examples
///
/// ```
/// use vitrine::cache::{QueryKey, derive_key};
///
/// struct ListingQuery {
///     id: String,
///     with_photos: bool,
/// }
///
/// impl QueryKey for ListingQuery {
///     fn entity_id(&self) -> &str {
///         &self.id
///     }
///
///     fn shape(&self) -> String {
///         format!("photos={}", u8::from(self.with_photos))
///     }
/// }
///
/// let q = ListingQuery { id: "casa-42".into(), with_photos: true };
/// assert_eq!(derive_key(&q), "casa-42:photos=1");
/// ```
pub trait QueryKey {
    /// The public identifier of the entity this query reads.
    fn entity_id(&self) -> &str;

    /// The result-shaping options, rendered deterministically.
    fn shape(&self) -> String;
}

/// Derives the cache key for `query`.
///
/// The entity id is escaped so that one entity's namespace is never a prefix
/// of another entity's keys.
pub fn derive_key<K: QueryKey + ?Sized>(query: &K) -> String {
    let shape = query.shape();
    let mut key = namespace(query.entity_id());
    key.push_str(&shape);
    key
}

/// Returns the key prefix shared by every cached variant of `entity_id`.
pub fn namespace(entity_id: &str) -> String {
    let mut out = String::with_capacity(entity_id.len() + 1);
    for ch in entity_id.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out.push(':');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Query {
        id: &'static str,
        summary: bool,
        limit: Option<u32>,
    }

    impl QueryKey for Query {
        fn entity_id(&self) -> &str {
            self.id
        }

        fn shape(&self) -> String {
            let limit = self.limit.map_or_else(|| "-".to_owned(), |l| l.to_string());
            format!("summary={}:limit={limit}", u8::from(self.summary))
        }
    }

    fn query(id: &'static str, summary: bool, limit: Option<u32>) -> Query {
        Query { id, summary, limit }
    }

    #[test]
    fn equal_queries_share_a_key() {
        let a = query("ana", true, Some(6));
        let b = query("ana", true, Some(6));
        assert_eq!(derive_key(&a), derive_key(&b));
    }

    #[test]
    fn any_differing_option_changes_the_key() {
        let base = query("ana", false, None);
        let summary = query("ana", true, None);
        let limited = query("ana", false, Some(10));
        let other = query("bia", false, None);

        let keys = [
            derive_key(&base),
            derive_key(&summary),
            derive_key(&limited),
            derive_key(&other),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn separator_in_entity_id_is_escaped() {
        assert_eq!(namespace("a:b"), "a%3Ab:");
        assert_eq!(namespace("50%"), "50%25:");
        // "a" must not own keys of entity "a:b"
        assert!(!namespace("a:b").starts_with(&namespace("a")));
    }
}

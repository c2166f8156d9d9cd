//! Order-preserving header list with case-insensitive lookup.

use std::fmt;

/// Request or response headers.
///
/// Names compare case-insensitively; repeated names keep every value in
/// arrival order.
///
/// # Examples
///
/// ```
/// use vitrine::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("X-Forwarded-For", "203.0.113.7, 10.0.0.2");
///
/// assert_eq!(headers.get("x-forwarded-for"), Some("203.0.113.7, 10.0.0.2"));
/// assert_eq!(headers.first_value("x-forwarded-for"), Some("203.0.113.7"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header; an existing entry with the same name is kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.entries.push((name, value.into()));
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First comma-separated element of the first `name` header, trimmed.
    ///
    /// For list-valued headers such as `X-Forwarded-For`, where the leftmost
    /// element is the originating client.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.get(name)?
            .split(',')
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

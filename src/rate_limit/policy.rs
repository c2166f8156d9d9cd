//! Named rate-limit policies for the platform's sensitive actions.

use std::collections::HashMap;
use std::time::Duration;

use super::RateLimitConfig;
use crate::config::ConfigError;

/// Action names with a default policy.
pub mod actions {
    /// Credential submission on the sign-in form.
    pub const LOGIN: &str = "login";
    /// Password reset e-mail requests.
    pub const PASSWORD_RESET: &str = "password_reset";
    /// Agent self-registration.
    pub const SIGNUP: &str = "signup";
    /// Visitor contact form on an agent's public page, per client address.
    pub const LEAD_CONTACT: &str = "lead_contact";
    /// Visitor contact form, per contact e-mail address.
    pub const LEAD_CONTACT_EMAIL: &str = "lead_contact_email";
}

const MINUTE: u64 = 60;

/// Static table mapping an action name to its [`RateLimitConfig`].
///
/// # Examples
///
/// ```
/// use vitrine::rate_limit::{RateLimitPolicies, actions};
///
/// let mut policies = RateLimitPolicies::default();
/// assert_eq!(policies.get(actions::LOGIN).unwrap().max_requests(), 5);
///
/// policies
///     .merge_json(r#"{"login": {"max_requests": 10, "interval_secs": 60}}"#)
///     .unwrap();
/// assert_eq!(policies.get(actions::LOGIN).unwrap().max_requests(), 10);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitPolicies {
    policies: HashMap<String, RateLimitConfig>,
}

impl Default for RateLimitPolicies {
    fn default() -> Self {
        let defaults = [
            (actions::LOGIN, 5, 15 * MINUTE),
            (actions::PASSWORD_RESET, 3, 60 * MINUTE),
            (actions::SIGNUP, 3, 60 * MINUTE),
            (actions::LEAD_CONTACT, 5, 10 * MINUTE),
            (actions::LEAD_CONTACT_EMAIL, 3, 60 * MINUTE),
        ];

        let policies = defaults
            .into_iter()
            .map(|(action, max, secs)| {
                (
                    action.to_owned(),
                    RateLimitConfig::fixed(max, Duration::from_secs(secs)),
                )
            })
            .collect();
        Self { policies }
    }
}

impl RateLimitPolicies {
    /// Creates a table with no policies at all.
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Returns the policy for `action`, if one is configured.
    pub fn get(&self, action: &str) -> Option<&RateLimitConfig> {
        self.policies.get(action)
    }

    /// Adds or replaces the policy for `action`.
    pub fn insert(&mut self, action: impl Into<String>, config: RateLimitConfig) {
        self.policies.insert(action.into(), config);
    }

    /// Overrides policies from a JSON object of
    /// `{"action": {"max_requests": N, "interval_secs": S}}`.
    ///
    /// Actions not named in `json` keep their current policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Policies`] if the JSON is malformed or any
    /// policy has a zero limit or interval. The table is left untouched on error.
    pub fn merge_json(&mut self, json: &str) -> Result<(), ConfigError> {
        let overrides: HashMap<String, RateLimitConfig> = serde_json::from_str(json)?;
        self.policies.extend(overrides);
        Ok(())
    }

    /// Iterates over `(action, config)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RateLimitConfig)> {
        self.policies.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

//! Rate-limit middleware for sensitive routes.

use std::sync::Arc;

use tracing::warn;

use crate::{
    Request, Response,
    context::Context,
    middleware::{BoxResponse, Middleware, Next},
    rate_limit::{RateLimitConfig, RateLimitPolicies, RateLimiter},
};

/// Identifier used when the client address cannot be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Returns the rate-limit identity of the request's client.
///
/// See [`Request::client_addr`] for how proxy headers are treated. Requests
/// with no known address all share the `"unknown"` identity.
pub fn client_identifier(request: &Request, trust_proxy_headers: bool) -> String {
    request
        .client_addr(trust_proxy_headers)
        .map_or_else(|| UNKNOWN_CLIENT.to_owned(), |ip| ip.to_string())
}

/// Limits how often one client may hit the wrapped route.
///
/// The limiter identifier is `"{action}:{client}"`, so one shared
/// [`RateLimiter`] can serve every action without their counts mixing.
///
/// # Behavior
///
/// - **Allowed** — the [`RateLimitDecision`](crate::rate_limit::RateLimitDecision)
///   is placed in the request extensions, the downstream handler runs, and
///   `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset` are
///   set on its response.
/// - **Rejected** — a `429 Too Many Requests` with `Retry-After` is returned
///   and the handler is **not** called.
/// - **Disabled** — every request passes through untouched.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use vitrine::rate_limit::{RateLimitPolicies, RateLimiter, actions};
/// use vitrine::security::RateLimitMiddleware;
///
/// let limiter = Arc::new(RateLimiter::new());
/// let policies = RateLimitPolicies::default();
///
/// let login_guard = RateLimitMiddleware::from_policy(limiter, &policies, actions::LOGIN)
///     .expect("login has a default policy")
///     .trust_proxy_headers(true);
/// ```
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
    action: String,
    config: RateLimitConfig,
    trust_proxy_headers: bool,
    enabled: bool,
}

impl RateLimitMiddleware {
    /// Limits `action` to `config`, counting in `limiter`.
    pub fn new(
        limiter: Arc<RateLimiter>,
        action: impl Into<String>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            limiter,
            action: action.into(),
            config,
            trust_proxy_headers: false,
            enabled: true,
        }
    }

    /// Builds the middleware from the policy configured for `action`.
    ///
    /// Returns `None` when `policies` has no entry for `action`.
    pub fn from_policy(
        limiter: Arc<RateLimiter>,
        policies: &RateLimitPolicies,
        action: &str,
    ) -> Option<Self> {
        policies
            .get(action)
            .map(|config| Self::new(limiter, action, *config))
    }

    /// Whether proxy headers identify the client. Off by default.
    #[must_use]
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Turns limiting on or off. On by default.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl Middleware for RateLimitMiddleware {
    fn handle(&self, mut ctx: Context, next: Next) -> BoxResponse {
        if !self.enabled {
            return Box::pin(next.run(ctx));
        }

        let client = client_identifier(ctx.request(), self.trust_proxy_headers);
        let identifier = format!("{}:{client}", self.action);
        let decision = self.limiter.check(&identifier, &self.config);

        if !decision.allowed {
            warn!(
                action = %self.action,
                client = %client,
                retry_after = decision.retry_after_secs(),
                "rate limit exceeded"
            );
            return Box::pin(async move { Response::too_many_requests(&decision) });
        }

        ctx.extensions_mut().insert(decision);
        Box::pin(async move {
            let mut response = next.run(ctx).await;
            response.set_rate_limit_headers(&decision);
            response
        })
    }
}

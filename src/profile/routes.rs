//! HTTP endpoints for agent landing pages.
//!
//! | Method | Path                        | Notes                                 |
//! |--------|-----------------------------|---------------------------------------|
//! | GET    | `/health`                   | `204`, for load-balancer checks       |
//! | GET    | `/corretores/:slug`         | cached; `imoveis`, `contato`, `resumo`, `limite=N` |
//! | POST   | `/corretores/:slug/contato` | JSON [`LeadRequest`]; per client and per address |

use std::sync::Arc;

use serde_json::json;
use tracing::error;

use super::{LeadOutcome, LeadRequest, ProfileQuery, ProfileService};
use crate::config::Config;
use crate::context::Context;
use crate::middleware::{LoggerMiddleware, from_middleware};
use crate::rate_limit::{RateLimiter, actions};
use crate::security::RateLimitMiddleware;
use crate::{Response, Router, StatusCode};

/// Builds the router serving profile pages and the contact form.
///
/// `limiter` is shared with `service` so per-client and per-address counts
/// live in one table.
pub fn routes(service: Arc<ProfileService>, limiter: Arc<RateLimiter>, config: &Config) -> Router {
    let mut router = Router::new();
    router.layer(from_middleware(Arc::new(LoggerMiddleware)));

    router.get("/health", |_ctx: Context| async {
        Response::new(StatusCode::NoContent)
    });

    let reader = Arc::clone(&service);
    router.get("/corretores/:slug", move |ctx: Context| {
        let service = Arc::clone(&reader);
        async move { show_profile(&service, &ctx).await }
    });

    let contact = router.post("/corretores/:slug/contato", move |ctx: Context| {
        let service = Arc::clone(&service);
        async move { submit_lead(&service, &ctx).await }
    });
    if let Some(guard) =
        RateLimitMiddleware::from_policy(limiter, &config.rate_limits, actions::LEAD_CONTACT)
    {
        let guard = guard
            .trust_proxy_headers(config.trust_proxy_headers)
            .enabled(config.rate_limit_enabled);
        contact.layer(from_middleware(Arc::new(guard)));
    }

    router
}

fn slug_param(ctx: &Context) -> &str {
    ctx.params().get("slug").unwrap_or_default()
}

fn store_unavailable() -> Response {
    Response::error(
        StatusCode::ServiceUnavailable,
        "store_unavailable",
        "Perfil temporariamente indisponível.",
    )
}

fn agent_not_found(slug: &str) -> Response {
    Response::error(
        StatusCode::NotFound,
        "agent_not_found",
        format!("no agent with slug {slug:?}"),
    )
}

async fn show_profile(service: &ProfileService, ctx: &Context) -> Response {
    let slug = slug_param(ctx);
    let query = match ProfileQuery::from_request(slug, ctx.request()) {
        Ok(query) => query,
        Err(e) => return Response::error(StatusCode::BadRequest, "invalid_query", e.to_string()),
    };

    match service.profile(&query).await {
        Ok(profile) => match profile.as_ref() {
            Some(profile) => Response::json(StatusCode::Ok, profile),
            None => agent_not_found(slug),
        },
        Err(e) => {
            error!(slug, error = %e, "profile read failed");
            store_unavailable()
        }
    }
}

// First missing required field, if any.
fn missing_field(lead: &LeadRequest) -> Option<&'static str> {
    if lead.name.trim().is_empty() {
        Some("name")
    } else if !lead.email.contains('@') {
        Some("email")
    } else if lead.message.trim().is_empty() {
        Some("message")
    } else {
        None
    }
}

async fn submit_lead(service: &ProfileService, ctx: &Context) -> Response {
    let slug = slug_param(ctx);
    let lead: LeadRequest = match ctx.json() {
        Ok(lead) => lead,
        Err(e) => return Response::error(StatusCode::BadRequest, "invalid_body", e.to_string()),
    };
    if let Some(field) = missing_field(&lead) {
        return Response::error(
            StatusCode::UnprocessableEntity,
            "invalid_lead",
            format!("missing or invalid field: {field}"),
        );
    }

    match service.submit_lead(slug, lead).await {
        Ok(LeadOutcome::Recorded { id }) => {
            Response::json(StatusCode::Created, &json!({ "id": id }))
        }
        Ok(LeadOutcome::UnknownAgent) => agent_not_found(slug),
        Ok(LeadOutcome::Throttled(decision)) => Response::too_many_requests(&decision),
        Err(e) => {
            error!(slug, error = %e, "lead intake failed");
            store_unavailable()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::Request;
    use crate::profile::{AgentRecord, MemoryProfileStore, ProfileUpdate, Property};

    struct App {
        router: Router,
        service: Arc<ProfileService>,
        store: Arc<MemoryProfileStore>,
    }

    fn app(config: Config) -> App {
        let store = Arc::new(MemoryProfileStore::with_agents([AgentRecord {
            slug: "ana-souza".to_owned(),
            name: "Ana Souza".to_owned(),
            creci: "12345-F".to_owned(),
            bio: Some("Apartamentos no Batel".to_owned()),
            phone: Some("+55 41 99999-0000".to_owned()),
            email: Some("ana@example.com".to_owned()),
            properties: vec![Property {
                id: 7,
                title: "Apartamento 2 quartos".to_owned(),
                city: "Curitiba".to_owned(),
                price_cents: 52_000_000,
                bedrooms: 2,
                featured: true,
            }],
            leads: Vec::new(),
        }]));
        let limiter = Arc::new(RateLimiter::new());
        let service = Arc::new(ProfileService::new(
            Arc::clone(&store) as Arc<dyn crate::profile::ProfileStore>,
            Arc::clone(&limiter),
            &config,
        ));
        let router = routes(Arc::clone(&service), limiter, &config);
        App {
            router,
            service,
            store,
        }
    }

    fn get(target: &str, peer: &str) -> Request {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: vitrine.test\r\n\r\n");
        let (mut request, _) = Request::parse(raw.as_bytes()).unwrap();
        request.set_peer_addr(peer.parse::<SocketAddr>().unwrap());
        request
    }

    fn post_json(target: &str, peer: &str, body: &str) -> Request {
        let raw = format!(
            "POST {target} HTTP/1.1\r\n\
             Host: vitrine.test\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\r\n{body}",
            body.len()
        );
        let (mut request, _) = Request::parse(raw.as_bytes()).unwrap();
        request.set_peer_addr(peer.parse::<SocketAddr>().unwrap());
        request
    }

    const CONTACT: &str = "/corretores/ana-souza/contato";

    fn lead_body(email: &str) -> String {
        json!({
            "name": "Rui",
            "email": email,
            "message": "Gostaria de agendar uma visita",
            "property_id": 7,
        })
        .to_string()
    }

    fn body_json(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body_ref()).unwrap()
    }

    const PEER: &str = "203.0.113.9:50000";

    #[tokio::test]
    async fn health_check() {
        let app = app(Config::default());
        let res = app.router.route(get("/health", PEER)).await;
        assert_eq!(res.status(), StatusCode::NoContent);
    }

    #[tokio::test]
    async fn profile_reads_are_cached_per_shape() {
        let app = app(Config::default());

        for _ in 0..3 {
            let res = app.router.route(get("/corretores/ana-souza", PEER)).await;
            assert_eq!(res.status(), StatusCode::Ok);
        }
        assert_eq!(app.store.fetch_count(), 1);

        let res = app
            .router
            .route(get("/corretores/ana-souza?imoveis&contato", PEER))
            .await;
        let body = body_json(&res);
        assert_eq!(body["phone"], "+55 41 99999-0000");
        assert_eq!(body["properties"][0]["id"], 7);
        assert_eq!(app.store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn update_is_visible_on_next_read() {
        let app = app(Config::default());
        app.router.route(get("/corretores/ana-souza", PEER)).await;

        let update = ProfileUpdate {
            name: Some("Ana S. Lima".to_owned()),
            ..ProfileUpdate::default()
        };
        assert!(app.service.update_profile("ana-souza", update).await.unwrap());

        let res = app.router.route(get("/corretores/ana-souza", PEER)).await;
        assert_eq!(body_json(&res)["name"], "Ana S. Lima");
    }

    #[tokio::test]
    async fn unknown_agent_and_bad_query() {
        let app = app(Config::default());

        let res = app.router.route(get("/corretores/ghost", PEER)).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(body_json(&res)["error"], "agent_not_found");

        let res = app
            .router
            .route(get("/corretores/ana-souza?limite=zero", PEER))
            .await;
        assert_eq!(res.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn lead_is_recorded() {
        let app = app(Config::default());
        let res = app
            .router
            .route(post_json(CONTACT, PEER, &lead_body("rui@example.com")))
            .await;

        assert_eq!(res.status(), StatusCode::Created);
        assert_eq!(res.headers().get("x-ratelimit-limit"), Some("5"));
        assert_eq!(res.headers().get("x-ratelimit-remaining"), Some("4"));
        assert_eq!(app.store.leads("ana-souza").await.len(), 1);
    }

    #[tokio::test]
    async fn malformed_and_incomplete_leads_are_rejected() {
        let app = app(Config::default());

        let res = app
            .router
            .route(post_json(CONTACT, PEER, "{not json"))
            .await;
        assert_eq!(res.status(), StatusCode::BadRequest);

        let res = app
            .router
            .route(post_json(CONTACT, PEER, &lead_body("no-at-sign")))
            .await;
        assert_eq!(res.status(), StatusCode::UnprocessableEntity);
        assert!(app.store.leads("ana-souza").await.is_empty());
    }

    #[tokio::test]
    async fn client_is_limited_across_addresses() {
        let app = app(Config::default());

        for i in 0..5 {
            let body = lead_body(&format!("visitante{i}@example.com"));
            let res = app.router.route(post_json(CONTACT, PEER, &body)).await;
            assert_eq!(res.status(), StatusCode::Created);
        }

        let res = app
            .router
            .route(post_json(CONTACT, PEER, &lead_body("novo@example.com")))
            .await;
        assert_eq!(res.status(), StatusCode::TooManyRequests);
        assert!(res.headers().get("retry-after").is_some());
        assert_eq!(app.store.leads("ana-souza").await.len(), 5);

        // another client is unaffected
        let res = app
            .router
            .route(post_json(CONTACT, "198.51.100.4:40000", &lead_body("novo@example.com")))
            .await;
        assert_eq!(res.status(), StatusCode::Created);
    }

    #[tokio::test]
    async fn address_is_limited_across_clients() {
        let app = app(Config::default());

        for i in 0..3 {
            let peer = format!("198.51.100.{i}:40000");
            let res = app
                .router
                .route(post_json(CONTACT, &peer, &lead_body("rui@example.com")))
                .await;
            assert_eq!(res.status(), StatusCode::Created);
        }

        let res = app
            .router
            .route(post_json(CONTACT, "198.51.100.200:40000", &lead_body("rui@example.com")))
            .await;
        assert_eq!(res.status(), StatusCode::TooManyRequests);
        assert_eq!(body_json(&res)["error"], "too_many_requests");
    }

    #[tokio::test]
    async fn disabled_limiting_lets_everything_through() {
        let app = app(Config {
            rate_limit_enabled: false,
            ..Config::default()
        });

        for _ in 0..8 {
            let res = app
                .router
                .route(post_json(CONTACT, PEER, &lead_body("rui@example.com")))
                .await;
            assert_eq!(res.status(), StatusCode::Created);
            assert!(res.headers().get("x-ratelimit-limit").is_none());
        }
    }
}

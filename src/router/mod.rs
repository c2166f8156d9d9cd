//! Request routing with router-wide and per-route middleware.
//!
//! | Pattern                       | Example match               | Captured params |
//! |-------------------------------|-----------------------------|-----------------|
//! | `/health`                     | `/health`                   | *(none)*        |
//! | `/corretores/:slug`           | `/corretores/ana-souza`     | `slug`          |
//!
//! Trailing slashes are ignored on both patterns and paths. Routes are tried
//! in registration order and the first match wins.
//!
//! Every request runs through the router-wide layers (see [`Router::layer`])
//! and then through the matched route's own layers (see [`Route::layer`])
//! before reaching the handler. Unmatched requests still pass the router-wide
//! layers and end in `404 Not Found`.

use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::middleware::{BoxResponse, MiddlewareHandler, Next};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased async handler.
pub type Handler = Arc<dyn Fn(Context) -> BoxResponse + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Response> + Send`
/// that is `Send + Sync + 'static`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxResponse;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxResponse {
        Box::pin((self)(ctx))
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

// Compiled route pattern.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

impl Pattern {
    // Any `:name` segment → Parameterized, otherwise Exact.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_owned()),
                    None => Segment::Static(s.to_owned()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_owned())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            params.insert(name.clone(), path_seg.to_owned());
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

/// A registered route: method, pattern, handler, and its own middleware.
pub struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
    layers: Vec<MiddlewareHandler>,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: Handler) -> Self {
        Self {
            method,
            pattern: Pattern::parse(pattern),
            handler,
            layers: Vec::new(),
        }
    }

    /// Wraps only this route's handler in `middleware`.
    ///
    /// Layers run in the order they are added, after the router-wide layers.
    pub fn layer(&mut self, middleware: MiddlewareHandler) -> &mut Self {
        self.layers.push(middleware);
        self
    }

    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

// Adapts a route handler into the last link of a middleware chain.
fn endpoint(handler: Handler) -> MiddlewareHandler {
    Arc::new(move |ctx: Context, _next: Next| handler(ctx))
}

fn not_found() -> MiddlewareHandler {
    Arc::new(|ctx: Context, _next: Next| -> BoxResponse {
        let path = ctx.request().path().to_owned();
        Box::pin(async move {
            Response::error(StatusCode::NotFound, "not_found", format!("no route for {path}"))
        })
    })
}

/// HTTP request router.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use vitrine::{Router, Response, StatusCode};
/// use vitrine::context::Context;
/// use vitrine::middleware::{LoggerMiddleware, from_middleware};
///
/// let mut router = Router::new();
/// router.layer(from_middleware(Arc::new(LoggerMiddleware)));
///
/// router.get("/corretores/:slug", |ctx: Context| async move {
///     let slug = ctx.params().get("slug").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(slug)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    layers: Vec<MiddlewareHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `GET` route.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Get, path, handler)
    }

    /// Registers a `POST` route.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) -> &mut Route {
        self.add_route(Method::Post, path, handler)
    }

    /// Adds a middleware that wraps every request, matched or not.
    pub fn layer(&mut self, middleware: MiddlewareHandler) -> &mut Self {
        self.layers.push(middleware);
        self
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) -> &mut Route {
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));
        self.routes.push(Route::new(method, path, handler));
        let last = self.routes.len() - 1;
        &mut self.routes[last]
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatches `request` through the middleware chain to the first
    /// matching route, or to a `404 Not Found` responder.
    pub async fn route(&self, request: Request) -> Response {
        let matched = self.routes.iter().find_map(|route| {
            route
                .matches(request.method(), request.path())
                .map(|params| (route, params))
        });

        let mut chain = self.layers.clone();
        let ctx = match matched {
            Some((route, params)) => {
                chain.extend(route.layers.iter().cloned());
                chain.push(endpoint(Arc::clone(&route.handler)));
                Context::with_params(request, params)
            }
            None => {
                chain.push(not_found());
                Context::new(request)
            }
        };

        Next::new(chain).run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Middleware, from_middleware};

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    // Adds a marker header so tests can see which layers ran.
    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
            let tag = self.0;
            Box::pin(async move {
                let mut res = next.run(ctx).await;
                res.add_header("X-Layer", tag);
                res
            })
        }
    }

    // ── Pattern ──────────────────────────────────────────────────────────

    #[test]
    fn pattern_parse_kinds() {
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
        assert!(matches!(Pattern::parse("/health/"), Pattern::Exact(s) if s == "/health"));
        match Pattern::parse("/corretores/:slug/contato") {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 3);
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "slug"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn pattern_param_extracts_value() {
        let pat = Pattern::parse("/corretores/:slug");
        let params = pat.matches("/corretores/ana-souza/").unwrap();
        assert_eq!(params.get("slug"), Some("ana-souza"));
        assert!(pat.matches("/corretores").is_none());
        assert!(pat.matches("/imoveis/ana-souza").is_none());
    }

    // ── Router ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn unmatched_request_is_404() {
        let mut router = Router::new();
        router.get("/hello", |_ctx| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("POST", "/hello")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert!(router.route(make_request("GET", "/world")).await.status() == StatusCode::NotFound);
    }

    #[tokio::test]
    async fn unrouted_methods_fall_through_to_404() {
        let mut router = Router::new();
        router.post("/corretores/:slug/contato", |_ctx| async {
            Response::new(StatusCode::Created)
        });

        let put = make_request("PUT", "/corretores/ana/contato");
        assert_eq!(put.method(), &Method::Other("PUT".to_owned()));
        assert_eq!(router.route(put).await.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", |_ctx| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx| async { Response::new(StatusCode::Created) });
        assert_eq!(router.len(), 2);
        let res = router.route(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn handler_receives_params() {
        let mut router = Router::new();
        router.get("/corretores/:slug", |ctx: Context| async move {
            let slug = ctx.params().get("slug").unwrap_or("").to_owned();
            Response::new(StatusCode::Ok).body(slug)
        });
        let res = router.route(make_request("GET", "/corretores/bia")).await;
        assert_eq!(res.body_ref(), b"bia");
    }

    #[tokio::test]
    async fn route_layers_apply_only_to_their_route() {
        let mut router = Router::new();
        router.layer(from_middleware(Arc::new(Tag("global"))));
        router
            .post("/guarded", |_ctx| async { Response::new(StatusCode::Created) })
            .layer(from_middleware(Arc::new(Tag("route"))));
        router.get("/open", |_ctx| async { Response::new(StatusCode::Ok) });

        let guarded = router.route(make_request("POST", "/guarded")).await;
        let layers: Vec<_> = guarded
            .headers()
            .iter()
            .filter(|(k, _)| *k == "X-Layer")
            .map(|(_, v)| v)
            .collect();
        // innermost layer decorates first
        assert_eq!(layers, ["route", "global"]);

        let open = router.route(make_request("GET", "/open")).await;
        assert_eq!(open.headers().get("x-layer"), Some("global"));

        let missing = router.route(make_request("GET", "/nope")).await;
        assert_eq!(missing.status(), StatusCode::NotFound);
        assert_eq!(missing.headers().get("x-layer"), Some("global"));
    }
}

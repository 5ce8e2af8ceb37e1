//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy handler
//! - Wire up middleware (request id, tracing, timeout, body limit)
//! - Dispatch requests to the route table
//! - Load and persist session cookie jars around each pipeline run
//! - Swap the route table when a new configuration arrives

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ForwarderConfig, SessionConfig};
use crate::http::{request, response, X_REQUEST_ID};
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::proxy::transport::Transport;
use crate::proxy::{CookieJar, HttpTransport, ReverseProxy, TransportError};
use crate::routing::RouteTable;
use crate::session::{self, CookieStore};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub proxy: ReverseProxy,
    pub cookies: Arc<CookieStore>,
    pub session: SessionConfig,
    pub max_body_size: usize,
}

/// HTTP server for the forwarder.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: ForwarderConfig,
}

impl HttpServer {
    /// Create a server forwarding through a `reqwest`-backed transport.
    pub fn new(config: ForwarderConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.timeouts)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a server forwarding through the given transport.
    pub fn with_transport(config: ForwarderConfig, transport: Arc<dyn Transport>) -> Self {
        let state = AppState {
            routes: Arc::new(ArcSwap::from_pointee(RouteTable::from_config(&config.routes))),
            proxy: ReverseProxy::new(transport),
            cookies: Arc::new(CookieStore::from_config(&config.session)),
            session: config.session.clone(),
            max_body_size: config.security.max_body_size,
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ForwarderConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Shared state (route table, cookie store).
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, applying route updates as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ForwarderConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.state.routes.load().len(),
            "HTTP server starting"
        );

        let routes = self.state.routes.clone();
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                let table = RouteTable::from_config(&new_config.routes);
                tracing::info!(routes = table.len(), "Route table reloaded");
                routes.store(Arc::new(table));
            }
        });

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Looks up the route, runs the pipeline and persists session cookies.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let path = request.uri().path().to_string();
    let method = request.method().to_string();

    // 1. Match Route
    let Some(matched) = state.routes.load().match_path(&path) else {
        tracing::warn!(method = %method, path = %path, "No route matched");
        metrics::record_request("none", &method, 404, start_time);
        return (StatusCode::NOT_FOUND, "No matching route found").into_response();
    };
    let route = matched.route.clone();

    // 2. Session jar; ids the store does not know are replaced
    let (session_id, jar, minted) = if route.store_cookies_in_session {
        let presented = session::session_id(
            request::cookie_headers(request.headers()),
            &state.session.cookie_name,
        );
        let known = presented.and_then(|id| state.cookies.load(&id).map(|jar| (id, jar)));
        match known {
            Some((id, jar)) => (Some(id), jar, false),
            None => (Some(session::new_session_id()), CookieJar::new(), true),
        }
    } else {
        (None, CookieJar::new(), false)
    };

    tracing::debug!(
        route = %route.name,
        method = %method,
        path = %path,
        cookies = jar.len(),
        "Proxying request"
    );

    // 3. Forward
    let inbound = match request::into_inbound(request, state.max_body_size).await {
        Ok(inbound) => inbound,
        Err(response) => {
            metrics::record_request(&route.name, &method, response.status().as_u16(), start_time);
            return response;
        }
    };
    let proxy_config = route.proxy_config(matched.target_url());

    match state.proxy.handle(inbound, &proxy_config, jar).await {
        Ok(result) => {
            // A fresh session is only kept once it holds a cookie.
            let persisted = match &session_id {
                Some(id) if !minted || !result.cookies.is_empty() => {
                    state.cookies.save(id, result.cookies.clone());
                    true
                }
                _ => false,
            };
            metrics::record_request(&route.name, &method, result.status, start_time);

            let mut response = response::into_response(result);
            if minted && persisted {
                if let Some(id) = &session_id {
                    match HeaderValue::from_str(&session::session_cookie(&state.session, id)) {
                        Ok(value) => {
                            response.headers_mut().append(header::SET_COOKIE, value);
                        }
                        Err(e) => tracing::error!(error = %e, "Invalid session cookie"),
                    }
                }
            }
            response
        }
        Err(e) => {
            metrics::record_error(&route.name, e.kind());
            metrics::record_request(&route.name, &method, e.status_code().as_u16(), start_time);
            e.into_response()
        }
    }
}

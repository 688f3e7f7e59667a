//! HTTP gateway for Switchboard.
//!
//! Clients start a run with a POST, then read its events once over
//! Server-Sent Events. Agent metadata is served alongside.
//!
//! Built on Axum.

pub mod api_v1;
pub mod bootstrap;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use switchboard_agent::{AgentRegistry, RunTable};
use switchboard_config::{AppConfig, GatewayConfig};
use switchboard_core::tool::ToolRegistry;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub agents: Arc<AgentRegistry>,
    /// Tools offered to chat runs
    pub tools: Arc<ToolRegistry>,
    pub chat_runs: Arc<RunTable>,
    pub agent_runs: Arc<RunTable>,
    /// Model used for chat runs
    pub model: String,
    /// Persona prepended to chat runs
    pub system_prompt: String,
}

impl GatewayState {
    pub fn new(agents: Arc<AgentRegistry>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        let ttl = Duration::from_secs(config.gateway.run_ttl_secs);
        Self {
            agents,
            tools,
            chat_runs: Arc::new(RunTable::new(ttl)),
            agent_runs: Arc::new(RunTable::new(ttl)),
            model: config.default_model.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .nest("/api/v1", api_v1::v1_router(state))
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// CORS for the configured origins. `*` allows any origin, without
/// credentials.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().max_age(Duration::from_secs(3600));
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Serve until the listener fails. Expired runs are reaped in the background.
pub async fn serve(state: SharedState, gateway: &GatewayConfig) -> std::io::Result<()> {
    let interval = Duration::from_secs(gateway.reap_interval_secs.max(1));
    let reapers = [
        state.chat_runs.spawn_reaper(interval),
        state.agent_runs.spawn_reaper(interval),
    ];

    let addr = format!("{}:{}", gateway.host, gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, agents = state.agents.len().await, tools = state.tools.len(), "Gateway listening");

    let result = axum::serve(listener, build_router(state, gateway)).await;
    for reaper in reapers {
        reaper.abort();
    }
    result
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Hello, World!",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProvider;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use switchboard_agent::LoopSettings;
    use tower::ServiceExt;

    fn test_router(gateway: &GatewayConfig) -> Router {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let agents = Arc::new(AgentRegistry::new(provider, LoopSettings::default()));
        let state = Arc::new(GatewayState::new(
            agents,
            Arc::new(ToolRegistry::new()),
            &AppConfig::default(),
        ));
        build_router(state, gateway)
    }

    #[tokio::test]
    async fn health_reports_version() {
        let app = test_router(&GatewayConfig::default());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn root_greets() {
        let app = test_router(&GatewayConfig::default());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Hello, World!");
    }

    #[tokio::test]
    async fn cors_allows_configured_origin_only() {
        let app = test_router(&GatewayConfig::default());

        let preflight = |origin: &str| {
            Request::builder()
                .method("OPTIONS")
                .uri("/api/v1/chat/start")
                .header("origin", origin)
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(preflight("http://localhost:3000")).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(
            response.headers().get("access-control-allow-credentials").unwrap(),
            "true"
        );

        let response = app.oneshot(preflight("http://evil.example")).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn wildcard_origin_allows_any() {
        let gateway = GatewayConfig {
            allowed_origins: vec!["*".into()],
            ..GatewayConfig::default()
        };
        let app = test_router(&gateway);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://anywhere.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");
    }
}

//! Assembles the axum [`Router`] under `/api/mcp/v2` (spec.md §4.8, §6.2).

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{ci_info, context, discovery, forward, messaging, registry, tools};
use crate::state::AppState;

/// Request body cap; large enough for a tool definition with a sizeable
/// launch-args list, small enough to refuse abuse.
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Non-streaming request timeout (spec.md §5).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// CORS policy for the server. Defaults to permissive; callers embedding
/// this router (e.g. behind a reverse proxy) can restrict it.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    pub allow_any_origin: bool,
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allow_any_origin: true,
        }
    }
}

fn cors_layer(policy: &CorsPolicy) -> CorsLayer {
    let mut cors = CorsLayer::new();
    if policy.allow_any_origin {
        cors = cors.allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }
    cors
}

/// Build the full router, ready to be served with [`axum::serve`].
#[must_use]
pub fn build_router(state: AppState, cors: CorsPolicy) -> Router {
    let api = Router::new()
        .route("/health", get(discovery::health))
        .route("/capabilities", get(discovery::capabilities))
        .route("/tools/send-message", post(messaging::send_message))
        .route("/tools/team-chat", post(messaging::team_chat))
        .route("/tools/list-ais", post(ci_info::list_ais))
        .route("/tools/ci/{name}", get(ci_info::get_ci))
        .route("/tools/ci/{name}/exists", get(ci_info::ci_exists))
        .route("/tools/ci-types", get(ci_info::ci_types))
        .route("/tools/cis/type/{type}", get(ci_info::cis_of_type))
        .route("/tools/ci-tools", get(tools::list_defined))
        .route("/tools/ci-tools/launch", post(tools::launch))
        .route("/tools/ci-tools/terminate", post(tools::terminate))
        .route("/tools/ci-tools/status/{name}", get(tools::status))
        .route("/tools/ci-tools/instances", get(tools::instances))
        .route("/tools/ci-tools/define", post(tools::define))
        .route("/tools/ci-tools/{name}", delete(tools::undefine))
        .route(
            "/tools/ci-tools/capabilities/{name}",
            get(tools::capabilities_of),
        )
        .route(
            "/tools/context-state/{name}",
            get(context::get_context_state).post(context::set_context_state),
        )
        .route("/tools/context-states", get(context::all_context_states))
        .route(
            "/tools/context-state/{name}/promote-staged",
            post(context::promote_staged),
        )
        .route("/tools/forward", post(forward::forward))
        .route("/tools/registry/reload", post(registry::reload))
        .route("/tools/registry/status", get(registry::status))
        .route("/tools/registry/save", post(registry::save));

    Router::new()
        .nest("/api/mcp/v2", api)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(tower_http::timeout::TimeoutLayer::new(DEFAULT_REQUEST_TIMEOUT))
        .layer(cors_layer(&cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ci_bus::MessageBus;
    use ci_core::{CiEntry, CiType, DefinedBy, MessageFormat};
    use ci_health::HealthMonitor;
    use ci_ports::{PortAllocator, PortMode, PortRange};
    use ci_registry::RegistryStore;
    use ci_router::UnifiedRouter;
    use ci_supervisor::ToolSupervisor;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn app(dir: &std::path::Path) -> (Router, Arc<RegistryStore>) {
        let registry = Arc::new(RegistryStore::new(dir.join("registry.json"), vec![]));
        let bus = Arc::new(MessageBus::new(dir.join("ci_queues")).unwrap());
        let router = Arc::new(UnifiedRouter::new(registry.clone(), bus));
        let ports = Arc::new(PortAllocator::new(
            PortRange {
                start: 19600,
                end: 19610,
            },
            PortMode::Dynamic,
        ));
        let supervisor = Arc::new(ToolSupervisor::new(
            registry.clone(),
            ports,
            dir.join("custom_tools.json"),
        ));
        let health = Arc::new(HealthMonitor::new(registry.clone(), router.clone(), supervisor.clone()));

        let app = build_router(
            AppState {
                registry: registry.clone(),
                router,
                supervisor,
                health,
            },
            CorsPolicy::default(),
        );
        (app, registry)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let dir = tempdir().unwrap();
        let (app, _registry) = app(dir.path());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/mcp/v2/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_ci_lookup_returns_404_with_error_envelope() {
        let dir = tempdir().unwrap();
        let (app, _registry) = app(dir.path());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/mcp/v2/tools/ci/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["code"], "unknown_ci");
    }

    #[tokio::test]
    async fn send_message_to_unknown_ci_returns_500_per_s6() {
        let dir = tempdir().unwrap();
        let (app, _registry) = app(dir.path());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/mcp/v2/tools/send-message")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::json!({"ai_name": "no-such-ci", "message": "hello"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["code"], "unknown_ci");
        assert_eq!(body["detail"], "CI not found: no-such-ci");
    }

    #[tokio::test]
    async fn ci_exists_round_trips_against_the_registry() {
        let dir = tempdir().unwrap();
        let (app, registry) = app(dir.path());

        let entry = CiEntry::new(
            "numa",
            CiType::Greek,
            MessageFormat::RhetorSocket,
            DefinedBy::System,
        );
        registry.register(entry).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/mcp/v2/tools/ci/numa/exists")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["exists"], true);
    }

    #[tokio::test]
    async fn registry_status_reports_path_and_count() {
        let dir = tempdir().unwrap();
        let (app, _registry) = app(dir.path());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/mcp/v2/tools/registry/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["entry_count"], 0);
    }
}

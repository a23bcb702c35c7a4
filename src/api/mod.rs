mod handlers;
mod middleware;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub use handlers::ErrorBody;
pub use middleware::{
    enforce_budget, require_api_key, AccessConfig, ClientKey, RequestBudget, CALLER_ID_HEADER,
    DEFAULT_RATE_LIMIT, REPOSITORY_TOKEN_HEADER,
};

use crate::service::RoadmapService;

/// Router without an API key, request budget or CORS restrictions.
pub fn create_router(service: RoadmapService) -> Router {
    create_router_with_config(service, AccessConfig::open())
}

pub fn create_router_with_config(service: RoadmapService, config: AccessConfig) -> Router {
    let protected = Router::new()
        // Ideas
        .route("/ideas", post(handlers::suggest_idea))
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route("/projects", post(handlers::create_project))
        .route("/projects/{id}", get(handlers::get_project))
        .route("/projects/{id}/repository", put(handlers::link_repository))
        // Refinement
        .route("/projects/{id}/refinement", post(handlers::start_refinement))
        .route("/projects/{id}/refinement", get(handlers::get_refinement))
        .route(
            "/projects/{id}/refinement/answers",
            post(handlers::submit_answers),
        )
        // Roadmap
        .route("/projects/{id}/roadmap", post(handlers::generate_roadmap))
        .route("/projects/{id}/status", get(handlers::get_status))
        // Tasks
        .route("/tasks/{id}/complete", post(handlers::complete_task))
        .route("/tasks/{id}/progress", post(handlers::check_progress))
        .route("/tasks/{id}/help", get(handlers::get_help))
        .route_layer(from_fn_with_state(config.clone(), require_api_key));

    let mut api = Router::new()
        // Health stays reachable without credentials
        .route("/health", get(handlers::health))
        .merge(protected);

    if let Some(budget) = config.budget.clone() {
        api = api.layer(from_fn_with_state(budget, enforce_budget));
    }

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config)),
        )
        .with_state(service)
}

fn cors_layer(config: &AccessConfig) -> CorsLayer {
    match &config.cors_origins {
        Some(origins) => CorsLayer::new()
            .allow_origin(AllowOrigin::list(
                origins
                    .iter()
                    .filter_map(|origin| origin.parse::<HeaderValue>().ok()),
            ))
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

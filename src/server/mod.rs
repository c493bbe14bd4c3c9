//! HTTP binding for the graph operations.

use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{fmt, EnvFilter};

use crate::backend::neo4j::Neo4jConnector;
use crate::backend::Connector;
use crate::codec::{NodeRecord, PathRecord, RelationshipRecord};
use crate::config::GatewayConfig;
use crate::connection::ConnectionManager;
use crate::error::GatewayError;
use crate::graph::{DeleteReport, Direction, GraphOperations, NodeList, RelationshipList};
use crate::path::{max_depth_from_json, PathFinder};
use crate::query::{QueryGateway, QueryResults};
use crate::stats::{StatsCollector, StatsReport};

/// Errors that stop the server itself (as opposed to failed requests).
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving on the listener failed.
    #[error("failed to serve HTTP: {0}")]
    Io(#[from] std::io::Error),
}

/// Operation set shared by every handler.
pub struct ServerState<C: Connector> {
    graph: GraphOperations<C>,
    paths: PathFinder<C>,
    queries: QueryGateway<C>,
    stats: StatsCollector<C>,
}

impl<C: Connector> ServerState<C> {
    /// Builds every operation family over one connection manager.
    pub fn new(connections: Arc<ConnectionManager<C>>) -> Self {
        Self {
            graph: GraphOperations::new(Arc::clone(&connections)),
            paths: PathFinder::new(Arc::clone(&connections)),
            queries: QueryGateway::new(Arc::clone(&connections)),
            stats: StatsCollector::new(connections),
        }
    }
}

type AppState<C> = Arc<ServerState<C>>;

/// Binds the configured address and serves until Ctrl-C, then releases the backend handle.
pub async fn serve(config: GatewayConfig) -> Result<(), ServerError> {
    let connector = Neo4jConnector::new(config.backend.clone());
    let connections = Arc::new(ConnectionManager::new(connector, config.statement_timeout()));
    let app = build_router(Arc::clone(&connections), &config.server.allow_origins);
    let addr = SocketAddr::from((config.server.host, config.server.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        backend = %config.backend.uri,
        allow_origins = ?config.server.allow_origins,
        "graphgate listening"
    );

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;
    connections.shutdown().await;
    served?;
    Ok(())
}

/// Assembles every route over `connections`. CORS is enabled only when `allow_origins`
/// has at least one usable entry.
pub fn build_router<C: Connector>(
    connections: Arc<ConnectionManager<C>>,
    allow_origins: &[String],
) -> Router {
    let state: AppState<C> = Arc::new(ServerState::new(connections));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/nodes", post(create_node_handler::<C>))
        .route("/nodes/label/:label", get(nodes_by_label_handler::<C>))
        .route(
            "/nodes/:id",
            get(get_node_handler::<C>)
                .put(update_node_handler::<C>)
                .delete(delete_node_handler::<C>),
        )
        .route(
            "/nodes/:id/relationships",
            get(node_relationships_handler::<C>),
        )
        .route("/relationships", post(create_relationship_handler::<C>))
        .route(
            "/relationships/type/:rel_type",
            get(relationships_by_type_handler::<C>),
        )
        .route(
            "/relationships/:id",
            get(get_relationship_handler::<C>)
                .put(update_relationship_handler::<C>)
                .delete(delete_relationship_handler::<C>),
        )
        .route("/query/cypher", post(query_handler::<C>))
        .route("/query/path", post(path_handler::<C>))
        .route("/stats", get(stats_handler::<C>))
        .with_state(state);

    if let Some(layer) = build_cors_layer(allow_origins) {
        router = router.layer(layer);
    }

    router.layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let mut allowed = Vec::new();
    for origin in origins {
        let normalized = normalize_origin(origin);
        match normalized
            .as_deref()
            .and_then(|value| HeaderValue::from_str(value).ok())
        {
            Some(value) => allowed.push(value),
            None => {
                tracing::warn!(%origin, ?normalized, "ignoring invalid CORS origin");
            }
        }
    }

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([ACCEPT, CONTENT_TYPE]),
    )
}

fn normalize_origin(origin: &str) -> Option<String> {
    let trimmed = origin.trim().trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn create_node_handler<C: Connector>(
    State(state): State<AppState<C>>,
    body: Result<Json<CreateNodeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<NodeRecord>), ApiError> {
    let Json(request) = body?;
    let node = state
        .graph
        .create_node(&request.labels, request.properties.unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(node)))
}

async fn get_node_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<NodeRecord>, ApiError> {
    Ok(Json(state.graph.get_node(&id).await?))
}

async fn update_node_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<NodeRecord>, ApiError> {
    let properties = body?.0.require()?;
    Ok(Json(state.graph.update_node(&id, properties).await?))
}

async fn delete_node_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, ApiError> {
    Ok(Json(state.graph.delete_node(&id).await?))
}

async fn nodes_by_label_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(label): Path<String>,
) -> Result<Json<NodeList>, ApiError> {
    Ok(Json(state.graph.get_nodes_by_label(&label).await?))
}

async fn node_relationships_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
    filter: Result<Query<RelationshipFilter>, QueryRejection>,
) -> Result<Json<RelationshipList>, ApiError> {
    let Query(filter) = filter?;
    let direction = match filter.direction.as_deref() {
        Some(value) => value.parse::<Direction>()?,
        None => Direction::All,
    };
    let relationships = state
        .graph
        .get_node_relationships(&id, direction, filter.rel_type.as_deref())
        .await?;
    Ok(Json(relationships))
}

async fn create_relationship_handler<C: Connector>(
    State(state): State<AppState<C>>,
    body: Result<Json<CreateRelationshipRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RelationshipRecord>), ApiError> {
    let Json(request) = body?;
    let (Some(from_node), Some(to_node), Some(rel_type)) = (
        entity_id(request.from_node),
        entity_id(request.to_node),
        request.rel_type.filter(|rel_type| !rel_type.is_empty()),
    ) else {
        return Err(GatewayError::validation("from_node, to_node, and type are required").into());
    };
    let rel = state
        .graph
        .create_relationship(
            &from_node,
            &to_node,
            &rel_type,
            request.properties.unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(rel)))
}

async fn get_relationship_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<RelationshipRecord>, ApiError> {
    Ok(Json(state.graph.get_relationship(&id).await?))
}

async fn update_relationship_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<RelationshipRecord>, ApiError> {
    let properties = body?.0.require()?;
    Ok(Json(state.graph.update_relationship(&id, properties).await?))
}

async fn delete_relationship_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteReport>, ApiError> {
    Ok(Json(state.graph.delete_relationship(&id).await?))
}

async fn relationships_by_type_handler<C: Connector>(
    State(state): State<AppState<C>>,
    Path(rel_type): Path<String>,
) -> Result<Json<RelationshipList>, ApiError> {
    Ok(Json(state.graph.get_relationships_by_type(&rel_type).await?))
}

async fn query_handler<C: Connector>(
    State(state): State<AppState<C>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResults>, ApiError> {
    let Json(request) = body?;
    let Some(query) = request.query else {
        return Err(GatewayError::validation("No query provided").into());
    };
    let results = state
        .queries
        .execute(&query, request.parameters.unwrap_or_default())
        .await?;
    Ok(Json(results))
}

async fn path_handler<C: Connector>(
    State(state): State<AppState<C>>,
    body: Result<Json<PathRequest>, JsonRejection>,
) -> Result<Json<PathResponse>, ApiError> {
    let Json(request) = body?;
    let (Some(from_node), Some(to_node)) = (entity_id(request.from_node), entity_id(request.to_node))
    else {
        return Err(GatewayError::validation("from_node and to_node are required").into());
    };
    let max_depth = max_depth_from_json(request.max_depth.as_ref())?;
    let rel_types = request.relationship_types.unwrap_or_default();
    let path = state
        .paths
        .find_path(&from_node, &to_node, max_depth, rel_types.as_slice())
        .await?;
    Ok(Json(PathResponse { path }))
}

async fn stats_handler<C: Connector>(
    State(state): State<AppState<C>>,
) -> Result<Json<StatsReport>, ApiError> {
    let stats = state.stats.get_stats().await?;
    Ok(Json(StatsReport { stats }))
}

/// Ids arrive as strings, but integer ids taken from other tools are accepted too.
/// An empty string counts as missing.
fn entity_id(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(id) if id.is_empty() => None,
        Value::String(id) => Some(id),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct PathResponse {
    path: PathRecord,
}

#[derive(Debug, Deserialize)]
struct CreateNodeRequest {
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

impl UpdateRequest {
    fn require(self) -> Result<Map<String, Value>, GatewayError> {
        self.properties
            .ok_or_else(|| GatewayError::validation("No properties provided"))
    }
}

#[derive(Debug, Deserialize)]
struct CreateRelationshipRequest {
    #[serde(default)]
    from_node: Option<Value>,
    #[serde(default)]
    to_node: Option<Value>,
    #[serde(default, rename = "type")]
    rel_type: Option<String>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    parameters: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct PathRequest {
    #[serde(default)]
    from_node: Option<Value>,
    #[serde(default)]
    to_node: Option<Value>,
    #[serde(default)]
    max_depth: Option<Value>,
    #[serde(default)]
    relationship_types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RelationshipFilter {
    #[serde(default)]
    direction: Option<String>,
    #[serde(default, rename = "type")]
    rel_type: Option<String>,
}

/// Failed request; rendered as `{"error": ...}` with the status of its category.
#[derive(Debug)]
struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(GatewayError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(GatewayError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Backend(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(ErrorPayload {
            error: self.0.public_message(),
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}

/// Installs the global `tracing` subscriber once. Output goes to stderr so command
/// output on stdout stays machine-readable; `RUST_LOG` overrides the `info` default.
pub fn install_tracing_subscriber() {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

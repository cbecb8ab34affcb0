use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use warden_store::ContractFilter;
use warden_types::{
    AgentCapabilityManifest, ContractStatus, DelegationRequest, WardenError,
};

use warden_contracts::StatusUpdate;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/contracts",
            post(create_contract).get(list_contracts),
        )
        .route("/api/v1/contracts/{contract_id}", get(get_contract))
        .route(
            "/api/v1/contracts/{contract_id}/status",
            post(transition_contract),
        )
        .route(
            "/api/v1/contracts/{contract_id}/cancel",
            post(cancel_contract),
        )
        .route("/api/v1/contracts/{contract_id}/chain", get(get_chain))
        .route("/api/v1/agents", post(register_agent).get(list_agents))
        .route("/api/v1/agents/{agent_id}", get(get_agent))
        .route(
            "/api/v1/agents/{agent_id}/reputation",
            get(get_agent_reputation),
        )
        .route("/api/v1/statistics", get(get_statistics))
        .route("/api/v1/mcp/servers", get(list_mcp_servers))
        .route("/api/v1/mcp/statistics", get(mcp_statistics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Typed error body mirrored from the error taxonomy.
struct ApiError(WardenError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WardenError::NotFound { .. } => StatusCode::NOT_FOUND,
            WardenError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            WardenError::StateMachineViolation { .. } => StatusCode::CONFLICT,
            WardenError::ClearanceInsufficient { .. }
            | WardenError::SecurityThreat { .. }
            | WardenError::ReputationInsufficient { .. }
            | WardenError::FirebreakBlocked { .. }
            | WardenError::MaxDepthExceeded { .. }
            | WardenError::LoopDetected { .. }
            | WardenError::PermissionAttenuationViolation { .. } => StatusCode::FORBIDDEN,
            WardenError::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WardenError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        };
        let body = serde_json::json!({
            "kind": self.0.kind(),
            "reason": self.0.to_string(),
            "remediation": self.0.remediation(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<WardenError> for ApiError {
    fn from(err: WardenError) -> Self {
        Self(err)
    }
}

async fn create_contract(
    State(state): State<AppState>,
    Json(request): Json<DelegationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contract = state.manager.create_contract(request).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

#[derive(Debug, Deserialize)]
struct ContractQueryParams {
    status: Option<ContractStatus>,
    delegator_id: Option<Uuid>,
    delegatee_id: Option<Uuid>,
    task_id: Option<String>,
    priority: Option<u8>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_contracts(
    State(state): State<AppState>,
    Query(params): Query<ContractQueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let mut filter = ContractFilter {
        delegator_id: params.delegator_id,
        delegatee_id: params.delegatee_id,
        task_id: params.task_id,
        priority: params.priority,
        limit: params.limit,
        offset: params.offset,
        ..Default::default()
    };
    if let Some(status) = params.status {
        filter = filter.with_status(status);
    }
    let contracts = state.manager.query_contracts(&filter).await?;
    Ok(Json(contracts))
}

async fn get_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let contract = state.manager.get_contract(contract_id).await?;
    Ok(Json(contract))
}

#[derive(Debug, Deserialize)]
struct TransitionRequest {
    status: ContractStatus,
    #[serde(default)]
    verification_result: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
}

async fn transition_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contract = state
        .manager
        .update_contract_status(
            contract_id,
            request.status,
            Some(StatusUpdate {
                verification_result: request.verification_result,
                reason: request.reason,
            }),
        )
        .await?;
    Ok(Json(contract))
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    reason: String,
}

async fn cancel_contract(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contract = state
        .manager
        .cancel_contract(contract_id, request.reason)
        .await?;
    Ok(Json(contract))
}

async fn get_chain(
    State(state): State<AppState>,
    Path(contract_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let analysis = state
        .manager
        .chain_tracker()
        .analyze_chain(contract_id)
        .await?;
    Ok(Json(analysis))
}

async fn register_agent(
    State(state): State<AppState>,
    Json(manifest): Json<AgentCapabilityManifest>,
) -> Result<impl IntoResponse, ApiError> {
    let agent_id = manifest.agent_id;
    state.registry.register_manifest(manifest)?;
    let stored = state
        .registry
        .get_manifest(agent_id)
        .ok_or_else(|| WardenError::not_found("manifest", agent_id))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentCapabilityManifest>> {
    Json(state.registry.list_manifests())
}

async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let manifest = state
        .registry
        .get_manifest(agent_id)
        .ok_or_else(|| WardenError::not_found("manifest", agent_id))?;
    Ok(Json(manifest))
}

async fn get_agent_reputation(
    State(state): State<AppState>,
    Path(agent_id): Path<Uuid>,
) -> Json<warden_reputation::ReputationRecord> {
    Json(state.manager.reputation().get_or_default(agent_id))
}

async fn get_statistics(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let statistics = state.manager.get_statistics(None).await?;
    Ok(Json(statistics))
}

async fn list_mcp_servers(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.mcp.list())
}

async fn mcp_statistics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.mcp.statistics())
}

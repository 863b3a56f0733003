//! REST API Endpoints
//!
//! Request submission for both entities, their read models, and the
//! service's own health and request-outcome endpoints.

use crate::actor::{ActorClosed, ActorHandle, SubmitError};
use crate::state::{AppState, RequestCounts, RequestRecord};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cl_proof::{
    compute_leaf_hash, hex_bytes32, parse_hex32, Address, Amount, ClProofVerifier, Envelope,
    Hash32, Outbound, ProofConfig, Rejection, RequestId, Slot, ValidatorProof,
    VerifierNotification, VerifierRequest,
};
use predeposit_guarantee::{
    PdgNotification, PdgRequest, PredepositGuarantee, ValidatorRecord, ValidatorStage,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;

/// Router state: shared bookkeeping plus the two actors
#[derive(Debug, Clone)]
pub struct ApiContext {
    pub state: AppState,
    pub verifier: ActorHandle<ClProofVerifier>,
    pub guarantee: ActorHandle<PredepositGuarantee>,
}

/// Run the API server
pub async fn run_server(listen: String, ctx: ApiContext) -> anyhow::Result<()> {
    let app = create_router(ctx);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(address = %listen, "API server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the API router
pub fn create_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/requests/{entity}/{request_id}", get(get_request))
        .route("/verifier/requests", post(submit_verifier))
        .route("/verifier/config", get(verifier_config))
        .route("/verifier/roots/{slot}", get(state_root))
        .route("/verifier/leaf-hash", post(leaf_hash))
        .route("/verifier/verify-proof", post(verify_proof))
        .route("/guarantee/requests", post(submit_guarantee))
        .route("/guarantee/config", get(guarantee_config))
        .route("/guarantee/node-operators/{address}", get(node_operator))
        .route("/guarantee/refunds/{address}", get(claimable_refund))
        .route("/guarantee/validators/{pubkey_hash}", get(validator))
        .route("/guarantee/vaults/{address}/pending", get(pending_activations))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Error body `{error, kind}` with a status derived from the kind
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    fn not_found(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind,
            message: message.into(),
        }
    }

    fn bad_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            kind: "invalid_argument",
            message: message.into(),
        }
    }

    fn rejected<E: Rejection>(err: &E) -> Self {
        Self {
            status: status_for_kind(err.kind()),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// HTTP status for an entity rejection kind
#[must_use]
pub fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "unauthorized" => StatusCode::FORBIDDEN,
        "unknown_slot" | "unknown_delivery" => StatusCode::NOT_FOUND,
        "proof_rejected" | "invalid_argument" | "arithmetic_overflow" => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message, "kind": self.kind }));
        (self.status, body).into_response()
    }
}

impl From<ActorClosed> for ApiError {
    fn from(err: ActorClosed) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind: "unavailable",
            message: err.to_string(),
        }
    }
}

impl<E: Rejection + 'static> From<SubmitError<E>> for ApiError {
    fn from(err: SubmitError<E>) -> Self {
        match err {
            SubmitError::Rejected(e) => Self::rejected(&e),
            SubmitError::Closed(e) => e.into(),
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::bad_input(format!("bad address {raw}: {e}")))
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    slots_behind: u64,
}

/// Health check endpoint
async fn health(State(ctx): State<ApiContext>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = ctx.state.is_healthy();
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        slots_behind: ctx.state.slots_behind(),
    };

    (status_code, Json(response))
}

/// Status response
#[derive(Debug, Serialize)]
struct StatusResponse {
    published_slot: Slot,
    finalized_epoch: u64,
    head_slot: Slot,
    slots_behind: u64,
    uptime_secs: u64,
    requests: RequestCounts,
    last_error: Option<String>,
}

/// Status endpoint
async fn status(State(ctx): State<ApiContext>) -> Json<StatusResponse> {
    let state = &ctx.state;
    Json(StatusResponse {
        published_slot: state.published_slot(),
        finalized_epoch: state.finalized_epoch(),
        head_slot: state.head_slot(),
        slots_behind: state.slots_behind(),
        uptime_secs: state.uptime_secs(),
        requests: state.counts(),
        last_error: state.last_error(),
    })
}

/// Recorded outcome of a submitted request
async fn get_request(
    State(ctx): State<ApiContext>,
    Path((entity, request_id)): Path<(String, RequestId)>,
) -> Result<Json<RequestRecord>, ApiError> {
    ctx.state
        .request(&entity, request_id)
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(
                "unknown_request",
                format!("no request {request_id} at {entity}"),
            )
        })
}

/// Accepted request and the messages it emitted
#[derive(Debug, Serialize)]
pub struct SubmitResponse<N> {
    pub request_id: RequestId,
    pub outbound: Vec<Outbound<N>>,
}

async fn submit_verifier(
    State(ctx): State<ApiContext>,
    Json(envelope): Json<Envelope<VerifierRequest>>,
) -> Result<Json<SubmitResponse<VerifierNotification>>, ApiError> {
    let request_id = envelope.request_id;
    let outbound = ctx.verifier.submit(envelope).await?;
    Ok(Json(SubmitResponse {
        request_id,
        outbound,
    }))
}

async fn submit_guarantee(
    State(ctx): State<ApiContext>,
    Json(envelope): Json<Envelope<PdgRequest>>,
) -> Result<Json<SubmitResponse<PdgNotification>>, ApiError> {
    let request_id = envelope.request_id;
    let outbound = ctx.guarantee.submit(envelope).await?;
    Ok(Json(SubmitResponse {
        request_id,
        outbound,
    }))
}

#[derive(Debug, Serialize)]
struct VerifierConfigResponse {
    owner: Address,
    #[serde(flatten)]
    config: ProofConfig,
}

async fn verifier_config(
    State(ctx): State<ApiContext>,
) -> Result<Json<VerifierConfigResponse>, ApiError> {
    let (owner, config) = ctx
        .verifier
        .query(|v| (v.owner(), v.config().clone()))
        .await?;
    Ok(Json(VerifierConfigResponse { owner, config }))
}

#[derive(Debug, Serialize)]
struct RootResponse {
    slot: Slot,
    #[serde(with = "hex_bytes32")]
    root: Hash32,
}

async fn state_root(
    State(ctx): State<ApiContext>,
    Path(slot): Path<Slot>,
) -> Result<Json<RootResponse>, ApiError> {
    let root = ctx.verifier.query(move |v| v.state_root(slot)).await?;
    root.map(|root| Json(RootResponse { slot, root }))
        .ok_or_else(|| {
            ApiError::not_found(
                "unknown_slot",
                format!("no state root published for slot {slot}"),
            )
        })
}

#[derive(Debug, Deserialize)]
struct LeafHashRequest {
    #[serde(with = "hex_bytes32")]
    pubkey_hash: Hash32,
    #[serde(with = "hex_bytes32")]
    withdrawal_credentials: Hash32,
}

#[derive(Debug, Serialize)]
struct LeafHashResponse {
    #[serde(with = "hex_bytes32")]
    leaf_hash: Hash32,
}

async fn leaf_hash(Json(req): Json<LeafHashRequest>) -> Json<LeafHashResponse> {
    Json(LeafHashResponse {
        leaf_hash: compute_leaf_hash(&req.pubkey_hash, &req.withdrawal_credentials),
    })
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    valid: bool,
}

/// Dry-run verification; never changes state
async fn verify_proof(
    State(ctx): State<ApiContext>,
    Json(proof): Json<ValidatorProof>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let valid = ctx.verifier.query(move |v| v.verify_proof(&proof)).await?;
    Ok(Json(VerifyResponse { valid }))
}

#[derive(Debug, Serialize)]
struct GuaranteeConfigResponse {
    admin: Address,
    proof_authority: Address,
    paused: bool,
    predeposit_amount: Amount,
}

async fn guarantee_config(
    State(ctx): State<ApiContext>,
) -> Result<Json<GuaranteeConfigResponse>, ApiError> {
    let response = ctx
        .guarantee
        .query(|g| GuaranteeConfigResponse {
            admin: g.admin(),
            proof_authority: g.proof_authority(),
            paused: g.is_paused(),
            predeposit_amount: g.predeposit_amount(),
        })
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct NodeOperatorResponse {
    node_operator: Address,
    total: Amount,
    locked: Amount,
    unlocked: Amount,
    guarantor: Address,
    depositor: Address,
}

async fn node_operator(
    State(ctx): State<ApiContext>,
    Path(address): Path<String>,
) -> Result<Json<NodeOperatorResponse>, ApiError> {
    let node_operator = parse_address(&address)?;
    let response = ctx
        .guarantee
        .query(move |g| {
            let balance = g.balance(&node_operator);
            NodeOperatorResponse {
                node_operator,
                total: balance.total,
                locked: balance.locked,
                unlocked: balance.unlocked(),
                guarantor: g.guarantor(&node_operator),
                depositor: g.depositor(&node_operator),
            }
        })
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct RefundResponse {
    guarantor: Address,
    claimable: Amount,
}

async fn claimable_refund(
    State(ctx): State<ApiContext>,
    Path(address): Path<String>,
) -> Result<Json<RefundResponse>, ApiError> {
    let guarantor = parse_address(&address)?;
    let claimable = ctx
        .guarantee
        .query(move |g| g.claimable_refund(&guarantor))
        .await?;
    Ok(Json(RefundResponse {
        guarantor,
        claimable,
    }))
}

#[derive(Debug, Serialize)]
struct ValidatorResponse {
    #[serde(with = "hex_bytes32")]
    pubkey_hash: Hash32,
    stage: ValidatorStage,
    stage_code: u8,
    record: Option<ValidatorRecord>,
}

async fn validator(
    State(ctx): State<ApiContext>,
    Path(pubkey_hash): Path<String>,
) -> Result<Json<ValidatorResponse>, ApiError> {
    let pubkey_hash = parse_hex32(&pubkey_hash)
        .map_err(|e| ApiError::bad_input(format!("bad pubkey hash: {e}")))?;
    let record = ctx
        .guarantee
        .query(move |g| g.validator(&pubkey_hash).cloned())
        .await?;
    let stage = record.as_ref().map_or(ValidatorStage::None, |r| r.stage);
    Ok(Json(ValidatorResponse {
        pubkey_hash,
        stage,
        stage_code: stage.code(),
        record,
    }))
}

#[derive(Debug, Serialize)]
struct PendingResponse {
    staking_vault: Address,
    pending_activations: u64,
}

async fn pending_activations(
    State(ctx): State<ApiContext>,
    Path(address): Path<String>,
) -> Result<Json<PendingResponse>, ApiError> {
    let staking_vault = parse_address(&address)?;
    let pending_activations = ctx
        .guarantee
        .query(move |g| g.pending_activations(&staking_vault))
        .await?;
    Ok(Json(PendingResponse {
        staking_vault,
        pending_activations,
    }))
}

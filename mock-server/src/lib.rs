//! In-memory stand-in for the YACHAQ Requester API.
//!
//! Speaks the same envelope as the real service, issues bearer tokens for a
//! single configured API key and keeps requests and disputes in memory.
//! [`Fault`] makes every route answer with a 429 or a 5xx so clients can be
//! exercised against those paths end-to-end.

use std::{collections::HashMap, str::FromStr, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const DEFAULT_API_KEY: &str = "test-api-key";
pub const REQUESTER_ID: &str = "requester-mock";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Canned failure returned by every route instead of the real handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// 429; `retry_after` of `None` omits the `Retry-After` header.
    RateLimit { retry_after: Option<String> },
    /// The given 5xx status with a non-JSON body.
    ServerError(u16),
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub api_key: String,
    pub fault: Option<Fault>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            fault: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    pub template_id: Option<String>,
    #[serde(default)]
    pub required_labels: Vec<String>,
    pub compensation: Decimal,
    pub output_mode: String,
    pub ttl_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationResult {
    pub success: bool,
    pub request_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub evidence_id: String,
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub description: String,
    pub content_hash: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub dispute_id: String,
    pub request_id: String,
    pub capsule_id: String,
    pub requester_id: String,
    pub reason: String,
    pub description: String,
    pub status: String,
    pub evidence: Vec<Evidence>,
    pub filed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisputeInput {
    request_id: String,
    capsule_id: String,
    reason: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct EvidenceInput {
    #[serde(rename = "type")]
    evidence_type: String,
    description: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Capsule {
    capsule_id: String,
    request_id: String,
    signature: String,
    headers: HashMap<String, String>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Schema {
    required_fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    merkle_proof: Vec<String>,
    blockchain_anchor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SchemaCheck {
    capsule: Capsule,
    schema: Schema,
}

#[derive(Debug, Deserialize)]
struct ReceiptCheck {
    capsule: Capsule,
    receipt: Receipt,
}

#[derive(Debug, Deserialize)]
struct CompleteCheck {
    capsule: Capsule,
    schema: Schema,
    receipt: Receipt,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestrictionCheck {
    output_mode: String,
    compensation: Decimal,
    #[serde(default)]
    required_labels: Vec<String>,
    #[serde(default)]
    identity_reveal: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthInput {
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct TemplateQuery {
    category: Option<String>,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredRequest {
    config: RequestConfig,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Store {
    tokens: Vec<String>,
    requests: HashMap<String, StoredRequest>,
    disputes: HashMap<String, Dispute>,
}

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    store: Arc<RwLock<Store>>,
}

pub fn app() -> Router {
    app_with_config(MockConfig::default())
}

pub fn app_with_config(config: MockConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
        store: Arc::new(RwLock::new(Store::default())),
    };
    Router::new()
        .route("/v1/auth/token", post(issue_token))
        .route("/v1/requests", post(create_request))
        .route("/v1/requests/batch", post(create_requests_batch))
        .route("/v1/requests/{id}/status", get(request_status))
        .route("/v1/templates", get(list_templates))
        .route("/v1/criteria/validate", post(validate_criteria))
        .route("/v1/capsules/verify/signature", post(verify_signature))
        .route("/v1/capsules/verify/schema", post(verify_schema))
        .route("/v1/capsules/verify/receipt", post(verify_receipt))
        .route("/v1/capsules/verify/complete", post(verify_complete))
        .route("/v1/disputes", post(file_dispute))
        .route("/v1/disputes/{id}", get(get_dispute))
        .route("/v1/disputes/{id}/evidence", post(add_evidence))
        .route("/v1/requester/tier", get(tier))
        .route("/v1/requester/restrictions/check", post(check_restrictions))
        .route("/v1/requester/analytics", get(analytics))
        .layer(middleware::from_fn_with_state(state.clone(), inject_fault))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_config(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_config(config)).await
}

// ---------------------------------------------------------------------------
// Envelope helpers
// ---------------------------------------------------------------------------

type Reply = (StatusCode, Json<Value>);

fn ok<T: Serialize>(data: T) -> Reply {
    (StatusCode::OK, Json(json!({ "success": true, "data": data })))
}

fn fail(status: StatusCode, code: &str, message: impl Into<String>) -> Reply {
    (
        status,
        Json(json!({ "success": false, "errorCode": code, "errorMessage": message.into() })),
    )
}

fn invalid(message: &str, errors: Vec<String>) -> Reply {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "errorCode": "VALIDATION_ERROR",
            "errorMessage": message,
            "validationErrors": errors,
        })),
    )
}

async fn inject_fault(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match &state.config.fault {
        None => next.run(request).await,
        Some(Fault::RateLimit { retry_after }) => {
            let mut response =
                fail(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT", "slow down").into_response();
            if let Some(value) = retry_after.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        Some(Fault::ServerError(status)) => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "<html><body>upstream unavailable</body></html>").into_response()
        }
    }
}

/// 401 unless the request carries a token this server issued.
async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Reply> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let known = match token {
        Some(token) => state.store.read().await.tokens.iter().any(|t| t == token),
        None => false,
    };
    if known {
        Ok(())
    } else {
        Err(fail(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "missing or unknown bearer token",
        ))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn issue_token(State(state): State<AppState>, Json(input): Json<AuthInput>) -> Reply {
    if input.api_key != state.config.api_key {
        return fail(StatusCode::OK, "INVALID_API_KEY", "API key not recognised");
    }
    let access_token = format!("at-{}", Uuid::new_v4());
    state.store.write().await.tokens.push(access_token.clone());
    tracing::info!("issued access token");
    ok(json!({
        "accessToken": access_token,
        "refreshToken": format!("rt-{}", Uuid::new_v4()),
        "expiresIn": 3600,
        "tokenType": "Bearer",
    }))
}

fn check_request(config: &RequestConfig) -> Vec<String> {
    let mut errors = Vec::new();
    if config.required_labels.is_empty() {
        errors.push("requiredLabels must not be empty".to_string());
    }
    if config.compensation <= Decimal::ZERO {
        errors.push("compensation must be positive".to_string());
    }
    if config.ttl_hours.is_some_and(|h| h <= 0) {
        errors.push("ttlHours must be positive".to_string());
    }
    errors
}

async fn store_request(state: &AppState, config: RequestConfig) -> CreationResult {
    let id = Uuid::new_v4().to_string();
    tracing::info!(request_id = %id, labels = config.required_labels.len(), "request created");
    state.store.write().await.requests.insert(
        id.clone(),
        StoredRequest {
            config,
            created_at: Utc::now(),
        },
    );
    CreationResult {
        success: true,
        request_id: id,
        status: "DRAFT".to_string(),
    }
}

async fn create_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(config): Json<RequestConfig>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let errors = check_request(&config);
    if !errors.is_empty() {
        return invalid("Request validation failed", errors);
    }
    ok(store_request(&state, config).await)
}

async fn create_requests_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(configs): Json<Vec<RequestConfig>>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let errors: Vec<String> = configs
        .iter()
        .enumerate()
        .flat_map(|(i, c)| check_request(c).into_iter().map(move |e| format!("item {i}: {e}")))
        .collect();
    if !errors.is_empty() {
        return invalid("Batch validation failed", errors);
    }
    let mut results = Vec::with_capacity(configs.len());
    for config in configs {
        results.push(store_request(&state, config).await);
    }
    ok(results)
}

async fn request_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let store = state.store.read().await;
    let Some(stored) = store.requests.get(&id) else {
        return fail(StatusCode::NOT_FOUND, "REQUEST_NOT_FOUND", format!("no request {id}"));
    };
    let expires_at = stored
        .config
        .ttl_hours
        .map(|h| stored.created_at + Duration::hours(h));
    ok(json!({
        "requestId": id,
        "status": "DRAFT",
        "screeningStatus": "PENDING",
        "createdAt": stored.created_at,
        "expiresAt": expires_at,
        "responseStats": {
            "totalResponses": 0,
            "completedResponses": 0,
            "pendingResponses": 0,
            "totalCost": "0.00",
        },
    }))
}

fn templates() -> Vec<Value> {
    vec![
        json!({
            "id": "tpl-steps",
            "name": "Daily steps",
            "description": "Aggregate step counts",
            "category": "health",
            "defaultLabels": ["health:steps"],
            "optionalLabels": ["health:distance"],
            "outputMode": "AGGREGATE_ONLY",
            "suggestedCompensation": "5.00",
            "defaultTtlHours": 168,
        }),
        json!({
            "id": "tpl-listening",
            "name": "Listening habits",
            "description": "Genres and listening time",
            "category": "media",
            "defaultLabels": ["media:music"],
            "optionalLabels": [],
            "outputMode": "CLEAN_ROOM",
            "suggestedCompensation": "2.50",
            "defaultTtlHours": 72,
        }),
    ]
}

async fn list_templates(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TemplateQuery>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let all = templates();
    let filtered: Vec<Value> = match query.category {
        Some(category) => all
            .into_iter()
            .filter(|t| t["category"] == category.as_str())
            .collect(),
        None => all,
    };
    ok(filtered)
}

async fn validate_criteria(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(criteria): Json<Value>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let labels = criteria["requiredLabels"]
        .as_array()
        .map(|a| a.len())
        .unwrap_or(0);
    let (valid, errors) = if labels == 0 {
        (false, vec!["at least one required label is needed"])
    } else {
        (true, Vec::new())
    };
    let warnings: Vec<&str> = if criteria.get("geoCriteria").is_some() {
        vec!["geo targeting narrows the cohort"]
    } else {
        Vec::new()
    };
    ok(json!({
        "valid": valid,
        "errors": errors,
        "warnings": warnings,
        "estimatedCohortSize": 1000 / (labels.max(1) as u64),
    }))
}

fn signature_result(capsule: &Capsule) -> Value {
    if capsule.signature.is_empty() {
        json!({ "valid": false, "errorMessage": "capsule is not signed" })
    } else {
        json!({
            "valid": true,
            "signerId": format!("node-{}", capsule.request_id),
            "algorithm": capsule.headers.get("alg").cloned().unwrap_or_else(|| "Ed25519".to_string()),
            "signedAt": Utc::now(),
        })
    }
}

fn schema_result(capsule: &Capsule, schema: &Schema) -> Value {
    let violations: Vec<Value> = schema
        .required_fields
        .iter()
        .filter(|f| !capsule.headers.contains_key(*f))
        .map(|f| json!({ "field": f, "violation": "required field missing", "expected": "present" }))
        .collect();
    json!({ "valid": violations.is_empty(), "violations": violations })
}

fn receipt_result(capsule: &Capsule, receipt: &Receipt) -> Value {
    let proof_valid = !receipt.merkle_proof.is_empty();
    let anchor_valid = receipt.blockchain_anchor.is_some();
    let expired = capsule.expires_at < Utc::now();
    let mut body = json!({
        "valid": proof_valid && !expired,
        "merkleProofValid": proof_valid,
        "blockchainAnchorValid": anchor_valid,
    });
    if !proof_valid {
        body["errorMessage"] = json!("empty merkle proof");
    } else if expired {
        body["errorMessage"] = json!(format!("capsule {} expired", capsule.capsule_id));
    }
    body
}

async fn verify_signature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(capsule): Json<Capsule>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    ok(signature_result(&capsule))
}

async fn verify_schema(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(check): Json<SchemaCheck>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    ok(schema_result(&check.capsule, &check.schema))
}

async fn verify_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(check): Json<ReceiptCheck>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    ok(receipt_result(&check.capsule, &check.receipt))
}

async fn verify_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(check): Json<CompleteCheck>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let signature = signature_result(&check.capsule);
    let schema = schema_result(&check.capsule, &check.schema);
    let receipt = receipt_result(&check.capsule, &check.receipt);
    let valid = [&signature, &schema, &receipt]
        .iter()
        .all(|r| r["valid"] == true);
    ok(json!({
        "valid": valid,
        "signatureResult": signature,
        "schemaResult": schema,
        "receiptResult": receipt,
    }))
}

async fn file_dispute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<DisputeInput>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    if input.description.trim().is_empty() {
        return invalid(
            "Dispute validation failed",
            vec!["description must not be empty".to_string()],
        );
    }
    let mut store = state.store.write().await;
    if !store.requests.contains_key(&input.request_id) {
        return fail(
            StatusCode::NOT_FOUND,
            "REQUEST_NOT_FOUND",
            format!("no request {}", input.request_id),
        );
    }
    let dispute = Dispute {
        dispute_id: Uuid::new_v4().to_string(),
        request_id: input.request_id,
        capsule_id: input.capsule_id,
        requester_id: REQUESTER_ID.to_string(),
        reason: input.reason,
        description: input.description,
        status: "FILED".to_string(),
        evidence: Vec::new(),
        filed_at: Utc::now(),
    };
    tracing::info!(dispute_id = %dispute.dispute_id, "dispute filed");
    let reply = json!({ "success": true, "disputeId": dispute.dispute_id, "status": "FILED" });
    store.disputes.insert(dispute.dispute_id.clone(), dispute);
    ok(reply)
}

async fn get_dispute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    match state.store.read().await.disputes.get(&id) {
        Some(dispute) => ok(dispute),
        None => fail(StatusCode::NOT_FOUND, "DISPUTE_NOT_FOUND", format!("no dispute {id}")),
    }
}

async fn add_evidence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<EvidenceInput>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let mut store = state.store.write().await;
    let Some(dispute) = store.disputes.get_mut(&id) else {
        return fail(StatusCode::NOT_FOUND, "DISPUTE_NOT_FOUND", format!("no dispute {id}"));
    };
    let evidence = Evidence {
        evidence_id: Uuid::new_v4().to_string(),
        evidence_type: input.evidence_type,
        description: input.description,
        content_hash: format!("len:{}", input.content.len()),
        submitted_at: Utc::now(),
    };
    let evidence_id = evidence.evidence_id.clone();
    dispute.evidence.push(evidence);
    dispute.status = "UNDER_REVIEW".to_string();
    ok(json!({ "success": true, "evidenceId": evidence_id }))
}

fn tier_capabilities() -> Value {
    json!({
        "tier": "VERIFIED",
        "maxBudget": "1000.00",
        "maxParticipants": 5000,
        "allowedOutputModes": ["AGGREGATE_ONLY", "VIEW_ONLY", "CLEAN_ROOM"],
        "exportAllowed": false,
        "allowedCategories": ["health", "media"],
    })
}

async fn tier(State(state): State<AppState>, headers: HeaderMap) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    ok(tier_capabilities())
}

async fn check_restrictions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(check): Json<RestrictionCheck>,
) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let tier = tier_capabilities();
    let mut violations = Vec::new();
    let allowed_mode = tier["allowedOutputModes"]
        .as_array()
        .is_some_and(|modes| modes.iter().any(|m| *m == check.output_mode.as_str()));
    if !allowed_mode {
        violations.push(format!(
            "output mode {} not allowed for tier VERIFIED",
            check.output_mode
        ));
    }
    let max_budget = tier["maxBudget"]
        .as_str()
        .and_then(|b| Decimal::from_str(b).ok())
        .unwrap_or(Decimal::ZERO);
    if check.compensation > max_budget {
        violations.push(format!("compensation exceeds max budget {max_budget}"));
    }
    if check.identity_reveal {
        violations.push("identity reveal requires ENTERPRISE".to_string());
    }
    let warnings: Vec<String> = check
        .required_labels
        .iter()
        .filter(|l| l.starts_with("finance:"))
        .map(|l| format!("label {l} triggers manual review"))
        .collect();
    ok(json!({
        "allowed": violations.is_empty(),
        "violations": violations,
        "warnings": warnings,
    }))
}

async fn analytics(State(state): State<AppState>, headers: HeaderMap) -> Reply {
    if let Err(reply) = authorize(&state, &headers).await {
        return reply;
    }
    let store = state.store.read().await;
    ok(json!({
        "requesterId": REQUESTER_ID,
        "totalRequests": store.requests.len(),
        "approvedRequests": 0,
        "rejectedRequests": 0,
        "pendingRequests": store.requests.len(),
        "totalResponses": 0,
        "totalSpent": "0.00",
        "generatedAt": Utc::now(),
    }))
}

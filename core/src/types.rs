//! Domain DTOs for the Requester API.
//!
//! # Design
//! Field names are snake_case in Rust and camelCase on the wire. Optional
//! fields are omitted from outgoing JSON rather than sent as `null`, so a
//! value serialized here and echoed back by the server deserializes to an
//! equal value. Money is [`Decimal`] (encoded as a decimal string, accepted
//! as string or number) and timestamps are RFC 3339 [`DateTime<Utc>`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How results of a request are released to the requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputMode {
    Raw,
    AggregateOnly,
    ViewOnly,
    CleanRoom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatusType {
    Draft,
    Screening,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreeningStatus {
    Pending,
    Approved,
    Rejected,
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequesterTier {
    Community,
    Verified,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeReason {
    DataQuality,
    SchemaMismatch,
    IncompleteData,
    ConsentViolation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Filed,
    UnderReview,
    EvidenceRequested,
    Resolved,
    Rejected,
}

/// Fix suggested by screening when a request is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemediationAction {
    ModifyCriteria,
    ChangeOutputMode,
    ReduceScope,
    AddJustification,
    UpgradeTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeoPrecision {
    City,
    Region,
    Country,
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub api_key: String,
}

/// Token pair issued by `POST /v1/auth/token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
    pub token_type: String,
}

// ---------------------------------------------------------------------------
// Request management
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoCriteria {
    pub precision: GeoPrecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
}

/// Payload for creating a data request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub required_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_criteria: Option<GeoCriteria>,
    pub compensation: Decimal,
    pub output_mode: OutputMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_hours: Option<u32>,
}

impl RequestConfig {
    pub fn new<I, S>(required_labels: I, compensation: Decimal, output_mode: OutputMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            template_id: None,
            required_labels: required_labels.into_iter().map(Into::into).collect(),
            optional_labels: None,
            time_window: None,
            geo_criteria: None,
            compensation,
            output_mode,
            ttl_hours: None,
        }
    }
}

/// Targeting criteria, validated without creating a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdxCriteria {
    pub required_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_criteria: Option<GeoCriteria>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationSuggestion {
    pub id: String,
    pub title: String,
    pub description: String,
    pub action: RemediationAction,
}

/// Outcome of a create call. Screening rejections come back as a successful
/// envelope whose result lists `errors` and `suggestions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCreationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<RemediationSuggestion>>,
}

impl RequestCreationResult {
    /// True when the server assigned an id and reported no errors.
    pub fn is_created(&self) -> bool {
        self.request_id.is_some()
            && self.success != Some(false)
            && self.errors.as_ref().map_or(true, |errors| errors.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub default_labels: Vec<String>,
    pub optional_labels: Vec<String>,
    pub output_mode: OutputMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_time_window: Option<TimeWindow>,
    pub suggested_compensation: Decimal,
    pub default_ttl_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub estimated_cohort_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseStats {
    pub total_responses: u64,
    pub completed_responses: u64,
    pub pending_responses: u64,
    pub total_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub request_id: String,
    pub status: RequestStatusType,
    pub screening_status: ScreeningStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub response_stats: ResponseStats,
}

// ---------------------------------------------------------------------------
// Capsule verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleSchema {
    pub schema_id: String,
    pub version: String,
    pub fields: BTreeMap<String, FieldSchema>,
    pub required_fields: Vec<String>,
}

/// A signed, encrypted data package delivered to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleData {
    pub capsule_id: String,
    pub contract_id: String,
    pub request_id: String,
    /// Base64 ciphertext, passed through untouched.
    pub encrypted_payload: String,
    pub signature: String,
    pub headers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Integrity proof for a capsule: content hash, Merkle inclusion proof and an
/// optional on-chain anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashReceipt {
    pub receipt_id: String,
    pub capsule_hash: String,
    pub merkle_root: String,
    pub merkle_proof: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchored_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureVerificationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub field: String,
    pub violation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub violations: Vec<SchemaViolation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashReceiptVerificationResult {
    pub valid: bool,
    pub merkle_proof_valid: bool,
    pub blockchain_anchor_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteVerificationResult {
    pub valid: bool,
    pub signature_result: SignatureVerificationResult,
    pub schema_result: SchemaValidationResult,
    pub receipt_result: HashReceiptVerificationResult,
}

impl CompleteVerificationResult {
    /// Turn an invalid verdict into [`SdkError::Verification`], naming the
    /// first component that failed.
    pub fn ensure_valid(&self) -> Result<(), SdkError> {
        if self.valid {
            return Ok(());
        }
        let message = if !self.signature_result.valid {
            format!(
                "signature invalid: {}",
                self.signature_result
                    .error_message
                    .as_deref()
                    .unwrap_or("no detail")
            )
        } else if !self.schema_result.valid {
            match self.schema_result.violations.first() {
                Some(v) => format!("schema violation on {}: {}", v.field, v.violation),
                None => "schema validation failed".to_string(),
            }
        } else if !self.receipt_result.valid {
            format!(
                "hash receipt invalid: {}",
                self.receipt_result
                    .error_message
                    .as_deref()
                    .unwrap_or("no detail")
            )
        } else {
            "capsule verification failed".to_string()
        };
        Err(SdkError::Verification { message })
    }
}

// ---------------------------------------------------------------------------
// Disputes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub evidence_id: String,
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub description: String,
    pub content_hash: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRequest {
    pub request_id: String,
    pub capsule_id: String,
    pub reason: DisputeReason,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeFilingResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispute_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DisputeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub dispute_id: String,
    pub request_id: String,
    pub capsule_id: String,
    pub requester_id: String,
    pub reason: DisputeReason,
    pub description: String,
    pub status: DisputeStatus,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub filed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// New evidence for an open dispute. `content` travels as standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSubmission {
    #[serde(rename = "type")]
    pub evidence_type: String,
    pub description: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceAddResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tier & analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierCapabilities {
    pub tier: RequesterTier,
    pub max_budget: Decimal,
    pub max_participants: u64,
    pub allowed_output_modes: Vec<OutputMode>,
    pub export_allowed: bool,
    pub allowed_categories: Vec<String>,
}

/// Request shape checked against the requester's tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestrictionCheck {
    pub output_mode: OutputMode,
    pub compensation: Decimal,
    pub required_labels: Vec<String>,
    #[serde(default)]
    pub identity_reveal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionCheckResult {
    pub allowed: bool,
    #[serde(default)]
    pub violations: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl RestrictionCheckResult {
    /// Turn a disallowed result into [`SdkError::TierRestriction`].
    pub fn into_result(self) -> Result<Self, SdkError> {
        if self.allowed {
            return Ok(self);
        }
        Err(SdkError::TierRestriction {
            message: "Request violates tier restrictions".to_string(),
            violations: self.violations,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterAnalytics {
    pub requester_id: String,
    pub total_requests: u64,
    pub approved_requests: u64,
    pub rejected_requests: u64,
    pub pending_requests: u64,
    pub total_responses: u64,
    pub total_spent: Decimal,
    pub generated_at: DateTime<Utc>,
}

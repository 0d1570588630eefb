//! Stateless HTTP request builder and response parser for the Requester API.
//!
//! # Design
//! `RequesterApi` holds only a `base_url` and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse` through the envelope classifier. The caller executes the
//! HTTP round-trip in between and attaches the bearer token, if any.

use serde::Serialize;

use crate::envelope::{self, check_status, parse_envelope};
use crate::error::SdkError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    AuthRequest, AuthToken, CapsuleData, CapsuleSchema, CompleteVerificationResult,
    CriteriaValidationResult, Dispute, DisputeFilingResult, DisputeRequest, EvidenceAddResult,
    EvidenceSubmission, HashReceipt, HashReceiptVerificationResult, OdxCriteria, RequestConfig,
    RequestCreationResult, RequestStatus, RequestTemplate, RequesterAnalytics, RestrictionCheck,
    RestrictionCheckResult, SchemaValidationResult, SignatureVerificationResult, TierCapabilities,
};

const AUTH_FALLBACK_MESSAGE: &str = "Authentication failed";

#[derive(Serialize)]
struct SchemaCheckBody<'a> {
    capsule: &'a CapsuleData,
    schema: &'a CapsuleSchema,
}

#[derive(Serialize)]
struct ReceiptCheckBody<'a> {
    capsule: &'a CapsuleData,
    receipt: &'a HashReceipt,
}

#[derive(Serialize)]
struct CompleteCheckBody<'a> {
    capsule: &'a CapsuleData,
    schema: &'a CapsuleSchema,
    receipt: &'a HashReceipt,
}

/// Synchronous, stateless builder/parser for the Requester API.
#[derive(Debug, Clone)]
pub struct RequesterApi {
    base_url: String,
}

impl RequesterApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- authentication ------------------------------------------------------

    pub fn build_authenticate(&self, api_key: &str) -> Result<HttpRequest, SdkError> {
        self.post(
            "/v1/auth/token",
            &AuthRequest {
                api_key: api_key.to_string(),
            },
        )
    }

    /// Reserved status codes classify as usual; any other failure of the
    /// token endpoint is an authentication error.
    pub fn parse_authenticate(&self, response: HttpResponse) -> Result<AuthToken, SdkError> {
        check_status(&response)?;
        let envelope = parse_envelope(&response)?;
        match envelope.data {
            Some(data) if envelope.success && !data.is_null() => envelope::from_data(data),
            _ => Err(SdkError::authentication(
                envelope
                    .error_message
                    .unwrap_or_else(|| AUTH_FALLBACK_MESSAGE.to_string()),
            )),
        }
    }

    // -- request management --------------------------------------------------

    pub fn build_create_request(&self, config: &RequestConfig) -> Result<HttpRequest, SdkError> {
        self.post("/v1/requests", config)
    }

    pub fn parse_create_request(
        &self,
        response: HttpResponse,
    ) -> Result<RequestCreationResult, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_create_requests_batch(
        &self,
        configs: &[RequestConfig],
    ) -> Result<HttpRequest, SdkError> {
        self.post("/v1/requests/batch", &configs)
    }

    /// Results come back in the order the configs were sent.
    pub fn parse_create_requests_batch(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<RequestCreationResult>, SdkError> {
        let data = envelope::classify_raw(&response)?;
        envelope::from_data(data)
    }

    pub fn build_get_templates(&self, category: Option<&str>) -> HttpRequest {
        let mut request = self.get("/v1/templates");
        if let Some(category) = category {
            request
                .query
                .push(("category".to_string(), category.to_string()));
        }
        request
    }

    pub fn parse_get_templates(
        &self,
        response: HttpResponse,
    ) -> Result<Vec<RequestTemplate>, SdkError> {
        let data = envelope::classify_raw(&response)?;
        envelope::from_data(data)
    }

    pub fn build_validate_criteria(&self, criteria: &OdxCriteria) -> Result<HttpRequest, SdkError> {
        self.post("/v1/criteria/validate", criteria)
    }

    pub fn parse_validate_criteria(
        &self,
        response: HttpResponse,
    ) -> Result<CriteriaValidationResult, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_get_request_status(&self, request_id: &str) -> HttpRequest {
        self.get(&format!(
            "/v1/requests/{}/status",
            urlencoding::encode(request_id)
        ))
    }

    pub fn parse_get_request_status(
        &self,
        response: HttpResponse,
    ) -> Result<RequestStatus, SdkError> {
        envelope::classify(&response)
    }

    // -- capsule verification ------------------------------------------------

    pub fn build_verify_signature(&self, capsule: &CapsuleData) -> Result<HttpRequest, SdkError> {
        self.post("/v1/capsules/verify/signature", capsule)
    }

    pub fn parse_verify_signature(
        &self,
        response: HttpResponse,
    ) -> Result<SignatureVerificationResult, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_validate_schema(
        &self,
        capsule: &CapsuleData,
        schema: &CapsuleSchema,
    ) -> Result<HttpRequest, SdkError> {
        self.post(
            "/v1/capsules/verify/schema",
            &SchemaCheckBody { capsule, schema },
        )
    }

    pub fn parse_validate_schema(
        &self,
        response: HttpResponse,
    ) -> Result<SchemaValidationResult, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_verify_hash_receipt(
        &self,
        capsule: &CapsuleData,
        receipt: &HashReceipt,
    ) -> Result<HttpRequest, SdkError> {
        self.post(
            "/v1/capsules/verify/receipt",
            &ReceiptCheckBody { capsule, receipt },
        )
    }

    pub fn parse_verify_hash_receipt(
        &self,
        response: HttpResponse,
    ) -> Result<HashReceiptVerificationResult, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_verify_complete(
        &self,
        capsule: &CapsuleData,
        schema: &CapsuleSchema,
        receipt: &HashReceipt,
    ) -> Result<HttpRequest, SdkError> {
        self.post(
            "/v1/capsules/verify/complete",
            &CompleteCheckBody {
                capsule,
                schema,
                receipt,
            },
        )
    }

    pub fn parse_verify_complete(
        &self,
        response: HttpResponse,
    ) -> Result<CompleteVerificationResult, SdkError> {
        envelope::classify(&response)
    }

    // -- disputes ------------------------------------------------------------

    pub fn build_file_dispute(&self, request: &DisputeRequest) -> Result<HttpRequest, SdkError> {
        self.post("/v1/disputes", request)
    }

    pub fn parse_file_dispute(
        &self,
        response: HttpResponse,
    ) -> Result<DisputeFilingResult, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_get_dispute(&self, dispute_id: &str) -> HttpRequest {
        self.get(&format!("/v1/disputes/{}", urlencoding::encode(dispute_id)))
    }

    pub fn parse_get_dispute(&self, response: HttpResponse) -> Result<Dispute, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_add_evidence(
        &self,
        dispute_id: &str,
        evidence: &EvidenceSubmission,
    ) -> Result<HttpRequest, SdkError> {
        self.post(
            &format!("/v1/disputes/{}/evidence", urlencoding::encode(dispute_id)),
            evidence,
        )
    }

    pub fn parse_add_evidence(&self, response: HttpResponse) -> Result<EvidenceAddResult, SdkError> {
        envelope::classify(&response)
    }

    // -- tier & analytics ----------------------------------------------------

    pub fn build_get_tier_capabilities(&self) -> HttpRequest {
        self.get("/v1/requester/tier")
    }

    pub fn parse_get_tier_capabilities(
        &self,
        response: HttpResponse,
    ) -> Result<TierCapabilities, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_check_restrictions(
        &self,
        check: &RestrictionCheck,
    ) -> Result<HttpRequest, SdkError> {
        self.post("/v1/requester/restrictions/check", check)
    }

    pub fn parse_check_restrictions(
        &self,
        response: HttpResponse,
    ) -> Result<RestrictionCheckResult, SdkError> {
        envelope::classify(&response)
    }

    pub fn build_get_analytics(&self) -> HttpRequest {
        self.get("/v1/requester/analytics")
    }

    pub fn parse_get_analytics(
        &self,
        response: HttpResponse,
    ) -> Result<RequesterAnalytics, SdkError> {
        envelope::classify(&response)
    }

    // -- helpers -------------------------------------------------------------

    fn get(&self, path: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}{path}", self.base_url),
            query: Vec::new(),
            headers: json_headers(),
            body: None,
        }
    }

    fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<HttpRequest, SdkError> {
        let body = serde_json::to_string(body).map_err(SdkError::serialization)?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}{path}", self.base_url),
            query: Vec::new(),
            headers: json_headers(),
            body: Some(body),
        })
    }
}

fn json_headers() -> Vec<(String, String)> {
    vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("accept".to_string(), "application/json".to_string()),
    ]
}

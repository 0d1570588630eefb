//! Async client for the Requester API.
//!
//! # Design
//! `YachaqClient` is the host half of the host-does-IO split: it asks
//! [`RequesterApi`] for an `HttpRequest`, executes it with `reqwest`, and
//! hands the `HttpResponse` back to the matching `parse_*` method. The only
//! mutable state is the bearer token and the connection handle, both behind
//! short-lived locks that are never held across an `.await`.
//!
//! The connection handle is created in [`YachaqClient::new`] and released by
//! [`YachaqClient::close`]. Closing twice is fine; any operation after close
//! fails with a network error.

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::api::RequesterApi;
use crate::config::ClientConfig;
use crate::error::SdkError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    AuthToken, CapsuleData, CapsuleSchema, CompleteVerificationResult, CriteriaValidationResult,
    Dispute, DisputeFilingResult, DisputeRequest, EvidenceAddResult, EvidenceSubmission,
    HashReceipt, HashReceiptVerificationResult, OdxCriteria, OutputMode, RequestConfig,
    RequestCreationResult, RequestStatus, RequestTemplate, RequesterAnalytics, RestrictionCheck,
    RestrictionCheckResult, SchemaValidationResult, SignatureVerificationResult, TierCapabilities,
};

/// Async client for the Requester API. Share it by reference (or `Arc`)
/// between tasks; every operation takes `&self`.
#[derive(Debug)]
pub struct YachaqClient {
    api: RequesterApi,
    api_key: Option<String>,
    http: RwLock<Option<reqwest::Client>>,
    access_token: RwLock<Option<String>>,
}

impl YachaqClient {
    pub fn new(config: ClientConfig) -> Result<Self, SdkError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SdkError::network(format!("failed to build HTTP client: {e}")))?;

        debug!(base_url = %config.base_url, "client created");
        Ok(Self {
            api: RequesterApi::new(&config.base_url),
            api_key: config.api_key,
            http: RwLock::new(Some(http)),
            access_token: RwLock::new(config.access_token),
        })
    }

    /// Client built from `YACHAQ_*` environment variables.
    pub fn from_env() -> Result<Self, SdkError> {
        Self::new(ClientConfig::from_env())
    }

    pub fn api(&self) -> &RequesterApi {
        &self.api
    }

    /// Replace the bearer token sent with subsequent requests.
    pub fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write() = Some(token.into());
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token.read().clone()
    }

    /// Release the connection handle. Idempotent.
    pub fn close(&self) {
        if self.http.write().take().is_some() {
            info!(base_url = %self.api.base_url(), "client closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.http.read().is_none()
    }

    // -- authentication ------------------------------------------------------

    /// Exchange an API key for a token pair and keep the access token for
    /// later calls. `api_key` overrides the configured key.
    pub async fn authenticate(&self, api_key: Option<&str>) -> Result<AuthToken, SdkError> {
        let key = api_key
            .or(self.api_key.as_deref())
            .ok_or_else(|| SdkError::authentication("API key is required"))?;
        let request = self.api.build_authenticate(key)?;
        let response = self.execute(request).await?;
        let token = logged(self.api.parse_authenticate(response))?;
        self.set_access_token(token.access_token.clone());
        info!(expires_in = token.expires_in, "authenticated");
        Ok(token)
    }

    // -- request management --------------------------------------------------

    pub async fn create_request(
        &self,
        config: &RequestConfig,
    ) -> Result<RequestCreationResult, SdkError> {
        let request = self.api.build_create_request(config)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_create_request(response))
    }

    pub async fn create_requests_batch(
        &self,
        configs: &[RequestConfig],
    ) -> Result<Vec<RequestCreationResult>, SdkError> {
        let request = self.api.build_create_requests_batch(configs)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_create_requests_batch(response))
    }

    pub async fn get_templates(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<RequestTemplate>, SdkError> {
        let response = self.execute(self.api.build_get_templates(category)).await?;
        logged(self.api.parse_get_templates(response))
    }

    pub async fn validate_criteria(
        &self,
        criteria: &OdxCriteria,
    ) -> Result<CriteriaValidationResult, SdkError> {
        let request = self.api.build_validate_criteria(criteria)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_validate_criteria(response))
    }

    pub async fn get_request_status(&self, request_id: &str) -> Result<RequestStatus, SdkError> {
        let response = self
            .execute(self.api.build_get_request_status(request_id))
            .await?;
        logged(self.api.parse_get_request_status(response))
    }

    // -- capsule verification ------------------------------------------------

    pub async fn verify_signature(
        &self,
        capsule: &CapsuleData,
    ) -> Result<SignatureVerificationResult, SdkError> {
        let request = self.api.build_verify_signature(capsule)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_verify_signature(response))
    }

    pub async fn validate_schema(
        &self,
        capsule: &CapsuleData,
        schema: &CapsuleSchema,
    ) -> Result<SchemaValidationResult, SdkError> {
        let request = self.api.build_validate_schema(capsule, schema)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_validate_schema(response))
    }

    pub async fn verify_hash_receipt(
        &self,
        capsule: &CapsuleData,
        receipt: &HashReceipt,
    ) -> Result<HashReceiptVerificationResult, SdkError> {
        let request = self.api.build_verify_hash_receipt(capsule, receipt)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_verify_hash_receipt(response))
    }

    pub async fn verify_complete(
        &self,
        capsule: &CapsuleData,
        schema: &CapsuleSchema,
        receipt: &HashReceipt,
    ) -> Result<CompleteVerificationResult, SdkError> {
        let request = self.api.build_verify_complete(capsule, schema, receipt)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_verify_complete(response))
    }

    // -- disputes ------------------------------------------------------------

    pub async fn file_dispute(
        &self,
        request: &DisputeRequest,
    ) -> Result<DisputeFilingResult, SdkError> {
        let http_request = self.api.build_file_dispute(request)?;
        let response = self.execute(http_request).await?;
        logged(self.api.parse_file_dispute(response))
    }

    pub async fn get_dispute(&self, dispute_id: &str) -> Result<Dispute, SdkError> {
        let response = self.execute(self.api.build_get_dispute(dispute_id)).await?;
        logged(self.api.parse_get_dispute(response))
    }

    pub async fn add_evidence(
        &self,
        dispute_id: &str,
        evidence: &EvidenceSubmission,
    ) -> Result<EvidenceAddResult, SdkError> {
        let request = self.api.build_add_evidence(dispute_id, evidence)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_add_evidence(response))
    }

    // -- tier & analytics ----------------------------------------------------

    pub async fn get_tier_capabilities(&self) -> Result<TierCapabilities, SdkError> {
        let response = self
            .execute(self.api.build_get_tier_capabilities())
            .await?;
        logged(self.api.parse_get_tier_capabilities(response))
    }

    /// Check a request shape against the tier. Identity reveal is never
    /// requested from here.
    pub async fn check_restrictions(
        &self,
        output_mode: OutputMode,
        compensation: rust_decimal::Decimal,
        labels: &[String],
    ) -> Result<RestrictionCheckResult, SdkError> {
        let check = RestrictionCheck {
            output_mode,
            compensation,
            required_labels: labels.to_vec(),
            identity_reveal: false,
        };
        let request = self.api.build_check_restrictions(&check)?;
        let response = self.execute(request).await?;
        logged(self.api.parse_check_restrictions(response))
    }

    pub async fn get_analytics(&self) -> Result<RequesterAnalytics, SdkError> {
        let response = self.execute(self.api.build_get_analytics()).await?;
        logged(self.api.parse_get_analytics(response))
    }

    // -- transport -----------------------------------------------------------

    /// Perform one round-trip. Fails with a network error when the client is
    /// closed, the connection cannot be made, or the call times out.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, SdkError> {
        let http = self
            .http
            .read()
            .clone()
            .ok_or_else(|| SdkError::network("client is closed"))?;

        let request = match self.access_token.read().as_deref() {
            Some(token) => request.with_bearer(token),
            None => request,
        };

        debug!(method = request.method.as_str(), url = %request.url, "sending request");

        let mut builder = match request.method {
            HttpMethod::Get => http.get(&request.url),
            HttpMethod::Post => http.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %request.url, error = %e, "request failed");
            transport_error(&e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| transport_error(&e))?;

        debug!(status, url = %request.url, "response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn logged<T>(result: Result<T, SdkError>) -> Result<T, SdkError> {
    if let Err(err) = &result {
        warn!(code = err.code(), message = err.message(), "response classified as error");
    }
    result
}

fn transport_error(err: &reqwest::Error) -> SdkError {
    if err.is_timeout() {
        SdkError::network(format!("Network error: request timed out: {err}"))
    } else if err.is_connect() {
        SdkError::network(format!("Network error: connection failed: {err}"))
    } else {
        SdkError::network(format!("Network error: {err}"))
    }
}

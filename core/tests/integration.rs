//! End-to-end tests of `YachaqClient` against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port inside the test's
//! runtime, so state never leaks between tests.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use yachaq_core::{
    CapsuleData, CapsuleSchema, ClientConfig, DisputeReason, DisputeRequest, DisputeStatus,
    ErrorKind, EvidenceSubmission, FieldSchema, HashReceipt, OdxCriteria, OutputMode,
    RequestConfig, RequestStatusType, RequesterTier, SdkError, YachaqClient,
};
use yachaq_mock_server::{Fault, MockConfig, DEFAULT_API_KEY};

async fn start_server(config: MockConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(yachaq_mock_server::run_with_config(listener, config));
    format!("http://{addr}")
}

async fn authed_client() -> YachaqClient {
    let base_url = start_server(MockConfig::default()).await;
    let client = YachaqClient::new(ClientConfig::new(&base_url).with_api_key(DEFAULT_API_KEY)).unwrap();
    client.authenticate(None).await.unwrap();
    client
}

fn config(compensation: &str) -> RequestConfig {
    RequestConfig::new(
        ["health:steps"],
        Decimal::from_str(compensation).unwrap(),
        OutputMode::AggregateOnly,
    )
}

fn capsule(request_id: &str) -> CapsuleData {
    CapsuleData {
        capsule_id: "cap-1".to_string(),
        contract_id: "contract-1".to_string(),
        request_id: request_id.to_string(),
        encrypted_payload: "c2VjcmV0".to_string(),
        signature: "ed25519:abcd".to_string(),
        headers: BTreeMap::from([
            ("alg".to_string(), "Ed25519".to_string()),
            ("steps".to_string(), "int".to_string()),
        ]),
        created_at: Utc::now(),
        expires_at: Utc::now() + Duration::days(30),
    }
}

fn schema(required: &[&str]) -> CapsuleSchema {
    CapsuleSchema {
        schema_id: "schema-steps".to_string(),
        version: "1.0".to_string(),
        fields: BTreeMap::from([(
            "steps".to_string(),
            FieldSchema {
                field_type: "integer".to_string(),
                format: None,
                nullable: false,
                constraints: None,
            },
        )]),
        required_fields: required.iter().map(|f| f.to_string()).collect(),
    }
}

fn receipt() -> HashReceipt {
    HashReceipt {
        receipt_id: "hr-1".to_string(),
        capsule_hash: "aa".to_string(),
        merkle_root: "bb".to_string(),
        merkle_proof: vec!["cc".to_string(), "dd".to_string()],
        blockchain_anchor: None,
        anchored_at: None,
    }
}

#[tokio::test]
async fn authenticate_stores_token() {
    let base_url = start_server(MockConfig::default()).await;
    let client = YachaqClient::new(ClientConfig::new(&base_url)).unwrap();
    assert!(client.access_token().is_none());

    let token = client.authenticate(Some(DEFAULT_API_KEY)).await.unwrap();
    assert_eq!(client.access_token(), Some(token.access_token.clone()));
    assert_eq!(token.token_type, "Bearer");

    let tier = client.get_tier_capabilities().await.unwrap();
    assert_eq!(tier.tier, RequesterTier::Verified);
}

#[tokio::test]
async fn wrong_api_key_is_authentication_error_and_keeps_token() {
    let base_url = start_server(MockConfig::default()).await;
    let client =
        YachaqClient::new(ClientConfig::new(&base_url).with_access_token("previous")).unwrap();
    let err = client.authenticate(Some("wrong")).await.unwrap_err();
    assert_eq!(
        err,
        SdkError::Authentication {
            message: "API key not recognised".to_string()
        }
    );
    assert_eq!(client.access_token().as_deref(), Some("previous"));
}

#[tokio::test]
async fn unauthenticated_call_is_401() {
    let base_url = start_server(MockConfig::default()).await;
    let client = YachaqClient::new(ClientConfig::new(&base_url)).unwrap();
    let err = client.get_analytics().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn request_lifecycle() {
    let client = authed_client().await;

    let created = client.create_request(&config("5.00")).await.unwrap();
    assert!(created.is_created());
    let request_id = created.request_id.unwrap();

    let status = client.get_request_status(&request_id).await.unwrap();
    assert_eq!(status.request_id, request_id);
    assert_eq!(status.status, RequestStatusType::Draft);
    assert_eq!(status.response_stats.total_cost, Decimal::from_str("0.00").unwrap());

    let err = client.get_request_status("missing").await.unwrap_err();
    assert_eq!(err.code(), "REQUEST_NOT_FOUND");

    let analytics = client.get_analytics().await.unwrap();
    assert_eq!(analytics.total_requests, 1);
}

#[tokio::test]
async fn invalid_request_surfaces_validation_errors_in_order() {
    let client = authed_client().await;
    let mut bad = config("0");
    bad.required_labels.clear();
    let err = client.create_request(&bad).await.unwrap_err();
    assert_eq!(
        err,
        SdkError::Validation {
            message: "Request validation failed".to_string(),
            errors: vec![
                "requiredLabels must not be empty".to_string(),
                "compensation must be positive".to_string(),
            ],
        }
    );
}

#[tokio::test]
async fn batch_results_keep_input_order() {
    let client = authed_client().await;
    let configs = vec![config("1.00"), config("2.00"), config("3.00")];
    let results = client.create_requests_batch(&configs).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_created()));

    let bad = vec![config("1.00"), config("-1")];
    let err = client.create_requests_batch(&bad).await.unwrap_err();
    assert!(matches!(
        err,
        SdkError::Validation { ref errors, .. } if errors == &["item 1: compensation must be positive".to_string()]
    ));
}

#[tokio::test]
async fn templates_and_criteria() {
    let client = authed_client().await;
    let all = client.get_templates(None).await.unwrap();
    assert_eq!(all.len(), 2);
    let health = client.get_templates(Some("health")).await.unwrap();
    assert_eq!(health.len(), 1);
    assert_eq!(health[0].suggested_compensation, Decimal::from_str("5.00").unwrap());

    let criteria = OdxCriteria {
        required_labels: vec!["health:steps".to_string(), "health:sleep".to_string()],
        optional_labels: None,
        time_window: None,
        geo_criteria: None,
    };
    let result = client.validate_criteria(&criteria).await.unwrap();
    assert!(result.valid);
    assert_eq!(result.estimated_cohort_size, 500);
}

#[tokio::test]
async fn capsule_verification() {
    let client = authed_client().await;
    let capsule = capsule("r1");

    let signature = client.verify_signature(&capsule).await.unwrap();
    assert!(signature.valid);
    assert_eq!(signature.algorithm.as_deref(), Some("Ed25519"));

    let schema_ok = client
        .validate_schema(&capsule, &schema(&["steps"]))
        .await
        .unwrap();
    assert!(schema_ok.valid);

    let receipt_result = client.verify_hash_receipt(&capsule, &receipt()).await.unwrap();
    assert!(receipt_result.merkle_proof_valid);
    assert!(!receipt_result.blockchain_anchor_valid);

    let complete = client
        .verify_complete(&capsule, &schema(&["steps", "sleep"]), &receipt())
        .await
        .unwrap();
    assert!(!complete.valid);
    let err = complete.ensure_valid().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verification);
    assert!(err.message().contains("sleep"));
}

#[tokio::test]
async fn dispute_lifecycle() {
    let client = authed_client().await;
    let request_id = client
        .create_request(&config("5.00"))
        .await
        .unwrap()
        .request_id
        .unwrap();

    let filed = client
        .file_dispute(&DisputeRequest {
            request_id: request_id.clone(),
            capsule_id: "cap-1".to_string(),
            reason: DisputeReason::IncompleteData,
            description: "half the rows are empty".to_string(),
            evidence_ids: None,
        })
        .await
        .unwrap();
    assert!(filed.success);
    assert_eq!(filed.status, Some(DisputeStatus::Filed));
    let dispute_id = filed.dispute_id.unwrap();

    let added = client
        .add_evidence(
            &dispute_id,
            &EvidenceSubmission {
                evidence_type: "SAMPLE".to_string(),
                description: "row dump".to_string(),
                content: b"row,steps\n1,\n".to_vec(),
            },
        )
        .await
        .unwrap();
    assert!(added.success);

    let dispute = client.get_dispute(&dispute_id).await.unwrap();
    assert_eq!(dispute.request_id, request_id);
    assert_eq!(dispute.reason, DisputeReason::IncompleteData);
    assert_eq!(dispute.status, DisputeStatus::UnderReview);
    assert_eq!(dispute.evidence.len(), 1);
    assert_eq!(Some(dispute.evidence[0].evidence_id.clone()), added.evidence_id);
}

#[tokio::test]
async fn restriction_check_feeds_tier_error() {
    let client = authed_client().await;
    let labels = vec!["health:steps".to_string()];

    let allowed = client
        .check_restrictions(OutputMode::AggregateOnly, Decimal::from_str("10").unwrap(), &labels)
        .await
        .unwrap();
    assert!(allowed.clone().into_result().is_ok());

    let denied = client
        .check_restrictions(OutputMode::Raw, Decimal::from_str("5000").unwrap(), &labels)
        .await
        .unwrap();
    let err = denied.into_result().unwrap_err();
    match err {
        SdkError::TierRestriction { violations, .. } => assert_eq!(violations.len(), 2),
        other => panic!("expected tier restriction, got {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_fault_is_classified() {
    let base_url = start_server(MockConfig {
        fault: Some(Fault::RateLimit {
            retry_after: Some("7".to_string()),
        }),
        ..MockConfig::default()
    })
    .await;
    let client = YachaqClient::new(ClientConfig::new(&base_url).with_access_token("t")).unwrap();
    let err = client.get_tier_capabilities().await.unwrap_err();
    assert_eq!(err.retry_after(), Some(std::time::Duration::from_secs(7)));

    let base_url = start_server(MockConfig {
        fault: Some(Fault::RateLimit { retry_after: None }),
        ..MockConfig::default()
    })
    .await;
    let client = YachaqClient::new(ClientConfig::new(&base_url)).unwrap();
    let err = client.get_tier_capabilities().await.unwrap_err();
    assert!(matches!(err, SdkError::RateLimit { retry_after: 60, .. }));
}

#[tokio::test]
async fn server_error_fault_is_network_error() {
    let base_url = start_server(MockConfig {
        fault: Some(Fault::ServerError(502)),
        ..MockConfig::default()
    })
    .await;
    let client = YachaqClient::new(ClientConfig::new(&base_url)).unwrap();
    let err = client.get_analytics().await.unwrap_err();
    assert_eq!(
        err,
        SdkError::Network {
            message: "Server error: 502".to_string()
        }
    );
}

#[tokio::test]
async fn unreachable_server_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = YachaqClient::new(
        ClientConfig::new(&format!("http://{addr}")).with_timeout(std::time::Duration::from_secs(2)),
    )
    .unwrap();
    let err = client.get_analytics().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Network);
    assert!(err.message().starts_with("Network error"), "{}", err.message());
}

#[tokio::test]
async fn concurrent_calls_share_one_client() {
    let client = Arc::new(authed_client().await);
    let mut handles = Vec::new();
    for i in 1..=5 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            client.create_request(&config(&format!("{i}.00"))).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_created());
    }
    assert_eq!(client.get_analytics().await.unwrap().total_requests, 5);

    client.close();
    let err = client.get_analytics().await.unwrap_err();
    assert_eq!(err.message(), "client is closed");
}

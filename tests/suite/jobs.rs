//! Job issuance, cadence and claim validation over HTTP.

use std::time::Duration;

use cartlock_client::ClientError;
use cartlock_config::Policy;
use cartlock_types::{ClaimRequest, DifficultyRule, ErrorCode};

use crate::common::{TestServer, WALLET_A, session};

#[tokio::test]
async fn cadence_gate_throttles_job_requests() {
    let server = TestServer::start().await;
    let client = server.client();
    client
        .open_session(&session(WALLET_A, 42, "a-tab"))
        .await
        .unwrap();

    let verdict = client.eligibility("a-tab").await.unwrap();
    assert!(verdict.eligible);
    assert_eq!(verdict.wait_ms, 0);

    let first = client.request_job("a-tab").await.unwrap();
    assert_eq!(first.epoch, 0);
    assert_eq!(first.display_suffix, "00");

    let verdict = client.eligibility("a-tab").await.unwrap();
    assert!(!verdict.eligible);
    assert_eq!(verdict.wait_ms, 15_000);
    assert_eq!(verdict.message, "next job available in 15s");

    server.clock.advance(Duration::from_secs(10));
    match client.request_job("a-tab").await {
        Err(ClientError::Throttled(verdict)) => assert_eq!(verdict.wait_ms, 5_000),
        other => panic!("expected Throttled, got {other:?}"),
    }

    server.clock.advance(Duration::from_secs(5));
    let second = client.request_job("a-tab").await.unwrap();
    assert_ne!(second.job_id, first.job_id);
}

#[tokio::test]
async fn unknown_session_eligibility_is_not_found() {
    let server = TestServer::start().await;
    let err = server.client().eligibility("ghost").await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::SessionNotFound));
}

#[tokio::test]
async fn late_epochs_use_bit_rule() {
    let server = TestServer::start_with(Policy::default(), 7, None).await;
    let client = server.client();
    client
        .open_session(&session(WALLET_A, 42, "a-tab"))
        .await
        .unwrap();

    let job = client.request_job("a-tab").await.unwrap();
    assert_eq!(job.difficulty_rule, DifficultyRule::TrailingZeroBits { bits: 18 });
    assert_eq!(job.display_suffix, "00000");
}

#[tokio::test]
async fn claim_is_single_use_and_current_only() {
    let server = TestServer::start().await;
    let client = server.client();
    let a = session(WALLET_A, 42, "a-tab");
    client.open_session(&a).await.unwrap();

    let first = client.request_job("a-tab").await.unwrap();
    server.clock.advance(Duration::from_secs(15));
    client.heartbeat(&a).await.unwrap();
    let second = client.request_job("a-tab").await.unwrap();

    let claim = |job_id: &str| ClaimRequest {
        session_id: "a-tab".into(),
        job_id: job_id.into(),
        nonce: "00ff13".into(),
    };

    let err = client.claim(&claim(first.job_id.as_str())).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadRequest), "superseded job");

    let accepted = client.claim(&claim(second.job_id.as_str())).await.unwrap();
    assert!(accepted.ok);
    assert_eq!(accepted.job_id, second.job_id);
    assert_eq!(accepted.nonce, "00ff13");

    let err = client.claim(&claim(second.job_id.as_str())).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadRequest), "already claimed");
}

#[tokio::test]
async fn expired_job_cannot_be_claimed() {
    let server = TestServer::start().await;
    let client = server.client();
    let a = session(WALLET_A, 42, "a-tab");
    client.open_session(&a).await.unwrap();
    let job = client.request_job("a-tab").await.unwrap();

    server.clock.advance(Duration::from_secs(30));
    client.heartbeat(&a).await.unwrap();
    server.clock.advance(Duration::from_secs(16));

    let err = client
        .claim(&ClaimRequest {
            session_id: "a-tab".into(),
            job_id: job.job_id.to_string(),
            nonce: "1".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::BadRequest));
}

#[tokio::test]
async fn expired_session_cannot_request_or_claim() {
    let server = TestServer::start().await;
    let client = server.client();
    client
        .open_session(&session(WALLET_A, 42, "a-tab"))
        .await
        .unwrap();
    let job = client.request_job("a-tab").await.unwrap();

    server.clock.advance(Duration::from_secs(61));
    let err = client.request_job("a-tab").await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::SessionExpired));

    let err = client
        .claim(&ClaimRequest {
            session_id: "a-tab".into(),
            job_id: job.job_id.to_string(),
            nonce: "1".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::SessionExpired));
}

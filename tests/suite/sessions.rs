//! Lock and session lifecycle over HTTP.

use std::time::Duration;

use cartlock_client::ClientError;
use cartlock_config::Policy;
use cartlock_types::ErrorCode;

use crate::common::{TestServer, WALLET_A, WALLET_B, session};

fn code(err: &ClientError) -> ErrorCode {
    err.code()
        .unwrap_or_else(|| panic!("expected a typed rejection, got {err:?}"))
}

#[tokio::test]
async fn owner_keeps_cartridge_after_session_expiry() {
    let server = TestServer::start().await;
    let client = server.client();
    let a = session(WALLET_A, 42, "a-tab");

    let opened = client.open_session(&a).await.unwrap();
    assert_eq!(opened.ownership_ttl_sec, 3600);
    assert_eq!(opened.session_ttl_sec, 60);
    assert_eq!(opened.token_id.as_str(), "42");

    server.clock.advance(Duration::from_secs(5));
    let err = client
        .open_session(&session(WALLET_B, 42, "b-tab"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::CartridgeInUse);
    assert_eq!(err.ttl_remaining_sec(), Some(3595));

    server.clock.advance(Duration::from_secs(61));
    let err = client.heartbeat(&a).await.unwrap_err();
    assert_eq!(code(&err), ErrorCode::SessionExpired);
    assert!(err.is_session_lost());

    // The lock outlived the session.
    let err = client
        .open_session(&session(WALLET_B, 42, "b-tab"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::CartridgeInUse);
}

#[tokio::test]
async fn expired_lock_is_taken_over() {
    let server = TestServer::start().await;
    let client = server.client();

    client
        .open_session(&session(WALLET_A, 42, "a-tab"))
        .await
        .unwrap();
    server.clock.advance(Duration::from_secs(3601));

    let opened = client
        .open_session(&session(WALLET_B, 42, "b-tab"))
        .await
        .unwrap();
    assert_eq!(opened.owner_wallet.as_str(), WALLET_B);
}

#[tokio::test]
async fn heartbeats_keep_session_and_lock_alive() {
    let server = TestServer::start().await;
    let client = server.client();
    let a = session(WALLET_A, 42, "a-tab");
    client.open_session(&a).await.unwrap();

    for _ in 0..80 {
        server.clock.advance(Duration::from_secs(55));
        assert_eq!(client.heartbeat(&a).await.unwrap().session_ttl_sec, 60);
    }

    let err = client
        .open_session(&session(WALLET_B, 42, "b-tab"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::CartridgeInUse);
}

#[tokio::test]
async fn second_tab_is_told_session_still_active() {
    let server = TestServer::start().await;
    let client = server.client();
    client
        .open_session(&session(WALLET_A, 42, "a-tab"))
        .await
        .unwrap();

    let err = client
        .open_session(&session(WALLET_A, 42, "a-tab-2"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::SessionStillActive);

    let err = client
        .heartbeat(&session(WALLET_A, 42, "a-tab-2"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::SessionStillActive);
}

#[tokio::test]
async fn wallet_session_limit() {
    let policy = Policy {
        max_sessions_per_wallet: 2,
        ..Policy::default()
    };
    let server = TestServer::start_with(policy, 0, None).await;
    let client = server.client();

    client
        .open_session(&session(WALLET_A, 1, "t1"))
        .await
        .unwrap();
    client
        .open_session(&session(WALLET_A, 2, "t2"))
        .await
        .unwrap();
    let err = client
        .open_session(&session(WALLET_A, 3, "t3"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::WalletSessionLimitExceeded);
    assert_eq!(err.ttl_remaining_sec(), Some(60));

    // Cartridge 3 stays free for someone else.
    client
        .open_session(&session(WALLET_B, 3, "t4"))
        .await
        .unwrap();
}

#[tokio::test]
async fn stop_with_release_frees_cartridge() {
    let server = TestServer::start().await;
    let client = server.client();
    let a = session(WALLET_A, 42, "a-tab");
    client.open_session(&a).await.unwrap();

    let mut stop = a.clone();
    stop.release = true;
    assert!(client.stop_session(&stop).await.unwrap().ok);
    // Idempotent.
    assert!(client.stop_session(&stop).await.unwrap().ok);

    client
        .open_session(&session(WALLET_B, 42, "b-tab"))
        .await
        .unwrap();
}

#[tokio::test]
async fn bad_input_is_rejected() {
    let server = TestServer::start().await;
    let client = server.client();

    let err = client
        .open_session(&session("not-a-wallet", 42, "a-tab"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::BadRequest);

    let err = client
        .open_session(&session(WALLET_A, 42, "has spaces"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::BadRequest);
}

#[tokio::test]
async fn api_token_is_enforced() {
    let server = TestServer::start_with(Policy::default(), 0, Some("s3cret")).await;

    server
        .client()
        .open_session(&session(WALLET_A, 42, "a-tab"))
        .await
        .unwrap();

    let anonymous = cartlock_client::CartlockClient::new(&server.url()).unwrap();
    anonymous.healthz().await.unwrap();
    let err = anonymous
        .open_session(&session(WALLET_B, 7, "b-tab"))
        .await
        .unwrap_err();
    assert_eq!(code(&err), ErrorCode::Unauthorized);
}

//! Heartbeat controller against a live server.

use std::sync::Arc;
use std::time::Duration;

use cartlock_client::{HeartbeatController, TickOutcome};
use cartlock_types::ClaimRequest;

use crate::common::{TestServer, WALLET_A, session};

const INTERVAL: Duration = Duration::from_millis(40);

#[tokio::test]
async fn controller_keeps_session_alive_and_pauses_for_claim() {
    let server = TestServer::start().await;
    let client = Arc::new(server.client());
    let a = session(WALLET_A, 42, "a-tab");
    client.open_session(&a).await.unwrap();

    let controller = HeartbeatController::new();
    controller.start(client.heartbeat_callback(a.clone()), INTERVAL);

    tokio::time::sleep(INTERVAL * 6).await;
    let running = controller.stats();
    assert!(running.fired >= 2, "{running:?}");
    assert_eq!(running.failed, 0);

    let job = client.request_job("a-tab").await.unwrap();

    controller.pause_for_claim().await;
    let paused_at = controller.stats().fired;
    let claim = client
        .claim(&ClaimRequest {
            session_id: "a-tab".into(),
            job_id: job.job_id.to_string(),
            nonce: "beef".into(),
        })
        .await
        .unwrap();
    assert!(claim.ok);
    tokio::time::sleep(INTERVAL * 4).await;
    assert_eq!(controller.stats().fired, paused_at, "no heartbeat while paused");

    controller.resume_after_claim();
    tokio::time::sleep(INTERVAL * 4).await;
    assert!(controller.stats().fired > paused_at);

    controller.stop();
    assert!(!controller.is_running());
}

#[tokio::test]
async fn lost_session_is_counted_not_raised() {
    let server = TestServer::start().await;
    let client = server.client();
    let a = session(WALLET_A, 42, "a-tab");
    client.open_session(&a).await.unwrap();

    let controller = HeartbeatController::new();
    let callback = client.heartbeat_callback(a);
    assert_eq!(controller.tick_once(&callback).await, TickOutcome::Fired);

    server.clock.advance(Duration::from_secs(61));
    assert_eq!(controller.tick_once(&callback).await, TickOutcome::Failed);
    assert_eq!(controller.stats().failed, 1);
}

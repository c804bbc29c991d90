//! Shared fixtures: a real cartlock server on an ephemeral port, driven by
//! a manual clock so TTLs can be crossed without sleeping.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use cartlock_client::{CartlockClient, RetryConfig};
use cartlock_config::Policy;
use cartlock_core::{Coordinator, FixedEpoch, ManualClock};
use cartlock_server::AppState;
use cartlock_types::{SessionRequest, TokenIdInput, UnixMillis};

pub const CHAIN_ID: u64 = 33139;
pub const CONTRACT: &str = "0x0000000000000000000000000000000000000ABC";
pub const WALLET_A: &str = "0x00000000000000000000000000000000000000aa";
pub const WALLET_B: &str = "0x00000000000000000000000000000000000000bb";

pub struct TestServer {
    pub addr: SocketAddr,
    pub clock: Arc<ManualClock>,
    api_token: Option<String>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(Policy::default(), 0, None).await
    }

    pub async fn start_with(policy: Policy, epoch: i64, api_token: Option<&str>) -> Self {
        let clock = Arc::new(ManualClock::new(UnixMillis::from_secs(1_700_000_000)));
        let coordinator = Coordinator::in_memory(policy, Arc::new(FixedEpoch(epoch)), clock.clone());
        let state = AppState::new(Arc::new(coordinator), api_token.map(str::to_string));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(cartlock_server::serve(listener, state, async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            clock,
            api_token: api_token.map(str::to_string),
            shutdown: Some(tx),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> CartlockClient {
        let client = CartlockClient::new(&self.url())
            .unwrap()
            .with_retry(RetryConfig::none());
        match &self.api_token {
            Some(token) => client.with_api_token(token.clone()),
            None => client,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn session(wallet: &str, token_id: u64, session_id: &str) -> SessionRequest {
    SessionRequest {
        wallet: wallet.to_string(),
        chain_id: CHAIN_ID,
        contract: CONTRACT.to_string(),
        token_id: TokenIdInput::Text(token_id.to_string()),
        session_id: session_id.to_string(),
        release: false,
    }
}

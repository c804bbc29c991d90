//! HTTP client for a cartlock server, plus the client-side heartbeat
//! controller that keeps a mining session alive.

mod error;
pub mod heartbeat;
pub mod retry;

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use cartlock_types::{
    ClaimRequest, ClaimResponse, EligibilityResponse, ErrorBody, HeartbeatResponse, JobRequest,
    MiningJob, OkResponse, OpenSessionResponse, SessionRequest,
};

pub use error::ClientError;
pub use heartbeat::{HeartbeatController, HeartbeatFn, HeartbeatFut, HeartbeatStats, TickOutcome};
pub use retry::{Replay, RetryConfig};

use retry::{RetryOutcome, send_with_retry};

/// Error bodies longer than this are cut before landing in `ClientError::Decode`.
const MAX_ERROR_TEXT: usize = 512;

#[derive(Debug, Clone)]
pub struct CartlockClient {
    http: reqwest::Client,
    base: Url,
    api_token: Option<String>,
    retry: RetryConfig,
}

impl CartlockClient {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8787`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            api_token: None,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub async fn open_session(
        &self,
        request: &SessionRequest,
    ) -> Result<OpenSessionResponse, ClientError> {
        let url = self.endpoint("session/open")?;
        let response = self
            .send(Replay::Safe, || self.http.post(url.clone()).json(request))
            .await?;
        decode(response).await
    }

    pub async fn heartbeat(
        &self,
        request: &SessionRequest,
    ) -> Result<HeartbeatResponse, ClientError> {
        let url = self.endpoint("session/heartbeat")?;
        let response = self
            .send(Replay::Safe, || self.http.post(url.clone()).json(request))
            .await?;
        decode(response).await
    }

    pub async fn stop_session(&self, request: &SessionRequest) -> Result<OkResponse, ClientError> {
        let url = self.endpoint("session/stop")?;
        let response = self
            .send(Replay::Safe, || self.http.post(url.clone()).json(request))
            .await?;
        decode(response).await
    }

    pub async fn eligibility(&self, session_id: &str) -> Result<EligibilityResponse, ClientError> {
        let mut url = self.endpoint("job/eligibility")?;
        url.query_pairs_mut().append_pair("sessionId", session_id);
        let response = self.send(Replay::Safe, || self.http.get(url.clone())).await?;
        decode(response).await
    }

    /// A throttled request comes back as [`ClientError::Throttled`].
    pub async fn request_job(&self, session_id: &str) -> Result<MiningJob, ClientError> {
        let url = self.endpoint("job/request")?;
        let body = JobRequest {
            session_id: session_id.to_string(),
        };
        let response = self
            .send(Replay::ConnectOnly, || self.http.post(url.clone()).json(&body))
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let text = read_text(response).await;
            if let Ok(verdict) = serde_json::from_str::<EligibilityResponse>(&text) {
                return Err(ClientError::Throttled(verdict));
            }
            return Err(rejection(StatusCode::TOO_MANY_REQUESTS, &text));
        }
        decode(response).await
    }

    pub async fn claim(&self, request: &ClaimRequest) -> Result<ClaimResponse, ClientError> {
        let url = self.endpoint("job/claim")?;
        let response = self
            .send(Replay::ConnectOnly, || self.http.post(url.clone()).json(request))
            .await?;
        decode(response).await
    }

    pub async fn healthz(&self) -> Result<(), ClientError> {
        let url = self.endpoint("healthz")?;
        let response = self.send(Replay::Safe, || self.http.get(url.clone())).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(rejection(status, &read_text(response).await))
        }
    }

    /// Heartbeat callback for [`HeartbeatController`]. Single attempt per
    /// tick; the next tick is the retry.
    #[must_use]
    pub fn heartbeat_callback(&self, request: SessionRequest) -> HeartbeatFn {
        let client = Arc::new(self.clone().with_retry(RetryConfig::none()));
        let request = Arc::new(request);
        Arc::new(move || -> HeartbeatFut {
            let client = Arc::clone(&client);
            let request = Arc::clone(&request);
            Box::pin(async move {
                match client.heartbeat(&request).await {
                    Ok(_) => Ok(()),
                    Err(err) => {
                        if err.is_session_lost() {
                            tracing::warn!(
                                session_id = %request.session_id,
                                code = ?err.code(),
                                "Heartbeat refused; session must be reopened"
                            );
                        }
                        Err(err)
                    }
                }
            })
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path)?)
    }

    async fn send<F>(&self, replay: Replay, build: F) -> Result<Response, ClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        let outcome = send_with_retry(
            || {
                let builder = build();
                match &self.api_token {
                    Some(token) => builder.bearer_auth(token),
                    None => builder,
                }
            },
            &self.retry,
            replay,
        )
        .await;

        match outcome {
            RetryOutcome::Response(response) => Ok(response),
            RetryOutcome::ConnectionError { attempts, source } => {
                Err(ClientError::Transport { attempts, source })
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let text = read_text(response).await;
    if !status.is_success() {
        return Err(rejection(status, &text));
    }
    serde_json::from_str(&text).map_err(|err| ClientError::Decode {
        status: status.as_u16(),
        message: err.to_string(),
    })
}

async fn read_text(response: Response) -> String {
    response.text().await.unwrap_or_default()
}

fn rejection(status: StatusCode, text: &str) -> ClientError {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(body) => ClientError::Rejected {
            status: status.as_u16(),
            body,
        },
        Err(_) => ClientError::Decode {
            status: status.as_u16(),
            message: truncate(text, MAX_ERROR_TEXT),
        },
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::auth::ServiceTokenIssuer;
use crate::AccountClientError;
use crate::AccountClientResult;
use crate::AccountSnapshot;
use crate::BalanceOpRequest;
use crate::BalanceOpResult;

/// The raw, unwrapped calls to the Accounts service — no retry, no circuit
/// breaker, no cache. [`crate::ResilientAccountClient`] is the only consumer that
/// should matter in practice; the trait boundary exists so tests can substitute a
/// scripted backend without standing up an HTTP server.
#[async_trait]
pub trait AccountBackend: Send + Sync {
    async fn get_account(&self, id: &str, user_token: Option<&str>) -> AccountClientResult<AccountSnapshot>;

    async fn apply_balance_op(&self, request: BalanceOpRequest) -> AccountClientResult<BalanceOpResult>;

    /// Ground truth for health probes: bypasses retry/circuit-breaker.
    async fn probe(&self) -> AccountClientResult<()>;
}

pub struct HttpAccountBackend {
    http: reqwest::Client,
    base_url: String,
    service_tokens: ServiceTokenIssuer,
}

impl HttpAccountBackend {
    pub fn new(base_url: impl Into<String>, service_secret: &str, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client builds with static config");
        Self {
            http,
            base_url: base_url.into(),
            service_tokens: ServiceTokenIssuer::new(service_secret),
        }
    }
}

#[async_trait]
impl AccountBackend for HttpAccountBackend {
    async fn get_account(&self, id: &str, user_token: Option<&str>) -> AccountClientResult<AccountSnapshot> {
        let url = format!("{}/api/accounts/{id}", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(token) = user_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(map_transport_error)?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(AccountClientError::NotFound(id.to_string())),
            status if status.is_success() => response
                .json::<AccountSnapshot>()
                .await
                .map_err(|e| AccountClientError::Unavailable(e.to_string())),
            status if status.is_client_error() => {
                Err(AccountClientError::Rejected(format!("status {status}")))
            }
            status => Err(AccountClientError::Unavailable(format!("status {status}"))),
        }
    }

    async fn apply_balance_op(&self, request: BalanceOpRequest) -> AccountClientResult<BalanceOpResult> {
        let token = self
            .service_tokens
            .issue()
            .map_err(|e| AccountClientError::Unavailable(e.to_string()))?;
        let url = format!(
            "{}/api/internal/accounts/{}/balance-ops",
            self.base_url, request.account_id
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(AccountClientError::NotFound(request.account_id.clone())),
            status if status.is_success() => response
                .json::<BalanceOpResult>()
                .await
                .map_err(|e| AccountClientError::Unavailable(e.to_string())),
            status if status.is_client_error() => {
                Err(AccountClientError::Rejected(format!("status {status}")))
            }
            status => Err(AccountClientError::Unavailable(format!("status {status}"))),
        }
    }

    async fn probe(&self) -> AccountClientResult<()> {
        let url = format!("{}/actuator/health", self.base_url);
        let response = self.http.get(&url).send().await.map_err(map_transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(AccountClientError::Unavailable(format!(
                "status {}",
                response.status()
            )))
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> AccountClientError {
    if err.is_timeout() {
        AccountClientError::Unavailable(format!("timed out: {err}"))
    } else {
        AccountClientError::Unavailable(err.to_string())
    }
}

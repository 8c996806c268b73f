use crate::error::{ProviderError, Result};
use crate::{CredentialSpec, NetworkCredential, NetworkIdentity, NetworkProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Token-authenticated JSON client for the overlay-network provider
#[derive(Clone)]
pub struct HttpNetwork {
    base_url: Url,
    token: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl HttpNetwork {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            base_url,
            token: token.into(),
            client: reqwest::Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

#[async_trait]
impl NetworkProvider for HttpNetwork {
    async fn create_credential(&self, spec: &CredentialSpec) -> Result<NetworkCredential> {
        let response = self
            .client
            .post(self.endpoint("v1/credentials"))
            .bearer_auth(&self.token)
            .json(spec)
            .send()
            .await?;

        let response = check_status(response).await?;
        let wrapped: CredentialResponse = response.json().await?;
        debug!(credential_id = %wrapped.credential.id, "Created network credential");

        Ok(wrapped.credential)
    }

    async fn delete_credential(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("v1/credentials/{}", id)))
            .bearer_auth(&self.token)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn list_identities(&self) -> Result<Vec<NetworkIdentity>> {
        let response = self
            .client
            .get(self.endpoint("v1/identities"))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let response = check_status(response).await?;
        let wrapped: IdentitiesResponse = response.json().await?;
        Ok(wrapped.identities)
    }

    async fn get_identity_by_hostname(&self, hostname: &str) -> Result<Option<NetworkIdentity>> {
        let identities = self.list_identities().await?;
        Ok(identities.into_iter().find(|i| i.hostname == hostname))
    }

    async fn delete_identity(&self, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(&format!("v1/identities/{}", id)))
            .bearer_auth(&self.token)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    async fn wait_for_identity(
        &self,
        hostname: &str,
        timeout: Duration,
    ) -> Result<NetworkIdentity> {
        let started = Instant::now();

        loop {
            if let Some(identity) = self.get_identity_by_hostname(hostname).await? {
                return Ok(identity);
            }

            if started.elapsed() >= timeout {
                return Err(ProviderError::Timeout {
                    operation: format!("overlay identity {}", hostname),
                    waited: started.elapsed(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: ApiErrorBody = response.json().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        code: body.error.code,
        message: body.error.message,
    })
}

#[derive(Deserialize)]
struct CredentialResponse {
    credential: NetworkCredential,
}

#[derive(Deserialize)]
struct IdentitiesResponse {
    identities: Vec<NetworkIdentity>,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Deserialize, Default)]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

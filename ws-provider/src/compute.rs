use crate::error::{ProviderError, Result};
use crate::{
    ComputeProvider, ComputeServer, ComputeVolume, CreatedServer, CreatedVolume, ServerSpec,
    ServerStatus, VolumeSpec,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Token-authenticated JSON client for the compute provider's REST API
#[derive(Clone)]
pub struct HttpCompute {
    base_url: Url,
    token: String,
    client: reqwest::Client,
    poll_interval: Duration,
}

impl HttpCompute {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            base_url,
            token: token.into(),
            client: reqwest::Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the fixed sleep between status checks in wait loops
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self
            .client
            .get(self.endpoint(path))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        let response = check_status(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.endpoint(path))
            .bearer_auth(&self.token)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ComputeProvider for HttpCompute {
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<CreatedVolume> {
        let created: VolumeCreateResponse = self.post("v1/volumes", spec).await?;
        debug!(volume_id = %created.volume.id, "Created external volume");

        Ok(CreatedVolume {
            id: created.volume.id,
            action_id: created.action.id,
        })
    }

    async fn get_volume(&self, id: &str) -> Result<Option<ComputeVolume>> {
        let wrapped: Option<VolumeResponse> = self.get(&format!("v1/volumes/{}", id)).await?;
        Ok(wrapped.map(|w| w.volume))
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        self.delete(&format!("v1/volumes/{}", id)).await
    }

    async fn list_volumes(&self) -> Result<Vec<ComputeVolume>> {
        let wrapped: Option<VolumesResponse> = self.get("v1/volumes").await?;
        Ok(wrapped.map(|w| w.volumes).unwrap_or_default())
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        let created: ServerCreateResponse = self.post("v1/servers", spec).await?;
        debug!(server_id = %created.server.id, "Created external server");

        Ok(CreatedServer {
            id: created.server.id,
            action_id: created.action.id,
            public_address: created.server.public_address,
        })
    }

    async fn get_server(&self, id: &str) -> Result<Option<ComputeServer>> {
        let wrapped: Option<ServerResponse> = self.get(&format!("v1/servers/{}", id)).await?;
        Ok(wrapped.map(|w| w.server))
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        self.delete(&format!("v1/servers/{}", id)).await
    }

    async fn list_servers(&self) -> Result<Vec<ComputeServer>> {
        let wrapped: Option<ServersResponse> = self.get("v1/servers").await?;
        Ok(wrapped.map(|w| w.servers).unwrap_or_default())
    }

    async fn wait_for_action(&self, action_id: &str, timeout: Duration) -> Result<()> {
        let started = Instant::now();

        loop {
            let action: Option<ActionResponse> =
                self.get(&format!("v1/actions/{}", action_id)).await?;

            match action.map(|a| a.action) {
                Some(action) if action.status == "success" => return Ok(()),
                Some(action) if action.status == "error" => {
                    let error = action.error.unwrap_or_default();
                    return Err(ProviderError::Api {
                        status: 422,
                        code: error.code,
                        message: error.message,
                    });
                }
                // Still running, or briefly unknown right after creation
                _ => {}
            }

            if started.elapsed() >= timeout {
                return Err(ProviderError::Timeout {
                    operation: format!("action {}", action_id),
                    waited: started.elapsed(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn wait_for_server_status(
        &self,
        id: &str,
        status: ServerStatus,
        timeout: Duration,
    ) -> Result<()> {
        let started = Instant::now();

        loop {
            if let Some(server) = self.get_server(id).await? {
                if server.status == status {
                    return Ok(());
                }
            }

            if started.elapsed() >= timeout {
                return Err(ProviderError::Timeout {
                    operation: format!("server {} status {:?}", id, status),
                    waited: started.elapsed(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Map non-2xx responses to the typed API error, decoding the provider's
/// `{"error": {"code", "message"}}` body when present.
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
struct VolumeCreateResponse {
    volume: ComputeVolume,
    action: ActionRef,
}

#[derive(Deserialize)]
struct VolumeResponse {
    volume: ComputeVolume,
}

#[derive(Deserialize)]
struct VolumesResponse {
    volumes: Vec<ComputeVolume>,
}

#[derive(Deserialize)]
struct ServerCreateResponse {
    server: ComputeServer,
    action: ActionRef,
}

#[derive(Deserialize)]
struct ServerResponse {
    server: ComputeServer,
}

#[derive(Deserialize)]
struct ServersResponse {
    servers: Vec<ComputeServer>,
}

#[derive(Deserialize)]
struct ActionRef {
    id: String,
}

#[derive(Deserialize)]
struct ActionResponse {
    action: Action,
}

#[derive(Deserialize)]
struct Action {
    status: String,
    #[serde(default)]
    error: Option<ActionError>,
}

#[derive(Deserialize, Default)]
struct ActionError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: ActionError,
}

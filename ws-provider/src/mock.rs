//! In-memory mock providers for consumers' tests.
//!
//! Both mocks record every call that matters to orchestration tests
//! (creation counts, deletions) and expose knobs to inject failures at
//! specific steps. Wait operations resolve immediately instead of
//! sleeping so tests stay fast.

use crate::error::{ProviderError, Result};
use crate::{
    ComputeProvider, ComputeServer, ComputeVolume, CreatedServer, CreatedVolume, CredentialSpec,
    NetworkCredential, NetworkIdentity, NetworkProvider, ServerSpec, ServerStatus, VolumeSpec,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

fn api_error(status: u16, message: &str) -> ProviderError {
    ProviderError::Api {
        status,
        code: "mock".to_string(),
        message: message.to_string(),
    }
}

#[derive(Default)]
struct ComputeState {
    volumes: HashMap<String, ComputeVolume>,
    servers: HashMap<String, ComputeServer>,
    next_id: u64,
    create_volume_calls: usize,
    create_server_calls: usize,
    deleted_volumes: Vec<String>,
    deleted_servers: Vec<String>,
    last_server_spec: Option<ServerSpec>,
    fail_create_server: bool,
    fail_wait_for_server: bool,
    fail_delete_ids: HashSet<String>,
    assign_public_address: bool,
}

#[derive(Default)]
pub struct MockCompute {
    state: Mutex<ComputeState>,
}

impl MockCompute {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().assign_public_address = true;
        mock
    }

    /// Make `create_server` fail with a 500
    pub fn fail_create_server(&self) {
        self.state.lock().unwrap().fail_create_server = true;
    }

    /// Make `wait_for_server_status` time out
    pub fn fail_wait_for_server(&self) {
        self.state.lock().unwrap().fail_wait_for_server = true;
    }

    /// Make deletion of a specific resource id fail with a 500
    pub fn fail_delete(&self, id: &str) {
        self.state.lock().unwrap().fail_delete_ids.insert(id.to_string());
    }

    /// Created servers carry no public address (private-mode fixtures)
    pub fn without_public_addresses(&self) {
        self.state.lock().unwrap().assign_public_address = false;
    }

    /// Seed inventory directly (reconciler fixtures)
    pub fn insert_volume(&self, volume: ComputeVolume) {
        let mut state = self.state.lock().unwrap();
        state.volumes.insert(volume.id.clone(), volume);
    }

    pub fn insert_server(&self, server: ComputeServer) {
        let mut state = self.state.lock().unwrap();
        state.servers.insert(server.id.clone(), server);
    }

    pub fn create_volume_calls(&self) -> usize {
        self.state.lock().unwrap().create_volume_calls
    }

    pub fn create_server_calls(&self) -> usize {
        self.state.lock().unwrap().create_server_calls
    }

    pub fn deleted_volumes(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_volumes.clone()
    }

    pub fn deleted_servers(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_servers.clone()
    }

    /// The spec passed to the most recent `create_server` call
    pub fn last_server_spec(&self) -> Option<ServerSpec> {
        self.state.lock().unwrap().last_server_spec.clone()
    }
}

#[async_trait]
impl ComputeProvider for MockCompute {
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<CreatedVolume> {
        let mut state = self.state.lock().unwrap();
        state.create_volume_calls += 1;
        state.next_id += 1;
        let n = state.next_id;

        let id = format!("vol-{}", n);
        state.volumes.insert(
            id.clone(),
            ComputeVolume {
                id: id.clone(),
                name: spec.name.clone(),
                size_gb: spec.size_gb,
                device_path: Some(format!("/dev/disk/by-id/scsi-0Volume-{}", n)),
                server_id: None,
                created_at: Utc::now(),
            },
        );

        Ok(CreatedVolume {
            id,
            action_id: format!("act-{}", n),
        })
    }

    async fn get_volume(&self, id: &str) -> Result<Option<ComputeVolume>> {
        Ok(self.state.lock().unwrap().volumes.get(id).cloned())
    }

    async fn delete_volume(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete_ids.contains(id) {
            return Err(api_error(500, "injected delete failure"));
        }
        if state.volumes.remove(id).is_none() {
            return Err(api_error(404, "volume not found"));
        }
        state.deleted_volumes.push(id.to_string());
        Ok(())
    }

    async fn list_volumes(&self) -> Result<Vec<ComputeVolume>> {
        Ok(self.state.lock().unwrap().volumes.values().cloned().collect())
    }

    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer> {
        let mut state = self.state.lock().unwrap();
        state.create_server_calls += 1;
        state.last_server_spec = Some(spec.clone());

        if state.fail_create_server {
            return Err(api_error(500, "injected create failure"));
        }

        state.next_id += 1;
        let n = state.next_id;
        let id = format!("srv-{}", n);
        let public_address = state
            .assign_public_address
            .then(|| format!("203.0.113.{}", n % 250 + 1));

        state.servers.insert(
            id.clone(),
            ComputeServer {
                id: id.clone(),
                name: spec.name.clone(),
                status: ServerStatus::Initializing,
                public_address: public_address.clone(),
                created_at: Utc::now(),
            },
        );

        for volume_id in &spec.volume_ids {
            if let Some(volume) = state.volumes.get_mut(volume_id) {
                volume.server_id = Some(id.clone());
            }
        }

        Ok(CreatedServer {
            id,
            action_id: format!("act-{}", n),
            public_address,
        })
    }

    async fn get_server(&self, id: &str) -> Result<Option<ComputeServer>> {
        Ok(self.state.lock().unwrap().servers.get(id).cloned())
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete_ids.contains(id) {
            return Err(api_error(500, "injected delete failure"));
        }
        if state.servers.remove(id).is_none() {
            return Err(api_error(404, "server not found"));
        }
        state.deleted_servers.push(id.to_string());
        Ok(())
    }

    async fn list_servers(&self) -> Result<Vec<ComputeServer>> {
        Ok(self.state.lock().unwrap().servers.values().cloned().collect())
    }

    async fn wait_for_action(&self, _action_id: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn wait_for_server_status(
        &self,
        id: &str,
        status: ServerStatus,
        timeout: Duration,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_wait_for_server {
            return Err(ProviderError::Timeout {
                operation: format!("server {} status {:?}", id, status),
                waited: timeout,
            });
        }

        match state.servers.get_mut(id) {
            Some(server) => {
                server.status = status;
                Ok(())
            }
            None => Err(api_error(404, "server not found")),
        }
    }
}

#[derive(Default)]
struct NetworkState {
    identities: HashMap<String, NetworkIdentity>,
    credentials: HashMap<String, String>,
    next_id: u64,
    deleted_credentials: Vec<String>,
    deleted_identities: Vec<String>,
    auto_register: bool,
}

#[derive(Default)]
pub struct MockNetwork {
    state: Mutex<NetworkState>,
}

impl MockNetwork {
    /// By default identities appear as soon as they are waited on, as if
    /// the VM joined the overlay during boot.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().unwrap().auto_register = true;
        mock
    }

    /// Identities never appear unless registered explicitly
    pub fn without_auto_register(&self) {
        self.state.lock().unwrap().auto_register = false;
    }

    pub fn register_identity(&self, hostname: &str, overlay_address: &str) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let identity = NetworkIdentity {
            id: format!("node-{}", state.next_id),
            hostname: hostname.to_string(),
            overlay_address: overlay_address.to_string(),
            created_at: Utc::now(),
        };
        state.identities.insert(hostname.to_string(), identity);
    }

    pub fn deleted_credentials(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_credentials.clone()
    }

    pub fn deleted_identities(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted_identities.clone()
    }
}

#[async_trait]
impl NetworkProvider for MockNetwork {
    async fn create_credential(&self, spec: &CredentialSpec) -> Result<NetworkCredential> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("cred-{}", state.next_id);
        let secret = format!("tskey-mock-{}", state.next_id);
        state.credentials.insert(id.clone(), spec.hostname.clone());

        Ok(NetworkCredential { id, secret })
    }

    async fn delete_credential(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.credentials.remove(id).is_none() {
            return Err(api_error(404, "credential not found"));
        }
        state.deleted_credentials.push(id.to_string());
        Ok(())
    }

    async fn list_identities(&self) -> Result<Vec<NetworkIdentity>> {
        Ok(self.state.lock().unwrap().identities.values().cloned().collect())
    }

    async fn get_identity_by_hostname(&self, hostname: &str) -> Result<Option<NetworkIdentity>> {
        Ok(self.state.lock().unwrap().identities.get(hostname).cloned())
    }

    async fn delete_identity(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let hostname = state
            .identities
            .iter()
            .find(|(_, identity)| identity.id == id)
            .map(|(hostname, _)| hostname.clone());

        match hostname {
            Some(hostname) => {
                state.identities.remove(&hostname);
                state.deleted_identities.push(id.to_string());
                Ok(())
            }
            None => Err(api_error(404, "identity not found")),
        }
    }

    async fn wait_for_identity(
        &self,
        hostname: &str,
        timeout: Duration,
    ) -> Result<NetworkIdentity> {
        {
            let state = self.state.lock().unwrap();
            if let Some(identity) = state.identities.get(hostname) {
                return Ok(identity.clone());
            }
            if !state.auto_register {
                return Err(ProviderError::Timeout {
                    operation: format!("overlay identity {}", hostname),
                    waited: timeout,
                });
            }
        }

        let address = {
            let state = self.state.lock().unwrap();
            format!("100.64.0.{}", state.next_id % 250 + 1)
        };
        self.register_identity(hostname, &address);
        Ok(self
            .state
            .lock()
            .unwrap()
            .identities
            .get(hostname)
            .cloned()
            .expect("identity just registered"))
    }
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] ws_store::StoreError),

    #[error(transparent)]
    Provider(#[from] ws_provider::ProviderError),

    #[error("Workspace {workspace_id} is not owned by {owner_id}")]
    NotOwned {
        workspace_id: String,
        owner_id: String,
    },

    #[error("Invalid workspace state: {0}")]
    InvalidState(String),

    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Missing provider resource: {0}")]
    MissingResource(String),
}

impl OrchestratorError {
    /// Validation errors are precondition failures: reported to the
    /// caller, never worth retrying through the queue.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotOwned { .. }
                | Self::InvalidState(_)
                | Self::Store(ws_store::StoreError::NotFound(_))
        )
    }
}

use cache_store::CacheStoreError;
use chat_client::RemoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatterlessError {
    #[error("remote call failed while {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    #[error("post '{post_id}' is listed in the order of channel '{channel_id}' but has no post entry")]
    MissingPostReference { channel_id: String, post_id: String },

    #[error("cache failure: {0}")]
    Cache(#[from] CacheStoreError),

    #[error("sync worker for channel '{channel_id}' panicked")]
    WorkerPanicked { channel_id: String },
}

impl MatterlessError {
    #[must_use]
    pub fn transport(operation: &'static str, source: RemoteError) -> Self {
        Self::Transport { operation, source }
    }

    /// Returns the remote error when this failure came from the server side.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }
}

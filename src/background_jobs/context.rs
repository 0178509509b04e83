use crate::store::FullStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    /// Access to the Vlog72 database.
    pub store: Arc<dyn FullStore>,
}

impl JobContext {
    pub fn new(cancellation_token: CancellationToken, store: Arc<dyn FullStore>) -> Self {
        Self {
            cancellation_token,
            store,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

use crate::session::SessionCoordinator;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single coaching session served by this process
    pub coordinator: Arc<Mutex<SessionCoordinator>>,
}

impl AppState {
    pub fn new(coordinator: SessionCoordinator) -> Self {
        Self {
            coordinator: Arc::new(Mutex::new(coordinator)),
        }
    }
}

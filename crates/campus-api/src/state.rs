use std::sync::Arc;

use campus_db::Database;
use campus_gateway::dispatcher::Dispatcher;
use campus_gateway::storage::RealtimeStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub hub: Dispatcher,
    pub jwt_secret: String,
}

impl AppStateInner {
    /// The database viewed through the gateway's storage seam, for handlers
    /// that go through the shared send/notify pipeline.
    pub fn store(&self) -> Arc<dyn RealtimeStore> {
        self.db.clone()
    }
}

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::services::{
    FileSnapshotStore, IdentityResolver, SessionRegistry, SnapshotStore, SupabaseProfileDirectory,
};

/// Router state shared by every cell that needs to know who the caller is.
#[derive(Clone)]
pub struct SessionState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SessionRegistry>,
}

impl SessionState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let store = FileSnapshotStore::new(config.identity_cache_dir.clone());
        match store.prune_older_than(Duration::from_secs(config.session_idle_ttl_secs)) {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} stale identity snapshots", removed),
            Err(e) => warn!("Could not prune identity snapshots in {}: {}", store.dir().display(), e),
        }

        let snapshots: Arc<dyn SnapshotStore> = Arc::new(store);
        Self::with_snapshots(config, snapshots)
    }

    pub fn with_snapshots(config: Arc<AppConfig>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(&config));
        let directory = Arc::new(SupabaseProfileDirectory::new(supabase));
        let resolver = Arc::new(IdentityResolver::new(directory));
        let registry = SessionRegistry::new(resolver, snapshots)
            .with_idle_ttl(Duration::from_secs(config.session_idle_ttl_secs));

        Self {
            config,
            registry: Arc::new(registry),
        }
    }
}

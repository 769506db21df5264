// libs/session-cell/src/services/resolver.rs
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{Identity, IdentityError, Principal};
use crate::services::directory::ProfileDirectory;

/// Maps a principal to exactly one clinic identity. Administrator records take
/// precedence over practitioner records.
pub struct IdentityResolver {
    directory: Arc<dyn ProfileDirectory>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn ProfileDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, principal: &Principal) -> Result<Identity, IdentityError> {
        debug!("Resolving identity for principal {}", principal.id);

        if let Some(admin) = self.directory.find_administrator(principal).await? {
            info!("Principal {} resolved as administrator {}", principal.id, admin.admin_id);
            return Ok(Identity::Administrator(admin));
        }

        if let Some(practitioner) = self.directory.find_practitioner(principal).await? {
            info!("Principal {} resolved as practitioner {}", principal.id, practitioner.scope);
            return Ok(Identity::Practitioner(practitioner));
        }

        warn!("No profile linked to principal {}", principal.id);
        Err(IdentityError::UnresolvedIdentity {
            principal_id: principal.id.clone(),
        })
    }
}

// libs/session-cell/src/services/directory.rs
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, error};

use shared_database::supabase::SupabaseClient;

use crate::models::{
    AdministratorProfile, AdministratorRow, IdentityError, PractitionerProfile,
    PractitionerRow, Principal,
};

/// Profile records an account can be cross-referenced against.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn find_administrator(
        &self,
        principal: &Principal,
    ) -> Result<Option<AdministratorProfile>, IdentityError>;

    async fn find_practitioner(
        &self,
        principal: &Principal,
    ) -> Result<Option<PractitionerProfile>, IdentityError>;
}

pub struct SupabaseProfileDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseProfileDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn find_one<T>(&self, path: &str, principal: &Principal) -> Result<Option<T>, IdentityError>
    where T: DeserializeOwned {
        let rows: Vec<T> = self.supabase.request(
            Method::GET,
            path,
            Some(&principal.access_token),
            None,
        ).await.map_err(|e| {
            error!("Profile lookup failed for {}: {}", principal.id, e);
            IdentityError::ResolutionTransport(e.to_string())
        })?;

        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl ProfileDirectory for SupabaseProfileDirectory {
    async fn find_administrator(
        &self,
        principal: &Principal,
    ) -> Result<Option<AdministratorProfile>, IdentityError> {
        debug!("Looking up administrator profile for {}", principal.id);

        let path = format!(
            "/rest/v1/administradores?id_auth_user=eq.{}&select=id_admin,nombre,apellido,correo,numero_celular&limit=1",
            urlencoding::encode(&principal.id)
        );

        let row: Option<AdministratorRow> = self.find_one(&path, principal).await?;
        Ok(row.map(|r| r.into_profile(&principal.id)))
    }

    async fn find_practitioner(
        &self,
        principal: &Principal,
    ) -> Result<Option<PractitionerProfile>, IdentityError> {
        debug!("Looking up practitioner profile for {}", principal.id);

        let path = format!(
            "/rest/v1/nutriologos?id_auth_user=eq.{}&select=id_nutriologo,nombre,apellido,correo,numero_celular,tarifa_consulta,nombre_usuario,descripcion,foto_perfil&limit=1",
            urlencoding::encode(&principal.id)
        );

        let row: Option<PractitionerRow> = self.find_one(&path, principal).await?;
        Ok(row.map(|r| r.into_profile(&principal.id)))
    }
}

// libs/session-cell/src/models.rs
use serde::{Deserialize, Serialize};
use std::fmt;

// ==============================================================================
// PRINCIPAL AND SCOPE
// ==============================================================================

/// An authenticated account together with the token that proved it. The token
/// is forwarded to the profile tables so row-level security applies.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub access_token: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            access_token: access_token.into(),
        }
    }
}

/// Internal numeric identifier of a practitioner. Every appointment and patient
/// query is filtered by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PractitionerScope(pub i64);

impl fmt::Display for PractitionerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ==============================================================================
// IDENTITY
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdministratorProfile {
    pub principal_id: String,
    pub admin_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PractitionerProfile {
    pub principal_id: String,
    pub scope: PractitionerScope,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub phone: String,
    pub consultation_fee: Option<f64>,
    pub description: String,
    pub photo_url: Option<String>,
}

/// Resolved clinic role of a principal. Exactly one variant per principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Identity {
    Administrator(AdministratorProfile),
    Practitioner(PractitionerProfile),
}

impl Identity {
    pub fn principal_id(&self) -> &str {
        match self {
            Identity::Administrator(admin) => &admin.principal_id,
            Identity::Practitioner(practitioner) => &practitioner.principal_id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Identity::Administrator(_) => Role::Administrator,
            Identity::Practitioner(_) => Role::Practitioner,
        }
    }

    /// Scope for practitioner-owned data; administrators have none.
    pub fn practitioner_scope(&self) -> Option<PractitionerScope> {
        match self {
            Identity::Practitioner(practitioner) => Some(practitioner.scope),
            Identity::Administrator(_) => None,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Identity::Administrator(admin) => format!("{} {}", admin.first_name, admin.last_name),
            Identity::Practitioner(p) => format!("{} {}", p.first_name, p.last_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Practitioner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Administrator => write!(f, "administrator"),
            Role::Practitioner => write!(f, "practitioner"),
        }
    }
}

/// Which tier of the identity store produced the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Authoritative,
    Restored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentIdentity {
    pub identity: Identity,
    pub source: IdentitySource,
}

/// Signals from the identity backend.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SignedIn(Principal),
    SignedOut,
    PasswordRecovery,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentityError {
    #[error("No administrator or practitioner profile is linked to account {principal_id}")]
    UnresolvedIdentity { principal_id: String },

    #[error("Identity lookup failed: {0}")]
    ResolutionTransport(String),

    #[error("No active session")]
    NoActiveSession,
}

impl IdentityError {
    /// Transport failures may succeed on retry; a missing profile never will
    /// without administrator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IdentityError::ResolutionTransport(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            IdentityError::UnresolvedIdentity { .. } => {
                "No clinic profile is associated with this account. Contact an administrator.".to_string()
            }
            IdentityError::ResolutionTransport(_) => {
                "Could not load your profile right now. Please try again.".to_string()
            }
            IdentityError::NoActiveSession => "Your session has ended. Please sign in again.".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// ==============================================================================
// PROFILE TABLE ROWS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AdministratorRow {
    pub id_admin: i64,
    pub nombre: Option<String>,
    pub apellido: Option<String>,
    pub correo: Option<String>,
    pub numero_celular: Option<String>,
}

impl AdministratorRow {
    pub fn into_profile(self, principal_id: &str) -> AdministratorProfile {
        AdministratorProfile {
            principal_id: principal_id.to_string(),
            admin_id: self.id_admin,
            email: self.correo.unwrap_or_default(),
            first_name: self.nombre.unwrap_or_default(),
            last_name: self.apellido.unwrap_or_default(),
            phone: self.numero_celular.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PractitionerRow {
    pub id_nutriologo: i64,
    pub nombre: Option<String>,
    pub apellido: Option<String>,
    pub correo: Option<String>,
    pub numero_celular: Option<String>,
    pub nombre_usuario: Option<String>,
    pub tarifa_consulta: Option<f64>,
    pub descripcion: Option<String>,
    pub foto_perfil: Option<String>,
}

impl PractitionerRow {
    pub fn into_profile(self, principal_id: &str) -> PractitionerProfile {
        PractitionerProfile {
            principal_id: principal_id.to_string(),
            scope: PractitionerScope(self.id_nutriologo),
            email: self.correo.unwrap_or_default(),
            first_name: self.nombre.unwrap_or_default(),
            last_name: self.apellido.unwrap_or_default(),
            username: self.nombre_usuario.unwrap_or_default(),
            phone: self.numero_celular.unwrap_or_default(),
            consultation_fee: self.tarifa_consulta,
            description: self.descripcion.unwrap_or_default(),
            photo_url: self.foto_perfil,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_serializes_with_role_tag() {
        let identity = Identity::Practitioner(PractitionerRow {
            id_nutriologo: 42,
            nombre: Some("Laura".into()),
            apellido: Some("Soto".into()),
            correo: None,
            numero_celular: None,
            nombre_usuario: None,
            tarifa_consulta: Some(650.0),
            descripcion: None,
            foto_perfil: None,
        }.into_profile("U1"));

        let value = serde_json::to_value(&identity).unwrap();
        assert_eq!(value["role"], json!("practitioner"));
        assert_eq!(value["scope"], json!(42));

        let back: Identity = serde_json::from_value(value).unwrap();
        assert_eq!(back, identity);
        assert_eq!(back.practitioner_scope(), Some(PractitionerScope(42)));
        assert_eq!(back.display_name(), "Laura Soto");
    }

    #[test]
    fn administrators_have_no_practitioner_scope() {
        let identity = Identity::Administrator(AdministratorRow {
            id_admin: 1,
            nombre: None,
            apellido: None,
            correo: Some("admin@example.com".into()),
            numero_celular: None,
        }.into_profile("A1"));

        assert_eq!(identity.role(), Role::Administrator);
        assert_eq!(identity.practitioner_scope(), None);
        assert_eq!(identity.principal_id(), "A1");
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(IdentityError::ResolutionTransport("timeout".into()).is_retryable());
        assert!(!IdentityError::UnresolvedIdentity { principal_id: "U9".into() }.is_retryable());
        assert!(!IdentityError::NoActiveSession.is_retryable());
    }
}

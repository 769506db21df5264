use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub session_id: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", "authenticated")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            session_id: Uuid::new_v4().to_string(),
        }
    }

    /// A signed-in principal. Clinic roles live in the profile tables, not
    /// in the token, so administrators and practitioners look alike here.
    pub fn authenticated(email: &str) -> Self {
        Self::new(email, "authenticated")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            session_id: Some(self.session_id.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "session_id": user.session_id,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for the clinic tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn administrator_row(auth_user_id: &str, admin_id: i64) -> serde_json::Value {
        json!({
            "id_admin": admin_id,
            "id_auth_user": auth_user_id,
            "nombre": "Ana",
            "apellido": "Ruiz",
            "correo": "admin@example.com",
            "numero_celular": "6621234567"
        })
    }

    pub fn practitioner_row(auth_user_id: &str, practitioner_id: i64) -> serde_json::Value {
        json!({
            "id_nutriologo": practitioner_id,
            "id_auth_user": auth_user_id,
            "nombre": "Laura",
            "apellido": "Soto",
            "correo": "nutri@example.com",
            "numero_celular": "6627654321",
            "nombre_usuario": "lsoto",
            "tarifa_consulta": 800.0,
            "descripcion": "Nutrición clínica",
            "foto_perfil": null
        })
    }

    pub fn appointment_row(
        appointment_id: i64,
        patient_id: i64,
        practitioner_id: i64,
        scheduled_at: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id_cita": appointment_id,
            "id_paciente": patient_id,
            "id_nutriologo": practitioner_id,
            "fecha_hora": scheduled_at,
            "estado": status,
            "duracion_minutos": 60,
            "tipo_cita": "presencial"
        })
    }

    pub fn payment_row(
        payment_id: i64,
        appointment_id: Option<i64>,
        amount: f64,
        status: &str,
        paid_at: &str,
    ) -> serde_json::Value {
        json!({
            "id_pago": payment_id,
            "id_cita": appointment_id,
            "monto": amount,
            "estado": status,
            "fecha_pago": paid_at
        })
    }

    pub fn patient_row(patient_id: i64, first_name: &str, last_name: &str, email: &str) -> serde_json::Value {
        json!({
            "id_paciente": patient_id,
            "nombre": first_name,
            "apellido": last_name,
            "correo": email
        })
    }

    pub fn relationship_row(patient_id: i64, practitioner_id: i64) -> serde_json::Value {
        json!({
            "id_paciente": patient_id,
            "id_nutriologo": practitioner_id,
            "activo": true
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

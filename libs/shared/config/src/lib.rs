use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Clinic wall-clock offset from UTC, in minutes. UTC−7, no daylight saving.
pub const DEFAULT_CLINIC_UTC_OFFSET_MINUTES: i32 = -7 * 60;

/// Amount shown for an appointment that has no payment record yet.
pub const DEFAULT_CONSULTATION_AMOUNT: f64 = 800.0;

pub const DEFAULT_UPCOMING_APPOINTMENTS_LIMIT: usize = 6;

/// Seconds a session may sit unused before its cached identity is dropped.
pub const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 8 * 60 * 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub clinic_utc_offset_minutes: i32,
    pub default_consultation_amount: f64,
    pub upcoming_appointments_limit: usize,
    pub identity_cache_dir: PathBuf,
    pub session_idle_ttl_secs: u64,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            clinic_utc_offset_minutes: parse_or_default(
                "CLINIC_UTC_OFFSET_MINUTES",
                DEFAULT_CLINIC_UTC_OFFSET_MINUTES,
            ),
            default_consultation_amount: parse_or_default(
                "DEFAULT_CONSULTATION_AMOUNT",
                DEFAULT_CONSULTATION_AMOUNT,
            ),
            upcoming_appointments_limit: parse_or_default(
                "UPCOMING_APPOINTMENTS_LIMIT",
                DEFAULT_UPCOMING_APPOINTMENTS_LIMIT,
            ),
            identity_cache_dir: env::var("IDENTITY_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    warn!("IDENTITY_CACHE_DIR not set, using default");
                    PathBuf::from(".identity-cache")
                }),
            session_idle_ttl_secs: parse_or_default(
                "SESSION_IDLE_TTL_SECS",
                DEFAULT_SESSION_IDLE_TTL_SECS,
            ),
            server_port: parse_or_default("SERVER_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            clinic_utc_offset_minutes: DEFAULT_CLINIC_UTC_OFFSET_MINUTES,
            default_consultation_amount: DEFAULT_CONSULTATION_AMOUNT,
            upcoming_appointments_limit: DEFAULT_UPCOMING_APPOINTMENTS_LIMIT,
            identity_cache_dir: PathBuf::from(".identity-cache"),
            session_idle_ttl_secs: DEFAULT_SESSION_IDLE_TTL_SECS,
            server_port: 3000,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_clinic_constants() {
        let config = AppConfig::default();

        assert_eq!(config.clinic_utc_offset_minutes, -420);
        assert_eq!(config.default_consultation_amount, 800.0);
        assert_eq!(config.upcoming_appointments_limit, 6);
        assert_eq!(config.session_idle_ttl_secs, 8 * 60 * 60);
        assert!(!config.is_configured());
    }

    #[test]
    fn unparseable_value_falls_back_to_default() {
        env::set_var("NUTRI_TEST_BAD_NUMBER", "not-a-number");
        let value: i32 = parse_or_default("NUTRI_TEST_BAD_NUMBER", 42);
        env::remove_var("NUTRI_TEST_BAD_NUMBER");

        assert_eq!(value, 42);
    }
}

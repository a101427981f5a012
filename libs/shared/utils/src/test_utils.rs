use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, ClinicSettings};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub clinic: ClinicSettings,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            clinic: ClinicSettings::default(),
        }
    }
}

impl TestConfig {
    /// Points the REST client at a mock server (e.g. `wiremock::MockServer::uri()`).
    pub fn with_supabase_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            redis_url: None,
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "test@clinic.local".to_string(),
            port: 0,
            clinic: self.clinic.clone(),
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
}

impl Default for TestUser {
    fn default() -> Self {
        Self::patient("test@example.com")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self::with_id(Uuid::new_v4(), email, role)
    }

    /// A user whose subject is a known entity id, e.g. a doctor id used in the ledger.
    pub fn with_id(id: Uuid, email: &str, role: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }
}

/// Mints HS256 tokens shaped like the ones the auth middleware accepts.
pub struct JwtTestUtils;

impl JwtTestUtils {
    fn sign(claims: &Value, secret: &str) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(json!({ "alg": "HS256", "typ": "JWT" }).to_string());
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{}.{}", header, payload);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(signing_input.as_bytes());
        let signature = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature)
    }

    fn claims(user: &TestUser, valid_for: Duration) -> Value {
        let issued = Utc::now();
        json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": issued.timestamp(),
            "exp": (issued + valid_for).timestamp()
        })
    }

    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        Self::sign(&Self::claims(user, Duration::hours(exp_hours.unwrap_or(24))), secret)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::sign(&Self::claims(user, Duration::minutes(-5)), secret)
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "not-the-clinic-secret", None)
    }

    /// `Authorization` header value for the given user.
    pub fn bearer(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.supabase_anon_key, "test-anon-key");
        assert!(!app_config.supabase_jwt_secret.is_empty());
        assert!(app_config.redis_url.is_none());
    }

    #[test]
    fn users_can_carry_a_known_subject() {
        let doctor_id = Uuid::new_v4();
        let user = TestUser::with_id(doctor_id, "doc@example.com", "doctor");
        assert_eq!(user.id, doctor_id.to_string());
        assert_eq!(user.role, "doctor");
    }

    #[test]
    fn test_jwt_token_creation() {
        let user = TestUser::default();
        let token = JwtTestUtils::create_test_token(&user, "test-secret", Some(1));

        assert_eq!(token.split('.').count(), 3);
        assert!(JwtTestUtils::bearer(&user, "test-secret").starts_with("Bearer "));
    }
}

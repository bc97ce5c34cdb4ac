use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::{AppConfig, CalendarBackend, SchedulingConfig};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub scheduling: SchedulingConfig,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            scheduling: SchedulingConfig::default(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(mut self, url: &str) -> Self {
        self.supabase_url = url.to_string();
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            supabase_service_role_key: "test-service-role-key".to_string(),
            calendar_backend: CalendarBackend::Memory,
            port: 0,
            scheduling: self.scheduling.clone(),
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
    pub workplace_id: Uuid,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("test@example.com", "pharmacist")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            workplace_id: Uuid::new_v4(),
        }
    }

    pub fn pharmacist(email: &str) -> Self {
        Self::new(email, "pharmacist")
    }

    pub fn manager(email: &str) -> Self {
        Self::new(email, "manager")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            workplace_id: Some(self.workplace_id),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "app_metadata": { "workplace_id": user.workplace_id.to_string() },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn bearer(user: &TestUser, secret: &str) -> String {
        format!("Bearer {}", Self::create_test_token(user, secret, Some(1)))
    }
}

/// PostgREST row shapes used when mocking the calendar tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn staff_row(staff_id: Uuid, workplace_id: Uuid, display_name: &str) -> serde_json::Value {
        json!({
            "id": staff_id,
            "workplace_id": workplace_id,
            "display_name": display_name,
            "is_active": true,
            "working_hours": null
        })
    }

    pub fn appointment_row(id: Uuid, staff_id: Uuid, date: &str, time: &str, duration: u32) -> serde_json::Value {
        json!({
            "id": id,
            "workplace_id": Uuid::nil(),
            "patient_id": Uuid::new_v4(),
            "staff_id": staff_id,
            "appointment_type": "general_followup",
            "date": date,
            "time": time,
            "duration_minutes": duration,
            "timezone": "+00:00",
            "status": "scheduled",
            "is_recurring_exception": false,
            "created_at": "2025-10-01T00:00:00Z",
            "updated_at": "2025-10-01T00:00:00Z",
            "created_by": "seed",
            "is_deleted": false,
            "version": 1
        })
    }

    pub fn time_off_row(id: Uuid, staff_id: Uuid, start: &str, end: &str, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "staff_id": staff_id,
            "start_date": start,
            "end_date": end,
            "reason": "Annual leave booked in advance",
            "time_off_type": "vacation",
            "status": status,
            "affected_appointment_ids": [],
            "created_at": "2025-10-01T00:00:00Z",
            "updated_at": "2025-10-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code,
            "details": null,
            "hint": null
        })
    }
}

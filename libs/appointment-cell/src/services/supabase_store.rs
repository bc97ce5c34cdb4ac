// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Appointment, StaffMember, TimeOffRequest, TimeOffStatus};
use crate::services::calendar::{CalendarStore, StoreError};

const BOOK_IF_FREE_RPC: &str = "book_appointment_if_free";
const RESCHEDULE_RPC: &str = "reschedule_appointment";

/// PostgREST-backed calendar. Overlap protection for inserts and reschedules
/// lives in database functions backed by an exclusion constraint; this side
/// only translates their 409 responses.
pub struct SupabaseCalendarStore {
    client: Arc<SupabaseClient>,
    service_key: String,
}

#[derive(Deserialize)]
struct ReplacedPair {
    previous: Appointment,
    replacement: Appointment,
}

impl SupabaseCalendarStore {
    pub fn new(client: Arc<SupabaseClient>, service_key: impl Into<String>) -> Self {
        Self {
            client,
            service_key: service_key.into(),
        }
    }

    fn token(&self) -> Option<&str> {
        Some(self.service_key.as_str()).filter(|k| !k.is_empty())
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        self.client
            .request(Method::GET, path, self.token(), None)
            .await
            .map_err(backend)
    }

    async fn write<T: DeserializeOwned>(&self, method: Method, path: &str, body: Value) -> Result<Vec<T>, SupabaseError> {
        self.client
            .request_with_headers(
                method,
                path,
                self.token(),
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
    }
}

fn backend(err: SupabaseError) -> StoreError {
    warn!("Calendar backend request failed: {}", err);
    StoreError::Backend(err.to_string())
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Backend(format!("serialization failed: {}", e)))
}

#[async_trait]
impl CalendarStore for SupabaseCalendarStore {
    async fn list_staff(&self) -> Result<Vec<StaffMember>, StoreError> {
        self.select("/rest/v1/staff_members?select=*&order=display_name.asc").await
    }

    async fn staff_member(&self, staff_id: Uuid) -> Result<Option<StaffMember>, StoreError> {
        let path = format!("/rest/v1/staff_members?id=eq.{}&select=*", staff_id);
        Ok(self.select(&path).await?.into_iter().next())
    }

    async fn appointments_for(&self, staff_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?staff_id=eq.{}&date=eq.{}&is_deleted=eq.false&order=time.asc",
            staff_id, date
        );
        self.select(&path).await
    }

    async fn appointments_between(
        &self,
        staff_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?staff_id=eq.{}&date=gte.{}&date=lte.{}&is_deleted=eq.false&order=date.asc,time.asc",
            staff_id, start, end
        );
        self.select(&path).await
    }

    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&is_deleted=eq.false", id);
        Ok(self.select(&path).await?.into_iter().next())
    }

    async fn series_occurrences(&self, series_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?series_id=eq.{}&is_deleted=eq.false&order=date.asc,time.asc",
            series_id
        );
        self.select(&path).await
    }

    async fn insert_if_free(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let (staff_id, date) = (appointment.staff_id, appointment.date);
        let args = json!({ "p_appointment": to_body(&Appointment { version: 1, ..appointment })? });

        match self.client.rpc::<Appointment>(BOOK_IF_FREE_RPC, self.token(), args).await {
            Ok(stored) => Ok(stored),
            Err(SupabaseError::Conflict(msg)) => {
                debug!("{} rejected booking: {}", BOOK_IF_FREE_RPC, msg);
                Err(StoreError::SlotTaken { staff_id, date })
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn update_appointment(&self, appointment: Appointment, expected_version: i64) -> Result<Appointment, StoreError> {
        let id = appointment.id;
        let path = format!("/rest/v1/appointments?id=eq.{}&version=eq.{}", id, expected_version);
        let body = to_body(&Appointment {
            version: expected_version + 1,
            ..appointment
        })?;

        // A version filter that matches nothing comes back as an empty array.
        let updated: Vec<Appointment> = match self.write(Method::PATCH, &path, body).await {
            Ok(rows) => rows,
            Err(SupabaseError::Conflict(_)) => {
                return Err(StoreError::VersionConflict {
                    id,
                    expected: expected_version,
                })
            }
            Err(e) => return Err(backend(e)),
        };

        updated.into_iter().next().ok_or(StoreError::VersionConflict {
            id,
            expected: expected_version,
        })
    }

    async fn replace_appointment(
        &self,
        previous: Appointment,
        expected_version: i64,
        replacement: Appointment,
    ) -> Result<(Appointment, Appointment), StoreError> {
        let (id, staff_id, date) = (previous.id, replacement.staff_id, replacement.date);
        let args = json!({
            "p_previous": to_body(&Appointment { version: expected_version + 1, ..previous })?,
            "p_expected_version": expected_version,
            "p_replacement": to_body(&Appointment { version: 1, ..replacement })?,
        });

        match self.client.rpc::<ReplacedPair>(RESCHEDULE_RPC, self.token(), args).await {
            Ok(pair) => Ok((pair.previous, pair.replacement)),
            Err(SupabaseError::Conflict(msg)) if msg.contains("version") => Err(StoreError::VersionConflict {
                id,
                expected: expected_version,
            }),
            Err(SupabaseError::Conflict(_)) => Err(StoreError::SlotTaken { staff_id, date }),
            Err(e) => Err(backend(e)),
        }
    }

    async fn time_off_for(&self, staff_id: Uuid, date: NaiveDate) -> Result<Option<TimeOffRequest>, StoreError> {
        let path = format!(
            "/rest/v1/time_off_requests?staff_id=eq.{}&status=eq.approved&start_date=lte.{}&end_date=gte.{}&order=start_date.asc&limit=1",
            staff_id, date, date
        );
        Ok(self.select(&path).await?.into_iter().next())
    }

    async fn time_off_requests_for(&self, staff_id: Uuid) -> Result<Vec<TimeOffRequest>, StoreError> {
        let path = format!("/rest/v1/time_off_requests?staff_id=eq.{}&order=start_date.asc", staff_id);
        self.select(&path).await
    }

    async fn time_off(&self, id: Uuid) -> Result<Option<TimeOffRequest>, StoreError> {
        let path = format!("/rest/v1/time_off_requests?id=eq.{}", id);
        Ok(self.select(&path).await?.into_iter().next())
    }

    async fn insert_time_off(&self, request: TimeOffRequest) -> Result<TimeOffRequest, StoreError> {
        let id = request.id;
        let rows: Vec<TimeOffRequest> = self
            .write(Method::POST, "/rest/v1/time_off_requests", to_body(&request)?)
            .await
            .map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend(format!("insert of time-off {} returned no row", id)))
    }

    async fn update_time_off(
        &self,
        request: TimeOffRequest,
        expected_status: TimeOffStatus,
    ) -> Result<TimeOffRequest, StoreError> {
        let id = request.id;
        let path = format!("/rest/v1/time_off_requests?id=eq.{}&status=eq.{}", id, expected_status);
        let rows: Vec<TimeOffRequest> = self
            .write(Method::PATCH, &path, to_body(&request)?)
            .await
            .map_err(backend)?;
        // No row matched: either the id is gone or another decision landed first.
        rows.into_iter().next().ok_or(StoreError::StatusConflict {
            id,
            expected: expected_status,
        })
    }
}

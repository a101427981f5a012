use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::services::BookingService;
use appointment_cell::{appointment_routes, AppointmentCellState};
use doctor_cell::services::ScheduleService;
use doctor_cell::{doctor_routes, DoctorCellState};
use shared_config::AppConfig;

pub fn create_router(
    config: Arc<AppConfig>,
    schedules: Arc<ScheduleService>,
    booking: Arc<BookingService>,
) -> Router {
    let doctor_state = Arc::new(DoctorCellState {
        config: config.clone(),
        schedules,
    });
    let appointment_state = Arc::new(AppointmentCellState { config, booking });

    Router::new()
        .route("/", get(|| async { "Amae scheduling API is running!" }))
        .nest("/doctors", doctor_routes(doctor_state))
        .nest("/appointments", appointment_routes(appointment_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use appointment_cell::services::{InMemoryLedger, LocalDayLocks, SlotAllocator};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use doctor_cell::services::InMemoryScheduleRepository;
    use reminder_cell::{InMemoryReminderStore, ReminderService};
    use serde_json::{json, Value};
    use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app(test_config: &TestConfig) -> Router {
        let config = test_config.to_arc();
        let schedules = Arc::new(ScheduleService::new(Arc::new(InMemoryScheduleRepository::new())));
        let booking = Arc::new(BookingService::new(
            schedules.clone(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(LocalDayLocks::new(Duration::from_secs(1))),
            Arc::new(ReminderService::new(Arc::new(InMemoryReminderStore::new()))),
            SlotAllocator::from_settings(&config.clinic).unwrap(),
            chrono::Duration::minutes(config.clinic.reminder_lead_minutes),
        ));
        create_router(config, schedules, booking)
    }

    async fn send(app: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(bearer) = bearer {
            builder = builder.header(header::AUTHORIZATION, bearer);
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn doctor_setup_flows_into_booking() {
        let test_config = TestConfig::default();
        let app = app(&test_config);
        let admin = JwtTestUtils::bearer(&TestUser::admin("admin@clinic.local"), &test_config.jwt_secret);
        let doctor_id = Uuid::new_v4();

        let (status, _) = send(&app, Method::POST, &format!("/doctors/{}/schedule", doctor_id), Some(&admin), None).await;
        assert_eq!(status, StatusCode::CREATED);

        // Freshly promoted doctors are not bookable until published.
        let booking = json!({ "doctor_id": doctor_id, "patient_id": Uuid::new_v4(), "calendar_date": "2030-01-07" });
        let (status, body) = send(&app, Method::POST, "/appointments", Some(&admin), Some(booking.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "DOCTOR_NOT_PUBLISHED");

        let (status, _) = send(
            &app,
            Method::PUT,
            &format!("/doctors/{}/profile", doctor_id),
            Some(&admin),
            Some(json!({ "is_published": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::POST, "/appointments", Some(&admin), Some(booking)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["booking"]["local_time"], "09:00:00");
    }

    #[tokio::test]
    async fn root_reports_liveness() {
        let app = app(&TestConfig::default());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// libs/doctor-cell/tests/supabase_repository_test.rs
use assert_matches::assert_matches;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, headers, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{DayOfWeek, DoctorSchedule, ScheduleError, ScheduleTemplate};
use doctor_cell::services::{ScheduleRepository, SupabaseScheduleRepository};
use shared_database::SupabaseClient;
use shared_utils::test_utils::TestConfig;

fn repository(server: &MockServer) -> SupabaseScheduleRepository {
    let config = TestConfig::with_supabase_url(server.uri()).to_app_config();
    SupabaseScheduleRepository::new(SupabaseClient::new(&config))
}

fn weekly_row(doctor_id: Uuid, day: &str, is_working: bool) -> serde_json::Value {
    json!({
        "doctor_id": doctor_id,
        "day_of_week": day,
        "is_working": is_working,
        "start_time": "09:00:00",
        "end_time": "17:00:00",
        "updated_at": Utc::now().to_rfc3339()
    })
}

#[tokio::test]
async fn reads_weekly_entry_by_doctor_and_day_code() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("day_of_week", "eq.TUE"))
        .and(header("apikey", "test-anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            weekly_row(doctor_id, "TUE", true)
        ])))
        .mount(&server)
        .await;

    let entry = repository(&server)
        .get_weekly_entry(doctor_id, DayOfWeek::Tuesday)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entry.day_of_week, DayOfWeek::Tuesday);
    assert!(entry.is_working);
}

#[tokio::test]
async fn missing_profile_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_booking_profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let profile = repository(&server).get_profile(Uuid::new_v4()).await.unwrap();
    assert!(profile.is_none());
}

#[tokio::test]
async fn weekly_entries_come_back_sunday_first() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            weekly_row(doctor_id, "SAT", false),
            weekly_row(doctor_id, "MON", true),
            weekly_row(doctor_id, "SUN", false)
        ])))
        .mount(&server)
        .await;

    let entries = repository(&server).list_weekly_entries(doctor_id).await.unwrap();
    let days: Vec<DayOfWeek> = entries.iter().map(|e| e.day_of_week).collect();
    assert_eq!(days, vec![DayOfWeek::Sunday, DayOfWeek::Monday, DayOfWeek::Saturday]);
}

#[tokio::test]
async fn weekly_edit_upserts_on_doctor_and_day() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let schedule = DoctorSchedule::from_template(doctor_id, &ScheduleTemplate::default(), Utc::now());

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_weekly_schedules"))
        .and(query_param("on_conflict", "doctor_id,day_of_week"))
        .and(headers("Prefer", vec!["resolution=merge-duplicates", "return=minimal"]))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let monday = schedule.entry(DayOfWeek::Monday).unwrap();
    repository(&server).save_weekly_entry(monday).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent[0]["day_of_week"], "MON");
}

#[tokio::test]
async fn duplicate_profile_insert_is_already_configured() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let schedule = DoctorSchedule::from_template(doctor_id, &ScheduleTemplate::default(), Utc::now());

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_booking_profiles"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key value"))
        .mount(&server)
        .await;

    let result = repository(&server).insert_schedule(&schedule).await;
    assert_matches!(result, Err(ScheduleError::AlreadyConfigured(id)) if id == doctor_id);
}

#[tokio::test]
async fn server_errors_surface_as_storage_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_booking_profiles"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = repository(&server).get_profile(Uuid::new_v4()).await;
    assert_matches!(result, Err(ScheduleError::Storage(_)));
}

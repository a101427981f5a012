// libs/appointment-cell/tests/supabase_ledger_test.rs
mod common;

use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, headers, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{Appointment, AppointmentStatus, SlotUpdate};
use appointment_cell::services::{AppointmentLedger, FinishRecord, LedgerError, SupabaseLedger};
use shared_database::SupabaseClient;
use shared_utils::test_utils::TestConfig;

use common::{local, monday};

fn ledger(server: &MockServer) -> SupabaseLedger {
    let config = TestConfig::with_supabase_url(server.uri()).to_app_config();
    SupabaseLedger::new(SupabaseClient::new(&config))
}

fn appointment(doctor_id: Uuid, hour: u32, minute: u32) -> Appointment {
    Appointment::new(doctor_id, Uuid::new_v4(), monday(), local(hour, minute))
}

#[tokio::test]
async fn lists_a_day_in_slot_order() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let early = appointment(doctor_id, 9, 0);
    let late = appointment(doctor_id, 9, 15);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("calendar_date", "eq.2030-01-07"))
        .and(query_param("order", "assigned_time.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([late, early])))
        .mount(&server)
        .await;

    let day = ledger(&server).list_for_day(doctor_id, monday()).await.unwrap();

    let ids: Vec<Uuid> = day.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![early.id, late.id]);
}

#[tokio::test]
async fn append_refuses_a_full_day_without_writing() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": Uuid::new_v4() },
            { "id": Uuid::new_v4() }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let result = ledger(&server).append(appointment(doctor_id, 9, 30), 2).await;
    assert_matches!(result, Err(LedgerError::CapacityExceeded(key)) if key.doctor_id == doctor_id);
}

#[tokio::test]
async fn append_inserts_and_returns_the_stored_row() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let new = appointment(doctor_id, 9, 0);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("select", "id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([new])))
        .expect(1)
        .mount(&server)
        .await;

    let stored = ledger(&server).append(new.clone(), 3).await.unwrap();
    assert_eq!(stored.id, new.id);
    assert_eq!(stored.status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn rewrite_sends_one_bulk_upsert() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let first = appointment(doctor_id, 9, 0);
    let second = appointment(doctor_id, 9, 15);
    let third = appointment(doctor_id, 9, 30);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([first, second, third])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("on_conflict", "id"))
        .and(headers("Prefer", vec!["resolution=merge-duplicates", "return=minimal"]))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let updates = [SlotUpdate {
        appointment_id: third.id,
        previous_time: third.assigned_time,
        assigned_time: local(9, 5),
    }];
    ledger(&server)
        .rewrite_times(doctor_id, monday(), &updates)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let upsert = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    let rows: Vec<Appointment> = serde_json::from_slice(&upsert.body).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, third.id);
    assert_eq!(rows[0].assigned_time, local(9, 5));
    assert_eq!(rows[0].patient_id, third.patient_id);
}

#[tokio::test]
async fn rewrite_of_an_unknown_appointment_writes_nothing() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([appointment(doctor_id, 9, 0)])),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let stray = Uuid::new_v4();
    let updates = [SlotUpdate {
        appointment_id: stray,
        previous_time: local(9, 30),
        assigned_time: local(9, 15),
    }];
    let result = ledger(&server).rewrite_times(doctor_id, monday(), &updates).await;
    assert_eq!(result, Err(LedgerError::NotFound(stray)));
}

#[tokio::test]
async fn commit_reflow_writes_finish_and_shifts_in_one_upsert() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let first = appointment(doctor_id, 9, 0);
    let second = appointment(doctor_id, 9, 15);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([first, second])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("on_conflict", "id"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let updates = [SlotUpdate {
        appointment_id: second.id,
        previous_time: second.assigned_time,
        assigned_time: local(9, 5),
    }];
    let finish = FinishRecord {
        appointment_id: first.id,
        finished_at: local(9, 5),
        status: AppointmentStatus::Completed,
    };
    let stored = ledger(&server)
        .commit_reflow(doctor_id, monday(), &updates, Some(finish))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, first.id);
    assert_eq!(stored.actual_finish_time, Some(local(9, 5)));

    let requests = server.received_requests().await.unwrap();
    let upsert = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .unwrap();
    let rows: Vec<serde_json::Value> = serde_json::from_slice(&upsert.body).unwrap();
    assert_eq!(rows.len(), 2);
    let finished = rows
        .iter()
        .find(|r| r["id"] == json!(first.id))
        .unwrap();
    assert_eq!(finished["status"], "completed");
    assert!(!finished["actual_finish_time"].is_null());
    let shifted = rows
        .iter()
        .find(|r| r["id"] == json!(second.id))
        .unwrap();
    assert_eq!(shifted["status"], "scheduled");
}

#[tokio::test]
async fn commit_reflow_of_a_missing_finish_writes_nothing() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let first = appointment(doctor_id, 9, 0);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([first])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let missing = Uuid::new_v4();
    let finish = FinishRecord {
        appointment_id: missing,
        finished_at: local(9, 12),
        status: AppointmentStatus::Completed,
    };
    let result = ledger(&server)
        .commit_reflow(doctor_id, monday(), &[], Some(finish))
        .await;
    assert_eq!(result, Err(LedgerError::NotFound(missing)));
}

#[tokio::test]
async fn server_errors_surface_as_storage_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = ledger(&server).get(Uuid::new_v4()).await;
    assert_matches!(result, Err(LedgerError::Storage(msg)) if msg.contains("boom"));
}

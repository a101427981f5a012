// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AvailabilityQuery, BookAppointmentRequest, BookingError, CompleteAppointmentRequest,
};
use crate::router::AppointmentCellState;

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let (status, code) = match &err {
            BookingError::DoctorNotConfigured(_) => (StatusCode::NOT_FOUND, "DOCTOR_NOT_CONFIGURED"),
            BookingError::InvalidCapacityConfiguration(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_CAPACITY_CONFIGURATION")
            }
            BookingError::DoctorNotPublished(_) => (StatusCode::NOT_FOUND, "DOCTOR_NOT_PUBLISHED"),
            BookingError::DoctorNotAvailable { .. } => (StatusCode::CONFLICT, "DOCTOR_NOT_AVAILABLE"),
            BookingError::DayFullyBooked { .. } => (StatusCode::CONFLICT, "DAY_FULLY_BOOKED"),
            BookingError::CapacityExceeded { .. } => (StatusCode::CONFLICT, "CAPACITY_EXCEEDED"),
            BookingError::Busy(_) => (StatusCode::SERVICE_UNAVAILABLE, "BUSY"),
            BookingError::InvalidTimestamp(_) => (StatusCode::BAD_REQUEST, "INVALID_TIMESTAMP"),
            BookingError::AppointmentNotFound(_) => (StatusCode::NOT_FOUND, "APPOINTMENT_NOT_FOUND"),
            BookingError::AlreadyCompleted(_) => (StatusCode::CONFLICT, "ALREADY_COMPLETED"),
            BookingError::Storage(msg) => return AppError::Database(msg.clone()),
        };
        AppError::rejected(status, code, err.to_string())
    }
}

fn can_view(user: &User, appointment: &Appointment) -> bool {
    user.is_admin() || user.is_subject(&appointment.patient_id) || user.is_subject(&appointment.doctor_id)
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppointmentCellState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let calendar_date = state.booking.allocator().clock().parse_date(&query.date)?;
    let availability = state.booking.get_availability(query.doctor_id, calendar_date).await?;

    Ok(Json(json!(availability)))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_booking(
    State(state): State<Arc<AppointmentCellState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    // Patients book for themselves; staff may book on a patient's behalf.
    let is_patient = user.is_subject(&request.patient_id);
    if !is_patient && !user.is_admin() && !user.is_doctor() {
        return Err(AppError::Forbidden(
            "Not authorized to book appointment for this patient".to_string(),
        ));
    }

    let calendar_date = state.booking.allocator().clock().parse_date(&request.calendar_date)?;
    let recipient = if is_patient { user.email.clone() } else { None };

    let confirmation = state
        .booking
        .create_booking(request.doctor_id, request.patient_id, calendar_date, recipient)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "booking": confirmation,
            "message": format!(
                "Appointment booked for {} at {}",
                calendar_date,
                confirmation.local_time.format("%H:%M")
            )
        })),
    ))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.get_appointment(appointment_id).await?;
    if !user.is_admin() && !user.is_subject(&appointment.doctor_id) {
        return Err(AppError::Forbidden(
            "Only the attending doctor can complete this appointment".to_string(),
        ));
    }

    let finished_at = request
        .actual_finish_time
        .as_deref()
        .map(|raw| state.booking.allocator().clock().parse_instant(raw))
        .transpose()?;

    let outcome = state.booking.record_completion(appointment_id, finished_at).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "shifted": outcome.shifted,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentCellState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.get_appointment(appointment_id).await?;
    if !can_view(&user, &appointment) {
        return Err(AppError::Forbidden("Not authorized to view this appointment".to_string()));
    }

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn list_doctor_day(
    State(state): State<Arc<AppointmentCellState>>,
    Path((doctor_id, date)): Path<(Uuid, String)>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && !user.is_subject(&doctor_id) {
        return Err(AppError::Forbidden("Not authorized to view this schedule".to_string()));
    }

    let calendar_date = state.booking.allocator().clock().parse_date(&date)?;
    let view = state.booking.list_day(doctor_id, calendar_date).await?;

    Ok(Json(json!(view)))
}

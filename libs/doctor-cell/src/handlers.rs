use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{DayOfWeek, ScheduleError, UpdateBookingProfileRequest, UpdateWeeklyEntryRequest};
use crate::router::DoctorCellState;

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::DoctorNotConfigured(_) => {
                AppError::rejected(StatusCode::NOT_FOUND, "DOCTOR_NOT_CONFIGURED", err.to_string())
            }
            ScheduleError::AlreadyConfigured(_) => {
                AppError::rejected(StatusCode::CONFLICT, "ALREADY_CONFIGURED", err.to_string())
            }
            ScheduleError::Validation(msg) => AppError::ValidationError(msg),
            ScheduleError::Storage(msg) => AppError::Database(msg),
        }
    }
}

fn require_admin(user: &User) -> Result<(), AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only administrators can edit doctor schedules".to_string()));
    }
    Ok(())
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let schedule = state.schedules.get_schedule(doctor_id).await?;
    Ok(Json(json!(schedule)))
}

// ==============================================================================
// ADMINISTRATIVE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn initialize_schedule(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_admin(&user)?;

    let schedule = state.schedules.initialize_doctor(doctor_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "schedule": schedule,
            "message": "Doctor schedule initialized"
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_weekly_entry(
    State(state): State<Arc<DoctorCellState>>,
    Path((doctor_id, weekday)): Path<(Uuid, String)>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateWeeklyEntryRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let day: DayOfWeek = weekday.parse()?;
    let entry = state.schedules.update_weekly_entry(doctor_id, day, request).await?;

    Ok(Json(json!({
        "success": true,
        "entry": entry,
    })))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<Arc<DoctorCellState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateBookingProfileRequest>,
) -> Result<Json<Value>, AppError> {
    require_admin(&user)?;

    let profile = state.schedules.update_profile(doctor_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "profile": profile,
    })))
}

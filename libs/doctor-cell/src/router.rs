use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::ScheduleService;

pub struct DoctorCellState {
    pub config: Arc<AppConfig>,
    pub schedules: Arc<ScheduleService>,
}

pub fn doctor_routes(state: Arc<DoctorCellState>) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/{doctor_id}/schedule", get(handlers::get_schedule));

    // Administrative schedule edits
    let protected_routes = Router::new()
        .route("/{doctor_id}/schedule", post(handlers::initialize_schedule))
        .route("/{doctor_id}/schedule/{weekday}", put(handlers::update_weekly_entry))
        .route("/{doctor_id}/profile", put(handlers::update_profile))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

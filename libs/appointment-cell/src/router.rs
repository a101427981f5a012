// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::BookingService;

pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub booking: Arc<BookingService>,
}

pub fn appointment_routes(state: Arc<AppointmentCellState>) -> Router {
    // Estimates are visible before sign-in
    let public_routes = Router::new()
        .route("/availability", get(handlers::get_availability));

    let protected_routes = Router::new()
        .route("/", post(handlers::create_booking))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))
        .route("/doctors/{doctor_id}/days/{date}", get(handlers::list_doctor_day))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

pub mod clock;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use clock::ClinicClock;
pub use models::*;
pub use router::{appointment_routes, AppointmentCellState};

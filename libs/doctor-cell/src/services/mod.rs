pub mod repository;
pub mod schedule;

pub use repository::{InMemoryScheduleRepository, ScheduleRepository, SupabaseScheduleRepository};
pub use schedule::ScheduleService;

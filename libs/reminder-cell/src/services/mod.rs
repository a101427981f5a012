pub mod store;
pub mod mailer;
pub mod scheduler;
pub mod dispatcher;

pub use store::*;
pub use mailer::*;
pub use scheduler::*;
pub use dispatcher::*;

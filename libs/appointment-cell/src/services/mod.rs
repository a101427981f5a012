pub mod allocator;
pub mod booking;
pub mod ledger;
pub mod locking;

pub use allocator::{SlotAllocator, SlotDecision};
pub use booking::BookingService;
pub use ledger::{AppointmentLedger, FinishRecord, InMemoryLedger, LedgerError, SupabaseLedger};
pub use locking::{DayLease, DayLockManager, LocalDayLocks, LockError, RedisDayLocks};

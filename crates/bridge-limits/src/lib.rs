//! Rate limiting and daily token budget enforcement (spec §4.D, §4.E, §4.F, §4.I).
//!
//! [`rate_limiter::RateLimiter`] and [`budget::DailyTokenBudget`] each run
//! local, process-confined state by default and switch to the atomic-script
//! variants over [`store::SharedLimitStore`] when a shared backend connects.
//! [`approvals::ApprovalsStore`] backs the budget's auto-approve path with a
//! file ledger.

pub mod approvals;
pub mod budget;
pub mod rate_limiter;
pub mod store;

pub use approvals::ApprovalsStore;
pub use budget::{DailyTokenBudget, Reservation, UsageSnapshot};
pub use rate_limiter::RateLimiter;
pub use store::{RedisStore, SharedLimitStore};

pub mod aggregate;
pub mod manager;
pub mod merge;

pub use aggregate::aggregate_session;
pub use manager::{SessionManager, SweepReport};
pub use merge::{merge_reconnections, MergedSession};

pub mod summary;
pub mod sweep;

pub use summary::summarize_flight;
pub use sweep::{FlightSummarizer, FlightSweepReport};

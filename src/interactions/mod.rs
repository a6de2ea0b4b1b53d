pub mod config;
pub mod detection;
pub mod frequency;
pub mod matcher;
pub mod scoring;

pub use config::MatchConfig;
pub use detection::InteractionDetector;
pub use frequency::{frequency_report, mhz_label, FrequencyContact};
pub use matcher::{match_samples, InteractionMatch};

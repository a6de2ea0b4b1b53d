pub mod controller;
pub mod flight;
pub mod occupancy;
pub mod summary;
pub mod transceiver;

pub use controller::{ControllerIdentity, ControllerSession};
pub use flight::{FlightIdentity, FlightRecord, FlightStatus};
pub use occupancy::SectorOccupancy;
pub use summary::{AircraftDetail, ControllerContact, ControllerSummary, FlightContactSummary};
pub use transceiver::{SampleKind, TransceiverSample};

pub mod controllers;
pub mod flights;
pub mod occupancy;
pub mod summaries;
pub mod transceivers;

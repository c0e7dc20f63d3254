pub mod channel;
pub mod config;
pub mod error;
pub mod geo;
pub mod map;
pub mod models;
pub mod notify;
pub mod observability;
pub mod rides;
pub mod state;
pub mod telemetry;

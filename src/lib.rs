//! Poller for the Piedmont GIS COVID-19 dashboard.
//!
//! Watches the tile-data backend for a new `ultimo_aggiornamento`, downloads the
//! packed per-municipality case counts and stores each update as a comma-separated
//! CSV snapshot.

pub mod cli;
pub mod comuni;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod fetch;
pub mod header;
pub mod pipeline;
pub mod snapshot;
pub mod timestamp;
pub mod tui;
pub mod writer;

pub use error::{Error, Resource};

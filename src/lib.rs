//! statsync keeps a local, incrementally synchronized copy of marketplace sales statements, with
//! amounts converted to a second currency, and keeps the derived totals current as data and
//! settings change.

pub mod api;
pub mod args;
pub mod backfill;
pub mod clock;
pub mod commands;
mod config;
pub mod currency;
mod db;
mod error;
pub mod hub;
pub mod ingest;
mod library;
pub mod model;
pub mod persist;
pub mod queries;
pub mod query;
pub mod rates;
pub mod resource;
pub mod scheduler;
pub mod setting;
pub mod settings;
mod utils;


pub use api::Mode;
pub use config::Config;
pub use error::{Error, InvalidPayload, Result};
pub use library::Library;

//! Live document-state synchronization for balance-sheet processing.
//!
//! A [`services::channel::PushChannel`] delivers partial updates, an
//! [`api::DocumentApi`] serves authoritative snapshots, and the
//! [`services::state`] synchronizer reconciles both into the records behind
//! the open views.

pub mod api;
pub mod commands;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Settings;
pub use services::state::{spawn_synchronizer, SyncEvent, SyncHandle};

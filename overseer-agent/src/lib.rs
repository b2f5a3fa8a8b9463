//! Overseer - GPU occupancy notifier
//!
//! Watches GPU memory usage on this host and tells Telegram subscribers when it
//! changes in a way that matters:
//! - GPU snapshots from NVML, grouped per user
//! - Debounced change detection (topology, users, >50% memory swings)
//! - Subscriber discovery through the bot's update feed, persisted across restarts
//! - Best-effort delivery that tolerates individual recipient failures

pub mod config;
pub mod detector;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod notifier;
pub mod store;
pub mod telegram;

pub use error::{OverseerError, Result};

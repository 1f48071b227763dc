//! # icemon
//!
//! Persistent-connection liveness monitor for Icecast-style audio streams.
//!
//! One background worker holds a single long-lived connection to the stream
//! (optionally resolved through an `.m3u` playlist indirection) and watches
//! whether bytes keep arriving. Online/offline transitions are published over
//! an ordered channel to the coordinator, which dispatches them to an
//! external on-air controller on its own execution context. Connection loss
//! and data silence past the configured threshold fold into offline plus a
//! paced reconnect; nothing here is ever fatal to the hosting process.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use icemon::{OnAirController, SettingsStore, StreamMonitor};
//!
//! struct Controller;
//!
//! impl OnAirController for Controller {
//!     fn stream_online(&mut self) { /* reset timer, light the indicator */ }
//!     fn stream_offline(&mut self) { /* extinguish the indicator */ }
//! }
//!
//! struct Settings;
//!
//! impl SettingsStore for Settings {
//!     fn value(&self, _key: &str) -> Option<String> {
//!         None // defaults
//!     }
//! }
//!
//! # async fn run() -> Result<(), icemon::MonitorError> {
//! let mut monitor = StreamMonitor::new(Arc::new(Settings), Controller)?;
//! monitor.start().await;
//! loop {
//!     monitor.pump_events();
//!     tokio::time::sleep(std::time::Duration::from_millis(250)).await;
//! }
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod resolver;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::{MonitorSettings, SettingsStore};
pub use error::{MonitorError, ResolveError};
pub use events::StreamEvent;
pub use monitor::{OnAirController, StreamMonitor};
pub use worker::{ConnectionWorker, WorkerConfig, WorkerHandle};

//! HTTP control surface for Yeelight smart lights
//!
//! Yeego finds lights on the local network, keeps a live registry of them and
//! lets HTTP clients read their state and send commands. It provides:
//!
//! - SSDP discovery with periodic rescans and advertisement monitoring
//! - One control connection per light, with replies matched to commands by request id
//! - A bounded event channel for notifications and unclaimed replies
//! - Toggle, brightness, name, power, colour temperature and RGB commands
//! - A JSON HTTP API built on axum
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use yeego::{events, Dispatcher, LightController, Registry, Scanner, SsdpDiscoverer, TcpConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Registry::new();
//!     let (events_tx, events_rx) = events::channel(256);
//!     let _dispatcher = Dispatcher::spawn(events_rx);
//!
//!     let scanner = Scanner::new(
//!         SsdpDiscoverer::new(),
//!         TcpConnector::default(),
//!         registry.clone(),
//!         events_tx,
//!         Duration::from_secs(3),
//!         "",
//!     );
//!     scanner.initial_scan().await?;
//!
//!     let controller = LightController::new(registry.clone(), Duration::from_secs(2));
//!     for light in registry.list().await {
//!         controller.set_brightness(light.id(), "50", 500).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Registry**: concurrent map of light handles
//! - **Scanner**: discovery, merge and connect policy, rescan loop
//! - **Connection**: JSON-lines control link with a per-link table of pending requests
//! - **Controller**: validated commands that wait for their reply
//! - **Dispatcher**: drains notifications and late replies
//! - **API**: axum routes over the controller and registry

pub mod api;
pub mod config;
mod connection;
mod controller;
mod discovery;
mod dispatcher;
mod error;
pub mod events;
mod light;
mod link;
mod protocol;
mod registry;
mod ssdp;
mod types;

// Public exports
pub use api::{ApiResult, AppState};
pub use config::Config;
pub use connection::{Connection, PendingRequest};
pub use controller::{Command, LightController, DEFAULT_COMMAND_TIMEOUT};
pub use discovery::{Connector, Discoverer, Scanner};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use error::{Result, YeegoError};
pub use events::{DeviceEvent, EventReceiver, EventSender};
pub use light::{Light, LightSnapshot};
pub use link::TcpConnector;
pub use protocol::{CommandReply, CommandRequest, Incoming};
pub use registry::{Registry, Upsert};
pub use ssdp::SsdpDiscoverer;
pub use types::{
    DeviceErrorPayload, DeviceId, DiscoveredLight, LightInfo, LightState, RequestId, Transition,
};

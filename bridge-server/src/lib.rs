//! Print Bridge - local bridge between web POS terminals and receipt printers
//!
//! Two ingress paths feed the same transports:
//!
//! - **WebSocket** (`server`): a browser on the LAN sends JSON commands and
//!   gets synchronous replies
//! - **Cloud queue** (`cloud`): devices on other networks enqueue jobs into
//!   a per-restaurant document collection that the bridge polls and drains
//!
//! # Module structure
//!
//! ```text
//! bridge-server/src/
//! ├── cli.rs         # flags + environment defaulting
//! ├── config.rs      # runtime config snapshot + on-disk store
//! ├── supervisor.rs  # owns config mutation and the poller lifecycle
//! ├── cloud/         # queue store client, job model, poller
//! ├── server/        # WebSocket upgrade, origin policy, command dispatch
//! └── logging.rs     # tracing setup
//! ```
//!
//! Byte payloads pass through untouched in both directions; rendering and
//! format conversion are someone else's problem.

pub mod cli;
pub mod cloud;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod supervisor;

// Re-export public types
pub use cloud::{CloudPoller, QueueStore};
pub use config::{ConfigStore, RuntimeConfig};
pub use error::{BridgeError, BridgeResult};
pub use server::{AppState, OriginPolicy};
pub use supervisor::Supervisor;

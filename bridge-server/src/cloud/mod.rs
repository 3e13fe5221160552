//! Cloud print queue integration
//!
//! Other devices enqueue jobs into a per-restaurant document collection;
//! this module polls it, claims jobs, and executes them through the
//! transports in `bridge-printer`.

pub mod job;
pub mod poller;
pub mod store;

pub use job::{JobStatus, JobTarget, PrintJob};
pub use poller::{CloudPoller, DEFAULT_POLL_INTERVAL};
pub use store::{FieldValue, MapFields, QueueStore, StoreDocument, StoreError};

//! Synheart Relay - Wrist-side sensor aggregation and batched relay
//!
//! Relay runs on the watch. It collects heart-rate and accelerometer samples,
//! validates heart-rate readings, groups motion samples into fixed-size batches
//! and sends each batch to the paired companion device over a wireless message
//! channel: sensor callback → buffer → formation policy → JSON encoding →
//! first connected peer.
//!
//! ## Modules
//!
//! - **Session**: [`AggregationSession`] ties the sensor paths together for one
//!   tracking period
//! - **Sync**: [`SyncFacade`] exports the retained heart-rate history on demand
//! - **Transport**: the [`Transport`] trait abstracts the companion link; an
//!   in-memory implementation backs tests and simulation
//! - **FFI**: C bindings for the host platform

pub mod buffer;
pub mod clock;
pub mod config;
pub mod connection;
pub mod encoder;
pub mod error;
pub mod history;
pub mod observer;
pub mod policy;
pub mod session;
pub mod sync;
pub mod transmitter;
pub mod transport;
pub mod types;
pub mod validator;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::RelayConfig;
pub use error::{RelayError, TransportError};
pub use session::{AggregationSession, MotionSensor, SessionDiagnostics};
pub use sync::SyncFacade;
pub use transport::{Peer, Transport};

/// Relay version reported by the CLI and FFI
pub const RELAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "synheart-relay";

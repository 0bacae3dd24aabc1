//! `hostforge-core`: building blocks shared by every HostForge crate.
//!
//! - [`Event`]: immutable bus message
//! - [`EventBus`]: bounded, asynchronous publish/subscribe with drain-on-close
//! - [`CancelScope`]: cancellation + deadline threaded through blocking calls

pub mod bus;
pub mod cancel;
pub mod error;
pub mod event;

pub use bus::{BusConfig, EventBus, EventHandler, Subscription};
pub use cancel::{CancelReason, CancelScope};
pub use error::BusError;
pub use event::Event;

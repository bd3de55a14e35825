//! # gatelink-core
//!
//! Foundation shared by the gatelink crates:
//!
//! - **Event surface**: [`EventBus`], a typed publish/subscribe registry keyed
//!   by event-kind strings with synchronous, ordered delivery
//! - **Logging**: [`logging::init_subscriber`] for binaries and
//!   [`logging::capture_logs`] for tests

#![deny(unsafe_code)]

pub mod events;
pub mod logging;

pub use events::{Event, EventBus, Listener, ListenerId};

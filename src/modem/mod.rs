//! # Modem Module
//!
//! Collaborators built on top of the cellular modem's command transport.
//!
//! This module handles:
//! - Reset, boot wait and network attach
//! - Network time (`AT+CCLK?`) as a [`crate::record::TimeSource`]
//! - GNSS position (`AT+CGPSINFO`) as a [`crate::record::LocationSource`]
//!
//! All of them share one transport; the lock is held for a whole exchange
//! sequence so commands from different collaborators never interleave.

pub mod bring_up;
pub mod clock;
pub mod gnss;

pub use bring_up::BringUp;
pub use clock::ModemClock;
pub use gnss::ModemGnss;

use std::sync::Arc;
use tokio::sync::Mutex;

/// Transport handle shared between modem collaborators
pub type SharedTransport<T> = Arc<Mutex<T>>;

/// Wrap a transport for sharing.
pub fn share<T>(transport: T) -> SharedTransport<T> {
    Arc::new(Mutex::new(transport))
}

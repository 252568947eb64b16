//! Virtual NIC sessions
//!
//! This module ties the host boundary to the caller-facing API:
//! - Lifecycle: blocking open/close over the host's completion handlers
//! - Events: packets-available notifications on a dedicated serial queue
//! - Packet I/O: single-packet blocking read and write

pub mod interface;
pub mod io;
pub mod notifier;

// Re-export commonly used items
pub use crate::host::EventKind;
pub use interface::{Interface, InterfaceAttributes};
pub use io::ReadResult;
pub use notifier::{EventNotifier, EventSink, InterfaceEvent};

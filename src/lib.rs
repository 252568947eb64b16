//! Blocking bridge to a host virtual network interface
//!
//! This library opens and closes a virtual NIC provided by the host
//! networking subsystem and moves Ethernet frames across it:
//! - Interface identifiers from an optional caller hint
//! - Synchronous open/close over the host's asynchronous start/stop
//! - Packets-available events delivered in order on a per-interface queue
//! - Single-packet blocking read and write over scatter/gather descriptors

pub mod dispatch;
pub mod error;
pub mod host;
pub mod iface;
pub mod identifier;
pub mod mac;
pub mod status;

// Re-export commonly used types
pub use error::{Error, Result};
pub use host::{HostNetwork, LoopbackConfig, LoopbackHost};
#[cfg(target_os = "linux")]
pub use host::{TapConfig, TapHost};
pub use iface::{EventKind, EventSink, Interface, InterfaceAttributes, InterfaceEvent, ReadResult};
pub use mac::MacAddress;
pub use status::HostStatus;

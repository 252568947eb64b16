//! Host networking subsystem boundary
//!
//! The host owns the actual virtual NIC. It speaks three protocols:
//! - start/stop requests answered by a completion handler posted on a queue
//! - blocking read/write over scatter/gather packet descriptors
//! - registration of an event callback dispatched on a caller-chosen queue
//!
//! [`HostNetwork`] captures those protocols; [`loopback`] is an in-process
//! implementation and [`tap`] drives a Linux TAP device.

pub mod loopback;
mod port;
#[cfg(target_os = "linux")]
pub mod tap;

use crate::dispatch::QueueHandle;
use crate::status::HostStatus;
use std::io::{IoSlice, IoSliceMut};
use std::sync::Arc;
use uuid::Uuid;

pub use loopback::{LoopbackConfig, LoopbackHost, LoopbackInterface};
#[cfg(target_os = "linux")]
pub use tap::{TapConfig, TapHost, TapInterface};

/// How the interface is attached to the host network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationMode {
    /// Private network between guest and host only
    Host,
    /// NAT through the host's uplink
    #[default]
    Shared,
    /// Attached to a physical interface
    Bridged,
}

impl OperationMode {
    pub fn code(self) -> u64 {
        match self {
            OperationMode::Host => 1000,
            OperationMode::Shared => 1001,
            OperationMode::Bridged => 1002,
        }
    }
}

/// Configuration handed to `start_interface`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub operation_mode: OperationMode,
    pub identifier: Uuid,
}

impl InterfaceDescriptor {
    pub fn shared(identifier: Uuid) -> Self {
        InterfaceDescriptor {
            operation_mode: OperationMode::Shared,
            identifier,
        }
    }
}

/// Attributes reported by a successful start completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceParams {
    pub mtu: u64,
    pub max_packet_size: u64,
    /// Hardware address in the host's string form
    pub mac_address: String,
    /// May differ from the requested identifier if the host reassigned it
    pub identifier: Uuid,
}

/// Payload of a successful start completion
#[derive(Debug)]
pub struct StartedInterface<H> {
    pub handle: H,
    pub params: InterfaceParams,
}

pub type StartCompletion<H> = Box<dyn FnOnce(HostStatus, Option<StartedInterface<H>>) + Send>;
pub type StopCompletion = Box<dyn FnOnce(HostStatus) + Send>;

/// Interface event identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PacketsAvailable,
    /// Identifier this crate does not know, forwarded as-is
    Other(u32),
}

impl EventKind {
    pub const PACKETS_AVAILABLE: u32 = 1 << 0;

    pub fn from_code(code: u32) -> Self {
        match code {
            Self::PACKETS_AVAILABLE => EventKind::PacketsAvailable,
            other => EventKind::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            EventKind::PacketsAvailable => Self::PACKETS_AVAILABLE,
            EventKind::Other(code) => code,
        }
    }
}

/// Event payload as raised by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEvent {
    /// Estimate only; reads may find fewer packets
    pub estimated_packets: u64,
}

pub type EventCallback = Arc<dyn Fn(u32, HostEvent) + Send + Sync>;

/// Event callback together with the queue the host must post it on
#[derive(Clone)]
pub struct EventRegistration {
    pub queue: QueueHandle,
    pub callback: EventCallback,
}

impl EventRegistration {
    /// Post one event on the registered queue
    pub fn raise(&self, code: u32, event: HostEvent) -> bool {
        let callback = self.callback.clone();
        self.queue.dispatch(move || callback(code, event))
    }
}

/// Receive-side packet descriptor
///
/// `size` is the total capacity of `iov` going in and the received packet
/// size coming out.
pub struct RxPacket<'a, 'b> {
    pub iov: &'a mut [IoSliceMut<'b>],
    pub size: usize,
    pub flags: u32,
}

/// Transmit-side packet descriptor
pub struct TxPacket<'a, 'b> {
    pub iov: &'a [IoSlice<'b>],
    pub size: usize,
    pub flags: u32,
}

/// The host networking subsystem
///
/// `count` arguments to `read`/`write` are in/out: the number of descriptors
/// offered going in, the number of packets transferred coming out.
pub trait HostNetwork: Send + Sync + 'static {
    /// Opaque reference to a started interface
    type Handle: Send + Sync + 'static;

    /// Request an interface start
    ///
    /// `Err` means the request was rejected and `completion` will never run.
    /// Otherwise `completion` runs exactly once on `queue`.
    fn start_interface(
        &self,
        descriptor: &InterfaceDescriptor,
        queue: &QueueHandle,
        completion: StartCompletion<Self::Handle>,
    ) -> Result<(), HostStatus>;

    /// Request an interface stop, same completion contract as start
    fn stop_interface(
        &self,
        handle: &Self::Handle,
        queue: &QueueHandle,
        completion: StopCompletion,
    ) -> Result<(), HostStatus>;

    /// Register (`Some`) or remove (`None`) the callback for `kind`
    ///
    /// Once removal returns, no further callbacks are posted.
    fn set_event_callback(
        &self,
        handle: &Self::Handle,
        kind: EventKind,
        registration: Option<EventRegistration>,
    ) -> Result<(), HostStatus>;

    fn read(&self, handle: &Self::Handle, packets: &mut [RxPacket<'_, '_>], count: &mut usize)
        -> HostStatus;

    fn write(&self, handle: &Self::Handle, packets: &[TxPacket<'_, '_>], count: &mut usize)
        -> HostStatus;
}

/// Copy `frame` across the regions of `iov`
///
/// Returns None if the regions cannot hold the whole frame.
pub(crate) fn scatter(frame: &[u8], iov: &mut [IoSliceMut<'_>]) -> Option<usize> {
    let capacity: usize = iov.iter().map(|region| region.len()).sum();
    if frame.len() > capacity {
        return None;
    }

    let mut offset = 0;
    for region in iov.iter_mut() {
        if offset == frame.len() {
            break;
        }
        let take = region.len().min(frame.len() - offset);
        region[..take].copy_from_slice(&frame[offset..offset + take]);
        offset += take;
    }
    Some(offset)
}

/// Collect the first `size` bytes described by `iov` into one frame
///
/// Returns None if the regions hold fewer than `size` bytes.
pub(crate) fn gather(iov: &[IoSlice<'_>], size: usize) -> Option<Vec<u8>> {
    let mut frame = Vec::with_capacity(size);
    for region in iov {
        if frame.len() == size {
            break;
        }
        let take = region.len().min(size - frame.len());
        frame.extend_from_slice(&region[..take]);
    }

    if frame.len() == size {
        Some(frame)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_codes() {
        assert_eq!(EventKind::from_code(1), EventKind::PacketsAvailable);
        assert_eq!(EventKind::from_code(8), EventKind::Other(8));
        assert_eq!(EventKind::PacketsAvailable.code(), 1);
    }

    #[test]
    fn test_default_descriptor_is_shared() {
        let id = Uuid::new_v4();
        let descriptor = InterfaceDescriptor::shared(id);
        assert_eq!(descriptor.operation_mode, OperationMode::default());
        assert_eq!(descriptor.operation_mode.code(), 1001);
        assert_eq!(descriptor.identifier, id);
    }

    #[test]
    fn test_scatter_spans_regions() {
        let mut a = [0u8; 3];
        let mut b = [0u8; 4];
        let mut iov = [IoSliceMut::new(&mut a), IoSliceMut::new(&mut b)];

        assert_eq!(scatter(&[1, 2, 3, 4, 5], &mut iov), Some(5));
        assert_eq!(scatter(&[0; 8], &mut iov), None);
        drop(iov);
        assert_eq!(a, [1, 2, 3]);
        assert_eq!(b, [4, 5, 0, 0]);
    }

    #[test]
    fn test_gather_respects_size() {
        let a = [1u8, 2];
        let b = [3u8, 4, 5];
        let iov = [IoSlice::new(&a), IoSlice::new(&b)];

        assert_eq!(gather(&iov, 4), Some(vec![1, 2, 3, 4]));
        assert_eq!(gather(&iov, 0), Some(vec![]));
        assert_eq!(gather(&iov, 6), None);
    }
}

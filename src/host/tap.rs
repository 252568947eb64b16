//! Linux TAP device host
//!
//! Each started interface owns one TAP device opened with packet
//! information enabled. The 4-byte header in front of every frame carries
//! the per-packet flags word (native endian) and the EtherType (big endian).
//! A pump thread drains the device into a receive queue and raises
//! packets-available events as frames arrive.

use super::port::{collect_frames, Frame, Port, DEFAULT_QUEUE_CAPACITY};
use super::{
    EventKind, EventRegistration, HostNetwork, InterfaceDescriptor, InterfaceParams, RxPacket,
    StartCompletion, StartedInterface, StopCompletion, TxPacket,
};
use crate::dispatch::QueueHandle;
use crate::status::HostStatus;
use byteorder::{BigEndian, ByteOrder, NativeEndian};
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use tun_tap::{Iface, Mode};
use uuid::Uuid;

/// Length of the packet information header
pub const PACKET_INFO_LEN: usize = 4;
const ETHERNET_HEADER_LEN: usize = 14;

/// TAP host settings
#[derive(Debug, Clone)]
pub struct TapConfig {
    /// Device name; `%d` lets the kernel pick the number
    pub name: String,
    pub mtu: u64,
    /// Sleep between polls of an idle device
    pub poll_interval: Duration,
    /// Unread frames held per interface
    ///
    /// While the queue is full the device is not drained, so further frames
    /// wait in (and are dropped by) the kernel's own queue.
    pub queue_capacity: usize,
}

impl Default for TapConfig {
    fn default() -> Self {
        TapConfig {
            name: "vnic%d".to_string(),
            mtu: 1500,
            poll_interval: Duration::from_millis(5),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Started TAP interface
pub struct TapInterface {
    iface: Iface,
    identifier: Uuid,
    max_packet_size: usize,
    port: Port,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl TapInterface {
    /// Kernel name of the device, e.g. `vnic0`
    pub fn name(&self) -> &str {
        self.iface.name()
    }

    pub fn identifier(&self) -> Uuid {
        self.identifier
    }
}

/// Host backed by Linux TAP devices
///
/// The packet information header only has room for 16 bits of flags, so
/// writes whose flags exceed `u16::MAX` are refused with `INVALID_ARGUMENT`.
#[derive(Default)]
pub struct TapHost {
    config: TapConfig,
}

impl TapHost {
    pub fn new(config: TapConfig) -> Self {
        TapHost { config }
    }

    fn open_device(
        &self,
        descriptor: &InterfaceDescriptor,
    ) -> Result<StartedInterface<Arc<TapInterface>>, HostStatus> {
        let iface = Iface::new(&self.config.name, Mode::Tap).map_err(status_from_io)?;
        iface.set_non_blocking().map_err(status_from_io)?;

        let mac_address = read_mac_address(iface.name());
        let max_packet_size = self.config.mtu as usize + ETHERNET_HEADER_LEN;
        let tap = Arc::new(TapInterface {
            iface,
            identifier: descriptor.identifier,
            max_packet_size,
            port: Port::new(self.config.queue_capacity),
            pump: Mutex::new(None),
        });

        let pump = {
            let tap = tap.clone();
            let poll_interval = self.config.poll_interval;
            thread::Builder::new()
                .name(format!("{}.pump", tap.name()))
                .spawn(move || pump_frames(tap, poll_interval))
                .map_err(status_from_io)?
        };
        *tap.pump.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(pump);

        info!(device = tap.name(), identifier = %descriptor.identifier, "tap device opened");
        Ok(StartedInterface {
            params: InterfaceParams {
                mtu: self.config.mtu,
                max_packet_size: max_packet_size as u64,
                mac_address,
                identifier: descriptor.identifier,
            },
            handle: tap,
        })
    }
}

impl HostNetwork for TapHost {
    type Handle = Arc<TapInterface>;

    fn start_interface(
        &self,
        descriptor: &InterfaceDescriptor,
        queue: &QueueHandle,
        completion: StartCompletion<Self::Handle>,
    ) -> Result<(), HostStatus> {
        let dispatched = match self.open_device(descriptor) {
            Ok(started) => queue.dispatch(move || completion(HostStatus::SUCCESS, Some(started))),
            Err(status) => {
                warn!(name = %self.config.name, %status, "failed to open tap device");
                queue.dispatch(move || completion(status, None))
            }
        };
        if !dispatched {
            return Err(HostStatus::FAILURE);
        }
        Ok(())
    }

    fn stop_interface(
        &self,
        handle: &Self::Handle,
        queue: &QueueHandle,
        completion: StopCompletion,
    ) -> Result<(), HostStatus> {
        if !handle.port.stop() {
            return Err(HostStatus::INVALID_ARGUMENT);
        }

        let pump = handle
            .pump
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let device = handle.name().to_string();
        let dispatched = queue.dispatch(move || {
            let status = match pump.map(JoinHandle::join) {
                Some(Err(_)) => HostStatus::FAILURE,
                _ => HostStatus::SUCCESS,
            };
            debug!(device = %device, %status, "tap pump stopped");
            completion(status);
        });
        if !dispatched {
            return Err(HostStatus::FAILURE);
        }
        Ok(())
    }

    fn set_event_callback(
        &self,
        handle: &Self::Handle,
        kind: EventKind,
        registration: Option<EventRegistration>,
    ) -> Result<(), HostStatus> {
        if kind != EventKind::PacketsAvailable {
            return Err(HostStatus::INVALID_ARGUMENT);
        }
        handle.port.set_events(registration)
    }

    fn read(
        &self,
        handle: &Self::Handle,
        packets: &mut [RxPacket<'_, '_>],
        count: &mut usize,
    ) -> HostStatus {
        handle.port.read_into(packets, count)
    }

    fn write(
        &self,
        handle: &Self::Handle,
        packets: &[TxPacket<'_, '_>],
        count: &mut usize,
    ) -> HostStatus {
        if !handle.port.is_running() {
            *count = 0;
            return HostStatus::INVALID_ARGUMENT;
        }

        let frames = match collect_frames(packets, count, handle.max_packet_size) {
            Ok(frames) => frames,
            Err(status) => return status,
        };
        let mut headers = Vec::with_capacity(frames.len());
        for frame in &frames {
            match packet_info_flags(frame.flags) {
                Ok(flags) => headers.push(encode_packet_info(flags, ethertype(&frame.data))),
                Err(status) => {
                    *count = 0;
                    return status;
                }
            }
        }

        *count = 0;
        let mut buf = Vec::with_capacity(PACKET_INFO_LEN + handle.max_packet_size);
        for (header, frame) in headers.iter().zip(&frames) {
            buf.clear();
            buf.extend_from_slice(header);
            buf.extend_from_slice(&frame.data);

            match handle.iface.send(&buf) {
                Ok(_) => *count += 1,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return HostStatus::BUFFER_EXHAUSTED
                }
                Err(err) => {
                    warn!(device = handle.name(), error = %err, "tap send failed");
                    return HostStatus::FAILURE;
                }
            }
        }
        HostStatus::SUCCESS
    }
}

/// Drain the device into the receive queue until the port stops
fn pump_frames(tap: Arc<TapInterface>, poll_interval: Duration) {
    let mut buf = vec![0u8; PACKET_INFO_LEN + tap.max_packet_size];

    while tap.port.is_running() {
        if tap.port.is_full() {
            thread::sleep(poll_interval);
            continue;
        }
        match tap.iface.recv(&mut buf) {
            Ok(n) if n > PACKET_INFO_LEN => {
                let (flags, _proto) = decode_packet_info(&buf[..PACKET_INFO_LEN]);
                let frame = Frame {
                    data: buf[PACKET_INFO_LEN..n].to_vec(),
                    flags: flags as u32,
                };
                match tap.port.push(frame) {
                    Ok(()) => {}
                    Err(HostStatus::BUFFER_EXHAUSTED) => {
                        warn!(device = tap.name(), "receive queue full, frame dropped");
                    }
                    Err(_) => break,
                }
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => thread::sleep(poll_interval),
            Err(err) => {
                warn!(device = tap.name(), error = %err, "tap receive failed");
                thread::sleep(poll_interval);
            }
        }
    }
}

/// Build the packet information header
pub fn encode_packet_info(flags: u16, proto: u16) -> [u8; PACKET_INFO_LEN] {
    let mut header = [0u8; PACKET_INFO_LEN];
    NativeEndian::write_u16(&mut header[0..2], flags);
    BigEndian::write_u16(&mut header[2..4], proto);
    header
}

/// Split a packet information header into (flags, proto)
pub fn decode_packet_info(header: &[u8]) -> (u16, u16) {
    (
        NativeEndian::read_u16(&header[0..2]),
        BigEndian::read_u16(&header[2..4]),
    )
}

/// Flags word for the packet information header
fn packet_info_flags(flags: u32) -> Result<u16, HostStatus> {
    u16::try_from(flags).map_err(|_| HostStatus::INVALID_ARGUMENT)
}

/// EtherType of an Ethernet frame, 0 if the frame is too short
fn ethertype(frame: &[u8]) -> u16 {
    if frame.len() < ETHERNET_HEADER_LEN {
        return 0;
    }
    BigEndian::read_u16(&frame[12..14])
}

fn read_mac_address(device: &str) -> String {
    let path = format!("/sys/class/net/{}/address", device);
    match fs::read_to_string(&path) {
        Ok(text) => text.trim().to_string(),
        Err(err) => {
            warn!(path = %path, error = %err, "could not read tap hardware address");
            String::new()
        }
    }
}

fn status_from_io(err: io::Error) -> HostStatus {
    match err.kind() {
        io::ErrorKind::PermissionDenied => HostStatus::INVALID_ACCESS,
        io::ErrorKind::OutOfMemory => HostStatus::MEM_FAILURE,
        io::ErrorKind::InvalidInput => HostStatus::INVALID_ARGUMENT,
        _ => HostStatus::FAILURE,
    }
}

//! In-process loopback host
//!
//! Every frame written to a loopback interface is queued for reading on the
//! same interface and raises a packets-available event. The host can be told
//! to misbehave (reject or fail start/stop, reassign identifiers, report
//! zero-packet successes) so callers can exercise their error paths.

use super::port::{collect_frames, Port, DEFAULT_QUEUE_CAPACITY};
use super::{
    EventKind, EventRegistration, HostNetwork, InterfaceDescriptor, InterfaceParams, RxPacket,
    StartCompletion, StartedInterface, StopCompletion, TxPacket,
};
use crate::dispatch::QueueHandle;
use crate::status::HostStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const DEFAULT_MTU: u64 = 1500;
const ETHERNET_HEADER_LEN: u64 = 14;

/// Behaviour of a [`LoopbackHost`]
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub mtu: u64,
    pub max_packet_size: u64,
    pub mac_address: String,
    /// Identifier reported instead of the requested one
    pub assigned_identifier: Option<Uuid>,
    /// Reject start requests synchronously with this status
    pub reject_start: Option<HostStatus>,
    /// Status delivered by the start completion
    pub start_status: HostStatus,
    /// Reject stop requests synchronously with this status
    pub reject_stop: Option<HostStatus>,
    /// Status delivered by the stop completion
    pub stop_status: HostStatus,
    /// Report success with zero packets on every read
    pub spurious_reads: bool,
    /// Report success with zero packets on every write
    pub spurious_writes: bool,
    /// Accept start requests but drop the completion without calling it
    pub drop_start_completion: bool,
    /// Accept stop requests but drop the completion without calling it
    pub drop_stop_completion: bool,
    /// Unread frames held per interface; writes beyond it fail
    pub queue_capacity: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        LoopbackConfig {
            mtu: DEFAULT_MTU,
            max_packet_size: DEFAULT_MTU + ETHERNET_HEADER_LEN,
            mac_address: "02:00:5e:10:00:01".to_string(),
            assigned_identifier: None,
            reject_start: None,
            start_status: HostStatus::SUCCESS,
            reject_stop: None,
            stop_status: HostStatus::SUCCESS,
            spurious_reads: false,
            spurious_writes: false,
            drop_start_completion: false,
            drop_stop_completion: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Started loopback interface
pub struct LoopbackInterface {
    identifier: Uuid,
    max_packet_size: usize,
    port: Port,
}

impl LoopbackInterface {
    pub fn identifier(&self) -> Uuid {
        self.identifier
    }

    /// Frames written but not yet read
    pub fn pending(&self) -> usize {
        self.port.pending()
    }

    pub fn is_running(&self) -> bool {
        self.port.is_running()
    }
}

/// Host whose interfaces loop written frames back to the reader
#[derive(Default)]
pub struct LoopbackHost {
    config: LoopbackConfig,
    active: Arc<AtomicUsize>,
}

impl LoopbackHost {
    pub fn new(config: LoopbackConfig) -> Self {
        LoopbackHost {
            config,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    /// Interfaces started and not yet stopped
    pub fn active_interfaces(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl HostNetwork for LoopbackHost {
    type Handle = Arc<LoopbackInterface>;

    fn start_interface(
        &self,
        descriptor: &InterfaceDescriptor,
        queue: &QueueHandle,
        completion: StartCompletion<Self::Handle>,
    ) -> Result<(), HostStatus> {
        if let Some(status) = self.config.reject_start {
            return Err(status);
        }
        if self.config.drop_start_completion {
            debug!(identifier = %descriptor.identifier, "dropping start completion");
            drop(completion);
            return Ok(());
        }

        let status = self.config.start_status;
        let started = if status.is_success() {
            let identifier = self
                .config
                .assigned_identifier
                .unwrap_or(descriptor.identifier);
            self.active.fetch_add(1, Ordering::SeqCst);
            Some(StartedInterface {
                handle: Arc::new(LoopbackInterface {
                    identifier,
                    max_packet_size: self.config.max_packet_size as usize,
                    port: Port::new(self.config.queue_capacity),
                }),
                params: InterfaceParams {
                    mtu: self.config.mtu,
                    max_packet_size: self.config.max_packet_size,
                    mac_address: self.config.mac_address.clone(),
                    identifier,
                },
            })
        } else {
            None
        };

        debug!(
            identifier = %descriptor.identifier,
            mode = ?descriptor.operation_mode,
            %status,
            "loopback start requested"
        );
        let counted = started.is_some();
        if !queue.dispatch(move || completion(status, started)) {
            if counted {
                self.active.fetch_sub(1, Ordering::SeqCst);
            }
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
        if let Some(status) = self.config.reject_stop {
            return Err(status);
        }
        if !handle.port.stop() {
            return Err(HostStatus::INVALID_ARGUMENT);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.config.drop_stop_completion {
            debug!(identifier = %handle.identifier, "dropping stop completion");
            drop(completion);
            return Ok(());
        }

        let status = self.config.stop_status;
        debug!(identifier = %handle.identifier, %status, "loopback stop requested");
        if !queue.dispatch(move || completion(status)) {
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
        if self.config.spurious_reads && handle.port.is_running() {
            *count = 0;
            return HostStatus::SUCCESS;
        }
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
        if self.config.spurious_writes {
            *count = 0;
            return HostStatus::SUCCESS;
        }

        let frames = match collect_frames(packets, count, handle.max_packet_size) {
            Ok(frames) => frames,
            Err(status) => return status,
        };
        *count = 0;
        for frame in frames {
            if let Err(status) = handle.port.push(frame) {
                return status;
            }
            *count += 1;
        }
        HostStatus::SUCCESS
    }
}

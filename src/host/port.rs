//! Receive queue and event registration shared by the in-process hosts

use super::{gather, scatter, EventKind, EventRegistration, HostEvent, RxPacket, TxPacket};
use crate::status::HostStatus;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Frames a port holds before refusing more
pub(crate) const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// One received frame waiting to be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub data: Vec<u8>,
    pub flags: u32,
}

struct PortState {
    frames: VecDeque<Frame>,
    running: bool,
    events: Option<EventRegistration>,
}

/// Pending frames of one started interface
pub(crate) struct Port {
    state: Mutex<PortState>,
    readable: Condvar,
    capacity: usize,
}

impl Port {
    /// Create a running port holding at most `capacity` unread frames
    pub fn new(capacity: usize) -> Self {
        Port {
            state: Mutex::new(PortState {
                frames: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
                running: true,
                events: None,
            }),
            readable: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn pending(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_full(&self) -> bool {
        self.lock().frames.len() >= self.capacity
    }

    /// Mark the port stopped, dropping queued frames and the event callback
    ///
    /// Returns false if it was already stopped.
    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        if !state.running {
            return false;
        }
        state.running = false;
        state.frames.clear();
        state.events = None;
        self.readable.notify_all();
        true
    }

    pub fn set_events(&self, registration: Option<EventRegistration>) -> Result<(), HostStatus> {
        let mut state = self.lock();
        if !state.running {
            return Err(HostStatus::INVALID_ARGUMENT);
        }
        state.events = registration;
        Ok(())
    }

    /// Queue a received frame and raise a packets-available event
    ///
    /// A full queue refuses the frame with `BUFFER_EXHAUSTED`.
    pub fn push(&self, frame: Frame) -> Result<(), HostStatus> {
        let mut state = self.lock();
        if !state.running {
            return Err(HostStatus::INVALID_ARGUMENT);
        }
        if state.frames.len() >= self.capacity {
            return Err(HostStatus::BUFFER_EXHAUSTED);
        }
        state.frames.push_back(frame);
        self.readable.notify_one();

        // Posted under the lock: after set_events(None) returns nothing more
        // reaches the queue.
        if let Some(registration) = &state.events {
            let event = HostEvent {
                estimated_packets: state.frames.len() as u64,
            };
            registration.raise(EventKind::PACKETS_AVAILABLE, event);
        }
        Ok(())
    }

    /// Fill `packets` from the queue, blocking until at least one frame is
    /// available or the port stops
    pub fn read_into(&self, packets: &mut [RxPacket<'_, '_>], count: &mut usize) -> HostStatus {
        let wanted = (*count).min(packets.len());
        *count = 0;
        if wanted == 0 {
            return HostStatus::INVALID_ARGUMENT;
        }

        let mut state = self.lock();
        while state.running && state.frames.is_empty() {
            state = self
                .readable
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if !state.running {
            return HostStatus::INVALID_ARGUMENT;
        }

        for packet in packets.iter_mut().take(wanted) {
            let Some(frame) = state.frames.front() else {
                break;
            };
            if frame.data.len() > packet.size {
                return HostStatus::PACKET_TOO_BIG;
            }
            let Some(written) = scatter(&frame.data, &mut *packet.iov) else {
                return HostStatus::PACKET_TOO_BIG;
            };
            packet.size = written;
            packet.flags = frame.flags;
            state.frames.pop_front();
            *count += 1;
        }
        HostStatus::SUCCESS
    }
}

/// Collect transmit descriptors into frames
///
/// Any descriptor larger than `max_packet_size` fails the whole batch;
/// `count` is set to the number of frames returned.
pub(crate) fn collect_frames(
    packets: &[TxPacket<'_, '_>],
    count: &mut usize,
    max_packet_size: usize,
) -> Result<Vec<Frame>, HostStatus> {
    let wanted = (*count).min(packets.len());
    *count = 0;
    if wanted == 0 {
        return Err(HostStatus::INVALID_ARGUMENT);
    }

    let mut frames = Vec::with_capacity(wanted);
    for packet in &packets[..wanted] {
        if packet.size > max_packet_size {
            return Err(HostStatus::PACKET_TOO_BIG);
        }
        let data = gather(packet.iov, packet.size).ok_or(HostStatus::INVALID_ARGUMENT)?;
        frames.push(Frame {
            data,
            flags: packet.flags,
        });
    }
    *count = frames.len();
    Ok(frames)
}

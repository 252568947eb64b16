//! Packet read/write against an open interface
//!
//! Each call hands the host a single-entry scatter/gather descriptor over the
//! caller's buffer and blocks inside the host until the transfer completes.
//! The buffer is only borrowed for the duration of the call.

use super::interface::Interface;
use crate::error::{Error, Result};
use crate::host::{HostNetwork, RxPacket, TxPacket};
use crate::status::HostStatus;
use std::io::{IoSlice, IoSliceMut};
use std::slice;
use tracing::debug;

/// Outcome of a successful read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    /// Bytes of the buffer holding the packet; the rest is unspecified
    pub packet_size: usize,
    /// Per-packet flags reported by the host
    pub flags: u32,
}

impl<H: HostNetwork> Interface<H> {
    /// Read one packet into `buf`, blocking until one arrives
    ///
    /// `buf` must hold at least `max_packet_size` bytes. There is no timeout;
    /// a concurrent [`close`](Interface::close) ends the wait with
    /// [`Error::NotOpen`]. A host success that transferred no packet is reported as
    /// [`Error::SpuriousReadSuccess`].
    pub fn read(&self, buf: &mut [u8]) -> Result<ReadResult> {
        let session = self.session()?;
        let required = session.attributes.max_packet_size as usize;
        let capacity = buf.len();
        if capacity < required {
            return Err(Error::BufferTooSmall { capacity, required });
        }

        let mut iov = [IoSliceMut::new(buf)];
        let mut packet = RxPacket {
            iov: &mut iov,
            size: capacity,
            flags: 0,
        };
        let mut count = 1;

        let status = self
            .host()
            .read(&session.handle, slice::from_mut(&mut packet), &mut count);
        if !status.is_success() {
            return Err(io_error(session.is_closing(), status));
        }
        if count == 0 {
            debug!(identifier = %session.attributes.identifier, "read succeeded without a packet");
            return Err(Error::SpuriousReadSuccess);
        }

        Ok(ReadResult {
            packet_size: packet.size,
            flags: packet.flags,
        })
    }

    /// Write `buf` as one packet with the given flags
    ///
    /// Returns the packet size accepted by the host. A host success that
    /// transferred no packet is reported as [`Error::SpuriousWriteSuccess`].
    pub fn write(&self, buf: &[u8], flags: u32) -> Result<usize> {
        let session = self.session()?;
        let max = session.attributes.max_packet_size as usize;
        if buf.len() > max {
            return Err(Error::PacketTooLarge {
                len: buf.len(),
                max,
            });
        }

        let iov = [IoSlice::new(buf)];
        let packet = TxPacket {
            iov: &iov,
            size: buf.len(),
            flags,
        };
        let mut count = 1;

        let status = self
            .host()
            .write(&session.handle, slice::from_ref(&packet), &mut count);
        if !status.is_success() {
            return Err(io_error(session.is_closing(), status));
        }
        if count == 0 {
            debug!(identifier = %session.attributes.identifier, "write succeeded without a packet");
            return Err(Error::SpuriousWriteSuccess);
        }
        Ok(packet.size)
    }
}

/// Host I/O failures on an interface being closed surface as `NotOpen`
fn io_error(closing: bool, status: HostStatus) -> Error {
    if closing {
        Error::NotOpen
    } else {
        Error::HostIo(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{LoopbackConfig, LoopbackHost};
    use crate::iface::{EventKind, InterfaceEvent};
    use std::sync::{mpsc, Arc};
    use std::thread;

    fn open(config: LoopbackConfig) -> Interface<LoopbackHost> {
        let iface = Interface::new(Arc::new(LoopbackHost::new(config)));
        iface.open(None, |_event: InterfaceEvent| {}).unwrap();
        iface
    }

    #[test]
    fn test_write_then_read_returns_same_bytes() {
        let iface = open(LoopbackConfig::default());
        let frame: Vec<u8> = (0..64u8).collect();

        assert_eq!(iface.write(&frame, 0).unwrap(), 64);

        let mut buf = [0u8; 2048];
        let result = iface.read(&mut buf).unwrap();
        assert_eq!(result.packet_size, 64);
        assert_eq!(&buf[..64], frame.as_slice());
    }

    #[test]
    fn test_flags_pass_through() {
        let iface = open(LoopbackConfig::default());
        iface.write(&[1, 2, 3], 0x0000_0010).unwrap();

        let mut buf = [0u8; 1514];
        assert_eq!(
            iface.read(&mut buf).unwrap(),
            ReadResult {
                packet_size: 3,
                flags: 0x10
            }
        );
    }

    #[test]
    fn test_blocked_read_wakes_on_write() {
        let iface = Arc::new(open(LoopbackConfig::default()));

        let reader = {
            let iface = iface.clone();
            thread::spawn(move || {
                let mut buf = vec![0u8; 1514];
                let result = iface.read(&mut buf).unwrap();
                buf.truncate(result.packet_size);
                buf
            })
        };
        thread::sleep(std::time::Duration::from_millis(20));
        iface.write(b"late frame", 0).unwrap();

        assert_eq!(reader.join().unwrap(), b"late frame".to_vec());
    }

    #[test]
    fn test_spurious_read_is_an_error() {
        let iface = open(LoopbackConfig {
            spurious_reads: true,
            ..Default::default()
        });

        let mut buf = [0u8; 1514];
        let err = iface.read(&mut buf).unwrap_err();
        assert_eq!(err, Error::SpuriousReadSuccess);
        assert_eq!(err.status(), Some(HostStatus::SPURIOUS_READ));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_spurious_write_is_an_error() {
        let iface = open(LoopbackConfig {
            spurious_writes: true,
            ..Default::default()
        });

        assert_eq!(iface.write(&[0; 60], 0), Err(Error::SpuriousWriteSuccess));
    }

    #[test]
    fn test_io_outside_open_state_fails() {
        let host = Arc::new(LoopbackHost::default());
        let iface = Interface::new(host);
        let mut buf = [0u8; 2048];

        assert_eq!(iface.read(&mut buf), Err(Error::NotOpen));
        assert_eq!(iface.write(&[0; 10], 0), Err(Error::NotOpen));

        iface.open(None, |_event: InterfaceEvent| {}).unwrap();
        iface.close().unwrap();

        assert_eq!(iface.read(&mut buf), Err(Error::NotOpen));
        assert_eq!(iface.write(&[0; 10], 0), Err(Error::NotOpen));
    }

    #[test]
    fn test_buffer_bounds_are_checked() {
        let iface = open(LoopbackConfig::default());

        let mut small = [0u8; 100];
        assert_eq!(
            iface.read(&mut small),
            Err(Error::BufferTooSmall {
                capacity: 100,
                required: 1514
            })
        );
        assert_eq!(
            iface.write(&[0u8; 1515], 0),
            Err(Error::PacketTooLarge { len: 1515, max: 1514 })
        );
    }

    #[test]
    fn test_writes_raise_packets_available_events() {
        let iface = Interface::new(Arc::new(LoopbackHost::default()));
        let (tx, rx) = mpsc::channel::<InterfaceEvent>();
        iface.open(None, tx).unwrap();

        iface.write(&[0xaa; 60], 0).unwrap();
        iface.write(&[0xbb; 60], 0).unwrap();

        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert_eq!(first.kind, EventKind::PacketsAvailable);
        assert_eq!(first.estimated_packets, 1);
        assert_eq!(second.estimated_packets, 2);

        let mut buf = [0u8; 1514];
        assert_eq!(iface.read(&mut buf).unwrap().packet_size, 60);
        assert_eq!(buf[0], 0xaa);
    }

    #[test]
    fn test_full_receive_queue_fails_write() {
        let iface = open(LoopbackConfig {
            queue_capacity: 1,
            ..Default::default()
        });

        iface.write(&[1; 60], 0).unwrap();
        assert_eq!(
            iface.write(&[2; 60], 0),
            Err(Error::HostIo(HostStatus::BUFFER_EXHAUSTED))
        );

        let mut buf = [0u8; 1514];
        assert_eq!(iface.read(&mut buf).unwrap().packet_size, 60);
        assert_eq!(iface.write(&[3; 60], 0).unwrap(), 60);
    }
}

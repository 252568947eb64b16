//! Interface lifecycle
//!
//! Opening an interface turns the host's start request, whose result arrives
//! on a completion handler, into a blocking call. The attributes reported by
//! the completion are installed together with the handle and the event
//! notifier, so an open interface is always fully populated and always has
//! an active notifier. Closing reverses that: the event callback is removed,
//! the host stop completes, and only then is the event queue released.

use super::notifier::{EventNotifier, EventSink};
use crate::dispatch::{completion, SerialQueue};
use crate::error::{Error, Result};
use crate::host::{EventKind, HostNetwork, InterfaceDescriptor, StartedInterface};
use crate::identifier;
use crate::mac::MacAddress;
use crate::status::HostStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

const START_QUEUE_LABEL: &str = "vnic.start";
const STOP_QUEUE_LABEL: &str = "vnic.stop";

/// Attributes of an open interface, fixed for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAttributes {
    pub identifier: Uuid,
    pub mtu: u64,
    pub max_packet_size: u64,
    pub mac_address: MacAddress,
}

/// Handle and attributes of an open interface, shared with in-flight I/O
pub(super) struct Session<T> {
    pub handle: T,
    pub attributes: InterfaceAttributes,
    closing: AtomicBool,
}

impl<T> Session<T> {
    /// Set once close has started; host errors after that mean "closed"
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

enum State<T> {
    Unopened,
    Open {
        session: Arc<Session<T>>,
        notifier: EventNotifier,
    },
    Closed,
}

/// One virtual NIC session on a host
///
/// Every method takes `&self`, so an interface shared through an `Arc` can
/// be closed while another thread is blocked in [`read`](Interface::read).
/// The blocked read then fails with [`Error::NotOpen`].
pub struct Interface<H: HostNetwork> {
    host: Arc<H>,
    state: Mutex<State<H::Handle>>,
}

impl<H: HostNetwork> Interface<H> {
    /// Create an unopened interface on `host`
    pub fn new(host: Arc<H>) -> Self {
        Interface {
            host,
            state: Mutex::new(State::Unopened),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State<H::Handle>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start the interface and block until the host reports the result
    ///
    /// `identifier_hint` is used as the interface identifier if it is a
    /// canonical UUID string; otherwise a random one is requested. The host
    /// may still assign a different identifier, which is what the returned
    /// attributes carry. `sink` receives packets-available events from the
    /// moment this returns until `close` starts.
    ///
    /// There is no timeout: the host offers no way to cancel a start.
    pub fn open<S: EventSink>(
        &self,
        identifier_hint: Option<&str>,
        sink: S,
    ) -> Result<InterfaceAttributes> {
        let mut state = self.lock_state();
        if matches!(*state, State::Open { .. }) {
            return Err(Error::AlreadyOpen);
        }

        let descriptor = InterfaceDescriptor::shared(identifier::resolve(identifier_hint));
        debug!(identifier = %descriptor.identifier, "starting interface");
        let started = self.start(&descriptor)?;
        let StartedInterface { handle, params } = started;

        let mac_address = match params.mac_address.parse::<MacAddress>() {
            Ok(mac) => mac,
            Err(_) => {
                self.abandon(&handle);
                return Err(Error::InvalidMacAddress(params.mac_address));
            }
        };
        let attributes = InterfaceAttributes {
            identifier: params.identifier,
            mtu: params.mtu,
            max_packet_size: params.max_packet_size,
            mac_address,
        };

        let notifier = match EventNotifier::start(attributes.identifier, Arc::new(sink)) {
            Ok(notifier) => notifier,
            Err(err) => {
                self.abandon(&handle);
                return Err(err);
            }
        };
        if let Err(status) = self.host.set_event_callback(
            &handle,
            EventKind::PacketsAvailable,
            Some(notifier.registration()),
        ) {
            self.abandon(&handle);
            notifier.release();
            return Err(Error::HostStartFailure(status));
        }

        info!(
            identifier = %attributes.identifier,
            mtu = attributes.mtu,
            max_packet_size = attributes.max_packet_size,
            mac = %attributes.mac_address,
            "interface opened"
        );
        *state = State::Open {
            session: Arc::new(Session {
                handle,
                attributes: attributes.clone(),
                closing: AtomicBool::new(false),
            }),
            notifier,
        };
        Ok(attributes)
    }

    /// Stop the interface and release its event queue
    ///
    /// Reads blocked on the interface return [`Error::NotOpen`]. The
    /// interface is closed locally whatever the outcome. A
    /// `HostStopFailure` leaves the host side in an unknown state; the
    /// instance should not be reused. Closing an interface that is not open
    /// fails with `HostStopFailure(INVALID_ARGUMENT)`.
    pub fn close(&self) -> Result<()> {
        let (session, notifier) = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Closed) {
                State::Open { session, notifier } => (session, notifier),
                other => {
                    *state = other;
                    return Err(Error::HostStopFailure(HostStatus::INVALID_ARGUMENT));
                }
            }
        };
        let identifier = session.attributes.identifier;
        session.closing.store(true, Ordering::SeqCst);

        if let Err(status) =
            self.host
                .set_event_callback(&session.handle, EventKind::PacketsAvailable, None)
        {
            warn!(%identifier, %status, "failed to remove event callback");
        }

        let result = self.stop(&session.handle);
        // Callbacks already posted may still be running until here.
        notifier.release();

        match &result {
            Ok(()) => info!(%identifier, "interface closed"),
            Err(err) => warn!(%identifier, error = %err, "interface close failed"),
        }
        result
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock_state(), State::Open { .. })
    }

    /// Attributes of the open session, None outside of it
    pub fn attributes(&self) -> Option<InterfaceAttributes> {
        match &*self.lock_state() {
            State::Open { session, .. } => Some(session.attributes.clone()),
            _ => None,
        }
    }

    pub fn identifier(&self) -> Option<Uuid> {
        self.attributes().map(|attributes| attributes.identifier)
    }

    /// Events delivered to the sink during the current session
    pub fn events_delivered(&self) -> u64 {
        match &*self.lock_state() {
            State::Open { notifier, .. } => notifier.delivered(),
            _ => 0,
        }
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    pub(super) fn session(&self) -> Result<Arc<Session<H::Handle>>> {
        match &*self.lock_state() {
            State::Open { session, .. } => Ok(session.clone()),
            _ => Err(Error::NotOpen),
        }
    }

    /// Issue the start request on its own queue and wait for the completion
    fn start(&self, descriptor: &InterfaceDescriptor) -> Result<StartedInterface<H::Handle>> {
        let queue = SerialQueue::new(START_QUEUE_LABEL)?;
        let (completer, waiter) = completion::channel();

        let requested = self.host.start_interface(
            descriptor,
            &queue.handle(),
            Box::new(
                move |status: HostStatus, started: Option<StartedInterface<H::Handle>>| {
                    completer.complete((status, started))
                },
            ),
        );
        let result = match requested {
            Err(status) => Err(Error::HostStartFailure(status)),
            Ok(()) => match waiter.wait() {
                Some((status, Some(started))) if status.is_success() => Ok(started),
                Some((status, _)) => Err(Error::HostStartFailure(status)),
                None => Err(Error::HostStartFailure(HostStatus::FAILURE)),
            },
        };
        queue.release();

        if let Err(err) = &result {
            warn!(identifier = %descriptor.identifier, error = %err, "interface start failed");
        }
        result
    }

    /// Issue the stop request on its own queue and wait for the completion
    fn stop(&self, handle: &H::Handle) -> Result<()> {
        let queue = SerialQueue::new(STOP_QUEUE_LABEL)?;
        let (completer, waiter) = completion::channel();

        let requested = self.host.stop_interface(
            handle,
            &queue.handle(),
            Box::new(move |status: HostStatus| completer.complete(status)),
        );
        let result = match requested {
            Err(status) => Err(status),
            Ok(()) => waiter
                .wait()
                .unwrap_or(HostStatus::FAILURE)
                .into_result(),
        };
        queue.release();
        result.map_err(Error::HostStopFailure)
    }

    /// Stop an interface that will not be handed to the caller
    fn abandon(&self, handle: &H::Handle) {
        if let Err(err) = self.stop(handle) {
            warn!(error = %err, "failed to stop abandoned interface");
        }
    }
}

impl<H: HostNetwork> Drop for Interface<H> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                warn!(error = %err, "close on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{LoopbackConfig, LoopbackHost};
    use crate::iface::InterfaceEvent;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn loopback(config: LoopbackConfig) -> Arc<LoopbackHost> {
        Arc::new(LoopbackHost::new(config))
    }

    fn ignore(_event: InterfaceEvent) {}

    #[test]
    fn test_open_uses_valid_hint() {
        let host = loopback(LoopbackConfig::default());
        let iface = Interface::new(host.clone());
        let hint = "5d3b1c7e-2a4f-4e6b-8c9d-0a1b2c3d4e5f";

        let attributes = iface.open(Some(hint), ignore).unwrap();

        assert_eq!(attributes.identifier.to_string(), hint);
        assert_eq!(attributes.mtu, 1500);
        assert_eq!(attributes.max_packet_size, 1514);
        assert_eq!(attributes.mac_address.to_string(), "02:00:5e:10:00:01");
        assert_eq!(iface.attributes(), Some(attributes));
        assert_eq!(host.active_interfaces(), 1);
    }

    #[test]
    fn test_open_with_malformed_hint_generates_identifier() {
        let host = loopback(LoopbackConfig::default());
        let first = Interface::new(host.clone());
        let second = Interface::new(host.clone());

        let a = first.open(Some("not-a-uuid"), ignore).unwrap();
        let b = second.open(Some("not-a-uuid"), ignore).unwrap();

        assert_ne!(a.identifier.to_string(), "not-a-uuid");
        assert_ne!(a.identifier, b.identifier);
        assert!(a.mtu > 0);
    }

    #[test]
    fn test_open_reports_host_assigned_identifier() {
        let assigned = Uuid::new_v4();
        let host = loopback(LoopbackConfig {
            assigned_identifier: Some(assigned),
            ..Default::default()
        });
        let iface = Interface::new(host);

        let attributes = iface.open(Some(&Uuid::new_v4().to_string()), ignore).unwrap();
        assert_eq!(attributes.identifier, assigned);
        assert_eq!(iface.identifier(), Some(assigned));
    }

    #[test]
    fn test_failed_start_leaves_interface_unopened() {
        let host = loopback(LoopbackConfig {
            start_status: HostStatus::INVALID_ACCESS,
            ..Default::default()
        });
        let iface = Interface::new(host.clone());

        assert_eq!(
            iface.open(None, ignore),
            Err(Error::HostStartFailure(HostStatus::INVALID_ACCESS))
        );
        assert!(!iface.is_open());
        assert!(iface.attributes().is_none());
        assert_eq!(host.active_interfaces(), 0);
    }

    #[test]
    fn test_rejected_start_is_reported() {
        let host = loopback(LoopbackConfig {
            reject_start: Some(HostStatus::MEM_FAILURE),
            ..Default::default()
        });
        let iface = Interface::new(host);

        assert_eq!(
            iface.open(None, ignore),
            Err(Error::HostStartFailure(HostStatus::MEM_FAILURE))
        );
    }

    #[test]
    fn test_malformed_mac_stops_started_interface() {
        let host = loopback(LoopbackConfig {
            mac_address: "02:00:5e".to_string(),
            ..Default::default()
        });
        let iface = Interface::new(host.clone());

        assert_eq!(
            iface.open(None, ignore),
            Err(Error::InvalidMacAddress("02:00:5e".to_string()))
        );
        assert!(!iface.is_open());
        assert_eq!(host.active_interfaces(), 0);
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let host = loopback(LoopbackConfig::default());
        let iface = Interface::new(host.clone());

        iface.open(None, ignore).unwrap();
        assert_eq!(iface.open(None, ignore), Err(Error::AlreadyOpen));
        assert_eq!(host.active_interfaces(), 1);
    }

    #[test]
    fn test_close_twice_fails_second_time() {
        let host = loopback(LoopbackConfig::default());
        let iface = Interface::new(host.clone());
        iface.open(None, ignore).unwrap();

        assert_eq!(iface.close(), Ok(()));
        assert!(!iface.is_open());
        assert_eq!(host.active_interfaces(), 0);
        assert_eq!(
            iface.close(),
            Err(Error::HostStopFailure(HostStatus::INVALID_ARGUMENT))
        );
    }

    #[test]
    fn test_close_unopened_fails() {
        let iface = Interface::new(loopback(LoopbackConfig::default()));
        assert_eq!(
            iface.close(),
            Err(Error::HostStopFailure(HostStatus::INVALID_ARGUMENT))
        );
    }

    #[test]
    fn test_rejected_stop_closes_locally() {
        let host = loopback(LoopbackConfig {
            reject_stop: Some(HostStatus::SETUP_INCOMPLETE),
            ..Default::default()
        });
        let iface = Interface::new(host);
        iface.open(None, ignore).unwrap();

        assert_eq!(
            iface.close(),
            Err(Error::HostStopFailure(HostStatus::SETUP_INCOMPLETE))
        );
        assert!(!iface.is_open());
    }

    #[test]
    fn test_stop_completion_failure_is_reported() {
        let host = loopback(LoopbackConfig {
            stop_status: HostStatus::FAILURE,
            ..Default::default()
        });
        let iface = Interface::new(host);
        iface.open(None, ignore).unwrap();

        assert_eq!(iface.close(), Err(Error::HostStopFailure(HostStatus::FAILURE)));
    }

    #[test]
    fn test_no_events_after_close() {
        let host = loopback(LoopbackConfig::default());
        let iface = Interface::new(host);
        let (tx, rx) = mpsc::channel::<InterfaceEvent>();
        iface.open(None, tx).unwrap();

        for _ in 0..16 {
            iface.write(&[0x55; 64], 0).unwrap();
        }
        iface.close().unwrap();

        let before = rx.try_iter().count();
        assert!(before <= 16);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(iface.events_delivered(), 0);
    }

    #[test]
    fn test_drop_closes_interface() {
        let host = loopback(LoopbackConfig::default());
        {
            let iface = Interface::new(host.clone());
            iface.open(None, ignore).unwrap();
            assert_eq!(host.active_interfaces(), 1);
        }
        assert_eq!(host.active_interfaces(), 0);
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let host = loopback(LoopbackConfig::default());
        let iface = Arc::new(Interface::new(host.clone()));
        iface.open(None, ignore).unwrap();

        let reader = {
            let iface = iface.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 1514];
                iface.read(&mut buf)
            })
        };
        thread::sleep(Duration::from_millis(20));

        assert_eq!(iface.close(), Ok(()));
        assert_eq!(reader.join().unwrap(), Err(Error::NotOpen));
        assert_eq!(host.active_interfaces(), 0);

        let mut buf = [0u8; 1514];
        assert_eq!(iface.read(&mut buf), Err(Error::NotOpen));
    }

    #[test]
    fn test_dropped_start_completion_fails_open() {
        let host = loopback(LoopbackConfig {
            drop_start_completion: true,
            ..Default::default()
        });
        let iface = Interface::new(host.clone());

        assert_eq!(
            iface.open(None, ignore),
            Err(Error::HostStartFailure(HostStatus::FAILURE))
        );
        assert!(!iface.is_open());
        assert_eq!(host.active_interfaces(), 0);
    }

    #[test]
    fn test_dropped_stop_completion_fails_close() {
        let host = loopback(LoopbackConfig {
            drop_stop_completion: true,
            ..Default::default()
        });
        let iface = Interface::new(host);
        iface.open(None, ignore).unwrap();

        assert_eq!(iface.close(), Err(Error::HostStopFailure(HostStatus::FAILURE)));
        assert!(!iface.is_open());
    }
}

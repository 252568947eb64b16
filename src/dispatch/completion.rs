//! One-shot blocking handoff
//!
//! A completion handler owns the [`Completer`] and signals it once; the
//! calling thread parks in [`Completion::wait`] until then.

use std::sync::mpsc::{self, Receiver, SyncSender};

/// Signalling half, consumed when the value is delivered
#[derive(Debug)]
pub struct Completer<T> {
    sender: SyncSender<T>,
}

/// Waiting half
#[derive(Debug)]
pub struct Completion<T> {
    receiver: Receiver<T>,
}

/// Create a connected completer/completion pair
pub fn channel<T>() -> (Completer<T>, Completion<T>) {
    // One slot: the single send never blocks the completion handler.
    let (sender, receiver) = mpsc::sync_channel(1);
    (Completer { sender }, Completion { receiver })
}

impl<T> Completer<T> {
    pub fn complete(self, value: T) {
        // The waiter may have given up already; nothing to do then.
        let _ = self.sender.send(value);
    }
}

impl<T> Completion<T> {
    /// Block until the completer fires
    ///
    /// Returns None if the completer was dropped without firing, which is
    /// how a host that discards its completion handler shows up here.
    pub fn wait(self) -> Option<T> {
        self.receiver.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_returns_value_from_other_thread() {
        let (completer, completion) = channel();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completer.complete(1000u32);
        });

        assert_eq!(completion.wait(), Some(1000));
        worker.join().unwrap();
    }

    #[test]
    fn test_dropped_completer_wakes_waiter() {
        let (completer, completion) = channel::<u32>();
        drop(completer);
        assert_eq!(completion.wait(), None);
    }

    #[test]
    fn test_complete_without_waiter_does_not_block() {
        let (completer, completion) = channel();
        drop(completion);
        completer.complete("late");
    }
}

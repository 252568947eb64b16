//! Serial execution context
//!
//! A [`SerialQueue`] owns one worker thread that runs posted jobs strictly in
//! FIFO order, never overlapping. Hosts receive a cloneable [`QueueHandle`]
//! to post completion handlers and event callbacks on.

use crate::error::{Error, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

/// Posting side of a serial queue
#[derive(Clone)]
pub struct QueueHandle {
    label: Arc<str>,
    sender: Sender<Message>,
}

impl QueueHandle {
    /// Post a job to run after every job posted before it
    ///
    /// Returns false if the queue has been released; the job is dropped
    /// without running.
    pub fn dispatch<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Message::Run(Box::new(job))).is_ok()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle").field("label", &self.label).finish()
    }
}

/// Owned serial queue; releasing it drains and joins the worker
pub struct SerialQueue {
    handle: QueueHandle,
    worker: Option<JoinHandle<()>>,
}

impl SerialQueue {
    /// Spawn a new queue whose worker thread is named after `label`
    pub fn new(label: &str) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(label.to_string())
            .spawn(move || run(receiver))
            .map_err(|err| Error::QueueSpawn {
                label: label.to_string(),
                reason: err.to_string(),
            })?;

        debug!(queue = label, "serial queue created");
        Ok(SerialQueue {
            handle: QueueHandle {
                label: Arc::from(label),
                sender,
            },
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> QueueHandle {
        self.handle.clone()
    }

    pub fn label(&self) -> &str {
        self.handle.label()
    }

    /// Release the queue
    ///
    /// Jobs posted before this call still run; this returns once the last of
    /// them has finished. Jobs posted afterwards are dropped.
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        // Handles held elsewhere keep the channel open, so the worker is told
        // to stop explicitly rather than waiting for every sender to drop.
        let _ = self.handle.sender.send(Message::Shutdown);

        if worker.thread().id() == thread::current().id() {
            warn!(queue = self.label(), "serial queue released from its own worker; not joining");
            return;
        }
        if worker.join().is_err() {
            warn!(queue = self.label(), "serial queue worker panicked");
        }
        debug!(queue = self.label(), "serial queue released");
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(receiver: Receiver<Message>) {
    for message in receiver {
        match message {
            Message::Run(job) => job(),
            Message::Shutdown => break,
        }
    }
}

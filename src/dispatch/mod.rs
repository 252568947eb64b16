//! Execution contexts used to bridge the host's completion model
//!
//! This module provides:
//! - Serial queues: one named worker thread running posted jobs in order
//! - One-shot completions: a blocking handoff signalled exactly once

pub mod completion;
pub mod queue;

pub use completion::{Completer, Completion};
pub use queue::{QueueHandle, SerialQueue};

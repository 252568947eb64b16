//! Utility functions for the demo programs
//!
//! This module provides host-side link setup shared by the demos.

pub mod network;

pub use network::*;

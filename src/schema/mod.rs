//! vibeflow.host_event.v1 schema
//!
//! This module defines the message format hosts use to drive a session over
//! a text channel (NDJSON over stdio, or the C ABI). Each record carries one
//! trigger: a text change, a focus change, a tick, a command, a decision, or a
//! dashboard acknowledgement.

mod host_event;
mod adapter;

pub use host_event::*;
pub use adapter::*;

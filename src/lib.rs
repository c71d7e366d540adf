//! VibeFlow - flow-state estimation for code editors
//!
//! VibeFlow watches the edits an editor reports, tells human typing apart from
//! AI-assisted insertions, and turns the activity into a 0-100 flow score once
//! per tick: edit → classification → metrics → score → status / nudge.
//!
//! ## Modules
//!
//! - **Classification**: [`classifier`] tags each sub-change (insert, delete, AI accept...)
//! - **Scoring**: [`metrics`] and [`scorer`] compute the windowed flow score
//! - **Nudges**: [`nudge`] tracks low-flow streaks and [`prompt`] resolves user answers
//! - **Logs**: [`history`], [`store`] and [`export`] keep and persist the bounded logs
//! - **Host integration**: [`pipeline::FlowSession`], the [`schema`] event format and [`ffi`]

pub mod classifier;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod history;
pub mod metrics;
pub mod nudge;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod scorer;
pub mod store;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::FlowConfig;
pub use error::VibeflowError;
pub use pipeline::{FlowSession, FlowStatus, HostResponse, TickReport};

// Schema exports
pub use schema::{HostEvent, HostEventAdapter, SCHEMA_VERSION};

/// Library version reported to hosts
pub const VIBEFLOW_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name stamped on exported bundles and diagnostics
pub const PRODUCER_NAME: &str = "vibeflow";

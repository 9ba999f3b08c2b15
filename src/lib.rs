#![forbid(unsafe_code)]

//! Participant session and progression engine for multi-participant studies.
//!
//! Each participant walks a fixed stage sequence (intake, case assessment,
//! chat with a conversational agent, completion) while exchanging real-time
//! messages over a per-connection channel. The [`coordinator`] module is the
//! entry point event handlers call into; everything below it is plumbing.

pub mod agent;
pub mod cases;
pub mod channels;
pub mod config;
pub mod coordinator;
pub mod dialog;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod store;

pub use config::StudyConfig;
pub use errors::{AppError, Result};

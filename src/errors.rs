//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Note that advancing past the terminal stage is *not* an error: the stage
/// machine treats it as an idempotent no-op.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Conversational-agent call failed or timed out.
    Agent(String),
    /// Handler invoked for a participant ID absent from the session store.
    /// Channels can deliver stale IDs after a process restart, so callers
    /// log and ignore this rather than crash.
    UnknownParticipant(String),
    /// Session creation collided with an existing participant ID.
    DuplicateParticipant(String),
    /// Outbound delivery attempted with no live channel bound.
    ChannelUnbound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Agent(msg) => write!(f, "agent: {msg}"),
            Self::UnknownParticipant(msg) => write!(f, "unknown participant: {msg}"),
            Self::DuplicateParticipant(msg) => write!(f, "duplicate participant: {msg}"),
            Self::ChannelUnbound(msg) => write!(f, "channel unbound: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Agent(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

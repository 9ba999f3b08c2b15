//! Per-participant session record and transcript entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cases::CaseCursor;
use crate::channels::ChannelId;
use crate::models::stage::Stage;

/// Speaker role of a transcript entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Injected instruction, never shown to the participant.
    System,
    /// The participant.
    User,
    /// The conversational agent.
    Assistant,
}

/// One immutable transcript entry; insertion order is conversation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utterance {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl Utterance {
    /// Construct a participant entry.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Construct an agent entry.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Construct a system entry.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Mutable per-participant session state.
///
/// Created exactly once per participant and kept for the process lifetime.
/// All mutation goes through the session store's per-record lock; the
/// transcript is append-only and owned by the dialog module.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Current stage; only ever moves forward.
    pub stage: Stage,
    /// Most recently bound outbound channel; last writer wins.
    pub channel: Option<ChannelId>,
    /// Ordered dialog history.
    pub transcript: Vec<Utterance>,
    /// Case-rating sub-workflow, present when the study configures it.
    pub cases: Option<CaseCursor>,
    /// Session creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Construct a fresh record in the initial stage.
    #[must_use]
    pub fn new(cases: Option<CaseCursor>) -> Self {
        Self {
            stage: Stage::Intake,
            channel: None,
            transcript: Vec::new(),
            cases,
            created_at: Utc::now(),
        }
    }
}

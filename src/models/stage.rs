//! Participation stage machine.
//!
//! A participant moves forward through a fixed, linear stage order with a
//! single conditional branch: the case-selection stage routes to the
//! case-assessment stage when the deployment configures case rating, and
//! straight to the chat stage otherwise. The machine is pure; the
//! coordinator owns applying transitions to session records.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Stages a participant passes through, in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Initial stage assigned at session creation.
    Intake,
    /// Transient routing stage; participants never rest here.
    SelectCase,
    /// Case rating before the chat begins.
    PreChatAssess,
    /// Live dialog with the conversational agent.
    Chat,
    /// Terminal stage; advancing from here is a no-op.
    Done,
}

impl Stage {
    /// Stable wire name for this stage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::SelectCase => "select_case",
            Self::PreChatAssess => "pre_chat_assess",
            Self::Chat => "chat",
            Self::Done => "done",
        }
    }

    /// Whether this stage is served by an interactive page (the client is
    /// redirected there) rather than a rendered content payload.
    #[must_use]
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::PreChatAssess | Self::Chat)
    }

    /// Whether case labels are collected in this stage.
    #[must_use]
    pub fn is_rating(self) -> bool {
        matches!(self, Self::PreChatAssess)
    }

    /// Whether this stage is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the successor of `current`.
///
/// Deterministic and total: the terminal stage maps to itself, so repeated
/// advances past the end are idempotent.
#[must_use]
pub fn next_stage(current: Stage, case_rating_enabled: bool) -> Stage {
    match current {
        Stage::Intake => Stage::SelectCase,
        Stage::SelectCase => {
            if case_rating_enabled {
                Stage::PreChatAssess
            } else {
                Stage::Chat
            }
        }
        Stage::PreChatAssess => Stage::Chat,
        Stage::Chat | Stage::Done => Stage::Done,
    }
}

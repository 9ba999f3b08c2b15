//! Channel-addressed outbound messages.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::record::Role;

/// Message emitted to a participant's bound channel.
///
/// Serialized with an `event` tag so the client can dispatch on it, matching
/// the inbound event vocabulary.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Outbound {
    /// Echo of a transcript entry (participant's own text or agent reply).
    Utterance {
        /// Who spoke.
        role: Role,
        /// Entry text.
        content: String,
    },
    /// Instruction to navigate to an interactive stage page.
    Redirect {
        /// Relative navigation target.
        target: String,
    },
    /// Rendered body for a non-interactive stage.
    Content {
        /// Stage name.
        stage: String,
        /// Body text from the deployment's content map.
        body: String,
    },
    /// The participant's current case, with any previously stored label.
    Case {
        /// Rating stage name the label is keyed under.
        stage: String,
        /// 1-based position within the participant's shuffled order.
        position: usize,
        /// Index of the case in the dataset.
        case_index: usize,
        /// Case feature name → value map.
        features: BTreeMap<String, String>,
        /// Previously stored label, if the case was already rated.
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Current stage name, in reply to a state query.
    State {
        /// Stage name.
        stage: String,
    },
}

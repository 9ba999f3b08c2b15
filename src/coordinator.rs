//! Session coordinator: one operation per inbound event type.
//!
//! Every handler resolves the participant's record through the session
//! store, applies the relevant state change, and emits zero or more
//! messages to the participant's *currently* bound channel — which may
//! differ from the channel that delivered the inbound event, since
//! reconnects rebind asynchronously.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::AgentApi;
use crate::cases::{CaseCursor, CaseSet};
use crate::channels::{ChannelId, ChannelRegistry};
use crate::config::StudyConfig;
use crate::dialog;
use crate::models::outbound::Outbound;
use crate::models::record::SessionRecord;
use crate::models::stage::{next_stage, Stage};
use crate::store::SessionStore;
use crate::{AppError, Result};

/// Façade sequencing store lookups, stage transitions, cursor moves, and
/// dialog dispatch for every inbound event.
pub struct SessionCoordinator {
    config: Arc<StudyConfig>,
    cases: Option<Arc<CaseSet>>,
    store: Arc<SessionStore>,
    channels: Arc<ChannelRegistry>,
    agent: Arc<dyn AgentApi>,
}

impl SessionCoordinator {
    /// Wire up the coordinator.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configuration enables case rating
    /// but no dataset was supplied, or vice versa.
    pub fn new(
        config: Arc<StudyConfig>,
        cases: Option<Arc<CaseSet>>,
        channels: Arc<ChannelRegistry>,
        agent: Arc<dyn AgentApi>,
    ) -> Result<Self> {
        if config.case_rating_enabled() != cases.is_some() {
            return Err(AppError::Config(
                "case dataset presence must match the cases configuration".into(),
            ));
        }
        Ok(Self {
            config,
            cases,
            store: Arc::new(SessionStore::new()),
            channels,
            agent,
        })
    }

    /// Create a new participant session and return its generated ID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateParticipant` on an ID collision, which
    /// would indicate a broken ID generator.
    pub async fn begin(&self) -> Result<String> {
        let participant = Uuid::new_v4().to_string();
        let cursor = self.fresh_cursor();
        self.store
            .create(&participant, SessionRecord::new(cursor))
            .await?;
        info!(participant = %participant, "participant session created");
        Ok(participant)
    }

    /// Bind (or rebind) the participant's outbound channel; last writer wins.
    ///
    /// Called on every reconnect-style event so in-flight replies land on
    /// the live channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn bind_channel(&self, participant: &str, channel: ChannelId) -> Result<()> {
        let channel_name = channel.clone();
        self.store
            .with_record(participant, move |record| {
                record.channel = Some(channel);
            })
            .await?;
        debug!(participant, channel = %channel_name, "channel bound");
        Ok(())
    }

    /// Advance the participant to the next stage and notify their channel.
    ///
    /// The transient case-selection stage is skipped through: when case
    /// rating is configured the cursor is reset and the participant lands
    /// on the assessment stage, otherwise they land directly in the chat.
    /// Advancing from the terminal stage is an idempotent no-op that still
    /// re-emits the terminal content payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn advance_stage(&self, participant: &str) -> Result<()> {
        let enabled = self.config.case_rating_enabled();
        let fresh = self.fresh_cursor();
        let (stage, channel) = self
            .store
            .with_record(participant, move |record| {
                let mut next = next_stage(record.stage, enabled);
                if next == Stage::SelectCase {
                    next = next_stage(Stage::SelectCase, enabled);
                    if enabled {
                        match &mut record.cases {
                            Some(cursor) => cursor.reset(),
                            None => record.cases = fresh,
                        }
                    }
                }
                record.stage = next;
                (next, record.channel.clone())
            })
            .await?;
        info!(participant, stage = %stage, "stage advanced");
        self.emit_stage_update(participant, channel.as_ref(), stage)
            .await;
        Ok(())
    }

    /// Re-emit the payload for the participant's current stage.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn request_content(&self, participant: &str) -> Result<()> {
        let record = self.store.snapshot(participant).await?;
        self.emit_stage_update(participant, record.channel.as_ref(), record.stage)
            .await;
        Ok(())
    }

    /// Replay the dialog history to the participant's current channel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn request_history(&self, participant: &str) -> Result<()> {
        dialog::send_history(&self.store, &self.channels, participant).await
    }

    /// Append a participant utterance, echo it, and schedule the assistant
    /// reply as a detached background task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn send_utterance(&self, participant: &str, text: &str) -> Result<()> {
        let (entry, channel) = dialog::append_user_utterance(&self.store, participant, text).await?;
        self.channels
            .deliver(
                channel.as_ref(),
                Outbound::Utterance {
                    role: entry.role,
                    content: entry.content,
                },
            )
            .await;
        // Detached: the reply task outlives this handler.
        let _ = dialog::spawn_assistant_reply(
            Arc::clone(&self.store),
            Arc::clone(&self.channels),
            Arc::clone(&self.agent),
            participant.to_owned(),
        );
        Ok(())
    }

    /// Report the participant's current stage, also emitting it to their
    /// channel as a `state` message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn get_state(&self, participant: &str) -> Result<Stage> {
        let record = self.store.snapshot(participant).await?;
        self.channels
            .deliver(
                record.channel.as_ref(),
                Outbound::State {
                    stage: record.stage.as_str().to_owned(),
                },
            )
            .await;
        Ok(record.stage)
    }

    /// Emit the participant's current case payload.
    ///
    /// Outside a rating stage this is a logged no-op.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn get_current_case(&self, participant: &str) -> Result<()> {
        self.send_case(participant).await
    }

    /// Record a label for the participant's current case, then re-send the
    /// (now labeled) case payload. Re-rating overwrites the prior label.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn rate_current_case(
        &self,
        participant: &str,
        stage: &str,
        label: &str,
    ) -> Result<()> {
        let stage_key = stage.to_owned();
        let label_text = label.to_owned();
        let recorded = self
            .store
            .with_record(participant, move |record| {
                record.cases.as_mut().map(|cursor| {
                    let index = cursor.current_case();
                    cursor.record_label(&stage_key, index, label_text);
                    index
                })
            })
            .await?;
        match recorded {
            Some(index) => {
                info!(participant, stage, case_index = index, "label recorded");
                self.send_case(participant).await
            }
            None => {
                warn!(participant, "rating received but no case cursor exists");
                Ok(())
            }
        }
    }

    /// Move the case cursor by a signed step.
    ///
    /// Exhaustion (a forward step reaching the configured limit) triggers
    /// the outer stage advance instead of a cursor move; otherwise the new
    /// current case is emitted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnknownParticipant` if the ID is absent.
    pub async fn step_cases(&self, participant: &str, step: i64) -> Result<()> {
        let exhausted = self
            .store
            .with_record(participant, |record| {
                record.cases.as_mut().map(|cursor| cursor.advance(step))
            })
            .await?;
        match exhausted {
            Some(true) => {
                info!(participant, "case order exhausted, advancing stage");
                self.advance_stage(participant).await
            }
            Some(false) => self.send_case(participant).await,
            None => {
                warn!(participant, "step received but no case cursor exists");
                Ok(())
            }
        }
    }

    /// Registry the transport layer registers its connections with.
    #[must_use]
    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    fn fresh_cursor(&self) -> Option<CaseCursor> {
        let case_set = self.cases.as_ref()?;
        let cases_config = self.config.cases.as_ref()?;
        Some(CaseCursor::new(case_set.len(), cases_config.n))
    }

    async fn emit_stage_update(
        &self,
        participant: &str,
        channel: Option<&ChannelId>,
        stage: Stage,
    ) {
        let message = if stage.is_interactive() {
            Outbound::Redirect {
                target: format!("?participant={participant}"),
            }
        } else {
            let name = stage.as_str();
            let body = self
                .config
                .content
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("You have reached the {name} stage."));
            Outbound::Content {
                stage: name.to_owned(),
                body,
            }
        };
        self.channels.deliver(channel, message).await;
    }

    async fn send_case(&self, participant: &str) -> Result<()> {
        let Some(case_set) = self.cases.as_ref() else {
            debug!(participant, "case requested but no dataset is configured");
            return Ok(());
        };
        let current = self
            .store
            .with_record(participant, |record| {
                if !record.stage.is_rating() {
                    return None;
                }
                record.cases.as_ref().map(|cursor| {
                    let index = cursor.current_case();
                    (
                        record.stage,
                        cursor.position(),
                        index,
                        cursor
                            .label_for(record.stage.as_str(), index)
                            .map(str::to_owned),
                        record.channel.clone(),
                    )
                })
            })
            .await?;

        let Some((stage, position, case_index, label, channel)) = current else {
            debug!(participant, "no rating stage active, case request ignored");
            return Ok(());
        };

        let features = case_set.features(case_index).unwrap_or_default();
        self.channels
            .deliver(
                channel.as_ref(),
                Outbound::Case {
                    stage: stage.as_str().to_owned(),
                    position: position + 1,
                    case_index,
                    features,
                    label,
                },
            )
            .await;
        Ok(())
    }
}

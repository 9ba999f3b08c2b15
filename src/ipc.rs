//! Newline-delimited JSON event bridge.
//!
//! Hosts the engine behind the process's stdin/stdout so a transport (or an
//! operator) can drive it without a web layer. One JSON object per line in
//! each direction.
//!
//! ## Protocol
//!
//! Inbound events:
//! ```json
//! {"event": "begin"}
//! {"event": "bind_channel", "participant": "..."}
//! {"event": "advance_stage", "participant": "..."}
//! {"event": "send_utterance", "participant": "...", "text": "hello"}
//! {"event": "step_cases", "participant": "...", "step": 1}
//! ```
//!
//! Replies and channel-addressed outbound messages:
//! ```json
//! {"ok": true, "participant": "..."}
//! {"ok": false, "error": "unknown participant: ..."}
//! {"channel": "...", "event": "utterance", "role": "user", "content": "hello"}
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::channels::ChannelId;
use crate::coordinator::SessionCoordinator;
use crate::{AppError, Result};

/// Inbound event, one per line, dispatched on the `event` tag.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum InboundEvent {
    /// Create a new participant session.
    Begin,
    /// Bind the participant to this connection's channel.
    BindChannel { participant: String },
    /// Advance the participant's stage.
    AdvanceStage { participant: String },
    /// Re-emit the current stage payload.
    RequestContent { participant: String },
    /// Replay the dialog history.
    RequestHistory { participant: String },
    /// Append a participant utterance and schedule the agent reply.
    SendUtterance { participant: String, text: String },
    /// Query the current stage.
    GetState { participant: String },
    /// Emit the current case payload.
    GetCurrentCase { participant: String },
    /// Record a label for the current case.
    RateCurrentCase {
        participant: String,
        stage: String,
        label: String,
    },
    /// Move the case cursor by a signed step.
    StepCases { participant: String, step: i64 },
    /// Liveness probe.
    Status,
}

/// Direct reply to an inbound event (distinct from channel-addressed
/// outbound messages, which carry a `channel` field instead).
#[derive(Debug, Serialize)]
struct EventReply {
    /// Whether the event was handled.
    ok: bool,
    /// Newly created participant ID (for `begin`).
    #[serde(skip_serializing_if = "Option::is_none")]
    participant: Option<String>,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl EventReply {
    fn success(data: Option<serde_json::Value>) -> Self {
        Self {
            ok: true,
            participant: None,
            data,
            error: None,
        }
    }

    fn participant(id: String) -> Self {
        Self {
            ok: true,
            participant: Some(id),
            data: None,
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            participant: None,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Run the bridge over the process's stdin/stdout until EOF.
///
/// # Errors
///
/// Returns `AppError::Io` if reading from stdin fails.
pub async fn run_stdio_bridge(coordinator: &SessionCoordinator) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    run_bridge(coordinator, stdin, tokio::io::stdout()).await
}

/// Run the bridge over arbitrary reader/writer pairs (testable core).
///
/// # Errors
///
/// Returns `AppError::Io` if reading an event line fails.
pub async fn run_bridge<R, W>(
    coordinator: &SessionCoordinator,
    reader: BufReader<R>,
    writer: W,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // All output lines funnel through one writer task so replies and
    // channel-addressed messages never interleave mid-line.
    let (line_tx, line_rx) = mpsc::unbounded_channel::<serde_json::Value>();
    let writer_task = spawn_line_writer(writer, line_rx);

    // This connection is one channel; bind_channel events attach
    // participants to it.
    let channel = ChannelId::random();
    let mut outbound_rx = coordinator.channels().register(channel.clone()).await;
    info!(channel = %channel, "event bridge connected");

    let pump_tx = line_tx.clone();
    let pump_channel = channel.clone();
    let pump_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let mut value = match serde_json::to_value(&message) {
                Ok(value) => value,
                Err(err) => {
                    warn!(%err, "failed to serialize outbound message");
                    continue;
                }
            };
            if let Some(object) = value.as_object_mut() {
                object.insert(
                    "channel".into(),
                    serde_json::Value::String(pump_channel.as_str().to_owned()),
                );
            }
            if pump_tx.send(value).is_err() {
                break;
            }
        }
    });

    let mut lines = reader.lines();
    let outcome = loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(err) => break Err(AppError::from(err)),
        };
        if line.trim().is_empty() {
            continue;
        }
        let event: InboundEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "discarding malformed event line");
                send_reply(&line_tx, &EventReply::error(format!("invalid event: {err}")));
                continue;
            }
        };
        let reply = handle_event(coordinator, &channel, event).await;
        if let Some(reply) = reply {
            send_reply(&line_tx, &reply);
        }
    };

    info!(channel = %channel, "event bridge disconnected");
    coordinator.channels().unregister(&channel).await;
    pump_task.abort();
    drop(line_tx);
    let _ = writer_task.await;
    outcome
}

/// Dispatch one event; a fault in one participant's flow never escapes to
/// take down the bridge.
async fn handle_event(
    coordinator: &SessionCoordinator,
    channel: &ChannelId,
    event: InboundEvent,
) -> Option<EventReply> {
    let result = match event {
        InboundEvent::Begin => {
            return Some(match coordinator.begin().await {
                Ok(id) => EventReply::participant(id),
                Err(err) => EventReply::error(err.to_string()),
            });
        }
        InboundEvent::Status => {
            return Some(EventReply::success(Some(serde_json::Value::String(
                "ok".into(),
            ))));
        }
        InboundEvent::GetState { participant } => {
            return Some(match coordinator.get_state(&participant).await {
                Ok(stage) => EventReply::success(Some(serde_json::Value::String(
                    stage.as_str().to_owned(),
                ))),
                Err(err) => {
                    warn!(participant = %participant, %err, "get_state for unknown participant");
                    EventReply::error(err.to_string())
                }
            });
        }
        InboundEvent::BindChannel { participant } => {
            coordinator.bind_channel(&participant, channel.clone()).await
        }
        InboundEvent::AdvanceStage { participant } => coordinator.advance_stage(&participant).await,
        InboundEvent::RequestContent { participant } => {
            coordinator.request_content(&participant).await
        }
        InboundEvent::RequestHistory { participant } => {
            coordinator.request_history(&participant).await
        }
        InboundEvent::SendUtterance { participant, text } => {
            coordinator.send_utterance(&participant, &text).await
        }
        InboundEvent::GetCurrentCase { participant } => {
            coordinator.get_current_case(&participant).await
        }
        InboundEvent::RateCurrentCase {
            participant,
            stage,
            label,
        } => {
            coordinator
                .rate_current_case(&participant, &stage, &label)
                .await
        }
        InboundEvent::StepCases { participant, step } => {
            coordinator.step_cases(&participant, step).await
        }
    };

    match result {
        Ok(()) => None,
        Err(err) => {
            // Stale participant IDs after a restart are expected; log and
            // keep serving.
            warn!(%err, "event ignored");
            Some(EventReply::error(err.to_string()))
        }
    }
}

fn send_reply(line_tx: &mpsc::UnboundedSender<serde_json::Value>, reply: &EventReply) {
    match serde_json::to_value(reply) {
        Ok(value) => {
            let _ = line_tx.send(value);
        }
        Err(err) => warn!(%err, "failed to serialize reply"),
    }
}

fn spawn_line_writer<W>(
    mut writer: W,
    mut line_rx: mpsc::UnboundedReceiver<serde_json::Value>,
) -> tokio::task::JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(value) = line_rx.recv().await {
            let mut line = value.to_string();
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() {
                warn!("stdout closed, stopping line writer");
                break;
            }
            let _ = writer.flush().await;
        }
    })
}

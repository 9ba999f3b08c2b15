//! Dialog transcript management and background reply dispatch.
//!
//! The transcript is append-only and only this module writes to it. The
//! assistant reply runs as a spawned task with a two-phase lock protocol:
//! snapshot the transcript under the record lock, release it for the slow
//! agent call, then re-acquire to append the reply and read the *current*
//! channel binding. A participant who reconnects mid-reply therefore still
//! receives the reply on their live channel, and a slow reply never blocks
//! that participant's quick actions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, info_span, warn, Instrument};

use crate::agent::AgentApi;
use crate::channels::{ChannelId, ChannelRegistry};
use crate::models::outbound::Outbound;
use crate::models::record::Utterance;
use crate::store::SessionStore;
use crate::Result;

/// Delay before the single retry after an agent failure.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Append a participant utterance to the transcript.
///
/// Runs synchronously under the record's exclusive access and returns the
/// entry together with the currently bound channel, so the caller can echo
/// it back immediately.
///
/// # Errors
///
/// Returns `AppError::UnknownParticipant` if the ID is absent.
pub async fn append_user_utterance(
    store: &SessionStore,
    participant: &str,
    text: &str,
) -> Result<(Utterance, Option<ChannelId>)> {
    let entry = Utterance::user(text);
    let appended = entry.clone();
    let channel = store
        .with_record(participant, move |record| {
            record.transcript.push(appended);
            record.channel.clone()
        })
        .await?;
    Ok((entry, channel))
}

/// Replay the full transcript, in order, to the participant's current channel.
///
/// # Errors
///
/// Returns `AppError::UnknownParticipant` if the ID is absent.
pub async fn send_history(
    store: &SessionStore,
    channels: &ChannelRegistry,
    participant: &str,
) -> Result<()> {
    let (transcript, channel) = store
        .with_record(participant, |record| {
            (record.transcript.clone(), record.channel.clone())
        })
        .await?;
    for entry in transcript {
        channels
            .deliver(
                channel.as_ref(),
                Outbound::Utterance {
                    role: entry.role,
                    content: entry.content,
                },
            )
            .await;
    }
    Ok(())
}

/// Spawn the background task that obtains and delivers the assistant reply.
///
/// The task outlives the event handler that spawned it. Agent failures are
/// retried once after a short delay, then logged and swallowed: the
/// participant simply receives no assistant message. No error escapes the
/// task.
pub fn spawn_assistant_reply(
    store: Arc<SessionStore>,
    channels: Arc<ChannelRegistry>,
    agent: Arc<dyn AgentApi>,
    participant: String,
) -> JoinHandle<()> {
    let span = info_span!("assistant_reply", participant = %participant);
    tokio::spawn(
        async move {
            // Phase one: snapshot the transcript, then drop the lock before
            // the slow call.
            let transcript = match store
                .with_record(&participant, |record| record.transcript.clone())
                .await
            {
                Ok(transcript) => transcript,
                Err(err) => {
                    warn!(%err, "cannot snapshot transcript, skipping reply");
                    return;
                }
            };

            let reply = match agent.get_response(&transcript).await {
                Ok(reply) => reply,
                Err(first_err) => {
                    warn!(%first_err, "agent call failed, retrying once");
                    sleep(RETRY_DELAY).await;
                    match agent.get_response(&transcript).await {
                        Ok(reply) => reply,
                        Err(err) => {
                            warn!(%err, "agent retry failed, delivering no reply");
                            return;
                        }
                    }
                }
            };

            // Phase two: re-acquire the record to append the reply and read
            // whichever channel is bound *now*.
            let entry = Utterance::assistant(reply);
            let appended = entry.clone();
            let channel = match store
                .with_record(&participant, move |record| {
                    record.transcript.push(appended);
                    record.channel.clone()
                })
                .await
            {
                Ok(channel) => channel,
                Err(err) => {
                    warn!(%err, "session vanished before reply could be appended");
                    return;
                }
            };

            info!("delivering assistant reply");
            channels
                .deliver(
                    channel.as_ref(),
                    Outbound::Utterance {
                        role: entry.role,
                        content: entry.content,
                    },
                )
                .await;
        }
        .instrument(span),
    )
}
